//! One visualizer session: the latest run and the playback over it.

use serde::Serialize;

use crate::call_tree::{CallTree, CallTreeView};
use crate::config::{Config, NetworkConfig};
use crate::diff;
use crate::dispatch::{Dispatcher, RendererContract, RendererTable};
use crate::engine::{ExecutionEngine, RunError, RunOutput};
use crate::formula::{FormulaRenderer, PlainFormula};
use crate::network::{NetworkView, NeuralNetworkDescriptor};
use crate::playback::{Playback, TickScheduler};
use crate::value::{Tag, Value};

/// Everything a front end needs to draw the current step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub step: usize,
    pub total: usize,
    pub auto_play: bool,
    pub caption: String,
    pub lineno: Option<u32>,
    pub code: Option<String>,
    pub stdout: Vec<String>,
    pub formula: Option<String>,
    pub return_value: Option<Value>,
    pub variables: Vec<VariableView>,
    pub call_tree: Option<CallTreeView>,
    pub networks: Vec<NetworkView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableView {
    pub name: String,
    pub tag: Tag,
    /// New or modified since the previous step of the same frame.
    pub changed: bool,
    pub view: RendererContract,
}

pub struct Session<S: TickScheduler> {
    playback: Playback<S>,
    tree: CallTree,
    nn_models: Vec<NeuralNetworkDescriptor>,
    recursive_funcs: Vec<String>,
    error: Option<RunError>,
    running: bool,
    dispatcher: Dispatcher,
    formula: Box<dyn FormulaRenderer>,
    network: NetworkConfig,
}

impl<S: TickScheduler> Session<S> {
    pub fn new(scheduler: S, config: &Config) -> Self {
        Self {
            playback: Playback::new(scheduler, config.playback.interval()),
            tree: CallTree::default(),
            nn_models: Vec::new(),
            recursive_funcs: Vec::new(),
            error: None,
            running: false,
            dispatcher: Dispatcher::new(RendererTable::standard(), config.display.clone()),
            formula: Box::new(PlainFormula),
            network: config.network.clone(),
        }
    }

    pub fn with_renderers(mut self, table: RendererTable) -> Self {
        self.dispatcher = Dispatcher::new(table, self.dispatcher.config().clone());
        self
    }

    pub fn with_formula_renderer(mut self, renderer: impl FormulaRenderer + 'static) -> Self {
        self.formula = Box::new(renderer);
        self
    }

    pub fn playback(&self) -> &Playback<S> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut Playback<S> {
        &mut self.playback
    }

    pub fn tree(&self) -> &CallTree {
        &self.tree
    }

    pub fn nn_models(&self) -> &[NeuralNetworkDescriptor] {
        &self.nn_models
    }

    pub fn recursive_funcs(&self) -> &[String] {
        &self.recursive_funcs
    }

    /// Error of the last run, for the error panel.
    pub fn error(&self) -> Option<&RunError> {
        self.error.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starting a run discards the previous one.
    pub fn begin_run(&mut self) {
        self.playback.reset();
        self.tree = CallTree::default();
        self.nn_models.clear();
        self.recursive_funcs.clear();
        self.error = None;
        self.running = true;
    }

    pub fn finish_run(&mut self, result: Result<RunOutput, RunError>) {
        self.running = false;
        match result {
            Ok(output) => {
                log::info!("run finished with {} steps", output.log.len());
                self.tree = CallTree::build(&output.log);
                self.recursive_funcs = output
                    .recursive_funcs
                    .unwrap_or_else(|| self.tree.recursive_functions());
                self.nn_models = output.nn_models;
                self.playback.load_log(output.log);
            }
            Err(error) => {
                log::info!("run failed: {error}");
                self.error = Some(error);
            }
        }
    }

    /// Run `source` on `engine` and load the result.
    pub async fn run<E: ExecutionEngine>(&mut self, engine: &E, source: &str) {
        self.begin_run();
        let result = engine.run(source).await;
        self.finish_run(result);
    }

    /// Load an already obtained run result.
    pub fn load(&mut self, output: RunOutput) {
        self.begin_run();
        self.finish_run(Ok(output));
    }

    pub fn shows_call_tree(&self) -> bool {
        self.tree.is_displayable(&self.recursive_funcs)
    }

    /// View of the current step; `None` while nothing is loaded.
    pub fn current_view(&self) -> Option<StepView> {
        let log = self.playback.log();
        let step = self.playback.current_step();
        let event = log.get(step)?;
        let changed = diff::changed_at(log, step);

        let variables = event
            .locals
            .iter()
            .map(|(name, value)| VariableView {
                name: name.clone(),
                tag: value.tag(),
                changed: changed.contains(name),
                view: self.dispatcher.render(value),
            })
            .collect();

        let call_tree = self
            .shows_call_tree()
            .then(|| self.tree.view(self.tree.active_node(log, step)));

        let networks = self
            .nn_models
            .iter()
            .filter_map(|model| NetworkView::layout(model, self.network.max_neurons_per_layer))
            .collect();

        Some(StepView {
            step,
            total: log.len(),
            auto_play: self.playback.auto_play(),
            caption: event.caption(),
            lineno: event.lineno,
            code: event.code.clone(),
            stdout: event.stdout.clone(),
            formula: event.formula.as_ref().map(|f| self.formula.render(f)),
            return_value: event.return_value.clone(),
            variables,
            call_tree,
            networks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::event::ExecutionLog;
    use crate::playback::Phase;
    use serde_json::json;

    fn session() -> Session<VirtualClock> {
        Session::new(VirtualClock::new(), &Config::default())
    }

    fn output(steps: serde_json::Value) -> RunOutput {
        RunOutput {
            log: serde_json::from_value::<ExecutionLog>(steps).unwrap(),
            ..RunOutput::default()
        }
    }

    fn fact_steps() -> serde_json::Value {
        json!([
            {"event": "call", "call_id": 0, "func": "<module>"},
            {"event": "call", "call_id": 1, "parent_id": 0, "func": "fact", "args": {"n": 2}, "locals": {"n": 2}},
            {"event": "call", "call_id": 2, "parent_id": 1, "func": "fact", "args": {"n": 1}, "locals": {"n": 1}},
            {"event": "return", "call_id": 2, "func": "fact", "return_value": 1, "locals": {"n": 1}},
            {"event": "return", "call_id": 1, "func": "fact", "return_value": 2, "locals": {"n": 2}},
            {"event": "line", "call_id": 0, "func": "<module>", "lineno": 6, "code": "y = fact(2)",
             "locals": {"y": 2}, "stdout": ["2"], "formula": {"expr": "fact(2)", "latex": null}},
        ])
    }

    struct FailingEngine;

    impl ExecutionEngine for FailingEngine {
        async fn run(&self, _source: &str) -> Result<RunOutput, RunError> {
            Err(RunError::Execution {
                message: "ZeroDivisionError: division by zero".into(),
                traceback: None,
            })
        }
    }

    #[test]
    fn empty_session_has_no_view() {
        let s = session();
        assert!(s.current_view().is_none());
        assert!(s.error().is_none());
    }

    #[test]
    fn failed_run_exposes_error_verbatim() {
        let mut s = session();
        s.load(output(fact_steps()));
        s.begin_run();
        assert!(s.is_running());
        s.finish_run(Err(RunError::Execution {
            message: "ZeroDivisionError: division by zero".into(),
            traceback: Some("Traceback (most recent call last): ...".into()),
        }));
        assert!(!s.is_running());
        assert_eq!(s.playback().phase(), Phase::Empty);
        assert_eq!(s.error().unwrap().to_string(), "ZeroDivisionError: division by zero");
        assert!(s.tree().is_empty());
        assert!(s.current_view().is_none());
    }

    #[tokio::test]
    async fn run_through_engine() {
        let mut s = session();
        s.run(&FailingEngine, "1 / 0").await;
        assert!(s.playback().is_empty());
        assert!(matches!(s.error(), Some(RunError::Execution { .. })));
    }

    #[test]
    fn recursion_falls_back_to_tree_detection() {
        let mut s = session();
        s.load(output(fact_steps()));
        assert_eq!(s.recursive_funcs(), ["fact"]);
        assert!(s.shows_call_tree());

        // An explicit empty list from the engine disables the tree
        let mut out = output(fact_steps());
        out.recursive_funcs = Some(Vec::new());
        s.load(out);
        assert!(!s.shows_call_tree());
    }

    #[test]
    fn view_of_a_line_step() {
        let mut s = session();
        s.load(output(fact_steps()));
        s.playback_mut().set_step(5);
        let view = s.current_view().unwrap();

        assert_eq!((view.step, view.total), (5, 6));
        assert_eq!(view.caption, "Line 6");
        assert_eq!(view.code.as_deref(), Some("y = fact(2)"));
        assert_eq!(view.stdout, ["2"]);
        assert_eq!(view.formula.as_deref(), Some("fact(2)"));

        let y = &view.variables[0];
        assert_eq!((y.name.as_str(), y.tag, y.changed), ("y", Tag::Number, true));

        let tree = view.call_tree.unwrap();
        assert_eq!(tree.rows.len(), 2);
        // Module frame is active, so no row is
        assert!(tree.rows.iter().all(|row| !row.active));
    }

    #[test]
    fn active_call_is_highlighted() {
        let mut s = session();
        s.load(output(fact_steps()));
        s.playback_mut().set_step(2);
        let view = s.current_view().unwrap();
        let active: Vec<_> = view
            .call_tree
            .unwrap()
            .rows
            .into_iter()
            .filter(|row| row.active)
            .map(|row| row.call_id)
            .collect();
        assert_eq!(active, [2]);
    }

    #[test]
    fn unchanged_locals_are_not_highlighted() {
        let mut s = session();
        s.load(output(fact_steps()));
        // Return of call 2 follows its own call event with the same locals
        s.playback_mut().set_step(3);
        let view = s.current_view().unwrap();
        assert!(!view.variables[0].changed);
        assert_eq!(view.return_value, Some(Value::Number(1.0)));
    }

    #[test]
    fn networks_are_laid_out() {
        let mut s = session();
        let mut out = output(json!([{"event": "line", "lineno": 1}]));
        out.nn_models = vec![serde_json::from_value(json!({
            "model_name": "net",
            "layers": [{"layer": "Linear", "in": 2, "out": 3}]
        }))
        .unwrap()];
        s.load(out);
        let view = s.current_view().unwrap();
        assert_eq!(view.networks.len(), 1);
        assert_eq!(view.networks[0].edges.len(), 6);
        assert!(view.call_tree.is_none());
    }
}
