//! Trace events as emitted by the execution engine.
//!
//! Events are ingested through `RawEvent`, which accepts both the current
//! wire shape (`locals`) and the older tracer shape that reported
//! `before`/`after` snapshots per line.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::value::{Mapping, Value};

/// What the tracer observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Line,
    Call,
    Return,
    Exception,
}

/// Candidate expression found on a source line, with optional LaTeX form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub expr: String,
    #[serde(default)]
    pub latex: Option<String>,
}

/// One recorded instant of program execution. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawEvent")]
pub struct ExecutionEvent {
    pub kind: EventKind,
    pub call_id: Option<u64>,
    pub parent_id: Option<u64>,
    pub func: String,
    pub lineno: Option<u32>,
    pub args: Option<Mapping>,
    pub return_value: Option<Value>,
    pub locals: Mapping,
    pub stdout: Vec<String>,
    /// Source text of `lineno`.
    pub code: Option<String>,
    pub formula: Option<Formula>,
}

#[derive(Deserialize)]
struct RawEvent {
    event: EventKind,
    #[serde(default)]
    call_id: Option<u64>,
    #[serde(default)]
    parent_id: Option<u64>,
    #[serde(default)]
    func: Option<String>,
    #[serde(default)]
    lineno: Option<u32>,
    #[serde(default)]
    args: Option<Mapping>,
    #[serde(default)]
    return_value: Option<Value>,
    #[serde(default)]
    locals: Option<Mapping>,
    #[serde(default)]
    before: Option<Mapping>,
    #[serde(default)]
    after: Option<Mapping>,
    #[serde(default)]
    stdout: Option<Vec<String>>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    formula: Option<Formula>,
}

impl From<RawEvent> for ExecutionEvent {
    fn from(raw: RawEvent) -> Self {
        Self {
            kind: raw.event,
            call_id: raw.call_id,
            parent_id: raw.parent_id,
            func: raw.func.unwrap_or_default(),
            lineno: raw.lineno,
            args: raw.args,
            return_value: raw.return_value,
            // Older tracers only report before/after snapshots
            locals: raw.locals.or(raw.after).or(raw.before).unwrap_or_default(),
            stdout: raw.stdout.unwrap_or_default(),
            code: raw.code,
            formula: raw.formula,
        }
    }
}

impl ExecutionEvent {
    /// Short status line for the event, e.g. `CALL fib()` or `Line 4`.
    pub fn caption(&self) -> String {
        match self.kind {
            EventKind::Call => format!("CALL {}()", self.func),
            EventKind::Return => format!("RETURN {}()", self.func),
            EventKind::Exception => format!("EXCEPTION {}()", self.func),
            EventKind::Line => match self.lineno {
                Some(lineno) => format!("Line {lineno}"),
                None => "Line ?".to_owned(),
            },
        }
    }
}

/// The full ordered event sequence of one run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    events: Vec<ExecutionEvent>,
}

impl ExecutionLog {
    pub fn new(events: Vec<ExecutionEvent>) -> Self {
        Self { events }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ExecutionEvent> {
        self.events.get(index)
    }

    pub fn last_index(&self) -> Option<usize> {
        self.events.len().checked_sub(1)
    }

    pub fn events(&self) -> &[ExecutionEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExecutionEvent> {
        self.events.iter()
    }
}

impl Index<usize> for ExecutionLog {
    type Output = ExecutionEvent;

    fn index(&self, index: usize) -> &Self::Output {
        &self.events[index]
    }
}

impl FromIterator<ExecutionEvent> for ExecutionLog {
    fn from_iter<I: IntoIterator<Item = ExecutionEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ExecutionLog {
    type Item = &'a ExecutionEvent;
    type IntoIter = std::slice::Iter<'a, ExecutionEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
