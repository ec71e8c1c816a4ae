//! Call hierarchy reconstructed from the flat event log.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Children are
//! index lists and the parent link is an index too, so the tree carries no
//! reference cycles. The tree is derived data: rebuild it for every new log.

use std::collections::HashMap;

use serde::Serialize;
use smallvec::SmallVec;

use crate::event::{EventKind, ExecutionEvent, ExecutionLog};
use crate::value::{Mapping, Value};

/// Function name the tracer reports for the synthetic module-level frame.
pub const MODULE_FUNC: &str = "<module>";

/// Index of a node in the [`CallTree`] arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One function activation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub call_id: u64,
    /// Parent id as reported by the tracer.
    pub parent_id: Option<u64>,
    /// Resolved parent in the arena.
    pub parent: Option<NodeId>,
    pub func: String,
    pub args: Mapping,
    pub return_value: Option<Value>,
    pub children: SmallVec<[NodeId; 4]>,
    /// Distance from the top of the arena, the module frame being depth 0.
    pub depth: u32,
    /// Log index of the call event.
    pub call_step: usize,
    /// Log index of the first matching return event.
    pub return_step: Option<usize>,
}

impl CallNode {
    pub fn is_module(&self) -> bool {
        self.func == MODULE_FUNC
    }

    /// `f(n=3, label=x)`
    pub fn label(&self) -> String {
        let args = self
            .args
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({args})", self.func)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallTree {
    nodes: Vec<CallNode>,
    by_call_id: HashMap<u64, NodeId>,
    module: Option<NodeId>,
    roots: Vec<NodeId>,
}

impl CallTree {
    /// Build the tree from a log. Malformed entries (calls without an id,
    /// repeated call ids, returns without a matching call) are skipped.
    pub fn build(log: &ExecutionLog) -> Self {
        let mut tree = Self::default();
        for (step, event) in log.iter().enumerate() {
            match event.kind {
                EventKind::Call => tree.open(step, event),
                EventKind::Return => tree.close(step, event),
                EventKind::Line | EventKind::Exception => {}
            }
        }

        let module = tree.module;
        tree.roots = tree
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none() || node.parent == module)
            .map(|(index, _)| NodeId(index as u32))
            .filter(|&id| Some(id) != module)
            .collect();
        tree
    }

    fn open(&mut self, step: usize, event: &ExecutionEvent) {
        let Some(call_id) = event.call_id else {
            log::debug!("step {step}: call event for {} has no call_id, skipping", event.func);
            return;
        };
        if self.by_call_id.contains_key(&call_id) {
            log::debug!("step {step}: call_id {call_id} already opened, skipping");
            return;
        }

        let is_module = event.func == MODULE_FUNC && self.module.is_none();
        // Unknown or missing parents attach under the module frame when there is one
        let parent = event
            .parent_id
            .and_then(|parent_id| self.by_call_id.get(&parent_id).copied())
            .or(self.module);

        let id = NodeId(self.nodes.len() as u32);
        let depth = parent.map_or(0, |p| self.nodes[p.index()].depth + 1);
        self.nodes.push(CallNode {
            call_id,
            parent_id: event.parent_id,
            parent,
            func: event.func.clone(),
            args: event.args.clone().unwrap_or_default(),
            return_value: None,
            children: SmallVec::new(),
            depth,
            call_step: step,
            return_step: None,
        });
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(id);
        }
        if is_module {
            self.module = Some(id);
        }
        self.by_call_id.insert(call_id, id);
    }

    fn close(&mut self, step: usize, event: &ExecutionEvent) {
        let Some(id) = event
            .call_id
            .and_then(|call_id| self.by_call_id.get(&call_id).copied())
        else {
            log::debug!("step {step}: return from {} without a matching call, dropping", event.func);
            return;
        };
        let node = &mut self.nodes[id.index()];
        if node.return_step.is_none() {
            node.return_step = Some(step);
            node.return_value = event.return_value.clone();
        }
    }

    /// Number of nodes, the module frame included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &CallNode {
        &self.nodes[id.index()]
    }

    pub fn id_of(&self, call_id: u64) -> Option<NodeId> {
        self.by_call_id.get(&call_id).copied()
    }

    pub fn get(&self, call_id: u64) -> Option<&CallNode> {
        self.id_of(call_id).map(|id| self.node(id))
    }

    pub fn nodes(&self) -> &[CallNode] {
        &self.nodes
    }

    /// The synthetic module-level frame, if the tracer reported one.
    pub fn module(&self) -> Option<NodeId> {
        self.module
    }

    /// Top-level activations in first-occurrence order. When a module frame
    /// exists these are its children.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, |&p| self.node(p).parent)
    }

    /// Node of the frame that `log[step]` belongs to.
    pub fn active_node(&self, log: &ExecutionLog, step: usize) -> Option<NodeId> {
        log.get(step)?.call_id.and_then(|call_id| self.id_of(call_id))
    }

    /// Functions that appear as their own ancestor, in first-occurrence order.
    pub fn recursive_functions(&self) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            if node.is_module() || found.contains(&node.func) {
                continue;
            }
            let recursive = self
                .ancestors(NodeId(index as u32))
                .any(|ancestor| self.node(ancestor).func == node.func);
            if recursive {
                found.push(node.func.clone());
            }
        }
        found
    }

    /// The tree view is only worth showing for recursive programs.
    pub fn is_displayable(&self, recursive_funcs: &[String]) -> bool {
        self.len() > 1 && !recursive_funcs.is_empty()
    }

    /// Pre-order rows under [`CallTree::roots`], depth relative to the roots.
    pub fn view(&self, active: Option<NodeId>) -> CallTreeView {
        let mut rows = Vec::with_capacity(self.nodes.len());
        // Explicit stack: deep recursion in the traced program must not
        // become deep recursion here.
        let mut stack: Vec<(NodeId, usize)> =
            self.roots.iter().rev().map(|&id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            rows.push(CallRow {
                call_id: node.call_id,
                depth,
                label: node.label(),
                returns: node.return_value.as_ref().map(Value::to_string),
                active: Some(id) == active,
            });
            stack.extend(node.children.iter().rev().map(|&child| (child, depth + 1)));
        }
        CallTreeView { rows }
    }
}

/// Display data for the call tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallTreeView {
    pub rows: Vec<CallRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRow {
    pub call_id: u64,
    pub depth: usize,
    pub label: String,
    pub returns: Option<String>,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn log(json: serde_json::Value) -> ExecutionLog {
        serde_json::from_value(json).unwrap()
    }

    /// fact(3) under a module frame, with line events in between.
    fn factorial_log() -> ExecutionLog {
        log(json!([
            {"event": "call", "call_id": 0, "parent_id": null, "func": "<module>"},
            {"event": "line", "call_id": 0, "func": "<module>", "lineno": 5},
            {"event": "call", "call_id": 1, "parent_id": 0, "func": "fact", "args": {"n": 3}},
            {"event": "line", "call_id": 1, "func": "fact", "lineno": 2},
            {"event": "call", "call_id": 2, "parent_id": 1, "func": "fact", "args": {"n": 2}},
            {"event": "call", "call_id": 3, "parent_id": 2, "func": "fact", "args": {"n": 1}},
            {"event": "return", "call_id": 3, "func": "fact", "return_value": 1},
            {"event": "return", "call_id": 2, "func": "fact", "return_value": 2},
            {"event": "return", "call_id": 1, "func": "fact", "return_value": 6},
            {"event": "call", "call_id": 4, "parent_id": 0, "func": "show", "args": {"x": "done"}},
            {"event": "return", "call_id": 4, "func": "show", "return_value": null},
        ]))
    }

    #[test]
    fn builds_nested_recursion() {
        let tree = CallTree::build(&factorial_log());
        assert_eq!(tree.len(), 5);

        let module = tree.module().unwrap();
        assert!(tree.node(module).is_module());

        let roots: Vec<u64> = tree.roots().iter().map(|&id| tree.node(id).call_id).collect();
        assert_eq!(roots, [1, 4]);

        let fact3 = tree.get(1).unwrap();
        assert_eq!(fact3.return_value, Some(Value::Number(6.0)));
        assert_eq!(fact3.children.len(), 1);
        assert_eq!(tree.node(fact3.children[0]).call_id, 2);
        assert_eq!(tree.get(3).unwrap().depth, 3);
        assert_eq!(tree.get(4).unwrap().return_value, None);
    }

    #[test]
    fn every_call_id_once_and_children_later() {
        let log = factorial_log();
        let tree = CallTree::build(&log);

        let ids: HashSet<u64> = tree.nodes().iter().map(|n| n.call_id).collect();
        assert_eq!(ids.len(), tree.len());

        for node in tree.nodes() {
            for &child in &node.children {
                assert!(tree.node(child).call_step > node.call_step);
            }
        }
    }

    #[test]
    fn build_is_idempotent() {
        let log = factorial_log();
        assert_eq!(CallTree::build(&log), CallTree::build(&log));
    }

    #[test]
    fn orphan_return_is_dropped() {
        let tree = CallTree::build(&log(json!([
            {"event": "return", "call_id": 9, "func": "ghost", "return_value": 1},
            {"event": "call", "call_id": 1, "parent_id": null, "func": "f"},
            {"event": "return", "call_id": 1, "func": "f", "return_value": 2},
            {"event": "return", "call_id": 1, "func": "f", "return_value": 3},
        ])));
        assert_eq!(tree.len(), 1);
        assert!(tree.get(9).is_none());
        // First return wins
        assert_eq!(tree.get(1).unwrap().return_value, Some(Value::Number(2.0)));
        assert_eq!(tree.get(1).unwrap().return_step, Some(2));
    }

    #[test]
    fn duplicate_call_ids_and_missing_ids_are_skipped() {
        let tree = CallTree::build(&log(json!([
            {"event": "call", "call_id": 1, "func": "f"},
            {"event": "call", "call_id": 1, "func": "g"},
            {"event": "call", "func": "h"},
        ])));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(1).unwrap().func, "f");
    }

    #[test]
    fn top_level_calls_attach_under_module() {
        let tree = CallTree::build(&log(json!([
            {"event": "call", "call_id": 10, "func": "<module>"},
            {"event": "call", "call_id": 11, "parent_id": null, "func": "a"},
            {"event": "call", "call_id": 12, "parent_id": 99, "func": "b"},
        ])));
        let module = tree.module().unwrap();
        assert_eq!(tree.children(module).len(), 2);
        assert_eq!(tree.get(12).unwrap().parent, Some(module));
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn without_module_roots_are_parentless_nodes() {
        let tree = CallTree::build(&log(json!([
            {"event": "call", "call_id": 1, "parent_id": null, "func": "a"},
            {"event": "call", "call_id": 2, "parent_id": 1, "func": "b"},
            {"event": "call", "call_id": 3, "parent_id": null, "func": "c"},
        ])));
        let roots: Vec<u64> = tree.roots().iter().map(|&id| tree.node(id).call_id).collect();
        assert_eq!(roots, [1, 3]);
    }

    #[test]
    fn active_node_follows_step_call_id() {
        let log = factorial_log();
        let tree = CallTree::build(&log);
        assert_eq!(tree.active_node(&log, 3), tree.id_of(1));
        assert_eq!(tree.active_node(&log, 5), tree.id_of(3));
        assert_eq!(tree.active_node(&log, 100), None);
    }

    #[test]
    fn detects_recursive_functions() {
        let tree = CallTree::build(&factorial_log());
        assert_eq!(tree.recursive_functions(), vec!["fact".to_string()]);
        assert!(tree.is_displayable(&tree.recursive_functions()));
        assert!(!tree.is_displayable(&[]));
    }

    #[test]
    fn view_rows_are_preorder() {
        let log = factorial_log();
        let tree = CallTree::build(&log);
        let view = tree.view(tree.id_of(2));
        let rows: Vec<(usize, &str, Option<&str>, bool)> = view
            .rows
            .iter()
            .map(|r| (r.depth, r.label.as_str(), r.returns.as_deref(), r.active))
            .collect();
        assert_eq!(
            rows,
            [
                (0, "fact(n=3)", Some("6"), false),
                (1, "fact(n=2)", Some("2"), true),
                (2, "fact(n=1)", Some("1"), false),
                (0, "show(x=done)", None, false),
            ]
        );
    }

    #[test]
    fn deep_recursion_does_not_overflow() {
        let mut events = Vec::new();
        for id in 0..20_000u64 {
            let parent = id.checked_sub(1);
            events.push(json!({"event": "call", "call_id": id, "parent_id": parent, "func": "down"}));
        }
        let tree = CallTree::build(&log(serde_json::Value::Array(events)));
        assert_eq!(tree.view(None).rows.len(), 20_000);
        assert_eq!(tree.recursive_functions(), vec!["down".to_string()]);
    }
}
