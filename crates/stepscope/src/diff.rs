//! Per-step variable deltas, used only for highlighting.

use std::collections::BTreeSet;

use crate::event::{ExecutionEvent, ExecutionLog};
use crate::value::Mapping;

/// Names present in `curr` that are new or hold a structurally different
/// value than in `prev`. Names that disappeared are not reported.
pub fn changed_names(prev: &Mapping, curr: &Mapping) -> BTreeSet<String> {
    curr.iter()
        .filter(|(name, value)| prev.get(*name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect()
}

/// Whether two events were captured in the same call frame.
pub fn same_frame(a: &ExecutionEvent, b: &ExecutionEvent) -> bool {
    match (a.call_id, b.call_id) {
        (Some(a), Some(b)) => a == b,
        _ => a.func == b.func,
    }
}

/// Locals of the step before `step`, when that step is in the same frame.
pub fn previous_locals(log: &ExecutionLog, step: usize) -> Option<&Mapping> {
    let prev = log.get(step.checked_sub(1)?)?;
    let curr = log.get(step)?;
    same_frame(prev, curr).then_some(&prev.locals)
}

/// Changed names at `step`. Without a same-frame predecessor every local
/// counts as changed.
pub fn changed_at(log: &ExecutionLog, step: usize) -> BTreeSet<String> {
    let Some(curr) = log.get(step) else {
        return BTreeSet::new();
    };
    match previous_locals(log, step) {
        Some(prev) => changed_names(prev, &curr.locals),
        None => curr.locals.keys().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use serde_json::json;

    fn locals(json: serde_json::Value) -> Mapping {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn self_diff_is_empty() {
        let x = locals(json!({
            "n": 3,
            "s": "abc",
            "m": [[1, 2], [3, 4]],
            "t": {"type": "torchtensor", "shape": [2], "dtype": "torch.float32", "values": [1.0, 2.0]},
            "d": {"a": 1, "b": [1, 2]},
        }));
        assert!(changed_names(&x, &x).is_empty());
    }

    #[test]
    fn new_and_modified_names() {
        let prev = locals(json!({"a": 1, "b": [1, 2], "gone": 0}));
        let curr = locals(json!({"a": 1, "b": [1, 3], "c": "new"}));
        let changed: Vec<_> = changed_names(&prev, &curr).into_iter().collect();
        assert_eq!(changed, ["b", "c"]);
    }

    #[test]
    fn mapping_equality_ignores_key_order() {
        let prev = locals(json!({"d": {"x": 1, "y": 2}}));
        let curr = locals(json!({"d": {"y": 2, "x": 1}}));
        assert!(changed_names(&prev, &curr).is_empty());
    }

    #[test]
    fn tensor_shape_change_counts() {
        let prev = locals(json!({"t": {"type": "torchtensor", "shape": [4], "values": [1, 2, 3, 4]}}));
        let curr = locals(json!({"t": {"type": "torchtensor", "shape": [2, 2], "values": [1, 2, 3, 4]}}));
        assert_eq!(changed_names(&prev, &curr).len(), 1);
    }

    #[test]
    fn number_equality_is_by_value() {
        let prev = locals(json!({"x": 2}));
        let curr = locals(json!({"x": 2.0}));
        assert!(changed_names(&prev, &curr).is_empty());
        assert_eq!(curr.get("x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn frame_boundaries_reset_the_baseline() {
        let log: ExecutionLog = serde_json::from_value(json!([
            {"event": "line", "call_id": 0, "func": "<module>", "locals": {"a": 1}},
            {"event": "line", "call_id": 0, "func": "<module>", "locals": {"a": 1, "b": 2}},
            {"event": "call", "call_id": 1, "parent_id": 0, "func": "f", "locals": {"a": 1}},
            {"event": "line", "call_id": 1, "func": "f", "locals": {"a": 1}},
        ]))
        .unwrap();

        assert_eq!(changed_at(&log, 0).into_iter().collect::<Vec<_>>(), ["a"]);
        assert_eq!(changed_at(&log, 1).into_iter().collect::<Vec<_>>(), ["b"]);
        // Entering f: previous step belongs to another frame
        assert!(previous_locals(&log, 2).is_none());
        assert_eq!(changed_at(&log, 2).into_iter().collect::<Vec<_>>(), ["a"]);
        assert!(changed_at(&log, 3).is_empty());
        assert!(changed_at(&log, 4).is_empty());
    }

    #[test]
    fn frames_without_ids_compare_by_function() {
        let log: ExecutionLog = serde_json::from_value(json!([
            {"event": "line", "func": "g", "locals": {"i": 0}},
            {"event": "line", "func": "g", "locals": {"i": 1}},
            {"event": "line", "func": "h", "locals": {"i": 1}},
        ]))
        .unwrap();
        assert!(previous_locals(&log, 1).is_some());
        assert!(previous_locals(&log, 2).is_none());
    }
}
