//! End-to-end walkthroughs: engine response in, step views out.

use serde_json::json;
use stepscope::dispatch::RendererContract;
use stepscope::protocol::parse_response;
use stepscope::{
    CallTree, Config, ExecutionLog, Phase, RunError, Session, Tag, Value, VirtualClock, classify,
};

fn session() -> (Session<VirtualClock>, VirtualClock) {
    let clock = VirtualClock::new();
    (Session::new(clock.clone(), &Config::default()), clock)
}

fn advance(session: &mut Session<VirtualClock>, clock: &VirtualClock, ms: u64) {
    for token in clock.advance_by(ms) {
        session.playback_mut().on_tick(token);
    }
}

#[test]
fn recursive_calls_nest_by_parent_id() {
    let log: ExecutionLog = serde_json::from_value(json!([
        {"event": "call", "call_id": 1, "parent_id": null, "func": "f", "args": {"n": 3}},
        {"event": "call", "call_id": 2, "parent_id": 1, "func": "f", "args": {"n": 2}},
        {"event": "return", "call_id": 2, "return_value": 2},
        {"event": "return", "call_id": 1, "return_value": 6},
    ]))
    .unwrap();
    let tree = CallTree::build(&log);

    assert_eq!(tree.roots().len(), 1);
    let root = tree.node(tree.roots()[0]);
    assert_eq!(root.call_id, 1);
    assert_eq!(root.return_value, Some(Value::Number(6.0)));

    let children: Vec<u64> = root.children.iter().map(|&id| tree.node(id).call_id).collect();
    assert_eq!(children, [2]);
    assert_eq!(tree.get(2).unwrap().return_value, Some(Value::Number(2.0)));
}

#[test]
fn ndarray_matrix_renders_as_grid() {
    let value = Value::from(json!({"type": "ndarray", "values": [[1, 2], [3, 4]]}));
    assert_eq!(classify(&value), Tag::NdArray);

    let contract = stepscope::Dispatcher::default().render(&value);
    let RendererContract::Grid { rows, cols, cells, elided } = contract else {
        panic!("expected grid, got {contract:?}");
    };
    assert_eq!((rows, cols, elided), (2, 2, 0));
    assert_eq!(cells[1], vec![Value::Number(3.0), Value::Number(4.0)]);
}

#[test]
fn scalar_tensor_renders_its_value() {
    let value = Value::from(json!({"type": "torchtensor", "shape": [], "values": [5]}));
    assert_eq!(classify(&value), Tag::TensorScalar);
    let contract = stepscope::Dispatcher::default().render(&value);
    assert_eq!(
        contract,
        RendererContract::Scalar { value: Value::Number(5.0), annotation: None }
    );
}

#[test]
fn autoplay_from_last_step_stops_without_advancing() {
    let (mut session, clock) = session();
    let output = parse_response(
        r#"{"success": true, "steps": [
            {"event": "line", "lineno": 1, "locals": {"a": 1}},
            {"event": "line", "lineno": 2, "locals": {"a": 2}},
            {"event": "line", "lineno": 3, "locals": {"a": 3}}
        ]}"#,
    )
    .unwrap();
    session.load(output);

    let playback = session.playback_mut();
    playback.step_forward();
    playback.step_forward();
    assert!(playback.is_at_end());
    playback.toggle_auto_play();
    assert!(playback.auto_play());

    advance(&mut session, &clock, 800);
    assert_eq!(session.playback().current_step(), 2);
    assert!(!session.playback().auto_play());

    // Timer is gone; further time changes nothing
    assert!(!clock.has_pending_timers());
    advance(&mut session, &clock, 10_000);
    assert_eq!(session.playback().current_step(), 2);
}

#[test]
fn failed_run_leaves_playback_empty() {
    let (mut session, _) = session();
    session.begin_run();
    session.finish_run(parse_response(
        r#"{"success": false, "error": "ZeroDivisionError: division by zero", "traceback": "..."}"#,
    ));

    assert_eq!(session.playback().phase(), Phase::Empty);
    let error = session.error().unwrap();
    assert!(matches!(error, RunError::Execution { .. }));
    assert_eq!(error.to_string(), "ZeroDivisionError: division by zero");
    assert!(session.current_view().is_none());
}

#[test]
fn full_walkthrough_with_autoplay() {
    let (mut session, clock) = session();
    let output = parse_response(
        &json!({
            "success": true,
            "steps": [
                {"event": "call", "call_id": 0, "func": "<module>"},
                {"event": "line", "call_id": 0, "func": "<module>", "lineno": 1, "locals": {}},
                {"event": "line", "call_id": 0, "func": "<module>", "lineno": 2,
                 "locals": {"xs": [1, 2, 3]}},
                {"event": "line", "call_id": 0, "func": "<module>", "lineno": 3,
                 "locals": {"xs": [1, 2, 3], "total": 6}},
            ],
            "recursiveFuncs": []
        })
        .to_string(),
    )
    .unwrap();
    session.load(output);
    session.playback_mut().toggle_auto_play();

    advance(&mut session, &clock, 800 * 2);
    let view = session.current_view().unwrap();
    assert_eq!(view.step, 2);
    assert_eq!(view.variables[0].tag, Tag::Array);
    assert!(view.variables[0].changed);

    advance(&mut session, &clock, 800);
    let view = session.current_view().unwrap();
    assert_eq!(view.step, 3);
    let changed: Vec<_> = view.variables.iter().filter(|v| v.changed).map(|v| v.name.as_str()).collect();
    assert_eq!(changed, ["total"]);
    assert!(view.call_tree.is_none());

    // A new run replaces everything and the old timer cannot touch it
    session.begin_run();
    advance(&mut session, &clock, 800 * 5);
    assert_eq!(session.playback().phase(), Phase::Empty);
}
