use super::*;

#[derive(Debug)]
struct TwoInputs;

impl NodeKind for TwoInputs {
    fn name(&self) -> &'static str {
        "test.two_inputs"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::value("a", 1.0), InputDesc::texture("b")]
    }
}

fn node() -> Node {
    Node::new(NodeId(7), Arc::new(TwoInputs))
}

#[test]
fn inputs_are_seeded_from_kind_defaults() {
    let n = node();
    let state = n.snapshot();
    assert_eq!(state.inputs.len(), 2);
    assert_eq!(state.inputs[0].stored.sample(FrameIndex(3)), Value::Float(1.0));
    assert_eq!(state.inputs[1].role, InputRole::Texture);
    assert_eq!(n.input_index("b"), Some(1));
    assert_eq!(n.input_index("missing"), None);
    assert_eq!(state.connected_inputs(), 0);
}

#[test]
fn renders_share_the_user_input_lock_and_edits_exclude_it() {
    let n = node();
    let r1 = n.lock_user_input();
    let r2 = n.lock_user_input();
    assert!(n.is_user_input_locked());
    assert!(n.try_lock_user_input_exclusive().is_none());
    drop(r1);
    drop(r2);
    assert!(!n.is_user_input_locked());
    assert!(n.try_lock_user_input_exclusive().is_some());
}

#[test]
fn processing_lock_is_independent_of_user_input_lock() {
    let n = node();
    let edit = n.lock_user_input_exclusive();
    let proc_guard = n.lock_processing();
    assert!(n.is_processing());
    drop(proc_guard);
    drop(edit);
    assert!(!n.is_processing());
}

#[test]
fn edits_through_the_exclusive_lock_are_visible_to_snapshots() {
    let n = node();
    {
        let edit = n.lock_user_input_exclusive();
        let mut state = n.state_mut(&edit);
        state.inputs[1].connection = Some(NodeId(3));
        state.block = Some(Block {
            range: FrameRange::new(FrameIndex(0), FrameIndex(10)).unwrap(),
            previous: Some(NodeId(1)),
            next: None,
        });
    }
    assert_eq!(n.upstream().as_slice(), &[NodeId(3), NodeId(1)]);
    assert_eq!(n.snapshot().connected_inputs(), 1);
}

#[test]
fn input_values_default_to_none() {
    let mut values = InputValues::new();
    values.push("a", Value::Float(2.0));
    assert_eq!(values.float("a"), Some(2.0));
    assert!(values.get("zzz").is_none());
    assert!(values.texture("a").is_none());
    assert_eq!(values.len(), 1);
}
