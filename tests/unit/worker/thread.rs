use super::*;
use crate::foundation::core::FrameIndex;
use crate::gpu::software::{GpuCall, SoftwareMaster};
use crate::graph::kinds::ValueNode;
use crate::graph::node::InputRef;
use crate::graph::value::Value;
use crate::media::NoFootage;

fn spawn(master: &SoftwareMaster, graph: &Arc<NodeGraph>) -> WorkerHandle {
    WorkerHandle::spawn(
        0,
        Arc::new(master.clone()),
        Arc::clone(graph),
        Arc::new(NoFootage),
        "test-worker".to_string(),
    )
    .unwrap()
}

#[test]
fn render_is_answered_after_two_phase_init() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    graph
        .set_input_value(InputRef::new(a, 0), Value::Int(5))
        .unwrap();
    let master = SoftwareMaster::new();
    let handle = spawn(&master, &graph);
    handle.set_parameters(RenderParams::new(16, 9));
    handle.init();
    assert!(handle.is_started());

    let out = handle
        .render(DependencyPath::output(a, FrameIndex(0)))
        .wait()
        .unwrap();
    assert_eq!(out.value, Value::Int(5));
    assert!(master.calls_for(1).contains(&GpuCall::Viewport {
        x: 0,
        y: 0,
        width: 16,
        height: 9
    }));
}

#[test]
fn render_without_init_is_refused() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    let master = SoftwareMaster::new();
    let handle = spawn(&master, &graph);

    let res = handle.render(DependencyPath::output(a, FrameIndex(0))).wait();
    assert!(matches!(res, Err(RenderError::NotInitialized)));
    assert!(!handle.is_started());
    assert!(master.calls().is_empty());
}

#[test]
fn failed_context_creation_leaves_worker_closed() {
    let graph = Arc::new(NodeGraph::new());
    let master = SoftwareMaster::new();
    master.fail_context_creation(true);
    let handle = spawn(&master, &graph);
    handle.init();
    assert!(!handle.is_started());
}

#[test]
fn failed_make_current_keeps_worker_started_but_unusable() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    let master = SoftwareMaster::new();
    master.fail_make_current(true);
    let handle = spawn(&master, &graph);
    handle.init();
    assert!(handle.is_started());

    let res = handle.render(DependencyPath::output(a, FrameIndex(0))).wait();
    assert!(matches!(res, Err(RenderError::NotInitialized)));
}

#[test]
fn close_then_init_reinitializes() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    let master = SoftwareMaster::new();
    let handle = spawn(&master, &graph);
    handle.init();
    handle.close();
    assert!(!handle.is_started());

    let res = handle.render(DependencyPath::output(a, FrameIndex(0))).wait();
    assert!(matches!(res, Err(RenderError::NotInitialized)));

    handle.init();
    assert!(handle.is_started());
    assert!(
        handle
            .render(DependencyPath::output(a, FrameIndex(0)))
            .wait()
            .is_ok()
    );
}
