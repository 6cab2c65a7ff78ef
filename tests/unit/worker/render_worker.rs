use parking_lot::Mutex;

use super::*;
use crate::foundation::core::{FrameIndex, FrameRange, Rgba8Premul};
use crate::gpu::software::{GpuCall, SoftwareMaster};
use crate::graph::kinds::{AddNode, BlockNode, FootageNode, MergeNode, SolidNode, ValueNode};
use crate::graph::node::{InputDesc, InputRef, InputValues, NodeKind};
use crate::graph::value::FootageRef;
use crate::media::NoFootage;
use crate::worker::thread::WorkerMsg;

#[derive(Debug)]
struct Recording {
    label: &'static str,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl NodeKind for Recording {
    fn name(&self) -> &'static str {
        "test.recording"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::value("a", 0.0), InputDesc::value("b", 0.0)]
    }

    fn evaluate(&self, inputs: &InputValues, _time: FrameIndex) -> Value {
        self.log.lock().push(self.label);
        Value::Float(inputs.float("a").unwrap_or(0.0) + inputs.float("b").unwrap_or(0.0))
    }
}

fn worker(graph: &Arc<NodeGraph>, master: &SoftwareMaster, params: RenderParams) -> RenderWorker {
    let mut w = RenderWorker::new(
        0,
        Arc::new(master.clone()),
        Arc::clone(graph),
        Arc::new(NoFootage),
    );
    w.set_parameters(params);
    w.init();
    w
}

fn at(node: NodeId, t: u64) -> DependencyPath {
    DependencyPath::output(node, FrameIndex(t))
}

#[test]
fn render_before_init_issues_no_gpu_calls() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    let master = SoftwareMaster::new();
    let w = RenderWorker::new(0, Arc::new(master.clone()), graph, Arc::new(NoFootage));

    assert!(matches!(w.render(at(a, 0)), Err(RenderError::NotInitialized)));
    assert!(!w.is_started());
    assert!(master.calls().is_empty());
}

#[test]
fn unconnected_value_is_returned() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    graph
        .set_input_value(InputRef::new(a, 0), Value::Int(5))
        .unwrap();
    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));

    let out = w.render(at(a, 0)).unwrap();
    assert_eq!(out.value, Value::Int(5));
    assert_eq!(out.locked, vec![a]);
    assert!(!graph.node(a).unwrap().is_user_input_locked());
}

#[test]
fn locks_cover_exactly_the_dependency_set() {
    let graph = Arc::new(NodeGraph::new());
    let sum = graph.add_node(AddNode);
    let x = graph.add_node(ValueNode);
    let y = graph.add_node(ValueNode);
    let unrelated = graph.add_node(ValueNode);
    graph.set_input_value(InputRef::new(x, 0), Value::Float(1.5)).unwrap();
    graph.set_input_value(InputRef::new(y, 0), Value::Float(2.0)).unwrap();
    graph.connect(x, InputRef::new(sum, 0)).unwrap();
    graph.connect(y, InputRef::new(sum, 1)).unwrap();

    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));
    let out = w.render(at(sum, 0)).unwrap();

    assert_eq!(out.value, Value::Float(3.5));
    assert_eq!(out.locked, vec![sum, x, y]);
    assert!(!out.locked.contains(&unrelated));
    for id in [sum, x, y, unrelated] {
        let node = graph.node(id).unwrap();
        assert!(!node.is_user_input_locked());
        assert!(!node.is_processing());
    }
}

#[test]
fn fan_out_inputs_are_evaluated_before_their_consumer() {
    let graph = Arc::new(NodeGraph::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let rec = |label| Recording {
        label,
        log: Arc::clone(&log),
    };
    let b = graph.add_node(rec("b"));
    let c = graph.add_node(rec("c"));
    let d = graph.add_node(rec("d"));
    graph.connect(c, InputRef::new(b, 0)).unwrap();
    graph.connect(d, InputRef::new(b, 1)).unwrap();

    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));
    w.render(at(b, 0)).unwrap();

    let order = log.lock().clone();
    assert_eq!(order.len(), 3);
    assert_eq!(order.last(), Some(&"b"));
}

#[test]
fn missing_footage_contributes_nothing_and_releases_locks() {
    let graph = Arc::new(NodeGraph::new());
    let f = graph.add_node(FootageNode);
    graph
        .set_input_value(InputRef::new(f, 0), Value::Footage(FootageRef::new("gone.png")))
        .unwrap();
    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));

    let out = w.render(at(f, 0)).unwrap();
    assert!(out.value.is_none());
    assert!(!graph.node(f).unwrap().is_user_input_locked());
}

#[test]
fn removed_node_renders_as_none() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    graph.remove_node(a).unwrap();
    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));

    let out = w.render(at(a, 0)).unwrap();
    assert!(out.value.is_none());
    assert!(out.locked.is_empty());
}

#[test]
fn top_level_textures_are_read_back_at_effective_size() {
    let graph = Arc::new(NodeGraph::new());
    let solid = graph.add_node(SolidNode);
    let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
    graph
        .set_input_value(InputRef::new(solid, 0), Value::Color(red))
        .unwrap();
    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(8, 6).with_divider(2));
    master.clear_calls();

    let out = w.render(at(solid, 0)).unwrap();
    let frame = out.value.as_frame().unwrap();
    assert_eq!((frame.width, frame.height), (4, 3));
    assert_eq!(frame.pixel(0, 0), Some(red));

    let calls = master.calls_for(1);
    let flush = calls.iter().position(|c| *c == GpuCall::Flush).unwrap();
    let finish = calls.iter().position(|c| *c == GpuCall::Finish).unwrap();
    assert!(flush < finish);
    assert_eq!(calls.last(), Some(&GpuCall::Finish));
}

#[test]
fn invalid_params_never_draw() {
    let graph = Arc::new(NodeGraph::new());
    let solid = graph.add_node(SolidNode);
    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::default());

    let out = w.render(at(solid, 0)).unwrap();
    assert!(out.value.is_none());
    assert!(
        !master
            .calls()
            .iter()
            .any(|c| matches!(c.call, GpuCall::Draw { .. }))
    );
}

#[test]
fn blocks_hand_over_to_the_active_neighbour() {
    let graph = Arc::new(NodeGraph::new());
    let red = graph.add_node(SolidNode);
    let blue = graph.add_node(SolidNode);
    graph
        .set_input_value(
            InputRef::new(red, 0),
            Value::Color(Rgba8Premul::from_straight_rgba(255, 0, 0, 255)),
        )
        .unwrap();
    graph
        .set_input_value(
            InputRef::new(blue, 0),
            Value::Color(Rgba8Premul::from_straight_rgba(0, 0, 255, 255)),
        )
        .unwrap();

    let first = graph.add_node(BlockNode);
    let second = graph.add_node(BlockNode);
    graph.connect(red, InputRef::new(first, 0)).unwrap();
    graph.connect(blue, InputRef::new(second, 0)).unwrap();
    let range = |s, e| FrameRange::new(FrameIndex(s), FrameIndex(e)).unwrap();
    graph.set_block_range(first, range(0, 10)).unwrap();
    graph.set_block_range(second, range(10, 20)).unwrap();
    graph.link_blocks(first, second).unwrap();

    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(2, 2));

    let px = |t| {
        let out = w.render(at(first, t)).unwrap();
        out.value.as_frame().and_then(|f| f.pixel(0, 0))
    };
    assert_eq!(px(3).map(|p| p.r), Some(255));
    assert_eq!(px(10).map(|p| p.b), Some(255));
    assert_eq!(px(25), None);

    let out = w.render(at(first, 12)).unwrap();
    let mut locked = out.locked.clone();
    locked.sort();
    assert_eq!(locked, out.locked);
    assert_eq!(out.locked, vec![red, blue, first, second]);
}

#[test]
fn closed_worker_refuses_to_render() {
    let graph = Arc::new(NodeGraph::new());
    let a = graph.add_node(ValueNode);
    let master = SoftwareMaster::new();
    let mut w = worker(&graph, &master, RenderParams::new(4, 4));
    assert!(w.is_ready());
    w.close();
    assert!(!w.is_started());
    assert!(matches!(w.render(at(a, 0)), Err(RenderError::NotInitialized)));
}

#[test]
fn edge_renders_hold_the_consumer_in_the_lock_set() {
    let graph = Arc::new(NodeGraph::new());
    let merge = graph.add_node(MergeNode);
    let solid = graph.add_node(SolidNode);
    graph.connect(solid, InputRef::new(merge, 0)).unwrap();

    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));
    let edge = DependencyPath::edge(solid, InputRef::new(merge, 0), FrameIndex(0));
    let out = w.render(edge).unwrap();

    // A texture consumer keeps the result on the GPU.
    assert!(matches!(out.value, Value::Texture(_)));
    assert_eq!(out.locked, vec![merge, solid]);
    for id in [merge, solid] {
        assert!(!graph.node(id).unwrap().is_user_input_locked());
    }
}

#[test]
fn sibling_work_completes_before_the_reply() {
    let graph = Arc::new(NodeGraph::new());
    let merge = graph.add_node(MergeNode);
    let solid = graph.add_node(SolidNode);
    graph.connect(solid, InputRef::new(merge, 0)).unwrap();

    let master = SoftwareMaster::new();
    let w = worker(&graph, &master, RenderParams::new(4, 4));
    master.clear_calls();

    let (tx, rx) = std::sync::mpsc::channel();
    let delegator = Siblings::new(vec![tx]);
    let branches = delegator.dispatch(&[DependencyPath::edge(
        solid,
        InputRef::new(merge, 0),
        FrameIndex(0),
    )]);
    let Ok(WorkerMsg::Sibling(job)) = rx.try_recv() else {
        panic!("branch was not posted to the sibling");
    };
    w.render_sibling(job);

    let calls = master.calls_for(1);
    assert!(calls.len() >= 2);
    assert_eq!(&calls[calls.len() - 2..], &[GpuCall::Flush, GpuCall::Finish]);

    let out = delegator.join(branches, |_| Value::None);
    assert!(matches!(out.as_slice(), [Value::Texture(_)]));
}
