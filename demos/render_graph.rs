use std::sync::Arc;

use noderender::gpu::software::SoftwareMaster;
use noderender::graph::kinds::{MergeNode, SolidNode};
use noderender::{
    DependencyPath, FrameIndex, InputRef, NoFootage, NodeGraph, RenderParams, Rgba8Premul, Value,
    WorkerPool, WorkerPoolOpts,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let graph = Arc::new(NodeGraph::new());
    let merge = graph.add_node(MergeNode);
    let base = graph.add_node(SolidNode);
    let top = graph.add_node(SolidNode);
    graph.set_input_value(
        InputRef::new(base, 0),
        Value::Color(Rgba8Premul::from_straight_rgba(200, 30, 30, 255)),
    )?;
    graph.set_input_value(
        InputRef::new(top, 0),
        Value::Color(Rgba8Premul::from_straight_rgba(30, 30, 200, 255)),
    )?;
    graph.set_input_value(InputRef::new(top, 1), Value::Float(0.4))?;
    graph.connect(base, InputRef::new(merge, 0))?;
    graph.connect(top, InputRef::new(merge, 1))?;

    let pool = WorkerPool::new(
        WorkerPoolOpts::default(),
        Arc::new(SoftwareMaster::new()),
        Arc::clone(&graph),
        Arc::new(NoFootage),
    )?;
    pool.set_parameters(RenderParams::new(1280, 720).with_divider(4));
    pool.init_all();

    for f in [0u64, 1, 2] {
        let out = pool
            .render(DependencyPath::output(merge, FrameIndex(f)))
            .wait()?;
        match out.value.as_frame() {
            Some(frame) => println!(
                "frame {f}: {}x{} px(0,0)={:?} locked={:?}",
                frame.width,
                frame.height,
                frame.pixel(0, 0).map(|p| p.to_array()),
                out.locked
            ),
            None => println!("frame {f}: no contribution"),
        }
    }

    Ok(())
}
