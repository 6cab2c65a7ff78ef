use std::sync::Arc;

use crate::foundation::error::{RenderError, RenderResult};
use crate::gpu::{GpuContext, GpuFunctions};
use crate::graph::node::{Node, NodeId, UserInputGuard};
use crate::graph::node_graph::NodeGraph;
use crate::graph::path::DependencyPath;
use crate::graph::value::Value;
use crate::media::FootageSource;
use crate::render::params::RenderParams;
use crate::worker::context::{ContextHolder, SharedMaster};
use crate::worker::sibling::{SiblingJob, Siblings};
use crate::worker::traverse::Traversal;

/// Result of one top-level render.
#[derive(Clone, Debug)]
pub struct RenderOutcome {
    pub value: Value,
    /// Nodes whose user-input lock the render held, in acquisition order.
    pub locked: Vec<NodeId>,
}

/// Renders dependency paths with one GPU context.
///
/// A worker is confined to the thread that initialized it (its function table is not `Send`).
/// [`crate::worker::thread::WorkerHandle`] runs one on a dedicated thread; owners that manage
/// threads themselves can drive a `RenderWorker` directly.
pub struct RenderWorker {
    id: usize,
    master: SharedMaster,
    graph: Arc<NodeGraph>,
    footage: Arc<dyn FootageSource>,
    holder: ContextHolder,
    siblings: Siblings,
}

impl RenderWorker {
    pub fn new(
        id: usize,
        master: SharedMaster,
        graph: Arc<NodeGraph>,
        footage: Arc<dyn FootageSource>,
    ) -> Self {
        Self {
            id,
            master,
            graph,
            footage,
            holder: ContextHolder::new(),
            siblings: Siblings::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn set_siblings(&mut self, siblings: Siblings) {
        self.siblings = siblings;
    }

    pub fn set_parameters(&mut self, params: RenderParams) {
        self.holder.set_parameters(params);
    }

    pub fn params(&self) -> RenderParams {
        self.holder.params()
    }

    /// Both initialization phases on the current thread.
    #[tracing::instrument(skip(self), fields(worker = self.id))]
    pub fn init(&mut self) {
        match ContextHolder::create_shared(self.master.as_ref()) {
            Some(context) => {
                self.finish_init(context);
            }
            None => self.close(),
        }
    }

    /// Second initialization phase. Must run on the thread that will render.
    pub fn finish_init(&mut self, context: Box<dyn GpuContext>) -> bool {
        self.holder.finish_init(context)
    }

    pub fn close(&mut self) {
        self.holder.close();
        tracing::debug!(worker = self.id, "worker closed");
    }

    pub fn is_started(&self) -> bool {
        self.holder.has_context()
    }

    pub fn is_ready(&self) -> bool {
        self.holder.is_ready()
    }

    /// Render `path` under a consistent snapshot of its dependency set.
    ///
    /// Every node the path depends on has its user-input lock held until the traversal is done
    /// and its commands are flushed; the blocking `finish` happens after the locks are gone.
    #[tracing::instrument(skip(self), fields(worker = self.id))]
    pub fn render(&self, path: DependencyPath) -> RenderResult<RenderOutcome> {
        let Some(gl) = self.holder.functions().filter(|_| self.holder.is_ready()) else {
            return Err(RenderError::NotInitialized);
        };

        let source = path.source();
        let mut nodes = self.lock_set(path);
        loop {
            let guards = lock_user_inputs(&nodes);
            let current = self.lock_set(path);
            if same_ids(&nodes, &current) {
                let value = self.traversal(gl.as_ref()).render_as_sibling(path);
                gl.flush();
                let locked = nodes.iter().map(|n| n.id()).collect();
                drop(guards);
                gl.finish();
                return Ok(RenderOutcome { value, locked });
            }
            drop(guards);
            tracing::trace!(node = %source, "dependency set changed while locking; retrying");
            nodes = current;
        }
    }

    /// Evaluate a branch delegated by another worker, if nobody has claimed it yet.
    ///
    /// The delegating worker holds the user-input locks; this only evaluates. Unlike a top-level
    /// render, the blocking `finish` runs while those locks are still held: the delegator samples
    /// the reply from its own context, so the commands must be complete before the reply is sent.
    /// Edits to the dependency set wait for that GPU work too.
    pub fn render_sibling(&self, job: SiblingJob) {
        let Some(gl) = self.holder.functions().filter(|_| self.holder.is_ready()) else {
            return;
        };
        if !job.claim() {
            return;
        }
        let value = self.traversal(gl.as_ref()).render_as_sibling(job.path());
        gl.flush();
        gl.finish();
        job.reply(value);
    }

    /// Dependency set of `path`, plus its consumer node when the path is an edge.
    ///
    /// The consumer's input role decides whether the result is read back, so it is held in the
    /// same snapshot.
    fn lock_set(&self, path: DependencyPath) -> Vec<Arc<Node>> {
        let mut nodes = self.graph.dependency_set(path.source());
        if let Some(consumer) = path.consumer()
            && let Some(node) = self.graph.node(consumer.node)
            && let Err(at) = nodes.binary_search_by_key(&node.id(), |n| n.id())
        {
            nodes.insert(at, node);
        }
        nodes
    }

    fn traversal<'a>(&'a self, gl: &'a dyn GpuFunctions) -> Traversal<'a> {
        Traversal {
            graph: &self.graph,
            footage: self.footage.as_ref(),
            gl,
            buffer: self.holder.buffer(),
            params: self.holder.params(),
            siblings: &self.siblings,
        }
    }
}

fn lock_user_inputs(nodes: &[Arc<Node>]) -> Vec<UserInputGuard<'_>> {
    nodes.iter().map(|n| n.lock_user_input()).collect()
}

fn same_ids(a: &[Arc<Node>], b: &[Arc<Node>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Arc::ptr_eq(x, y))
}

#[cfg(test)]
#[path = "../../tests/unit/worker/render_worker.rs"]
mod tests;
