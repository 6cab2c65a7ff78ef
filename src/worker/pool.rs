use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::foundation::error::{RenderError, RenderResult};
use crate::graph::node_graph::NodeGraph;
use crate::graph::path::DependencyPath;
use crate::media::FootageSource;
use crate::render::params::RenderParams;
use crate::worker::context::SharedMaster;
use crate::worker::thread::{RenderTicket, WorkerHandle};

/// Options controlling a [`WorkerPool`].
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WorkerPoolOpts {
    /// Number of worker threads, each with its own GPU context.
    pub workers: usize,
    /// Hand fan-out branches to other workers. When off, every worker evaluates its whole
    /// graph inline.
    pub sibling_delegation: bool,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for WorkerPoolOpts {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(2),
            sibling_delegation: true,
            thread_name_prefix: "noderender-worker".to_string(),
        }
    }
}

impl WorkerPoolOpts {
    pub fn validate(&self) -> RenderResult<()> {
        if self.workers == 0 {
            return Err(RenderError::validation("worker pool needs at least one worker"));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(RenderError::validation(
                "worker thread name prefix must be non-empty",
            ));
        }
        Ok(())
    }

    /// Parse and validate options from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> RenderResult<Self> {
        let opts: Self = serde_json::from_str(json)
            .map_err(|e| RenderError::validation(format!("invalid worker pool options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }
}

/// A set of render workers sharing one master context.
///
/// Requests go to workers round-robin; with sibling delegation on, every worker knows the inboxes
/// of all the others.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        opts: WorkerPoolOpts,
        master: SharedMaster,
        graph: Arc<NodeGraph>,
        footage: Arc<dyn FootageSource>,
    ) -> RenderResult<Self> {
        opts.validate()?;

        let workers = (0..opts.workers)
            .map(|i| {
                WorkerHandle::spawn(
                    i,
                    Arc::clone(&master),
                    Arc::clone(&graph),
                    Arc::clone(&footage),
                    format!("{}-{i}", opts.thread_name_prefix),
                )
            })
            .collect::<RenderResult<Vec<_>>>()?;

        if opts.sibling_delegation && workers.len() > 1 {
            for worker in &workers {
                let peers = workers
                    .iter()
                    .filter(|w| w.id() != worker.id())
                    .map(WorkerHandle::inbox)
                    .collect();
                worker.set_siblings(peers);
            }
        }

        tracing::debug!(workers = workers.len(), "worker pool started");
        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker(&self, index: usize) -> Option<&WorkerHandle> {
        self.workers.get(index)
    }

    pub fn workers(&self) -> &[WorkerHandle] {
        &self.workers
    }

    pub fn set_parameters(&self, params: RenderParams) {
        for worker in &self.workers {
            worker.set_parameters(params);
        }
    }

    pub fn init_all(&self) {
        for worker in &self.workers {
            worker.init();
        }
    }

    /// Number of workers whose context exists.
    pub fn started(&self) -> usize {
        self.workers.iter().filter(|w| w.is_started()).count()
    }

    pub fn close_all(&self) {
        for worker in &self.workers {
            worker.close();
        }
    }

    /// Send `path` to the next worker in turn.
    pub fn render(&self, path: DependencyPath) -> RenderTicket {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        self.workers[i].render(path)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/pool.rs"]
mod tests;
