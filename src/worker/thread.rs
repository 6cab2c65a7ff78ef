use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use anyhow::Context;

use crate::foundation::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::graph::node_graph::NodeGraph;
use crate::graph::path::DependencyPath;
use crate::media::FootageSource;
use crate::render::params::RenderParams;
use crate::worker::context::{ContextHolder, SharedMaster};
use crate::worker::render_worker::{RenderOutcome, RenderWorker};
use crate::worker::sibling::{SiblingJob, Siblings};

/// Messages accepted by a worker thread, processed in arrival order.
pub enum WorkerMsg {
    /// Second initialization phase, carrying the context created by `WorkerHandle::init`.
    FinishInit(Box<dyn GpuContext>),
    SetParameters(RenderParams),
    SetSiblings(Vec<mpsc::Sender<WorkerMsg>>),
    Render {
        path: DependencyPath,
        reply: mpsc::Sender<RenderResult<RenderOutcome>>,
    },
    Sibling(SiblingJob),
    Close,
    Shutdown,
}

/// Pending result of a render request.
pub struct RenderTicket {
    rx: mpsc::Receiver<RenderResult<RenderOutcome>>,
}

impl RenderTicket {
    /// Block until the worker answers.
    pub fn wait(self) -> RenderResult<RenderOutcome> {
        self.rx
            .recv()
            .map_err(|_| RenderError::evaluation("render worker stopped before replying"))?
    }

    /// The result, if the worker already answered.
    pub fn try_wait(&self) -> Option<RenderResult<RenderOutcome>> {
        self.rx.try_recv().ok()
    }
}

/// A [`RenderWorker`] running on its own thread.
///
/// All methods only post to the worker's inbox (except the first phase of `init`, which runs on
/// the caller's thread), so they never wait on a render in progress.
pub struct WorkerHandle {
    id: usize,
    master: SharedMaster,
    inbox: mpsc::Sender<WorkerMsg>,
    started: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn spawn(
        id: usize,
        master: SharedMaster,
        graph: Arc<NodeGraph>,
        footage: Arc<dyn FootageSource>,
        thread_name: String,
    ) -> RenderResult<Self> {
        let (inbox, rx) = mpsc::channel();
        let worker_master = Arc::clone(&master);
        let thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let worker = RenderWorker::new(id, worker_master, graph, footage);
                run(worker, rx);
            })
            .context("spawn render worker thread")?;

        Ok(Self {
            id,
            master,
            inbox,
            started: Arc::new(AtomicBool::new(false)),
            thread: Some(thread),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Create the worker's context here, then hand it to the worker thread to finish.
    ///
    /// A failure is logged and leaves the worker closed. Calling `init` on a started worker
    /// re-initializes it.
    #[tracing::instrument(skip(self), fields(worker = self.id))]
    pub fn init(&self) {
        if self.is_started() {
            self.close();
        }
        match ContextHolder::create_shared(self.master.as_ref()) {
            Some(context) => {
                self.started.store(true, Ordering::SeqCst);
                self.post(WorkerMsg::FinishInit(context));
            }
            None => self.close(),
        }
    }

    /// `true` once a context exists, whether or not the worker thread finished setting it up.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn set_parameters(&self, params: RenderParams) {
        self.post(WorkerMsg::SetParameters(params));
    }

    pub fn close(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.post(WorkerMsg::Close);
    }

    pub fn render(&self, path: DependencyPath) -> RenderTicket {
        let (reply, rx) = mpsc::channel();
        self.post(WorkerMsg::Render { path, reply });
        RenderTicket { rx }
    }

    pub(crate) fn inbox(&self) -> mpsc::Sender<WorkerMsg> {
        self.inbox.clone()
    }

    pub(crate) fn set_siblings(&self, peers: Vec<mpsc::Sender<WorkerMsg>>) {
        self.post(WorkerMsg::SetSiblings(peers));
    }

    fn post(&self, msg: WorkerMsg) {
        if self.inbox.send(msg).is_err() {
            tracing::warn!(worker = self.id, "render worker thread is gone");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.inbox.send(WorkerMsg::Shutdown);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!(worker = self.id, "render worker thread panicked");
        }
    }
}

fn run(mut worker: RenderWorker, rx: mpsc::Receiver<WorkerMsg>) {
    tracing::debug!(worker = worker.id(), "render worker thread started");
    while let Ok(msg) = rx.recv() {
        match msg {
            WorkerMsg::FinishInit(context) => {
                worker.finish_init(context);
            }
            WorkerMsg::SetParameters(params) => worker.set_parameters(params),
            WorkerMsg::SetSiblings(peers) => worker.set_siblings(Siblings::new(peers)),
            WorkerMsg::Render { path, reply } => {
                let _ = reply.send(worker.render(path));
            }
            WorkerMsg::Sibling(job) => worker.render_sibling(job),
            WorkerMsg::Close => worker.close(),
            WorkerMsg::Shutdown => break,
        }
    }
    worker.close();
    tracing::debug!(worker = worker.id(), "render worker thread stopped");
}

#[cfg(test)]
#[path = "../../tests/unit/worker/thread.rs"]
mod tests;
