//! Render workers: one GPU context per thread, rendering dependency paths of a shared graph.

pub mod context;
pub mod pool;
pub mod render_worker;
pub mod sibling;
pub mod thread;
mod traverse;

pub use context::{ContextHolder, SharedMaster};
pub use pool::{WorkerPool, WorkerPoolOpts};
pub use render_worker::{RenderOutcome, RenderWorker};
pub use sibling::{SiblingJob, Siblings};
pub use thread::{RenderTicket, WorkerHandle, WorkerMsg};
