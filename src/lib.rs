//! Node-graph render workers.
//!
//! A [`NodeGraph`] holds nodes whose outputs are plain values or GPU textures. Render workers own
//! one GPU context each, sharing resources through a [`gpu::MasterContext`], and evaluate
//! [`DependencyPath`]s of the graph:
//!
//! - Build a graph and connect nodes
//! - Start a [`WorkerPool`] (or drive a single [`RenderWorker`]) against a master context
//! - Send render requests and wait on the returned tickets
#![forbid(unsafe_code)]

pub mod foundation;
pub mod gpu;
pub mod graph;
pub mod media;
pub mod render;
pub mod worker;

pub use crate::foundation::core::{FrameIndex, FrameRGBA, FrameRange, Fps, Rgba8Premul};
pub use crate::foundation::error::{RenderError, RenderResult};
pub use crate::graph::{
    DependencyPath, FootageRef, InputRef, InputRole, Keyframes, NodeGraph, NodeId, NodeKind, Value,
};
pub use crate::media::{FootageSource, NoFootage, StillImageSource};
pub use crate::render::params::RenderParams;
pub use crate::worker::{
    RenderOutcome, RenderTicket, RenderWorker, WorkerHandle, WorkerPool, WorkerPoolOpts,
};
