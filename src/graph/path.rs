use crate::foundation::core::FrameIndex;
use crate::graph::node::{InputRef, NodeId};

/// One node's output as consumed by a specific input, at a given time.
///
/// A path without a consumer addresses the output on behalf of the render owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DependencyPath {
    source: NodeId,
    consumer: Option<InputRef>,
    time: FrameIndex,
}

impl DependencyPath {
    /// Path to `source`'s output as seen by the render owner.
    pub fn output(source: NodeId, time: FrameIndex) -> Self {
        Self {
            source,
            consumer: None,
            time,
        }
    }

    /// Path along the edge `source -> consumer`.
    pub fn edge(source: NodeId, consumer: InputRef, time: FrameIndex) -> Self {
        Self {
            source,
            consumer: Some(consumer),
            time,
        }
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn consumer(&self) -> Option<InputRef> {
        self.consumer
    }

    pub fn time(&self) -> FrameIndex {
        self.time
    }

    /// Same edge, different source node (used when a block hands over to its active neighbour).
    pub(crate) fn redirect(self, source: NodeId) -> Self {
        Self { source, ..self }
    }
}
