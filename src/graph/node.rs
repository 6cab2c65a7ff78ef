use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use smallvec::SmallVec;

use crate::foundation::core::{FrameIndex, FrameRange};
use crate::gpu::{ProgramKind, Texture, Uniforms};
use crate::graph::keyframe::Keyframes;
use crate::graph::value::Value;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One input slot of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputRef {
    pub node: NodeId,
    pub index: usize,
}

impl InputRef {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// How an input's value is obtained and consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputRole {
    /// Plain value; keyframed when unconnected.
    #[default]
    Value,
    /// GPU texture consumed by a program.
    Texture,
    /// CPU-side pixels; textures arriving here are read back.
    Pixels,
    /// External media, resolved through a footage source rather than keyframes.
    Footage,
}

/// Static description of an input, declared by a [`NodeKind`].
#[derive(Clone, Debug)]
pub struct InputDesc {
    pub name: &'static str,
    pub role: InputRole,
    pub default: Value,
}

impl InputDesc {
    pub fn value(name: &'static str, default: impl Into<Value>) -> Self {
        Self {
            name,
            role: InputRole::Value,
            default: default.into(),
        }
    }

    pub fn texture(name: &'static str) -> Self {
        Self {
            name,
            role: InputRole::Texture,
            default: Value::None,
        }
    }

    pub fn pixels(name: &'static str) -> Self {
        Self {
            name,
            role: InputRole::Pixels,
            default: Value::None,
        }
    }

    pub fn footage(name: &'static str) -> Self {
        Self {
            name,
            role: InputRole::Footage,
            default: Value::None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeInput {
    pub name: &'static str,
    pub role: InputRole,
    pub stored: Keyframes,
    pub connection: Option<NodeId>,
}

/// Time-ranged segment linked to its neighbours on the same track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub range: FrameRange,
    pub previous: Option<NodeId>,
    pub next: Option<NodeId>,
}

/// Connections and values of a node. Readable by renders, writable only by graph edits.
#[derive(Clone, Debug, Default)]
pub struct NodeState {
    pub inputs: Vec<NodeInput>,
    pub block: Option<Block>,
}

impl NodeState {
    /// Upstream nodes this node reads from: connections, then block neighbours.
    pub fn upstream(&self) -> SmallVec<[NodeId; 4]> {
        let mut out: SmallVec<[NodeId; 4]> =
            self.inputs.iter().filter_map(|i| i.connection).collect();
        if let Some(block) = self.block {
            out.extend(block.previous);
            out.extend(block.next);
        }
        out
    }

    pub fn connected_inputs(&self) -> usize {
        self.inputs.iter().filter(|i| i.connection.is_some()).count()
    }
}

/// Resolved input values handed to a [`NodeKind`], in declaration order.
#[derive(Clone, Debug, Default)]
pub struct InputValues {
    entries: SmallVec<[(&'static str, Value); 4]>,
}

impl InputValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: Value) {
        self.entries.push((name, value));
    }

    /// Value of `name`, `Value::None` when absent.
    pub fn get(&self, name: &str) -> &Value {
        const NONE: &Value = &Value::None;
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
            .unwrap_or(NONE)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).as_float()
    }

    pub fn texture(&self, name: &str) -> Option<Texture> {
        self.get(name).as_texture().cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Behavior of a node type.
///
/// A kind either produces a plain value (`evaluate`) or, when `program` returns a program,
/// a texture drawn by the worker from `draw_inputs` and `uniforms`.
pub trait NodeKind: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn inputs(&self) -> Vec<InputDesc>;

    fn program(&self) -> Option<ProgramKind> {
        None
    }

    /// Textures to bind, in order. `None` means the node has nothing to contribute.
    fn draw_inputs(&self, inputs: &InputValues) -> Option<Vec<Texture>> {
        Some(
            inputs
                .iter()
                .filter_map(|(_, v)| v.as_texture().cloned())
                .collect(),
        )
    }

    fn uniforms(&self, _inputs: &InputValues) -> Uniforms {
        Uniforms::default()
    }

    fn evaluate(&self, _inputs: &InputValues, _time: FrameIndex) -> Value {
        Value::None
    }
}

pub type UserInputGuard<'a> = RwLockReadGuard<'a, ()>;
pub type EditGuard<'a> = RwLockWriteGuard<'a, ()>;
pub type ProcessingGuard<'a> = MutexGuard<'a, ()>;

/// A graph vertex.
///
/// Two independent locks guard a node: the user-input lock (shared by renders, exclusive for
/// edits) keeps connections and values stable while a render reads them, and the processing
/// lock keeps two workers from evaluating the node at the same time.
pub struct Node {
    id: NodeId,
    kind: Arc<dyn NodeKind>,
    user_input: RwLock<()>,
    processing: Mutex<()>,
    state: RwLock<NodeState>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind.name())
            .finish()
    }
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: Arc<dyn NodeKind>) -> Self {
        let inputs = kind
            .inputs()
            .into_iter()
            .map(|desc| NodeInput {
                name: desc.name,
                role: desc.role,
                stored: Keyframes::constant(desc.default),
                connection: None,
            })
            .collect();
        Self {
            id,
            kind,
            user_input: RwLock::new(()),
            processing: Mutex::new(()),
            state: RwLock::new(NodeState {
                inputs,
                block: None,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &dyn NodeKind {
        self.kind.as_ref()
    }

    /// Shared user-input lock taken by renders for their whole snapshot window.
    pub fn lock_user_input(&self) -> UserInputGuard<'_> {
        self.user_input.read()
    }

    /// Exclusive user-input lock taken by edits.
    pub fn lock_user_input_exclusive(&self) -> EditGuard<'_> {
        self.user_input.write()
    }

    pub fn try_lock_user_input_exclusive(&self) -> Option<EditGuard<'_>> {
        self.user_input.try_write()
    }

    pub fn is_user_input_locked(&self) -> bool {
        self.user_input.is_locked()
    }

    pub fn lock_processing(&self) -> ProcessingGuard<'_> {
        self.processing.lock()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_locked()
    }

    pub fn snapshot(&self) -> NodeState {
        self.state.read().clone()
    }

    pub fn block(&self) -> Option<Block> {
        self.state.read().block
    }

    pub fn upstream(&self) -> SmallVec<[NodeId; 4]> {
        self.state.read().upstream()
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.state.read().inputs.iter().position(|i| i.name == name)
    }

    pub fn input_count(&self) -> usize {
        self.state.read().inputs.len()
    }

    /// Mutable state, only reachable while holding this node's exclusive user-input lock.
    pub(crate) fn state_mut<'a>(
        &'a self,
        edit: &EditGuard<'_>,
    ) -> RwLockWriteGuard<'a, NodeState> {
        debug_assert!(std::ptr::eq(
            RwLockWriteGuard::rwlock(edit),
            &self.user_input
        ));
        self.state.write()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node.rs"]
mod tests;
