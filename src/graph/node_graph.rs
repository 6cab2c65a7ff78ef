use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{RenderError, RenderResult};
use crate::graph::keyframe::Keyframes;
use crate::graph::node::{Block, InputRef, Node, NodeId, NodeKind};

/// Shared node graph.
///
/// Structural edits (`connect`, `disconnect`, `link_blocks`, `remove_node`) are serialized by a
/// graph-wide edit lock so cycle checks see a stable structure. Every edit that touches a node
/// holds that node's exclusive user-input lock, so it waits for renders reading the node.
#[derive(Default)]
pub struct NodeGraph {
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
    next_id: AtomicU64,
    edit: Mutex<()>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, kind: impl NodeKind + 'static) -> NodeId {
        self.add_node_arc(Arc::new(kind))
    }

    pub fn add_node_arc(&self, kind: Arc<dyn NodeKind>) -> NodeId {
        let id = NodeId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let node = Arc::new(Node::new(id, kind));
        tracing::trace!(%id, kind = node.kind().name(), "node added");
        self.nodes.write().insert(id, node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    fn require(&self, id: NodeId) -> RenderResult<Arc<Node>> {
        self.node(id)
            .ok_or_else(|| RenderError::validation(format!("node {id} does not exist")))
    }

    /// Remove a node, disconnecting every input and block link that referenced it.
    pub fn remove_node(&self, id: NodeId) -> RenderResult<()> {
        let _edit = self.edit.lock();
        let node = self.require(id)?;

        let consumers: Vec<Arc<Node>> = self
            .nodes
            .read()
            .values()
            .filter(|n| n.id() != id && n.upstream().contains(&id))
            .cloned()
            .collect();

        let mut affected: BTreeMap<NodeId, Arc<Node>> =
            consumers.into_iter().map(|n| (n.id(), n)).collect();
        affected.insert(id, Arc::clone(&node));

        // Ascending id order, the same order renders lock in.
        let guards: Vec<_> = affected
            .values()
            .map(|n| (n, n.lock_user_input_exclusive()))
            .collect();
        for (n, guard) in &guards {
            if n.id() == id {
                continue;
            }
            let mut state = n.state_mut(guard);
            for input in &mut state.inputs {
                if input.connection == Some(id) {
                    input.connection = None;
                }
            }
            if let Some(block) = state.block.as_mut() {
                if block.previous == Some(id) {
                    block.previous = None;
                }
                if block.next == Some(id) {
                    block.next = None;
                }
            }
        }
        self.nodes.write().remove(&id);
        drop(guards);

        tracing::debug!(%id, "node removed");
        Ok(())
    }

    /// Connect `upstream`'s output to `input`. Rejects self-loops and cycles.
    pub fn connect(&self, upstream: NodeId, input: InputRef) -> RenderResult<()> {
        let _edit = self.edit.lock();
        let source = self.require(upstream)?;
        let dest = self.require(input.node)?;
        if input.index >= dest.input_count() {
            return Err(RenderError::validation(format!(
                "node {} has no input {}",
                input.node, input.index
            )));
        }
        if upstream == input.node || self.reaches(&source, input.node) {
            return Err(RenderError::validation(format!(
                "connecting {upstream} to {} would create a cycle",
                input.node
            )));
        }

        let guard = dest.lock_user_input_exclusive();
        dest.state_mut(&guard).inputs[input.index].connection = Some(upstream);
        Ok(())
    }

    /// Disconnect `input`, returning the node it was connected to.
    pub fn disconnect(&self, input: InputRef) -> RenderResult<Option<NodeId>> {
        let _edit = self.edit.lock();
        let dest = self.require(input.node)?;
        let guard = dest.lock_user_input_exclusive();
        let mut state = dest.state_mut(&guard);
        let slot = state.inputs.get_mut(input.index).ok_or_else(|| {
            RenderError::validation(format!("node {} has no input {}", input.node, input.index))
        })?;
        Ok(slot.connection.take())
    }

    /// Replace the stored (keyframed) value of `input`.
    pub fn set_input_value(&self, input: InputRef, value: impl Into<Keyframes>) -> RenderResult<()> {
        let dest = self.require(input.node)?;
        let guard = dest.lock_user_input_exclusive();
        let mut state = dest.state_mut(&guard);
        let slot = state.inputs.get_mut(input.index).ok_or_else(|| {
            RenderError::validation(format!("node {} has no input {}", input.node, input.index))
        })?;
        slot.stored = value.into();
        Ok(())
    }

    /// Turn `id` into a block covering `range` (or move an existing block).
    pub fn set_block_range(&self, id: NodeId, range: FrameRange) -> RenderResult<()> {
        let node = self.require(id)?;
        let guard = node.lock_user_input_exclusive();
        let mut state = node.state_mut(&guard);
        match state.block.as_mut() {
            Some(block) => block.range = range,
            None => {
                state.block = Some(Block {
                    range,
                    previous: None,
                    next: None,
                })
            }
        }
        Ok(())
    }

    /// Link two blocks as neighbours: `previous.next = next`, `next.previous = previous`.
    pub fn link_blocks(&self, previous: NodeId, next: NodeId) -> RenderResult<()> {
        let _edit = self.edit.lock();
        let prev_node = self.require(previous)?;
        let next_node = self.require(next)?;
        if prev_node.block().is_none() || next_node.block().is_none() {
            return Err(RenderError::validation(
                "only blocks can be linked; set a block range first",
            ));
        }
        if previous == next
            || self.reaches(&prev_node, next)
            || self.reaches(&next_node, previous)
        {
            return Err(RenderError::validation(format!(
                "linking {previous} and {next} would create a cycle"
            )));
        }

        let (first, second) = if previous < next {
            (&prev_node, &next_node)
        } else {
            (&next_node, &prev_node)
        };
        let g1 = first.lock_user_input_exclusive();
        let g2 = second.lock_user_input_exclusive();
        let (prev_guard, next_guard) = if previous < next { (&g1, &g2) } else { (&g2, &g1) };

        if let Some(block) = prev_node.state_mut(prev_guard).block.as_mut() {
            block.next = Some(next);
        }
        if let Some(block) = next_node.state_mut(next_guard).block.as_mut() {
            block.previous = Some(previous);
        }
        Ok(())
    }

    /// `true` when `target` is in the transitive upstream of `from`.
    fn reaches(&self, from: &Arc<Node>, target: NodeId) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeId> = from.upstream().into_iter().collect();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(n) = self.node(id) {
                stack.extend(n.upstream());
            }
        }
        false
    }

    /// Transitive upstream of `id` (connections and block neighbours), excluding `id`,
    /// sorted by id. Unknown ids are skipped.
    pub fn dependencies(&self, id: NodeId) -> Vec<Arc<Node>> {
        self.dependency_set(id)
            .into_iter()
            .filter(|n| n.id() != id)
            .collect()
    }

    /// `id` plus its transitive upstream, sorted by id.
    pub fn dependency_set(&self, id: NodeId) -> Vec<Arc<Node>> {
        let mut found: BTreeMap<NodeId, Arc<Node>> = BTreeMap::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if found.contains_key(&next) {
                continue;
            }
            if let Some(n) = self.node(next) {
                stack.extend(n.upstream());
                found.insert(next, n);
            }
        }
        found.into_values().collect()
    }

    /// The block of `node`'s track that covers `time`.
    ///
    /// Non-block nodes are their own active block. Ranges are half-open, so on a boundary the
    /// later block wins. `None` when no linked block covers `time`.
    pub fn active_block(&self, node: &Arc<Node>, time: FrameIndex) -> Option<Arc<Node>> {
        let Some(block) = node.block() else {
            return Some(Arc::clone(node));
        };

        let mut current = Arc::clone(node);
        let mut range = block.range;
        let mut seen = BTreeSet::new();
        loop {
            if range.contains(time) {
                return Some(current);
            }
            if !seen.insert(current.id()) {
                return None;
            }
            let links = current.block()?;
            let step = if time < range.start {
                links.previous
            } else {
                links.next
            };
            current = self.node(step?)?;
            range = current.block()?.range;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/node_graph.rs"]
mod tests;
