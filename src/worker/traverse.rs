use std::sync::Arc;

use smallvec::SmallVec;

use crate::foundation::error::RenderResult;
use crate::gpu::resources::ResourceBuffer;
use crate::gpu::{DrawCall, GpuFunctions, ProgramKind, Texture};
use crate::graph::node::{InputRef, InputRole, InputValues, Node, NodeInput};
use crate::graph::node_graph::NodeGraph;
use crate::graph::path::DependencyPath;
use crate::graph::value::Value;
use crate::media::FootageSource;
use crate::render::params::RenderParams;
use crate::worker::sibling::Siblings;

/// Everything one worker needs to evaluate a path, borrowed for the duration of a render.
pub(crate) struct Traversal<'a> {
    pub graph: &'a NodeGraph,
    pub footage: &'a dyn FootageSource,
    pub gl: &'a dyn GpuFunctions,
    pub buffer: &'a ResourceBuffer,
    pub params: RenderParams,
    pub siblings: &'a Siblings,
}

impl Traversal<'_> {
    /// Evaluate the output addressed by `path`, holding the node's processing lock meanwhile.
    ///
    /// Missing data anywhere upstream degrades to `Value::None` instead of failing.
    pub fn render_as_sibling(&self, path: DependencyPath) -> Value {
        let Some(node) = self.graph.node(path.source()) else {
            tracing::debug!(node = %path.source(), "node vanished; no contribution");
            return Value::None;
        };
        let processing = node.lock_processing();

        if node.block().is_some() {
            match self.graph.active_block(&node, path.time()) {
                None => {
                    tracing::trace!(node = %node.id(), time = path.time().0, "no block active");
                    return Value::None;
                }
                Some(active) if active.id() != node.id() => {
                    drop(processing);
                    return self.render_as_sibling(path.redirect(active.id()));
                }
                Some(_) => {}
            }
        }

        let inputs = self.resolve_inputs(&node, path);
        let output = self.evaluate(&node, &inputs, path);
        drop(processing);
        output
    }

    fn resolve_inputs(&self, node: &Arc<Node>, path: DependencyPath) -> InputValues {
        let state = node.snapshot();
        let time = path.time();

        let upstream: SmallVec<[DependencyPath; 4]> = state
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, input)| {
                let source = input.connection?;
                Some(DependencyPath::edge(source, InputRef::new(node.id(), i), time))
            })
            .collect();

        let fetched: Vec<Value> = match upstream.as_slice() {
            [] => Vec::new(),
            [only] => vec![self.render_as_sibling(*only)],
            many => {
                let branches = self.siblings.dispatch(many);
                self.siblings.join(branches, |p| self.render_as_sibling(p))
            }
        };
        let mut fetched = fetched.into_iter();

        let mut values = InputValues::new();
        for input in &state.inputs {
            let raw = if input.connection.is_some() {
                fetched.next().unwrap_or_default()
            } else {
                self.stored_value(input, path)
            };
            values.push(input.name, self.adapt(input.role, raw));
        }
        values
    }

    fn stored_value(&self, input: &NodeInput, path: DependencyPath) -> Value {
        let value = input.stored.sample(path.time());
        if input.role != InputRole::Footage {
            return value;
        }
        let Some(footage) = value.as_footage() else {
            return Value::None;
        };
        match self.footage.frame(footage, path.time()) {
            Some(frame) => Value::Frame(frame),
            None => {
                tracing::debug!(path = %footage.path.display(), "footage has no frame");
                Value::None
            }
        }
    }

    /// Convert between GPU and CPU representations as the input's role requires.
    fn adapt(&self, role: InputRole, value: Value) -> Value {
        match (role, value) {
            (InputRole::Texture | InputRole::Footage, Value::Frame(frame)) => {
                match self.gl.upload_texture(&frame) {
                    Ok(texture) => Value::Texture(texture),
                    Err(e) => {
                        tracing::debug!(error = %e, "texture upload failed");
                        Value::None
                    }
                }
            }
            (InputRole::Pixels, Value::Texture(texture)) => self.read_back(&texture),
            (_, value) => value,
        }
    }

    fn read_back(&self, texture: &Texture) -> Value {
        match self.gl.read_pixels(texture) {
            Ok(frame) => Value::Frame(Arc::new(frame)),
            Err(e) => {
                tracing::debug!(error = %e, "readback failed");
                Value::None
            }
        }
    }

    fn evaluate(&self, node: &Node, inputs: &InputValues, path: DependencyPath) -> Value {
        let kind = node.kind();
        let Some(program) = kind.program() else {
            return kind.evaluate(inputs, path.time());
        };

        let texture = match self.draw(node, inputs, program) {
            Ok(Some(texture)) => texture,
            Ok(None) => return Value::None,
            Err(e) => {
                tracing::debug!(node = %node.id(), error = %e, "draw failed; no contribution");
                return Value::None;
            }
        };

        if self.wants_pixels(path) {
            self.read_back(&texture)
        } else {
            Value::Texture(texture)
        }
    }

    fn draw(
        &self,
        node: &Node,
        inputs: &InputValues,
        program: ProgramKind,
    ) -> RenderResult<Option<Texture>> {
        if !self.params.is_valid() {
            tracing::trace!(node = %node.id(), "params invalid; skipping draw");
            return Ok(None);
        }
        let kind = node.kind();
        let Some(textures) = kind.draw_inputs(inputs) else {
            return Ok(None);
        };
        let texture = self.gl.draw(&DrawCall {
            program: self.buffer.program(program)?,
            framebuffer: self.buffer.framebuffer()?,
            inputs: &textures,
            uniforms: kind.uniforms(inputs),
            width: self.params.effective_width(),
            height: self.params.effective_height(),
        })?;
        Ok(Some(texture))
    }

    /// Top-level outputs and `Pixels` consumers get CPU pixels; everything else stays on the GPU.
    fn wants_pixels(&self, path: DependencyPath) -> bool {
        let Some(consumer) = path.consumer() else {
            return true;
        };
        self.graph
            .node(consumer.node)
            .and_then(|n| n.snapshot().inputs.get(consumer.index).map(|i| i.role))
            .is_some_and(|role| role == InputRole::Pixels)
    }
}
