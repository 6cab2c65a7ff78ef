//! Built-in node kinds.

use crate::foundation::core::{FrameIndex, Rgba8Premul};
use crate::gpu::{ProgramKind, Texture, Uniforms};
use crate::graph::node::{InputDesc, InputValues, NodeKind};
use crate::graph::value::Value;

fn opacity(inputs: &InputValues) -> f32 {
    inputs.float("opacity").unwrap_or(1.0).clamp(0.0, 1.0) as f32
}

/// Passes its single `value` input through.
#[derive(Debug, Default)]
pub struct ValueNode;

impl NodeKind for ValueNode {
    fn name(&self) -> &'static str {
        "value"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::value("value", Value::None)]
    }

    fn evaluate(&self, inputs: &InputValues, _time: FrameIndex) -> Value {
        inputs.get("value").clone()
    }
}

/// `a + b`. A missing operand counts as zero.
#[derive(Debug, Default)]
pub struct AddNode;

impl NodeKind for AddNode {
    fn name(&self) -> &'static str {
        "add"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::value("a", 0.0), InputDesc::value("b", 0.0)]
    }

    fn evaluate(&self, inputs: &InputValues, _time: FrameIndex) -> Value {
        let a = inputs.float("a").unwrap_or(0.0);
        let b = inputs.float("b").unwrap_or(0.0);
        Value::Float(a + b)
    }
}

/// Solid color layer covering the whole viewport.
#[derive(Debug, Default)]
pub struct SolidNode;

impl NodeKind for SolidNode {
    fn name(&self) -> &'static str {
        "solid"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![
            InputDesc::value("color", Rgba8Premul::from_straight_rgba(255, 255, 255, 255)),
            InputDesc::value("opacity", 1.0),
        ]
    }

    fn program(&self) -> Option<ProgramKind> {
        Some(ProgramKind::Fill)
    }

    fn draw_inputs(&self, _inputs: &InputValues) -> Option<Vec<Texture>> {
        Some(Vec::new())
    }

    fn uniforms(&self, inputs: &InputValues) -> Uniforms {
        Uniforms {
            color: inputs
                .get("color")
                .as_color()
                .unwrap_or_else(Rgba8Premul::transparent),
            opacity: opacity(inputs),
        }
    }
}

/// Composites `blend` over `base`, then scales the result by `opacity`.
#[derive(Debug, Default)]
pub struct MergeNode;

impl NodeKind for MergeNode {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![
            InputDesc::texture("base"),
            InputDesc::texture("blend"),
            InputDesc::value("opacity", 1.0),
        ]
    }

    fn program(&self) -> Option<ProgramKind> {
        Some(ProgramKind::Over)
    }

    fn draw_inputs(&self, inputs: &InputValues) -> Option<Vec<Texture>> {
        let layers: Vec<Texture> = ["base", "blend"]
            .into_iter()
            .filter_map(|name| inputs.texture(name))
            .collect();
        (!layers.is_empty()).then_some(layers)
    }

    fn uniforms(&self, inputs: &InputValues) -> Uniforms {
        Uniforms {
            opacity: opacity(inputs),
            ..Uniforms::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct OpacityNode;

impl NodeKind for OpacityNode {
    fn name(&self) -> &'static str {
        "opacity"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::texture("source"), InputDesc::value("opacity", 1.0)]
    }

    fn program(&self) -> Option<ProgramKind> {
        Some(ProgramKind::Opacity)
    }

    fn draw_inputs(&self, inputs: &InputValues) -> Option<Vec<Texture>> {
        inputs.texture("source").map(|t| vec![t])
    }

    fn uniforms(&self, inputs: &InputValues) -> Uniforms {
        Uniforms {
            opacity: opacity(inputs),
            ..Uniforms::default()
        }
    }
}

/// External media, scaled to the viewport.
#[derive(Debug, Default)]
pub struct FootageNode;

impl NodeKind for FootageNode {
    fn name(&self) -> &'static str {
        "footage"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::footage("footage")]
    }

    fn program(&self) -> Option<ProgramKind> {
        Some(ProgramKind::Blit)
    }

    fn draw_inputs(&self, inputs: &InputValues) -> Option<Vec<Texture>> {
        inputs.texture("footage").map(|t| vec![t])
    }
}

/// Time-ranged segment of a track. Shows `source` while the block is active.
///
/// The range and neighbour links live on the node (see `NodeGraph::set_block_range` and
/// `NodeGraph::link_blocks`); the kind only forwards its input.
#[derive(Debug, Default)]
pub struct BlockNode;

impl NodeKind for BlockNode {
    fn name(&self) -> &'static str {
        "block"
    }

    fn inputs(&self) -> Vec<InputDesc> {
        vec![InputDesc::texture("source")]
    }

    fn program(&self) -> Option<ProgramKind> {
        Some(ProgramKind::Blit)
    }

    fn draw_inputs(&self, inputs: &InputValues) -> Option<Vec<Texture>> {
        inputs.texture("source").map(|t| vec![t])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/kinds.rs"]
mod tests;
