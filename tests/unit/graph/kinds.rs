use std::any::Any;
use std::sync::Arc;

use super::*;
use crate::gpu::{GpuTexture, TextureId};

#[derive(Debug)]
struct FakeTexture(u64);

impl GpuTexture for FakeTexture {
    fn id(&self) -> TextureId {
        TextureId(self.0)
    }

    fn width(&self) -> u32 {
        1
    }

    fn height(&self) -> u32 {
        1
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn tex(id: u64) -> Value {
    Value::Texture(Arc::new(FakeTexture(id)))
}

#[test]
fn value_node_forwards_its_input() {
    let mut inputs = InputValues::new();
    inputs.push("value", Value::Int(5));
    assert_eq!(ValueNode.evaluate(&inputs, FrameIndex(0)), Value::Int(5));
    assert!(ValueNode.program().is_none());
}

#[test]
fn add_treats_missing_operands_as_zero() {
    let mut inputs = InputValues::new();
    inputs.push("a", Value::Float(2.5));
    inputs.push("b", Value::None);
    assert_eq!(AddNode.evaluate(&inputs, FrameIndex(0)), Value::Float(2.5));
}

#[test]
fn merge_skips_absent_layers() {
    let mut inputs = InputValues::new();
    inputs.push("base", Value::None);
    inputs.push("blend", tex(4));
    inputs.push("opacity", Value::Float(0.25));
    let layers = MergeNode.draw_inputs(&inputs).unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].id(), TextureId(4));
    assert_eq!(MergeNode.uniforms(&inputs).opacity, 0.25);

    let empty = InputValues::new();
    assert!(MergeNode.draw_inputs(&empty).is_none());
}

#[test]
fn opacity_is_clamped() {
    let mut inputs = InputValues::new();
    inputs.push("source", tex(1));
    inputs.push("opacity", Value::Float(3.0));
    assert_eq!(OpacityNode.uniforms(&inputs).opacity, 1.0);
}

#[test]
fn solid_draws_without_inputs() {
    let mut inputs = InputValues::new();
    let red = Rgba8Premul::from_straight_rgba(255, 0, 0, 255);
    inputs.push("color", Value::Color(red));
    assert_eq!(SolidNode.draw_inputs(&inputs).map(|v| v.len()), Some(0));
    assert_eq!(SolidNode.uniforms(&inputs).color, red);
    assert_eq!(SolidNode.program(), Some(ProgramKind::Fill));
}

#[test]
fn footage_and_block_need_a_source() {
    let empty = InputValues::new();
    assert!(FootageNode.draw_inputs(&empty).is_none());
    assert!(BlockNode.draw_inputs(&empty).is_none());

    let mut inputs = InputValues::new();
    inputs.push("source", tex(9));
    assert_eq!(BlockNode.draw_inputs(&inputs).map(|v| v.len()), Some(1));
}
