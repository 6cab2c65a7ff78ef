use crate::{
    foundation::core::FrameIndex,
    foundation::error::{RenderError, RenderResult},
    graph::value::Value,
};

/// Interpolation strategy between adjacent keyframes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Interp {
    /// Hold the previous key until the next one.
    #[default]
    Hold,
    /// Straight-line interpolation.
    Linear,
    /// Cubic ease-in/out.
    Smooth,
}

impl Interp {
    fn shape(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Hold => 0.0,
            Self::Linear => t,
            Self::Smooth => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - ((-2.0 * t + 2.0).powi(3) / 2.0)
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
    pub frame: FrameIndex,
    pub value: Value,
    /// Interpolation applied toward the next key.
    pub interp: Interp,
}

/// Stored value of an unconnected input: one key for a constant, several for an animation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Keyframes {
    keys: Vec<Keyframe>,
}

impl Keyframes {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self {
            keys: vec![Keyframe {
                frame: FrameIndex(0),
                value: value.into(),
                interp: Interp::Hold,
            }],
        }
    }

    /// Build an animated track; keys must be sorted by frame.
    pub fn from_keys(keys: Vec<Keyframe>) -> RenderResult<Self> {
        if !keys.windows(2).all(|w| w[0].frame <= w[1].frame) {
            return Err(RenderError::validation(
                "keyframes must be sorted by frame",
            ));
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    pub fn is_animated(&self) -> bool {
        self.keys.len() > 1
    }

    /// Value at `frame`. An empty track yields `Value::None`.
    pub fn sample(&self, frame: FrameIndex) -> Value {
        let Some(first) = self.keys.first() else {
            return Value::None;
        };

        let idx = self.keys.partition_point(|k| k.frame <= frame);
        if idx == 0 {
            return first.value.clone();
        }
        if idx >= self.keys.len() {
            return self.keys[self.keys.len() - 1].value.clone();
        }

        let a = &self.keys[idx - 1];
        let b = &self.keys[idx];
        let denom = b.frame.0.saturating_sub(a.frame.0);
        if denom == 0 || a.interp == Interp::Hold {
            return a.value.clone();
        }

        let t = ((frame.0 - a.frame.0) as f64) / (denom as f64);
        Value::lerp(&a.value, &b.value, a.interp.shape(t))
    }
}

impl From<Value> for Keyframes {
    fn from(value: Value) -> Self {
        Self::constant(value)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/keyframe.rs"]
mod tests;
