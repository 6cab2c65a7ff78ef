use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::core::{FrameRGBA, Rgba8Premul};
use crate::gpu::Texture;

/// Reference to externally-sourced media (a still image or a stream within a file).
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FootageRef {
    pub path: PathBuf,
    #[serde(default)]
    pub stream: u32,
}

impl FootageRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            stream: 0,
        }
    }
}

/// A value flowing along graph edges.
///
/// `None` is the "no contribution" value produced for missing data; consumers treat it as
/// transparent / zero rather than failing.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Color(Rgba8Premul),
    Text(String),
    Footage(FootageRef),
    /// GPU-resident texture, shared between all contexts of one master.
    Texture(Texture),
    /// Texture contents read back to the CPU.
    Frame(Arc<FrameRGBA>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Rgba8Premul> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&Texture> {
        match self {
            Self::Texture(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&FrameRGBA> {
        match self {
            Self::Frame(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_footage(&self) -> Option<&FootageRef> {
        match self {
            Self::Footage(f) => Some(f),
            _ => None,
        }
    }

    /// Interpolate between two keyed values.
    ///
    /// Numbers and colors interpolate; every other kind (and mismatched kinds) holds `a`.
    pub fn lerp(a: &Self, b: &Self, t: f64) -> Self {
        fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
            let a = f64::from(a);
            let b = f64::from(b);
            (a + (b - a) * t).round().clamp(0.0, 255.0) as u8
        }

        match (a, b) {
            (Self::Float(x), Self::Float(y)) => Self::Float(x + (y - x) * t),
            (Self::Int(x), Self::Int(y)) => {
                // Keys may span the whole i64 range; interpolate in f64 and saturate back.
                let (x, y) = (*x as f64, *y as f64);
                let v = (x + (y - x) * t).round();
                Self::Int(v.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
            }
            (Self::Color(x), Self::Color(y)) => Self::Color(Rgba8Premul {
                r: lerp_u8(x.r, y.r, t),
                g: lerp_u8(x.g, y.g, t),
                b: lerp_u8(x.b, y.b, t),
                a: lerp_u8(x.a, y.a, t),
            }),
            _ => a.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Color(a), Self::Color(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Footage(a), Self::Footage(b)) => a == b,
            (Self::Texture(a), Self::Texture(b)) => a.id() == b.id(),
            (Self::Frame(a), Self::Frame(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Rgba8Premul> for Value {
    fn from(v: Rgba8Premul) -> Self {
        Self::Color(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<FootageRef> for Value {
    fn from(v: FootageRef) -> Self {
        Self::Footage(v)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graph/value.rs"]
mod tests;
