//! GPU seams used by render workers.
//!
//! A [`MasterContext`] hands out contexts that share its resources (textures created in one
//! worker's context are usable from every other worker's context). A [`GpuContext`] is created on
//! any thread, then made current on exactly one worker thread, after which it exposes its
//! [`GpuFunctions`] table.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::foundation::core::{FrameRGBA, Rgba8Premul};
use crate::foundation::error::RenderResult;

pub mod resources;
pub mod software;
#[cfg(feature = "gpu")]
pub mod wgpu_backend;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u64);

/// Built-in compositing programs a node can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgramKind {
    /// Fill the target with `Uniforms::color`.
    Fill,
    /// Source-over every input in order (first input at the bottom).
    Over,
    /// Scale the first input by `Uniforms::opacity`.
    Opacity,
    /// Copy the first input, resampling to the target size.
    Blit,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 4] = [Self::Fill, Self::Over, Self::Opacity, Self::Blit];
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniforms {
    pub color: Rgba8Premul,
    pub opacity: f32,
}

impl Default for Uniforms {
    fn default() -> Self {
        Self {
            color: Rgba8Premul::transparent(),
            opacity: 1.0,
        }
    }
}

/// One draw into a freshly allocated texture of `width x height`.
pub struct DrawCall<'a> {
    pub program: ProgramId,
    pub framebuffer: FramebufferId,
    pub inputs: &'a [Texture],
    pub uniforms: Uniforms,
    pub width: u32,
    pub height: u32,
}

/// Backend texture storage.
pub trait GpuTexture: Send + Sync + fmt::Debug {
    fn id(&self) -> TextureId;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a texture living in a master context's resource space.
pub type Texture = Arc<dyn GpuTexture>;

pub(crate) fn next_texture_id() -> TextureId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    TextureId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Off-screen drawable a worker makes its context current against.
#[derive(Debug, PartialEq, Eq)]
pub struct OffscreenSurface {
    id: u64,
}

impl OffscreenSurface {
    pub fn create() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Function table of a current context. Only usable on the thread the context is current on.
pub trait GpuFunctions {
    fn enable_blend(&self);
    fn viewport(&self, x: i32, y: i32, width: u32, height: u32);
    fn create_framebuffer(&self) -> RenderResult<FramebufferId>;
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    fn create_program(&self, kind: ProgramKind) -> RenderResult<ProgramId>;
    fn delete_program(&self, program: ProgramId);
    fn upload_texture(&self, frame: &FrameRGBA) -> RenderResult<Texture>;
    fn draw(&self, call: &DrawCall<'_>) -> RenderResult<Texture>;
    fn read_pixels(&self, texture: &Texture) -> RenderResult<FrameRGBA>;
    /// Submit queued commands without waiting.
    fn flush(&self);
    /// Block until every submitted command has completed.
    fn finish(&self);
}

/// A context created against a master. Movable between threads until made current.
pub trait GpuContext: Send {
    fn make_current(&mut self, surface: &OffscreenSurface) -> RenderResult<()>;
    /// Function table, available once the context is current.
    fn functions(&self) -> Option<Rc<dyn GpuFunctions>>;
}

/// The context every worker shares resources with.
pub trait MasterContext: Send + Sync {
    fn create_shared(&self) -> RenderResult<Box<dyn GpuContext>>;
}
