//! Headless GPU backend that executes programs on the CPU.
//!
//! Every context created from one [`SoftwareMaster`] shares its texture space, mirroring how
//! shared GL contexts exchange textures. All calls are recorded per context so callers can
//! inspect what a worker actually issued.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::foundation::core::FrameRGBA;
use crate::foundation::error::{RenderError, RenderResult};
use crate::foundation::math::{fade, over};
use crate::gpu::{
    DrawCall, FramebufferId, GpuContext, GpuFunctions, GpuTexture, MasterContext,
    OffscreenSurface, ProgramId, ProgramKind, Texture, TextureId, next_texture_id,
};

/// A GPU call as observed by the software backend.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCall {
    EnableBlend,
    Viewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    CreateFramebuffer,
    DeleteFramebuffer,
    CreateProgram(ProgramKind),
    DeleteProgram,
    Upload {
        width: u32,
        height: u32,
    },
    Draw {
        program: ProgramKind,
        inputs: usize,
        width: u32,
        height: u32,
    },
    ReadPixels,
    Flush,
    Finish,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub context: u64,
    pub call: GpuCall,
}

#[derive(Default)]
struct Shared {
    next_context: AtomicU64,
    fail_create: AtomicBool,
    fail_make_current: AtomicBool,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Shared {
    fn record(&self, context: u64, call: GpuCall) {
        self.calls.lock().push(RecordedCall { context, call });
    }
}

/// Master context of the software backend.
#[derive(Clone, Default)]
pub struct SoftwareMaster {
    shared: Arc<Shared>,
}

impl SoftwareMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_shared` calls fail.
    pub fn fail_context_creation(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `make_current` calls fail.
    pub fn fail_make_current(&self, fail: bool) {
        self.shared.fail_make_current.store(fail, Ordering::SeqCst);
    }

    /// Every call recorded so far, across all contexts, in issue order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.shared.calls.lock().clone()
    }

    pub fn calls_for(&self, context: u64) -> Vec<GpuCall> {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|c| c.context == context)
            .map(|c| c.call.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().clear();
    }
}

impl MasterContext for SoftwareMaster {
    fn create_shared(&self) -> RenderResult<Box<dyn GpuContext>> {
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(RenderError::context("software context creation refused"));
        }
        let id = self.shared.next_context.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Box::new(SoftwareContext {
            id,
            shared: Arc::clone(&self.shared),
            current: None,
            objects: None,
        }))
    }
}

pub struct SoftwareContext {
    id: u64,
    shared: Arc<Shared>,
    current: Option<(u64, ThreadId)>,
    objects: Option<Arc<Mutex<ObjectTable>>>,
}

impl SoftwareContext {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl GpuContext for SoftwareContext {
    fn make_current(&mut self, surface: &OffscreenSurface) -> RenderResult<()> {
        if self.shared.fail_make_current.load(Ordering::SeqCst) {
            return Err(RenderError::context("software make_current refused"));
        }
        let thread = std::thread::current().id();
        if let Some((_, owner)) = self.current
            && owner != thread
        {
            return Err(RenderError::context(
                "context is already current on another thread",
            ));
        }
        self.current = Some((surface.id(), thread));
        if self.objects.is_none() {
            self.objects = Some(Arc::new(Mutex::new(ObjectTable::default())));
        }
        Ok(())
    }

    fn functions(&self) -> Option<Rc<dyn GpuFunctions>> {
        let objects = self.objects.as_ref()?;
        Some(Rc::new(SoftwareFunctions {
            context: self.id,
            shared: Arc::clone(&self.shared),
            objects: Arc::clone(objects),
        }))
    }
}

#[derive(Debug)]
pub struct SoftwareTexture {
    id: TextureId,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SoftwareTexture {
    fn sample(&self, x: u32, y: u32, target_w: u32, target_h: u32) -> [u8; 4] {
        if self.width == 0 || self.height == 0 {
            return [0; 4];
        }
        let sx = (u64::from(x) * u64::from(self.width) / u64::from(target_w)) as usize;
        let sy = (u64::from(y) * u64::from(self.height) / u64::from(target_h)) as usize;
        let i = (sy * self.width as usize + sx) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }
}

impl GpuTexture for SoftwareTexture {
    fn id(&self) -> TextureId {
        self.id
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Framebuffers and programs are per context; only textures are shared.
#[derive(Default)]
struct ObjectTable {
    next_object: u64,
    framebuffers: HashSet<FramebufferId>,
    programs: HashMap<ProgramId, ProgramKind>,
}

impl ObjectTable {
    fn next_object(&mut self) -> u64 {
        self.next_object += 1;
        self.next_object
    }
}

struct SoftwareFunctions {
    context: u64,
    shared: Arc<Shared>,
    objects: Arc<Mutex<ObjectTable>>,
}

impl SoftwareFunctions {
    fn record(&self, call: GpuCall) {
        self.shared.record(self.context, call);
    }
}

fn downcast(texture: &Texture) -> RenderResult<&SoftwareTexture> {
    texture
        .as_any()
        .downcast_ref::<SoftwareTexture>()
        .ok_or_else(|| RenderError::gpu("texture does not belong to the software backend"))
}

impl GpuFunctions for SoftwareFunctions {
    fn enable_blend(&self) {
        self.record(GpuCall::EnableBlend);
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.record(GpuCall::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn create_framebuffer(&self) -> RenderResult<FramebufferId> {
        let mut objects = self.objects.lock();
        let fb = FramebufferId(objects.next_object());
        objects.framebuffers.insert(fb);
        drop(objects);
        self.record(GpuCall::CreateFramebuffer);
        Ok(fb)
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        if self.objects.lock().framebuffers.remove(&framebuffer) {
            self.record(GpuCall::DeleteFramebuffer);
        }
    }

    fn create_program(&self, kind: ProgramKind) -> RenderResult<ProgramId> {
        let mut objects = self.objects.lock();
        let program = ProgramId(objects.next_object());
        objects.programs.insert(program, kind);
        drop(objects);
        self.record(GpuCall::CreateProgram(kind));
        Ok(program)
    }

    fn delete_program(&self, program: ProgramId) {
        if self.objects.lock().programs.remove(&program).is_some() {
            self.record(GpuCall::DeleteProgram);
        }
    }

    fn upload_texture(&self, frame: &FrameRGBA) -> RenderResult<Texture> {
        let expected = (frame.width as usize) * (frame.height as usize) * 4;
        if frame.data.len() != expected {
            return Err(RenderError::gpu(
                "upload expects width*height*4 rgba8 bytes",
            ));
        }
        self.record(GpuCall::Upload {
            width: frame.width,
            height: frame.height,
        });
        Ok(Arc::new(SoftwareTexture {
            id: next_texture_id(),
            width: frame.width,
            height: frame.height,
            pixels: frame.data.clone(),
        }))
    }

    fn draw(&self, call: &DrawCall<'_>) -> RenderResult<Texture> {
        let kind = {
            let objects = self.objects.lock();
            if !objects.framebuffers.contains(&call.framebuffer) {
                return Err(RenderError::gpu(
                    "draw with a framebuffer from another context",
                ));
            }
            objects
                .programs
                .get(&call.program)
                .copied()
                .ok_or_else(|| RenderError::gpu("draw with a program from another context"))?
        };
        if call.width == 0 || call.height == 0 {
            return Err(RenderError::gpu("draw with an empty viewport"));
        }
        let inputs = call
            .inputs
            .iter()
            .map(downcast)
            .collect::<RenderResult<Vec<_>>>()?;

        self.record(GpuCall::Draw {
            program: kind,
            inputs: inputs.len(),
            width: call.width,
            height: call.height,
        });

        let (w, h) = (call.width, call.height);
        let mut target = FrameRGBA::transparent(w, h)?;
        let uniforms = call.uniforms;
        target
            .data
            .par_chunks_mut(w as usize * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let x = x as u32;
                    let out = match kind {
                        ProgramKind::Fill => fade(uniforms.color.to_array(), uniforms.opacity),
                        ProgramKind::Over => {
                            let mut acc = [0u8; 4];
                            for input in &inputs {
                                acc = over(acc, input.sample(x, y, w, h), 1.0);
                            }
                            fade(acc, uniforms.opacity)
                        }
                        ProgramKind::Opacity => inputs
                            .first()
                            .map(|t| fade(t.sample(x, y, w, h), uniforms.opacity))
                            .unwrap_or([0; 4]),
                        ProgramKind::Blit => inputs
                            .first()
                            .map(|t| t.sample(x, y, w, h))
                            .unwrap_or([0; 4]),
                    };
                    px.copy_from_slice(&out);
                }
            });

        Ok(Arc::new(SoftwareTexture {
            id: next_texture_id(),
            width: w,
            height: h,
            pixels: target.data,
        }))
    }

    fn read_pixels(&self, texture: &Texture) -> RenderResult<FrameRGBA> {
        let tex = downcast(texture)?;
        self.record(GpuCall::ReadPixels);
        Ok(FrameRGBA {
            width: tex.width,
            height: tex.height,
            data: tex.pixels.clone(),
        })
    }

    fn flush(&self) {
        self.record(GpuCall::Flush);
    }

    fn finish(&self) {
        self.record(GpuCall::Finish);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/software.rs"]
mod tests;
