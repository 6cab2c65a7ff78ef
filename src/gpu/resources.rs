use std::collections::BTreeMap;

use crate::foundation::error::{RenderError, RenderResult};
use crate::gpu::{FramebufferId, GpuFunctions, ProgramId, ProgramKind};

/// Per-worker GPU objects: one framebuffer and one program per [`ProgramKind`].
///
/// Created once the worker's context is current, destroyed when the worker closes.
#[derive(Debug, Default)]
pub struct ResourceBuffer {
    framebuffer: Option<FramebufferId>,
    programs: BTreeMap<ProgramKind, ProgramId>,
}

impl ResourceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate everything up front. A partial failure releases what was already created.
    pub fn create(&mut self, gl: &dyn GpuFunctions) -> RenderResult<()> {
        if self.is_created() {
            return Ok(());
        }

        self.framebuffer = Some(gl.create_framebuffer()?);
        for kind in ProgramKind::ALL {
            match gl.create_program(kind) {
                Ok(program) => {
                    self.programs.insert(kind, program);
                }
                Err(e) => {
                    self.destroy(gl);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Release every object. Safe to call repeatedly or on a buffer that was never created.
    pub fn destroy(&mut self, gl: &dyn GpuFunctions) {
        for (_, program) in std::mem::take(&mut self.programs) {
            gl.delete_program(program);
        }
        if let Some(fb) = self.framebuffer.take() {
            gl.delete_framebuffer(fb);
        }
    }

    pub fn is_created(&self) -> bool {
        self.framebuffer.is_some()
    }

    pub fn framebuffer(&self) -> RenderResult<FramebufferId> {
        self.framebuffer
            .ok_or_else(|| RenderError::gpu("resource buffer has no framebuffer"))
    }

    pub fn program(&self, kind: ProgramKind) -> RenderResult<ProgramId> {
        self.programs
            .get(&kind)
            .copied()
            .ok_or_else(|| RenderError::gpu(format!("program {kind:?} was not created")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/resources.rs"]
mod tests;
