use std::rc::Rc;
use std::sync::Arc;

use crate::foundation::error::RenderResult;
use crate::gpu::resources::ResourceBuffer;
use crate::gpu::{GpuContext, GpuFunctions, MasterContext, OffscreenSurface};
use crate::render::params::RenderParams;

/// A worker's GPU state: its shared context, the function table once current, and the
/// per-context resource buffer.
///
/// Initialization is split in two. [`ContextHolder::create_shared`] may run on any thread;
/// [`ContextHolder::finish_init`] must run on the thread that will render.
pub struct ContextHolder {
    surface: OffscreenSurface,
    context: Option<Box<dyn GpuContext>>,
    functions: Option<Rc<dyn GpuFunctions>>,
    buffer: ResourceBuffer,
    params: RenderParams,
}

impl ContextHolder {
    pub fn new() -> Self {
        Self {
            surface: OffscreenSurface::create(),
            context: None,
            functions: None,
            buffer: ResourceBuffer::new(),
            params: RenderParams::default(),
        }
    }

    /// First phase: a context sharing resources with `master`. Failures are logged, not raised.
    pub fn create_shared(master: &dyn MasterContext) -> Option<Box<dyn GpuContext>> {
        match master.create_shared() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!(error = %e, "failed to create shared gpu context");
                None
            }
        }
    }

    /// Second phase, on the rendering thread.
    ///
    /// Replaces any previous context. Returns `false` when the worker is left unusable.
    pub fn finish_init(&mut self, mut context: Box<dyn GpuContext>) -> bool {
        self.close();

        if let Err(e) = context.make_current(&self.surface) {
            tracing::warn!(
                error = %e,
                thread = ?std::thread::current().id(),
                "failed to make gpu context current on offscreen surface"
            );
            self.context = Some(context);
            return false;
        }
        let Some(gl) = context.functions() else {
            tracing::warn!("gpu context is current but exposes no function table");
            self.context = Some(context);
            return false;
        };
        self.context = Some(context);

        gl.enable_blend();
        self.functions = Some(gl);
        self.update_viewport();

        if let Err(e) = self.create_buffer() {
            tracing::warn!(error = %e, "failed to create gpu resource buffer");
            self.close();
            return false;
        }

        tracing::debug!(thread = ?std::thread::current().id(), "gpu context ready");
        true
    }

    fn create_buffer(&mut self) -> RenderResult<()> {
        match self.functions.as_ref() {
            Some(gl) => self.buffer.create(gl.as_ref()),
            None => Ok(()),
        }
    }

    pub fn set_parameters(&mut self, params: RenderParams) {
        self.params = params;
        self.update_viewport();
    }

    /// Apply the viewport when the function table is live and the params are usable.
    pub fn update_viewport(&self) {
        if let Some(gl) = self.functions.as_ref()
            && self.params.is_valid()
        {
            gl.viewport(
                0,
                0,
                self.params.effective_width(),
                self.params.effective_height(),
            );
        }
    }

    /// Release the resource buffer, the function table and the context. Idempotent.
    pub fn close(&mut self) {
        if let Some(gl) = self.functions.take() {
            self.buffer.destroy(gl.as_ref());
        }
        self.context = None;
    }

    /// A context exists (first phase done and not closed since).
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Fully initialized: current, with function table and resources.
    pub fn is_ready(&self) -> bool {
        self.functions.is_some() && self.buffer.is_created()
    }

    pub fn functions(&self) -> Option<&Rc<dyn GpuFunctions>> {
        self.functions.as_ref()
    }

    pub fn buffer(&self) -> &ResourceBuffer {
        &self.buffer
    }

    pub fn params(&self) -> RenderParams {
        self.params
    }
}

impl Default for ContextHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ContextHolder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared master handle as stored by workers and pools.
pub type SharedMaster = Arc<dyn MasterContext>;

#[cfg(test)]
#[path = "../../tests/unit/worker/context.rs"]
mod tests;
