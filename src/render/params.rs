use crate::foundation::core::Fps;

/// Output configuration applied to a worker's viewport before rendering.
///
/// `divider` renders at a reduced resolution (2 = half size) without changing the nominal
/// `width`/`height` of the sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    pub divider: u32,
    pub fps: Fps,
}

impl Default for RenderParams {
    /// Invalid until a size is set; a worker never draws with the default.
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            divider: 1,
            fps: Fps::default(),
        }
    }
}

impl RenderParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_divider(mut self, divider: u32) -> Self {
        self.divider = divider;
        self
    }

    pub fn with_fps(mut self, fps: Fps) -> Self {
        self.fps = fps;
        self
    }

    pub fn effective_width(&self) -> u32 {
        self.width.checked_div(self.divider).unwrap_or(0)
    }

    pub fn effective_height(&self) -> u32 {
        self.height.checked_div(self.divider).unwrap_or(0)
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.divider > 0
            && self.effective_width() > 0
            && self.effective_height() > 0
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/params.rs"]
mod tests;
