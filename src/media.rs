//! Footage decoding.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use crate::foundation::core::{FrameIndex, FrameRGBA};
use crate::foundation::error::RenderResult;
use crate::graph::value::FootageRef;

/// Provides decoded frames for footage inputs.
///
/// `None` means the footage has nothing to show at `time` (missing file, undecodable data, stream
/// out of range); the node then contributes nothing.
pub trait FootageSource: Send + Sync {
    fn frame(&self, footage: &FootageRef, time: FrameIndex) -> Option<Arc<FrameRGBA>>;
}

/// No footage at all.
#[derive(Debug, Default)]
pub struct NoFootage;

impl FootageSource for NoFootage {
    fn frame(&self, _footage: &FootageRef, _time: FrameIndex) -> Option<Arc<FrameRGBA>> {
        None
    }
}

/// Still images read from disk, decoded once and cached by path.
///
/// Every time samples the same frame. Relative paths resolve against `root`.
#[derive(Debug, Default)]
pub struct StillImageSource {
    root: PathBuf,
    cache: Mutex<HashMap<PathBuf, Arc<FrameRGBA>>>,
}

impl StillImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the cache with an already-decoded frame for `path`.
    pub fn insert(&self, path: impl Into<PathBuf>, frame: FrameRGBA) {
        let path = self.resolve(&path.into());
        self.cache.lock().insert(path, Arc::new(frame));
    }

    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn load(&self, path: &Path) -> RenderResult<FrameRGBA> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read footage '{}'", path.display()))?;
        decode_image(&bytes)
    }
}

impl FootageSource for StillImageSource {
    fn frame(&self, footage: &FootageRef, _time: FrameIndex) -> Option<Arc<FrameRGBA>> {
        if footage.stream != 0 {
            return None;
        }
        let path = self.resolve(&footage.path);
        if let Some(frame) = self.cache.lock().get(&path) {
            return Some(Arc::clone(frame));
        }

        match self.load(&path) {
            Ok(frame) => {
                let frame = Arc::new(frame);
                self.cache.lock().insert(path, Arc::clone(&frame));
                Some(frame)
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "footage unavailable");
                None
            }
        }
    }
}

/// Decode an encoded image into premultiplied RGBA8.
pub fn decode_image(bytes: &[u8]) -> RenderResult<FrameRGBA> {
    let img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut data = rgba.into_raw();
    premultiply_rgba8_in_place(&mut data);
    Ok(FrameRGBA {
        width,
        height,
        data,
    })
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[..3].fill(0);
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/media.rs"]
mod tests;
