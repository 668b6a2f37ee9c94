use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::RgbaImage;
use log::info;

use crate::error::{FocusError, FocusResult};

/// Exclusive handle on a capture device.
///
/// `release` must be idempotent; implementations also release on drop so an
/// aborted session cannot leak the device.
pub trait CameraHandle: Send {
    /// `Ok(None)` means the device has not produced a frame yet.
    fn capture(&mut self) -> Result<Option<RgbaImage>>;

    fn release(&mut self);
}

pub trait FrameSource: Send + Sync {
    fn name(&self) -> &str;

    fn acquire(&self) -> FocusResult<Box<dyn CameraHandle>>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays the image files of a directory, in name order, as camera frames.
pub struct ImageDirCamera {
    dir: PathBuf,
    name: String,
}

impl ImageDirCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = format!("frames:{}", dir.display());
        Self { dir, name }
    }
}

impl FrameSource for ImageDirCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(&self) -> FocusResult<Box<dyn CameraHandle>> {
        let frames = list_frames(&self.dir)
            .map_err(|err| FocusError::DeviceUnavailable(format!("{err:#}")))?;
        if frames.is_empty() {
            return Err(FocusError::DeviceUnavailable(format!(
                "no image frames in {}",
                self.dir.display()
            )));
        }
        info!("Acquired {} ({} frames)", self.name, frames.len());
        Ok(Box::new(ImageDirHandle {
            name: self.name.clone(),
            frames,
            next: 0,
            released: false,
        }))
    }
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("cannot open {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

struct ImageDirHandle {
    name: String,
    frames: Vec<PathBuf>,
    next: usize,
    released: bool,
}

impl CameraHandle for ImageDirHandle {
    fn capture(&mut self) -> Result<Option<RgbaImage>> {
        if self.released || self.frames.is_empty() {
            return Ok(None);
        }
        let path = &self.frames[self.next % self.frames.len()];
        self.next = self.next.wrapping_add(1);
        let frame = image::open(path)
            .with_context(|| format!("failed to decode frame {}", path.display()))?;
        Ok(Some(frame.to_rgba8()))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!("Released {}", self.name);
        }
    }
}

impl Drop for ImageDirHandle {
    fn drop(&mut self) {
        self.release();
    }
}
