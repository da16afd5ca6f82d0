//! Captured frames.
//!
//! - `Frame`: owned RGB8 pixel grid for one capture instant. Not `Clone`.
//! - `BoundingBox`: axis-aligned box in pixel units, shared by motion regions
//!   and person detections.
//!
//! The capture buffer belongs to the loop iteration that produced it. The only
//! way to duplicate pixels is `Frame::snapshot()`, which the dispatcher calls
//! before handing a frame to a detection job.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Instant;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured frame.
///
/// Explicitly NOT implementing `Clone`: copies must go through `snapshot()` so
/// every hand-off to asynchronous work is visible at the call site.
pub struct Frame {
    pixels: RgbImage,
    /// Capture sequence number assigned by the source (1-based).
    pub sequence: u64,
    /// Monotonic capture instant.
    captured_at: Instant,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. The length must be `width * height * 3`.
    pub fn from_rgb(sequence: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("invalid {}x{} RGB buffer", width, height))?;
        Ok(Self::from_image(sequence, pixels))
    }

    pub fn from_image(sequence: u64, pixels: RgbImage) -> Self {
        Self {
            pixels,
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.width() == 0 || self.pixels.height() == 0
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Borrow the pixel grid.
    pub fn image(&self) -> &RgbImage {
        &self.pixels
    }

    /// Fully owned deep copy for hand-off to another thread.
    ///
    /// Keeps the sequence number and capture instant of the source frame.
    pub fn snapshot(&self) -> Frame {
        Frame {
            pixels: self.pixels.clone(),
            sequence: self.sequence,
            captured_at: self.captured_at,
        }
    }

    pub fn into_image(self) -> RgbImage {
        self.pixels
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Clip the box to a `width x height` image. Returns `None` when nothing
    /// of the box remains inside.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BoundingBox> {
        if self.x >= width || self.y >= height || self.width == 0 || self.height == 0 {
            return None;
        }
        let right = self.x.saturating_add(self.width).min(width);
        let bottom = self.y.saturating_add(self.height).min(height);
        Some(BoundingBox {
            x: self.x,
            y: self.y,
            width: right - self.x,
            height: bottom - self.y,
        })
    }

    pub(crate) fn to_rect(self) -> imageproc::rect::Rect {
        imageproc::rect::Rect::at(self.x as i32, self.y as i32).of_size(self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
