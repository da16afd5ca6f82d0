//! Live preview of the gate.
//!
//! The preview shows the frame with motion regions boxed, next to the
//! foreground mask. It is best effort: the capture loop logs preview errors
//! and keeps going.

use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};

use crate::frame::{BoundingBox, Frame};
use crate::sink::{draw_boxes, write_png_atomic, BOX_COLOR, BOX_THICKNESS};

pub const FRAME_FILE: &str = "frame.png";
pub const MASK_FILE: &str = "mask.png";

/// What the loop shows for one frame.
pub struct PreviewFrame<'a> {
    pub frame: &'a Frame,
    pub regions: &'a [BoundingBox],
    pub mask: &'a GrayImage,
}

pub trait Preview {
    fn present(&mut self, view: &PreviewFrame<'_>) -> Result<()>;

    fn close(&mut self) {}
}

/// Shows nothing.
#[derive(Debug, Default)]
pub struct HeadlessPreview;

impl Preview for HeadlessPreview {
    fn present(&mut self, _view: &PreviewFrame<'_>) -> Result<()> {
        Ok(())
    }
}

/// Overwrites `frame.png` and `mask.png` in a directory every N frames.
pub struct SnapshotPreview {
    dir: PathBuf,
    every_n_frames: u64,
    presented: u64,
    written: u64,
}

impl SnapshotPreview {
    pub fn new(dir: impl Into<PathBuf>, every_n_frames: u64) -> Result<Self> {
        if every_n_frames == 0 {
            return Err(anyhow!("preview interval must be at least one frame"));
        }
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create preview dir {}", dir.display()))?;
        Ok(Self {
            dir,
            every_n_frames,
            presented: 0,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of snapshot pairs written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl Preview for SnapshotPreview {
    fn present(&mut self, view: &PreviewFrame<'_>) -> Result<()> {
        self.presented += 1;
        if (self.presented - 1) % self.every_n_frames != 0 {
            return Ok(());
        }

        let mut annotated = view.frame.image().clone();
        draw_boxes(&mut annotated, view.regions, BOX_COLOR, BOX_THICKNESS);
        write_png_atomic(&self.dir.join(FRAME_FILE), &annotated)?;
        write_png_atomic(&self.dir.join(MASK_FILE), view.mask)?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) {
        log::debug!(
            "preview: {} snapshots written to {}",
            self.written,
            self.dir.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn snapshot_preview_writes_every_nth_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut preview = SnapshotPreview::new(dir.path().join("live"), 3)?;
        let mask = GrayImage::from_pixel(32, 24, Luma([255]));
        let regions = [BoundingBox::new(4, 4, 10, 10)];

        for seq in 1..=4 {
            let frame = Frame::from_image(seq, RgbImage::from_pixel(32, 24, Rgb([9, 9, 9])));
            preview.present(&PreviewFrame {
                frame: &frame,
                regions: &regions,
                mask: &mask,
            })?;
        }
        assert_eq!(preview.written(), 2);

        let frame = image::open(preview.dir().join(FRAME_FILE))?.to_rgb8();
        assert_eq!(*frame.get_pixel(4, 4), BOX_COLOR);
        assert_eq!(*frame.get_pixel(0, 0), Rgb([9, 9, 9]));
        let mask = image::open(preview.dir().join(MASK_FILE))?.to_luma8();
        assert_eq!(mask.get_pixel(0, 0).0, [255]);
        preview.close();
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(SnapshotPreview::new(dir.path(), 0).is_err());
        Ok(())
    }
}
