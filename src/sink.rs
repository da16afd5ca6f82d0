//! Result persistence.
//!
//! A detection job hands its `DetectionResult` to a `ResultSink` before the
//! job state returns to idle. `FileSink` keeps a single slot on disk: each
//! positive result overwrites the previous image.

use anyhow::{anyhow, Context, Result};
use image::{EncodableLayout, ImageBuffer, ImageFormat, Pixel, PixelWithColorType, Rgb, RgbImage};
use std::path::{Path, PathBuf};

use crate::detect::{Detection, DetectionResult};
use crate::frame::BoundingBox;

pub const DEFAULT_OUTPUT_PATH: &str = "output.png";
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkOutcome {
    /// Annotated image written to this path.
    Persisted(PathBuf),
    /// Nothing to persist (no person found).
    Skipped,
}

pub trait ResultSink: Send + Sync {
    fn publish(&self, result: DetectionResult) -> Result<SinkOutcome>;
}

/// Writes the annotated snapshot as PNG to one fixed path.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(anyhow!("output path must not be empty"));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileSink {
    fn publish(&self, result: DetectionResult) -> Result<SinkOutcome> {
        if !result.person_found() {
            log::debug!(
                "frame #{}: no person found, nothing persisted",
                result.frame.sequence
            );
            return Ok(SinkOutcome::Skipped);
        }

        let sequence = result.frame.sequence;
        let mut image = result.frame.into_image();
        draw_detections(&mut image, &result.detections);
        write_png_atomic(&self.path, &image)?;
        log::info!(
            "frame #{}: {} person(s) detected, wrote {}",
            sequence,
            result.detections.len(),
            self.path.display()
        );
        Ok(SinkOutcome::Persisted(self.path.clone()))
    }
}

/// Draw each detection as a hollow rectangle.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bounds).collect();
    draw_boxes(image, &boxes, BOX_COLOR, BOX_THICKNESS);
}

/// Draw hollow rectangles `thickness` pixels wide, growing inwards.
pub fn draw_boxes(image: &mut RgbImage, boxes: &[BoundingBox], color: Rgb<u8>, thickness: u32) {
    let (width, height) = image.dimensions();
    for bbox in boxes {
        let Some(clipped) = bbox.clamp_to(width, height) else {
            continue;
        };
        for inset in 0..thickness {
            if clipped.width <= 2 * inset || clipped.height <= 2 * inset {
                break;
            }
            let ring = BoundingBox::new(
                clipped.x + inset,
                clipped.y + inset,
                clipped.width - 2 * inset,
                clipped.height - 2 * inset,
            );
            imageproc::drawing::draw_hollow_rect_mut(image, ring.to_rect(), color);
        }
    }
}

/// Encode to a sibling temp file, then rename over `path`.
pub(crate) fn write_png_atomic<P>(path: &Path, image: &ImageBuffer<P, Vec<P::Subpixel>>) -> Result<()>
where
    P: Pixel + PixelWithColorType,
    [P::Subpixel]: EncodableLayout,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    image
        .save_with_format(&tmp, ImageFormat::Png)
        .with_context(|| format!("failed to encode {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn result_with(detections: Vec<Detection>) -> DetectionResult {
        let frame = Frame::from_image(4, RgbImage::from_pixel(60, 40, Rgb([10, 10, 10])));
        DetectionResult::new(frame, detections)
    }

    #[test]
    fn skips_when_nobody_found() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.png");
        let sink = FileSink::new(&path)?;
        assert_eq!(sink.publish(result_with(vec![]))?, SinkOutcome::Skipped);
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn writes_annotated_png_and_overwrites() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("out.png");
        let sink = FileSink::new(&path)?;
        let det = Detection {
            bounds: BoundingBox::new(10, 5, 20, 30),
            weight: 1.0,
        };

        assert_eq!(
            sink.publish(result_with(vec![det]))?,
            SinkOutcome::Persisted(path.clone())
        );
        let written = image::open(&path)?.to_rgb8();
        assert_eq!(written.dimensions(), (60, 40));
        assert_eq!(*written.get_pixel(10, 5), BOX_COLOR);
        assert_eq!(*written.get_pixel(11, 6), BOX_COLOR);
        assert_eq!(*written.get_pixel(15, 15), Rgb([10, 10, 10]));

        let moved = Detection {
            bounds: BoundingBox::new(40, 2, 10, 10),
            weight: 1.0,
        };
        sink.publish(result_with(vec![moved]))?;
        let written = image::open(&path)?.to_rgb8();
        assert_eq!(*written.get_pixel(10, 5), Rgb([10, 10, 10]));
        assert_eq!(*written.get_pixel(40, 2), BOX_COLOR);
        assert_eq!(std::fs::read_dir(path.parent().unwrap())?.count(), 1);
        Ok(())
    }

    #[test]
    fn draw_boxes_clips_to_image() {
        let mut image = RgbImage::new(20, 20);
        draw_boxes(
            &mut image,
            &[BoundingBox::new(15, 15, 30, 30), BoundingBox::new(50, 50, 3, 3)],
            BOX_COLOR,
            1,
        );
        assert_eq!(*image.get_pixel(15, 15), BOX_COLOR);
        assert_eq!(*image.get_pixel(19, 19), BOX_COLOR);
        assert_eq!(*image.get_pixel(17, 17), Rgb([0, 0, 0]));
    }

    #[test]
    fn rejects_empty_path() {
        assert!(FileSink::new("").is_err());
    }
}
