use anyhow::{anyhow, Result};
use image::imageops::FilterType;
use std::path::Path;

use crate::detect::backend::PersonDetector;
use crate::detect::grouping::{group_detections, DEFAULT_GROUP_EPS};
use crate::detect::hog::{HogFeatureMap, CELL_SIZE, WINDOW_HEIGHT, WINDOW_WIDTH};
use crate::detect::result::Detection;
use crate::detect::svm::LinearSvm;
use crate::frame::{BoundingBox, Frame};

/// Multi-scale scan parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct HogScanParams {
    /// Window stride in pixels. Must be a positive multiple of the cell size.
    pub win_stride: u32,
    /// Pyramid scale factor between levels (> 1).
    pub scale: f32,
    /// Maximum pyramid levels, including the full-resolution level.
    pub max_levels: usize,
    /// A window is a hit when its SVM score is strictly greater than this.
    pub hit_threshold: f32,
    /// Clusters need more than this many hits. 0 disables grouping.
    pub group_threshold: usize,
}

impl Default for HogScanParams {
    fn default() -> Self {
        Self {
            win_stride: 8,
            scale: 1.05,
            max_levels: 64,
            hit_threshold: 0.0,
            group_threshold: 2,
        }
    }
}

impl HogScanParams {
    pub fn validate(&self) -> Result<()> {
        if self.win_stride == 0 || self.win_stride % CELL_SIZE != 0 {
            return Err(anyhow!(
                "window stride must be a positive multiple of {} (got {})",
                CELL_SIZE,
                self.win_stride
            ));
        }
        if !self.scale.is_finite() || self.scale <= 1.0 {
            return Err(anyhow!("pyramid scale must be > 1.0 (got {})", self.scale));
        }
        if self.max_levels == 0 {
            return Err(anyhow!("pyramid needs at least one level"));
        }
        if !self.hit_threshold.is_finite() {
            return Err(anyhow!("hit threshold must be finite"));
        }
        Ok(())
    }
}

/// HOG features scored by a linear SVM over a sliding-window image pyramid.
pub struct HogSvmBackend {
    model: LinearSvm,
    params: HogScanParams,
}

impl HogSvmBackend {
    pub fn new(model: LinearSvm, params: HogScanParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { model, params })
    }

    pub fn from_model_file(path: &Path, params: HogScanParams) -> Result<Self> {
        Self::new(LinearSvm::load(path)?, params)
    }

    /// Ungrouped window hits over all pyramid levels, in frame coordinates.
    pub fn raw_hits(&self, frame: &Frame) -> Vec<Detection> {
        let base = frame.image();
        let (width, height) = base.dimensions();
        let stride_cells = (self.params.win_stride / CELL_SIZE) as usize;
        let mut hits = Vec::new();
        let mut scale = 1.0f32;

        for level in 0..self.params.max_levels {
            let level_w = (width as f32 / scale).round() as u32;
            let level_h = (height as f32 / scale).round() as u32;
            if level_w < WINDOW_WIDTH || level_h < WINDOW_HEIGHT {
                break;
            }
            let features = if level == 0 {
                HogFeatureMap::compute(base)
            } else {
                let resized = image::imageops::resize(base, level_w, level_h, FilterType::Triangle);
                HogFeatureMap::compute(&resized)
            };

            for (cx, cy) in features.window_positions(stride_cells) {
                let score = features.window_response(cx, cy, &self.model.weights) + self.model.bias;
                if score > self.params.hit_threshold {
                    let x = (cx as u32 * CELL_SIZE) as f32 * scale;
                    let y = (cy as u32 * CELL_SIZE) as f32 * scale;
                    let bounds = BoundingBox::new(
                        x.round() as u32,
                        y.round() as u32,
                        (WINDOW_WIDTH as f32 * scale).round() as u32,
                        (WINDOW_HEIGHT as f32 * scale).round() as u32,
                    );
                    if let Some(bounds) = bounds.clamp_to(width, height) {
                        hits.push(Detection {
                            bounds,
                            weight: score,
                        });
                    }
                }
            }
            scale *= self.params.scale;
        }
        hits
    }
}

impl PersonDetector for HogSvmBackend {
    fn name(&self) -> &'static str {
        "hog-svm"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.is_empty() {
            return Err(anyhow!(
                "cannot run detection on empty frame #{}",
                frame.sequence
            ));
        }
        let hits = self.raw_hits(frame);
        let grouped = group_detections(&hits, self.params.group_threshold, DEFAULT_GROUP_EPS);
        log::debug!(
            "hog-svm: frame #{} produced {} window hits, {} after grouping",
            frame.sequence,
            hits.len(),
            grouped.len()
        );
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::hog::DESCRIPTOR_LEN;
    use image::{Rgb, RgbImage};

    fn frame(width: u32, height: u32) -> Frame {
        Frame::from_image(1, RgbImage::from_pixel(width, height, Rgb([120, 120, 120])))
    }

    fn constant_model(bias: f32) -> LinearSvm {
        LinearSvm::new(vec![0.0; DESCRIPTOR_LEN], bias).unwrap()
    }

    #[test]
    fn rejects_misaligned_stride() {
        let params = HogScanParams {
            win_stride: 12,
            ..HogScanParams::default()
        };
        assert!(HogSvmBackend::new(constant_model(0.0), params).is_err());
    }

    #[test]
    fn negative_model_finds_nothing() -> Result<()> {
        let backend = HogSvmBackend::new(constant_model(-1.0), HogScanParams::default())?;
        assert!(backend.detect(&frame(160, 200))?.is_empty());
        Ok(())
    }

    #[test]
    fn frame_smaller_than_window_yields_nothing() -> Result<()> {
        let backend = HogSvmBackend::new(constant_model(1.0), HogScanParams::default())?;
        assert!(backend.detect(&frame(50, 100))?.is_empty());
        Ok(())
    }

    #[test]
    fn positive_model_hits_every_window_inside_frame() -> Result<()> {
        let params = HogScanParams {
            group_threshold: 0,
            max_levels: 1,
            ..HogScanParams::default()
        };
        let backend = HogSvmBackend::new(constant_model(0.5), params)?;
        let hits = backend.detect(&frame(80, 136))?;
        assert_eq!(hits.len(), 6);
        for hit in &hits {
            assert_eq!(hit.weight, 0.5);
            assert!(hit.bounds.x + hit.bounds.width <= 80);
            assert!(hit.bounds.y + hit.bounds.height <= 136);
        }
        Ok(())
    }

    #[test]
    fn grouping_merges_overlapping_hits() -> Result<()> {
        let backend = HogSvmBackend::new(constant_model(0.5), HogScanParams::default())?;
        let grouped = backend.detect(&frame(80, 136))?;
        assert_eq!(grouped.len(), 1);
        Ok(())
    }

    #[test]
    fn rejects_empty_frame() {
        let backend = HogSvmBackend::new(constant_model(0.5), HogScanParams::default()).unwrap();
        let empty = Frame::from_image(3, RgbImage::new(0, 0));
        assert!(backend.detect(&empty).is_err());
    }
}
