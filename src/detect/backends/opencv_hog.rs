#![cfg(feature = "backend-opencv")]

use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::HOGDescriptor;
use opencv::prelude::*;

use crate::detect::backend::PersonDetector;
use crate::detect::backends::hog_svm::HogScanParams;
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

/// OpenCV's `HOGDescriptor` with its built-in people detector.
///
/// Scans with `detectMultiScale` using the stride, pyramid scale, hit
/// threshold and group threshold from `HogScanParams`.
pub struct OpencvHogBackend {
    hog: Mutex<HOGDescriptor>,
    params: HogScanParams,
}

impl OpencvHogBackend {
    pub fn new(params: HogScanParams) -> Result<Self> {
        params.validate()?;
        let mut hog = HOGDescriptor::default().context("failed to create HOG descriptor")?;
        hog.set_svm_detector(&default_people_detector()?)
            .context("failed to install people detector")?;
        Ok(Self {
            hog: Mutex::new(hog),
            params,
        })
    }
}

/// Coefficients of OpenCV's default 64x128 people detector: 3780 weights
/// followed by the bias.
pub fn default_people_detector() -> Result<Vector<f32>> {
    HOGDescriptor::get_default_people_detector().context("failed to load default people detector")
}

impl PersonDetector for OpencvHogBackend {
    fn name(&self) -> &'static str {
        "opencv-hog"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.is_empty() {
            return Err(anyhow!(
                "cannot run detection on empty frame #{}",
                frame.sequence
            ));
        }
        let bgr = to_bgr(frame)?;
        let stride = self.params.win_stride as i32;
        let mut found = Vector::<Rect>::new();
        let mut weights = Vector::<f64>::new();
        {
            let hog = self
                .hog
                .lock()
                .map_err(|_| anyhow!("HOG descriptor lock poisoned"))?;
            hog.detect_multi_scale_weights(
                &bgr,
                &mut found,
                &mut weights,
                self.params.hit_threshold as f64,
                Size::new(stride, stride),
                Size::new(0, 0),
                self.params.scale as f64,
                self.params.group_threshold as f64,
                false,
            )
            .context("HOG detectMultiScale failed")?;
        }

        let (width, height) = frame.image().dimensions();
        let detections: Vec<Detection> = found
            .iter()
            .zip(weights.iter().chain(std::iter::repeat(0.0)))
            .filter_map(|(rect, weight)| {
                let bounds = BoundingBox::new(
                    rect.x.max(0) as u32,
                    rect.y.max(0) as u32,
                    rect.width.max(0) as u32,
                    rect.height.max(0) as u32,
                )
                .clamp_to(width, height)?;
                Some(Detection {
                    bounds,
                    weight: weight as f32,
                })
            })
            .collect();
        log::debug!(
            "opencv-hog: frame #{} produced {} detections",
            frame.sequence,
            detections.len()
        );
        Ok(detections)
    }
}

fn to_bgr(frame: &Frame) -> Result<Mat> {
    let image = frame.image();
    let flat = Mat::from_slice(image.as_raw()).context("failed to wrap frame pixels")?;
    let rgb = flat
        .reshape(3, image.height() as i32)
        .context("failed to shape frame as RGB")?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)
        .context("failed to convert frame to BGR")?;
    Ok(bgr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::hog::DESCRIPTOR_LEN;
    use crate::detect::LinearSvm;
    use image::{Rgb, RgbImage};

    #[test]
    fn default_people_detector_matches_descriptor_length() -> Result<()> {
        let coefficients = default_people_detector()?.to_vec();
        assert_eq!(coefficients.len(), DESCRIPTOR_LEN + 1);
        let model = LinearSvm::from_detector(&coefficients)?;
        assert_eq!(model.weights.len(), DESCRIPTOR_LEN);
        Ok(())
    }

    #[test]
    fn flat_frame_has_no_people() -> Result<()> {
        let backend = OpencvHogBackend::new(HogScanParams::default())?;
        let frame = Frame::from_image(1, RgbImage::from_pixel(160, 200, Rgb([90, 90, 90])));
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn frame_smaller_than_window_yields_nothing() -> Result<()> {
        let backend = OpencvHogBackend::new(HogScanParams::default())?;
        let frame = Frame::from_image(2, RgbImage::new(50, 100));
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }
}
