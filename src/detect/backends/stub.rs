use anyhow::Result;
use std::time::Duration;

use crate::detect::backend::PersonDetector;
use crate::detect::result::Detection;
use crate::frame::{BoundingBox, Frame};

const SATURATION_LEVEL: u8 = 240;

/// Stub backend for demos and tests.
///
/// Reports the bounding box of all near-white pixels as one "person" when at
/// least `min_pixels` of them are present. Pairs with the synthetic `stub://`
/// walker scene, whose figure is drawn in white.
pub struct StubBackend {
    min_pixels: usize,
    latency: Duration,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            min_pixels: 200,
            latency: Duration::ZERO,
        }
    }

    pub fn with_min_pixels(mut self, min_pixels: usize) -> Self {
        self.min_pixels = min_pixels;
        self
    }

    /// Sleep this long inside every `detect` call to mimic a slow model.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        let mut count = 0usize;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        for (x, y, px) in frame.image().enumerate_pixels() {
            if px.0.iter().all(|c| *c >= SATURATION_LEVEL) {
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if count == 0 || count < self.min_pixels {
            return Ok(Vec::new());
        }
        Ok(vec![Detection {
            bounds: BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
            weight: 1.0,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn stub_backend_reports_bright_blob() -> Result<()> {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([40, 40, 40]));
        for y in 10..60 {
            for x in 20..40 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let frame = Frame::from_image(1, img);
        let found = StubBackend::new().detect(&frame)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bounds, BoundingBox::new(20, 10, 20, 50));
        Ok(())
    }

    #[test]
    fn stub_backend_ignores_small_or_missing_blobs() -> Result<()> {
        let mut img = RgbImage::from_pixel(50, 50, Rgb([40, 40, 40]));
        img.put_pixel(5, 5, Rgb([255, 255, 255]));
        let frame = Frame::from_image(1, img);
        assert!(StubBackend::new().detect(&frame)?.is_empty());
        assert_eq!(StubBackend::new().with_min_pixels(1).detect(&frame)?.len(), 1);
        Ok(())
    }
}
