//! Motion gate: cheap per-frame "is anything moving" signal.
//!
//! Pipeline per frame:
//! 1. Gaussian-mixture background subtraction (`background`)
//! 2. Morphological opening to drop isolated noise pixels (`morphology`)
//! 3. External contour tracing and area filtering (`contours`)
//!
//! Only the boolean result drives detection. Regions and the mask are handed
//! back for preview and are not retained across frames.

mod background;
mod contours;
mod morphology;

pub use background::{BackgroundModel, BackgroundParams};
pub use contours::{
    exceeds_noise_floor, external_regions, polygon_area, qualifying_regions, MotionRegion,
};
pub use morphology::open;

use anyhow::{anyhow, Result};
use image::GrayImage;

use crate::frame::{BoundingBox, Frame};

pub const DEFAULT_AREA_THRESHOLD: f64 = 500.0;
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

/// When the background model learns from a frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LearningPolicy {
    /// Learn from every frame, including frames with motion.
    #[default]
    Always,
    /// Learn only from frames without qualifying motion, so slow movers are
    /// not absorbed into the background.
    SkipMotionFrames,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionConfig {
    /// Contour area (pixel units squared) that must be exceeded to count as motion.
    pub area_threshold: f64,
    /// Odd opening kernel size; 1 disables the opening.
    pub kernel_size: u32,
    pub learning: LearningPolicy,
    pub background: BackgroundParams,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            area_threshold: DEFAULT_AREA_THRESHOLD,
            kernel_size: DEFAULT_KERNEL_SIZE,
            learning: LearningPolicy::Always,
            background: BackgroundParams::default(),
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.area_threshold.is_finite() || self.area_threshold < 0.0 {
            return Err(anyhow!("motion area threshold must be a finite value >= 0"));
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(anyhow!(
                "morphology kernel size must be odd and >= 1 (got {})",
                self.kernel_size
            ));
        }
        let bg = &self.background;
        if bg.history == 0 {
            return Err(anyhow!("background history must be > 0"));
        }
        if bg.max_modes == 0 || bg.max_modes > u8::MAX as usize {
            return Err(anyhow!("background modes must be within 1..=255"));
        }
        if !(0.0..=1.0).contains(&bg.background_ratio) {
            return Err(anyhow!("background ratio must be within 0..=1"));
        }
        if bg.var_min <= 0.0 || bg.var_min > bg.var_max {
            return Err(anyhow!("background variance bounds are invalid"));
        }
        Ok(())
    }
}

/// Result of gating one frame.
#[derive(Debug)]
pub struct MotionOutcome {
    pub motion_detected: bool,
    /// Bounding boxes of qualifying contours. Display only.
    pub regions: Vec<BoundingBox>,
    /// Opened foreground mask. Display only.
    pub mask: GrayImage,
}

pub struct MotionGate {
    config: MotionConfig,
    model: BackgroundModel,
}

impl MotionGate {
    pub fn new(config: MotionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model: BackgroundModel::new(config.background.clone()),
            config,
        })
    }

    /// Gate one frame. Frames must be evaluated in capture order.
    pub fn evaluate(&mut self, frame: &Frame) -> MotionOutcome {
        let image = frame.image();
        let deferred = self.config.learning == LearningPolicy::SkipMotionFrames
            && self.model.is_ready_for(image.width(), image.height());
        let raw = if deferred {
            self.model.classify(image)
        } else {
            self.model.apply(image)
        };

        let mask = open(&raw, self.config.kernel_size);
        let regions = qualifying_regions(&external_regions(&mask), self.config.area_threshold);
        let motion_detected = !regions.is_empty();

        if deferred && !motion_detected {
            self.model.apply(image);
        }

        MotionOutcome {
            motion_detected,
            regions,
            mask,
        }
    }
}
