//! Adaptive Gaussian-mixture background model.
//!
//! Every pixel keeps up to `max_modes` Gaussian components (weight, RGB mean,
//! isotropic variance) sorted by weight. A pixel is background when it falls
//! within `var_threshold` variances of one of the heaviest components whose
//! cumulative weight stays under `background_ratio`.

use image::{GrayImage, Luma, RgbImage};

pub const FOREGROUND: u8 = 255;

/// Tunables of the mixture model.
#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundParams {
    /// Frames after which the learning rate stops decreasing.
    pub history: u32,
    /// Maximum Gaussian components per pixel.
    pub max_modes: usize,
    /// Squared-distance threshold (in variances) for the background decision.
    pub var_threshold: f32,
    /// Squared-distance threshold (in variances) for matching an existing component.
    pub var_threshold_gen: f32,
    /// Cumulative weight of the components treated as background.
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Weight decay pushing unused components out of the mixture.
    pub complexity_reduction: f32,
}

impl Default for BackgroundParams {
    fn default() -> Self {
        Self {
            history: 500,
            max_modes: 5,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
        }
    }
}

/// Per-pixel mixture state. Owned by the capture thread; never shared.
pub struct BackgroundModel {
    params: BackgroundParams,
    width: u32,
    height: u32,
    frames_seen: u64,
    modes_used: Vec<u8>,
    weights: Vec<f32>,
    means: Vec<[f32; 3]>,
    variances: Vec<f32>,
}

impl BackgroundModel {
    pub fn new(params: BackgroundParams) -> Self {
        Self {
            params,
            width: 0,
            height: 0,
            frames_seen: 0,
            modes_used: Vec::new(),
            weights: Vec::new(),
            means: Vec::new(),
            variances: Vec::new(),
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// True once a frame of these dimensions has initialised the model.
    pub fn is_ready_for(&self, width: u32, height: u32) -> bool {
        self.frames_seen > 0 && self.width == width && self.height == height
    }

    /// Classify `image` against the model and learn from it.
    ///
    /// The first frame (or the first frame after a dimension change) seeds
    /// every pixel with a single component and returns an empty mask.
    pub fn apply(&mut self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        if !self.is_ready_for(width, height) {
            self.bootstrap(image);
            return GrayImage::new(width, height);
        }

        self.frames_seen += 1;
        let alpha = self.learning_rate();
        let mut mask = GrayImage::new(width, height);
        for (idx, (x, y, px)) in image.enumerate_pixels().enumerate() {
            let sample = [px[0] as f32, px[1] as f32, px[2] as f32];
            if self.update_pixel(idx, sample, alpha) {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        mask
    }

    /// Classify `image` without touching the model.
    ///
    /// Returns an empty mask when the model has not seen a frame of these
    /// dimensions yet.
    pub fn classify(&self, image: &RgbImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let mut mask = GrayImage::new(width, height);
        if !self.is_ready_for(width, height) {
            return mask;
        }
        for (idx, (x, y, px)) in image.enumerate_pixels().enumerate() {
            let sample = [px[0] as f32, px[1] as f32, px[2] as f32];
            if !self.is_background(idx, sample) {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        mask
    }

    fn learning_rate(&self) -> f32 {
        let span = (2 * self.frames_seen).min(self.params.history.max(1) as u64);
        1.0 / span as f32
    }

    fn bootstrap(&mut self, image: &RgbImage) {
        let (width, height) = image.dimensions();
        let pixels = width as usize * height as usize;
        let k = self.params.max_modes.max(1);
        self.width = width;
        self.height = height;
        self.frames_seen = 1;
        self.modes_used = vec![1; pixels];
        self.weights = vec![0.0; pixels * k];
        self.means = vec![[0.0; 3]; pixels * k];
        self.variances = vec![self.params.var_init; pixels * k];
        for (idx, px) in image.pixels().enumerate() {
            let base = idx * k;
            self.weights[base] = 1.0;
            self.means[base] = [px[0] as f32, px[1] as f32, px[2] as f32];
        }
        log::debug!("background model initialised at {}x{}", width, height);
    }

    fn is_background(&self, idx: usize, sample: [f32; 3]) -> bool {
        let k = self.params.max_modes.max(1);
        let base = idx * k;
        let used = self.modes_used[idx] as usize;
        let mut total = 0.0f32;
        for m in 0..used {
            let i = base + m;
            if total >= self.params.background_ratio {
                break;
            }
            if distance2(sample, self.means[i]) < self.params.var_threshold * self.variances[i] {
                return true;
            }
            total += self.weights[i];
        }
        false
    }

    /// Returns true when the pixel is foreground.
    fn update_pixel(&mut self, idx: usize, sample: [f32; 3], alpha: f32) -> bool {
        let p = &self.params;
        let k = p.max_modes.max(1);
        let base = idx * k;
        let mut used = self.modes_used[idx] as usize;
        let decay = 1.0 - alpha;
        let prune = -alpha * p.complexity_reduction;

        let mut total = 0.0f32;
        let mut background = false;
        let mut matched = false;

        for m in 0..used {
            let i = base + m;
            let mut weight = decay * self.weights[i] + prune;
            if !matched {
                let var = self.variances[i];
                let d2 = distance2(sample, self.means[i]);
                if total < p.background_ratio && d2 < p.var_threshold * var {
                    background = true;
                }
                if d2 < p.var_threshold_gen * var {
                    matched = true;
                    weight += alpha;
                    let rate = alpha / weight;
                    let mean = &mut self.means[i];
                    for c in 0..3 {
                        mean[c] += rate * (sample[c] - mean[c]);
                    }
                    self.variances[i] = (var + rate * (d2 - var)).clamp(p.var_min, p.var_max);
                }
            }
            let weight = weight.max(0.0);
            self.weights[i] = weight;
            total += weight;
        }

        if !matched {
            let slot = if used < k {
                used += 1;
                used - 1
            } else {
                k - 1
            };
            let i = base + slot;
            self.weights[i] = if used == 1 { 1.0 } else { alpha };
            self.means[i] = sample;
            self.variances[i] = p.var_init;
        }

        // Keep components sorted by weight (at most a handful per pixel).
        for m in 1..used {
            let mut j = m;
            while j > 0 && self.weights[base + j] > self.weights[base + j - 1] {
                self.swap_modes(base + j, base + j - 1);
                j -= 1;
            }
        }
        while used > 1 && self.weights[base + used - 1] <= 0.0 {
            used -= 1;
        }

        let sum: f32 = self.weights[base..base + used].iter().sum();
        if sum > 0.0 {
            for w in &mut self.weights[base..base + used] {
                *w /= sum;
            }
        }
        self.modes_used[idx] = used as u8;

        !background
    }

    fn swap_modes(&mut self, a: usize, b: usize) {
        self.weights.swap(a, b);
        self.means.swap(a, b);
        self.variances.swap(a, b);
    }
}

fn distance2(a: [f32; 3], b: [f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}
