//! Histogram-of-oriented-gradients features for the person detector.
//!
//! Features follow OpenCV's `HOGDescriptor` with default parameters, so
//! linear SVM coefficients exported from it (such as the default people
//! detector) score windows the same way:
//!
//! - 64x128 window, 16x16 blocks of 2x2 cells of 8x8 pixels, block stride 8,
//!   9 unsigned orientation bins over 0..180 degrees.
//! - Gradients use square-root gamma per channel, centred differences with
//!   the border reflected, and the strongest channel at each pixel.
//! - Each pixel votes into two neighbouring bins and up to four cells of its
//!   block with bilinear weights, scaled by a Gaussian (sigma 4) centred on
//!   the block. Blocks are L2-Hys normalised (clip 0.2).
//! - A window descriptor lists its 7x15 blocks column by column (x outer),
//!   each block its cells column by column, each cell its 9 bins: 3780
//!   values.

use image::RgbImage;

pub const CELL_SIZE: u32 = 8;
pub const BINS: usize = 9;
pub const BLOCK_CELLS: usize = 2;
pub const BLOCK_LEN: usize = BLOCK_CELLS * BLOCK_CELLS * BINS;
pub const WINDOW_WIDTH: u32 = 64;
pub const WINDOW_HEIGHT: u32 = 128;
pub const WINDOW_CELLS_X: usize = (WINDOW_WIDTH / CELL_SIZE) as usize;
pub const WINDOW_CELLS_Y: usize = (WINDOW_HEIGHT / CELL_SIZE) as usize;
pub const WINDOW_BLOCKS_X: usize = WINDOW_CELLS_X - BLOCK_CELLS + 1;
pub const WINDOW_BLOCKS_Y: usize = WINDOW_CELLS_Y - BLOCK_CELLS + 1;
pub const DESCRIPTOR_LEN: usize = WINDOW_BLOCKS_X * WINDOW_BLOCKS_Y * BLOCK_LEN;

const BLOCK_PIXELS: usize = BLOCK_CELLS * CELL_SIZE as usize;
const BLOCK_SIGMA: f32 = (BLOCK_PIXELS + BLOCK_PIXELS) as f32 / 8.0;
const L2_HYS_CLIP: f32 = 0.2;

/// Normalised block features of one image (one pyramid level).
pub struct HogFeatureMap {
    cells_x: usize,
    cells_y: usize,
    blocks_x: usize,
    blocks: Vec<f32>,
}

impl HogFeatureMap {
    pub fn compute(image: &RgbImage) -> Self {
        let cells_x = (image.width() / CELL_SIZE) as usize;
        let cells_y = (image.height() / CELL_SIZE) as usize;
        let blocks_x = (cells_x + 1).saturating_sub(BLOCK_CELLS);
        let blocks_y = (cells_y + 1).saturating_sub(BLOCK_CELLS);

        let grads = Gradients::compute(image);
        let votes = block_votes();
        let mut blocks = vec![0.0f32; blocks_x * blocks_y * BLOCK_LEN];
        for by in 0..blocks_y {
            for bx in 0..blocks_x {
                let start = (by * blocks_x + bx) * BLOCK_LEN;
                let block = &mut blocks[start..start + BLOCK_LEN];
                let ox = bx * CELL_SIZE as usize;
                let oy = by * CELL_SIZE as usize;
                for vote in &votes {
                    let p = (oy + vote.y) * grads.width + ox + vote.x;
                    let [m0, m1] = grads.magnitudes[p];
                    let [b0, b1] = grads.bins[p];
                    for &(cell, weight) in &vote.cells[..vote.len] {
                        let w = vote.gaussian * weight;
                        block[cell * BINS + b0 as usize] += m0 * w;
                        block[cell * BINS + b1 as usize] += m1 * w;
                    }
                }
                normalize_l2_hys(block);
            }
        }

        Self {
            cells_x,
            cells_y,
            blocks_x,
            blocks,
        }
    }

    /// Cell grid dimensions.
    pub fn cells(&self) -> (usize, usize) {
        (self.cells_x, self.cells_y)
    }

    /// Block whose top-left cell is `(bx, by)`.
    pub fn block(&self, bx: usize, by: usize) -> &[f32] {
        let start = (by * self.blocks_x + bx) * BLOCK_LEN;
        &self.blocks[start..start + BLOCK_LEN]
    }

    /// Window origins (in cells) visited with the given stride (in cells).
    pub fn window_positions(&self, stride_cells: usize) -> Vec<(usize, usize)> {
        if self.cells_x < WINDOW_CELLS_X || self.cells_y < WINDOW_CELLS_Y {
            return Vec::new();
        }
        let stride = stride_cells.max(1);
        let mut positions = Vec::new();
        for cy in (0..=self.cells_y - WINDOW_CELLS_Y).step_by(stride) {
            for cx in (0..=self.cells_x - WINDOW_CELLS_X).step_by(stride) {
                positions.push((cx, cy));
            }
        }
        positions
    }

    /// Linear response of the window at cell origin `(cx, cy)`.
    ///
    /// `weights` must hold `DESCRIPTOR_LEN` values.
    pub fn window_response(&self, cx: usize, cy: usize, weights: &[f32]) -> f32 {
        let mut sum = 0.0f32;
        for bx in 0..WINDOW_BLOCKS_X {
            for by in 0..WINDOW_BLOCKS_Y {
                let w = (bx * WINDOW_BLOCKS_Y + by) * BLOCK_LEN;
                let block = self.block(cx + bx, cy + by);
                sum += block
                    .iter()
                    .zip(&weights[w..w + BLOCK_LEN])
                    .map(|(a, b)| a * b)
                    .sum::<f32>();
            }
        }
        sum
    }

    /// Full descriptor of the window at cell origin `(cx, cy)`.
    pub fn window_descriptor(&self, cx: usize, cy: usize) -> Option<Vec<f32>> {
        if cx + WINDOW_CELLS_X > self.cells_x || cy + WINDOW_CELLS_Y > self.cells_y {
            return None;
        }
        let mut descriptor = Vec::with_capacity(DESCRIPTOR_LEN);
        for bx in 0..WINDOW_BLOCKS_X {
            for by in 0..WINDOW_BLOCKS_Y {
                descriptor.extend_from_slice(self.block(cx + bx, cy + by));
            }
        }
        Some(descriptor)
    }
}

/// Per-pixel gradient split across two orientation bins.
struct Gradients {
    width: usize,
    magnitudes: Vec<[f32; 2]>,
    bins: Vec<[u8; 2]>,
}

impl Gradients {
    fn compute(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let gamma: Vec<f32> = (0..256).map(|v| (v as f32).sqrt()).collect();
        let angle_scale = BINS as f32 / std::f32::consts::PI;
        let len = width as usize * height as usize;
        let mut magnitudes = Vec::with_capacity(len);
        let mut bins = Vec::with_capacity(len);

        for y in 0..height {
            let up = reflect(y as i64 - 1, height);
            let down = reflect(y as i64 + 1, height);
            for x in 0..width {
                let left = image.get_pixel(reflect(x as i64 - 1, width), y).0;
                let right = image.get_pixel(reflect(x as i64 + 1, width), y).0;
                let above = image.get_pixel(x, up).0;
                let below = image.get_pixel(x, down).0;

                // Ties keep the earliest of B, G, R.
                let (mut dx, mut dy, mut best) = (0.0f32, 0.0f32, -1.0f32);
                for c in [2usize, 1, 0] {
                    let gx = gamma[right[c] as usize] - gamma[left[c] as usize];
                    let gy = gamma[below[c] as usize] - gamma[above[c] as usize];
                    let mag2 = gx * gx + gy * gy;
                    if mag2 > best {
                        best = mag2;
                        dx = gx;
                        dy = gy;
                    }
                }

                let magnitude = best.sqrt();
                let mut angle = dy.atan2(dx);
                if angle < 0.0 {
                    angle += 2.0 * std::f32::consts::PI;
                }
                let position = angle * angle_scale - 0.5;
                let lower = position.floor();
                let frac = position - lower;
                let mut lo = lower as i32;
                if lo < 0 {
                    lo += BINS as i32;
                } else if lo >= BINS as i32 {
                    lo -= BINS as i32;
                }
                let lo = lo.clamp(0, BINS as i32 - 1) as u8;
                let hi = ((lo as usize + 1) % BINS) as u8;

                magnitudes.push([magnitude * (1.0 - frac), magnitude * frac]);
                bins.push([lo, hi]);
            }
        }

        Self {
            width: width as usize,
            magnitudes,
            bins,
        }
    }
}

/// Reflect-101 border: `-1 -> 1`, `n -> n - 2`.
fn reflect(v: i64, n: u32) -> u32 {
    let n = n as i64;
    if n <= 1 {
        return 0;
    }
    let v = if v < 0 { -v } else { v };
    let v = if v >= n { 2 * n - 2 - v } else { v };
    v.clamp(0, n - 1) as u32
}

/// How one pixel of a block votes into the block's cells.
struct PixelVote {
    x: usize,
    y: usize,
    gaussian: f32,
    /// `(cell slot, weight)`, slot = `cell_x * 2 + cell_y`.
    cells: [(usize, f32); 4],
    len: usize,
}

fn block_votes() -> Vec<PixelVote> {
    let half = BLOCK_PIXELS as f32 * 0.5;
    let scale = 1.0 / (BLOCK_SIGMA * BLOCK_SIGMA * 2.0);
    let mut votes = Vec::with_capacity(BLOCK_PIXELS * BLOCK_PIXELS);
    for y in 0..BLOCK_PIXELS {
        for x in 0..BLOCK_PIXELS {
            let dx = x as f32 - half;
            let dy = y as f32 - half;
            let xs = cell_weights(x);
            let ys = cell_weights(y);

            let mut cells = [(0usize, 0.0f32); 4];
            let mut len = 0;
            for &(cx, wx) in xs.iter().flatten() {
                for &(cy, wy) in ys.iter().flatten() {
                    cells[len] = (cx * BLOCK_CELLS + cy, wx * wy);
                    len += 1;
                }
            }
            votes.push(PixelVote {
                x,
                y,
                gaussian: (-(dx * dx + dy * dy) * scale).exp(),
                cells,
                len,
            });
        }
    }
    votes
}

/// Cells (within the block) that pixel offset `p` interpolates between.
fn cell_weights(p: usize) -> [Option<(usize, f32)>; 2] {
    let pos = (p as f32 + 0.5) / CELL_SIZE as f32 - 0.5;
    let first = pos.floor();
    let frac = pos - first;
    let first = first as i64;
    let inside = |c: i64| c >= 0 && c < BLOCK_CELLS as i64;
    [
        inside(first).then(|| (first as usize, 1.0 - frac)),
        inside(first + 1).then(|| ((first + 1) as usize, frac)),
    ]
}

fn normalize_l2_hys(block: &mut [f32]) {
    let sum: f32 = block.iter().map(|v| v * v).sum();
    let scale = 1.0 / (sum.sqrt() + 0.1 * block.len() as f32);
    for v in block.iter_mut() {
        *v = (*v * scale).min(L2_HYS_CLIP);
    }
    let sum: f32 = block.iter().map(|v| v * v).sum();
    let scale = 1.0 / (sum.sqrt() + 1e-3);
    for v in block.iter_mut() {
        *v *= scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn slot_energy(block: &[f32], slot: usize) -> f32 {
        block[slot * BINS..(slot + 1) * BINS].iter().sum()
    }

    #[test]
    fn descriptor_length_matches_geometry() {
        assert_eq!(DESCRIPTOR_LEN, 3780);
        let image = RgbImage::from_pixel(WINDOW_WIDTH, WINDOW_HEIGHT, Rgb([100, 100, 100]));
        let map = HogFeatureMap::compute(&image);
        assert_eq!(map.cells(), (8, 16));
        let descriptor = map.window_descriptor(0, 0).unwrap();
        assert_eq!(descriptor.len(), DESCRIPTOR_LEN);
        assert!(map.window_descriptor(1, 0).is_none());
    }

    #[test]
    fn flat_image_has_no_gradient_energy() {
        let image = RgbImage::from_pixel(80, 136, Rgb([77, 20, 200]));
        let map = HogFeatureMap::compute(&image);
        assert!(map.window_descriptor(0, 0).unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn vertical_edge_fills_horizontal_orientation_bins() {
        let image = RgbImage::from_fn(64, 128, |x, _| {
            if x < 36 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let map = HogFeatureMap::compute(&image);
        // Block 3 covers x = 24..40; its right cells (slots 2 and 3) hold the edge.
        let block = map.block(3, 5);
        let right_cell = &block[2 * BINS..3 * BINS];
        let (best, _) = right_cell
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
        assert!(best == 0 || best == BINS - 1);
        assert!(slot_energy(block, 2) > slot_energy(block, 0));
        let norm: f32 = block.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!(norm <= 1.0 + 1e-3);
    }

    #[test]
    fn cells_within_a_block_are_column_major() {
        // A lone bright pixel in the lower-left cell of block (0, 0).
        let mut image = RgbImage::new(64, 128);
        image.put_pixel(4, 12, Rgb([255, 255, 255]));
        let map = HogFeatureMap::compute(&image);
        let block = map.block(0, 0);
        let lower_left = slot_energy(block, 1);
        for slot in [0, 2, 3] {
            assert!(lower_left > slot_energy(block, slot), "slot {}", slot);
        }
    }

    #[test]
    fn window_blocks_are_column_major() {
        let image = RgbImage::from_fn(72, 136, |x, y| {
            Rgb([((x * 7 + y * 3) % 256) as u8, ((x * 11) % 256) as u8, (y % 256) as u8])
        });
        let map = HogFeatureMap::compute(&image);
        let descriptor = map.window_descriptor(1, 1).unwrap();
        let (bx, by) = (1, 2);
        let offset = (bx * WINDOW_BLOCKS_Y + by) * BLOCK_LEN;
        assert_eq!(&descriptor[offset..offset + BLOCK_LEN], map.block(1 + bx, 1 + by));
    }

    #[test]
    fn strongest_channel_drives_the_gradient() {
        // Only the red channel changes; a luma-only feature would be weaker.
        let red = RgbImage::from_fn(64, 128, |x, _| if x < 36 { Rgb([0, 90, 90]) } else { Rgb([255, 90, 90]) });
        let gray = RgbImage::from_fn(64, 128, |x, _| if x < 36 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let a = HogFeatureMap::compute(&red);
        let b = HogFeatureMap::compute(&gray);
        for (x, y) in a.block(3, 5).iter().zip(b.block(3, 5)) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn window_positions_respect_stride() {
        let map = HogFeatureMap::compute(&RgbImage::new(80, 136));
        assert_eq!(map.cells(), (10, 17));
        assert_eq!(map.window_positions(1).len(), 6);
        assert_eq!(map.window_positions(2), vec![(0, 0), (2, 0)]);

        let small = HogFeatureMap::compute(&RgbImage::new(60, 200));
        assert!(small.window_positions(1).is_empty());
    }

    #[test]
    fn response_equals_descriptor_dot_product() {
        let image = RgbImage::from_fn(72, 136, |x, y| {
            Rgb([((x * 7 + y * 3) % 256) as u8, ((x * 5) % 256) as u8, 40])
        });
        let map = HogFeatureMap::compute(&image);
        let weights: Vec<f32> = (0..DESCRIPTOR_LEN).map(|i| (i % 5) as f32 - 2.0).collect();
        let descriptor = map.window_descriptor(1, 1).unwrap();
        let expected: f32 = descriptor.iter().zip(&weights).map(|(a, b)| a * b).sum();
        let response = map.window_response(1, 1, &weights);
        assert!((response - expected).abs() < 1e-2);
    }

    #[test]
    fn reflect_mirrors_without_repeating_the_edge() {
        assert_eq!(reflect(-1, 10), 1);
        assert_eq!(reflect(10, 10), 8);
        assert_eq!(reflect(4, 10), 4);
        assert_eq!(reflect(-1, 1), 0);
    }
}
