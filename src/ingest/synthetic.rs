//! Synthetic frame source (`stub://`).
//!
//! - `stub://static`: a fixed gradient background, no motion at all.
//! - `stub://walker`: the same background with a white 40x100 figure that
//!   crosses the scene for 30 of every 60 frames.
//!
//! Append `?frames=N` to end the stream after N frames.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::Frame;

pub const FIGURE_WIDTH: u32 = 40;
pub const FIGURE_HEIGHT: u32 = 100;
const WALK_PERIOD: u64 = 60;
const WALK_START: u64 = 20;
const WALK_END: u64 = 50;
const WALK_STEP: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyntheticScene {
    Static,
    Walker,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub uri: String,
    pub scene: SyntheticScene,
    pub width: u32,
    pub height: u32,
    /// End of stream after this many frames.
    pub max_frames: Option<u64>,
}

impl SyntheticConfig {
    pub fn parse(uri: &str, width: u32, height: u32) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic source uri must start with stub://"))?;
        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let scene = match name {
            "static" => SyntheticScene::Static,
            "walker" => SyntheticScene::Walker,
            other => return Err(anyhow!("unknown synthetic scene '{}'", other)),
        };

        let mut max_frames = None;
        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            match pair.split_once('=') {
                Some(("frames", value)) => {
                    let frames: u64 = value
                        .parse()
                        .map_err(|_| anyhow!("frames must be an integer (got '{}')", value))?;
                    max_frames = Some(frames);
                }
                _ => return Err(anyhow!("unknown synthetic source option '{}'", pair)),
            }
        }

        if scene == SyntheticScene::Walker
            && (width < FIGURE_WIDTH + WALK_STEP || height < FIGURE_HEIGHT + 10)
        {
            return Err(anyhow!(
                "walker scene needs at least {}x{} pixels",
                FIGURE_WIDTH + WALK_STEP,
                FIGURE_HEIGHT + 10
            ));
        }

        Ok(Self {
            uri: uri.to_string(),
            scene,
            width,
            height,
            max_frames,
        })
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    background: RgbImage,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let background = gradient(config.width, config.height);
        Self {
            config,
            frame_count: 0,
            background,
        }
    }

    pub fn from_settings(settings: &SourceSettings) -> Result<Self> {
        Ok(Self::new(SyntheticConfig::parse(
            &settings.uri,
            settings.width,
            settings.height,
        )?))
    }

    /// Top-left corner of the walker figure in frame `n` (1-based), if visible.
    pub fn figure_origin(&self, n: u64) -> Option<(u32, u32)> {
        if self.config.scene != SyntheticScene::Walker {
            return None;
        }
        let phase = n % WALK_PERIOD;
        if !(WALK_START..WALK_END).contains(&phase) {
            return None;
        }
        let travel = self.config.width - FIGURE_WIDTH;
        let x = ((phase - WALK_START) as u32 * WALK_STEP) % travel;
        let y = (self.config.height - FIGURE_HEIGHT) / 2;
        Some((x, y))
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.uri.clone()
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .config
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.frame_count += 1;

        let mut pixels = self.background.clone();
        if let Some((x0, y0)) = self.figure_origin(self.frame_count) {
            for y in y0..y0 + FIGURE_HEIGHT {
                for x in x0..x0 + FIGURE_WIDTH {
                    pixels.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        Ok(Some(Frame::from_image(self.frame_count, pixels)))
    }

    fn release(&mut self) {
        log::info!(
            "SyntheticSource: released {} after {} frames",
            self.config.uri,
            self.frame_count
        );
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = 40 + (x * 60 / width.max(1)) + (y * 40 / height.max(1));
        Rgb([v as u8, v as u8, (v + 10) as u8])
    })
}
