//! Frame sources.
//!
//! This module provides the sources the capture loop can pull frames from:
//! - Synthetic scenes (`stub://static`, `stub://walker`) for tests and demos
//! - Directories of still images, replayed in file-name order
//! - Local video files (feature: ingest-file-ffmpeg)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//!
//! Every source produces `Frame`s of session-constant dimensions. End of
//! stream is `Ok(None)`; a read failure is `Err`. The loop treats both as the
//! end of the session and never retries.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod images;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use file::VideoFileSource;
pub use images::ImageDirSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::Frame;

pub const DEFAULT_SOURCE_URI: &str = "/dev/video0";
pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_TARGET_FPS: u32 = 30;

/// A capture device or replayable stream.
pub trait FrameSource: Send {
    /// Human-readable origin, for logs.
    fn describe(&self) -> String;

    /// Open the underlying device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the device. Called once by the capture loop on shutdown.
    fn release(&mut self);

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Where and how to capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://...`, `v4l2://<device>`, `/dev/videoN`, an image directory, or a video file.
    pub uri: String,
    /// Requested frame width (devices and synthetic scenes).
    pub width: u32,
    /// Requested frame height (devices and synthetic scenes).
    pub height: u32,
    pub target_fps: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl SourceSettings {
    pub fn validate(&self) -> Result<()> {
        if self.uri.trim().is_empty() {
            return Err(anyhow!("source uri must not be empty"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("source dimensions must be non-zero"));
        }
        Ok(())
    }
}

/// Pick a source implementation from the URI.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    settings.validate()?;
    let uri = settings.uri.trim();

    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_settings(settings)?));
    }
    if let Some(device) = device_path(uri) {
        return open_device(device, settings);
    }
    if uri.contains("://") {
        return Err(anyhow!(
            "unsupported source '{}': only local devices and files are supported",
            uri
        ));
    }
    if Path::new(uri).is_dir() {
        return Ok(Box::new(ImageDirSource::new(uri)?));
    }
    Ok(Box::new(VideoFileSource::new(uri)?))
}

fn device_path(uri: &str) -> Option<&str> {
    if let Some(device) = uri.strip_prefix("v4l2://") {
        return Some(device);
    }
    uri.starts_with("/dev/video").then_some(uri)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(v4l2::V4l2Config {
        device: device.to_string(),
        target_fps: settings.target_fps,
        width: settings.width,
        height: settings.height,
    })?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "capture device {} requires the ingest-v4l2 feature",
        device
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(uri: &str) -> SourceSettings {
        SourceSettings {
            uri: uri.to_string(),
            width: 160,
            height: 120,
            target_fps: 10,
        }
    }

    #[test]
    fn opens_synthetic_source() -> Result<()> {
        let mut source = open_source(&settings("stub://static?frames=2"))?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn opens_image_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = open_source(&settings(&dir.path().display().to_string()))?;
        assert!(source.describe().contains(&dir.path().display().to_string()));
        Ok(())
    }

    #[test]
    fn rejects_network_and_empty_uris() {
        assert!(open_source(&settings("rtsp://camera/stream")).is_err());
        assert!(open_source(&settings("   ")).is_err());
    }

    #[test]
    fn recognises_device_paths() {
        assert_eq!(device_path("/dev/video2"), Some("/dev/video2"));
        assert_eq!(device_path("v4l2:///dev/video1"), Some("/dev/video1"));
        assert_eq!(device_path("clip.mp4"), None);
    }
}
