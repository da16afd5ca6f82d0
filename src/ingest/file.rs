//! Local video file source.
//!
//! Decoding is delegated to FFmpeg behind the `ingest-file-ffmpeg` feature.
//! Without the feature, opening a video file is a configuration error.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::Frame;

/// Local video file frame source.
pub struct VideoFileSource {
    path: String,
    #[cfg(feature = "ingest-file-ffmpeg")]
    decoder: FfmpegFileSource,
}

impl VideoFileSource {
    pub fn new(path: &str) -> Result<Self> {
        if !Path::new(path).is_file() {
            return Err(anyhow!("video file {} does not exist", path));
        }
        Self::open(path)
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open(path: &str) -> Result<Self> {
        Ok(Self {
            path: path.to_string(),
            decoder: FfmpegFileSource::new(path)?,
        })
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open(path: &str) -> Result<Self> {
        Err(anyhow!(
            "video file {} requires the ingest-file-ffmpeg feature",
            path
        ))
    }
}

#[cfg(feature = "ingest-file-ffmpeg")]
impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("VideoFileSource: connected to {} (ffmpeg)", self.path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.decoder.next_frame()
    }

    fn release(&mut self) {
        log::info!(
            "VideoFileSource: released {} after {} frames",
            self.path,
            self.decoder.frames_decoded()
        );
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.decoder.frames_decoded(),
            source: self.path.clone(),
        }
    }
}

// Unreachable at runtime: `new` never succeeds without a decoder.
#[cfg(not(feature = "ingest-file-ffmpeg"))]
impl FrameSource for VideoFileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn connect(&mut self) -> Result<()> {
        Err(anyhow!("video decoding is not compiled in"))
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Err(anyhow!("video decoding is not compiled in"))
    }

    fn release(&mut self) {}

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            source: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_rejected() {
        let err = VideoFileSource::new("/nonexistent/clip.mp4")
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("does not exist"));
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn video_files_need_the_decoder_feature() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let path = file.path().display().to_string();
        let err = VideoFileSource::new(&path)
            .err()
            .map(|e| e.to_string())
            .unwrap_or_default();
        assert!(err.contains("ingest-file-ffmpeg"));
        Ok(())
    }
}
