//! Image directory source.
//!
//! Replays every PNG or JPEG in a directory in file-name order. The first
//! image fixes the session dimensions; a later image of a different size
//! is a read failure.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
    dimensions: Option<(u32, u32)>,
    frame_count: u64,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(anyhow!("{} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            next: 0,
            dimensions: None,
            frame_count: 0,
        })
    }

    /// Files queued for replay, in order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

impl FrameSource for ImageDirSource {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "ImageDirSource: connected to {} ({} images)",
            self.dir.display(),
            files.len()
        );
        self.files = files;
        self.next = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let pixels = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let dimensions = pixels.dimensions();
        match self.dimensions {
            None => self.dimensions = Some(dimensions),
            Some(expected) if expected != dimensions => {
                return Err(anyhow!(
                    "{} is {}x{}, expected {}x{}",
                    path.display(),
                    dimensions.0,
                    dimensions.1,
                    expected.0,
                    expected.1
                ));
            }
            Some(_) => {}
        }

        self.frame_count += 1;
        Ok(Some(Frame::from_image(self.frame_count, pixels)))
    }

    fn release(&mut self) {
        log::info!(
            "ImageDirSource: released {} after {} frames",
            self.dir.display(),
            self.frame_count
        );
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write(dir: &Path, name: &str, w: u32, h: u32, shade: u8) -> Result<()> {
        RgbImage::from_pixel(w, h, Rgb([shade, shade, shade])).save(dir.join(name))?;
        Ok(())
    }

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "002.png", 8, 6, 20)?;
        write(dir.path(), "001.png", 8, 6, 10)?;
        std::fs::write(dir.path().join("notes.txt"), "skip me")?;

        let mut source = ImageDirSource::new(dir.path())?;
        source.connect()?;
        assert_eq!(source.files().len(), 2);

        let first = source.next_frame()?.unwrap();
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([10, 10, 10]));
        let second = source.next_frame()?.unwrap();
        assert_eq!(second.sequence, 2);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn size_change_is_a_read_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write(dir.path(), "a.png", 8, 6, 10)?;
        write(dir.path(), "b.png", 6, 8, 10)?;

        let mut source = ImageDirSource::new(dir.path())?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn rejects_missing_directory() {
        assert!(ImageDirSource::new("/nonexistent/frames").is_err());
    }
}
