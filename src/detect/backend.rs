use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Person detector trait.
///
/// Implementations are pure functions of the frame and their fixed model
/// parameters: `detect` takes `&self`, so one instance can be shared behind an
/// `Arc` by successive detection jobs without locking.
///
/// Detection is slow relative to the frame interval. Callers MUST run it off
/// the capture thread.
pub trait PersonDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame snapshot.
    ///
    /// Returns a possibly empty list of boxes with confidence weights.
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}
