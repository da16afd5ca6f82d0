use crate::frame::{BoundingBox, Frame};

/// One detected person.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bounds: BoundingBox,
    /// Detector confidence (SVM margin for the HOG backend).
    pub weight: f32,
}

/// Detections together with the frame snapshot they were computed on.
#[derive(Debug)]
pub struct DetectionResult {
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(frame: Frame, detections: Vec<Detection>) -> Self {
        Self { frame, detections }
    }

    pub fn person_found(&self) -> bool {
        !self.detections.is_empty()
    }
}
