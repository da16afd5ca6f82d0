mod backend;
mod backends;
mod grouping;
pub mod hog;
mod result;
mod svm;

pub use backend::PersonDetector;
pub use backends::{HogScanParams, HogSvmBackend, StubBackend};
#[cfg(feature = "backend-opencv")]
pub use backends::{default_people_detector, OpencvHogBackend};
pub use grouping::{group_detections, DEFAULT_GROUP_EPS};
pub use result::{Detection, DetectionResult};
pub use svm::LinearSvm;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// People model the `hog-svm` backend loads when none is configured.
pub const DEFAULT_MODEL_PATH: &str = "models/people.json";

/// Which person detector backend to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// OpenCV's HOG people detector (feature `backend-opencv`).
    OpencvHog,
    /// HOG features scored by a linear SVM model file.
    HogSvm,
    Stub,
}

impl Default for DetectorKind {
    fn default() -> Self {
        if cfg!(feature = "backend-opencv") {
            Self::OpencvHog
        } else {
            Self::HogSvm
        }
    }
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opencv-hog" | "opencv_hog" | "opencv" => Ok(Self::OpencvHog),
            "hog-svm" | "hog_svm" | "hog" => Ok(Self::HogSvm),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!(
                "unknown detector '{}' (expected opencv-hog, hog-svm or stub)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    /// JSON linear SVM model for `hog-svm`. Defaults to `DEFAULT_MODEL_PATH`.
    pub model_path: Option<PathBuf>,
    pub scan: HogScanParams,
    /// Artificial latency for the stub backend.
    pub stub_latency: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::default(),
            model_path: None,
            scan: HogScanParams::default(),
            stub_latency: Duration::ZERO,
        }
    }
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        if self.kind == DetectorKind::OpencvHog && !cfg!(feature = "backend-opencv") {
            return Err(anyhow!(
                "opencv-hog detector requires the backend-opencv feature"
            ));
        }
        Ok(())
    }

    /// Model file the `hog-svm` backend reads.
    pub fn resolved_model_path(&self) -> &Path {
        self.model_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_MODEL_PATH))
    }
}

/// Construct the configured detector, shared by all detection jobs.
pub fn build_detector(settings: &DetectorSettings) -> Result<Arc<dyn PersonDetector>> {
    settings.validate()?;
    let detector: Arc<dyn PersonDetector> = match settings.kind {
        DetectorKind::OpencvHog => build_opencv(settings)?,
        DetectorKind::HogSvm => {
            let path = settings.resolved_model_path();
            if !path.exists() {
                return Err(anyhow!(
                    "people model {} not found; export OpenCV's default people detector \
                     with `export_people_model` (feature backend-opencv) or set a model path",
                    path.display()
                ));
            }
            Arc::new(HogSvmBackend::from_model_file(path, settings.scan.clone())?)
        }
        DetectorKind::Stub => Arc::new(StubBackend::new().with_latency(settings.stub_latency)),
    };
    log::info!("person detector: {}", detector.name());
    Ok(detector)
}

#[cfg(feature = "backend-opencv")]
fn build_opencv(settings: &DetectorSettings) -> Result<Arc<dyn PersonDetector>> {
    Ok(Arc::new(OpencvHogBackend::new(settings.scan.clone())?))
}

#[cfg(not(feature = "backend-opencv"))]
fn build_opencv(_settings: &DetectorSettings) -> Result<Arc<dyn PersonDetector>> {
    Err(anyhow!(
        "opencv-hog detector requires the backend-opencv feature"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detector_kind() {
        assert_eq!("opencv-hog".parse::<DetectorKind>().unwrap(), DetectorKind::OpencvHog);
        assert_eq!("hog-svm".parse::<DetectorKind>().unwrap(), DetectorKind::HogSvm);
        assert_eq!(" STUB ".parse::<DetectorKind>().unwrap(), DetectorKind::Stub);
        assert!("yolo".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn default_settings_validate() {
        DetectorSettings::default().validate().unwrap();
        assert_eq!(
            DetectorSettings::default().resolved_model_path(),
            Path::new(DEFAULT_MODEL_PATH)
        );
    }

    #[cfg(not(feature = "backend-opencv"))]
    #[test]
    fn default_kind_without_opencv_is_hog_svm() {
        assert_eq!(DetectorKind::default(), DetectorKind::HogSvm);
        let settings = DetectorSettings {
            kind: DetectorKind::OpencvHog,
            ..DetectorSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[cfg(feature = "backend-opencv")]
    #[test]
    fn default_detector_is_opencv_people_detector() -> Result<()> {
        assert_eq!(DetectorKind::default(), DetectorKind::OpencvHog);
        assert_eq!(build_detector(&DetectorSettings::default())?.name(), "opencv-hog");
        Ok(())
    }

    #[test]
    fn missing_people_model_names_the_path() {
        let settings = DetectorSettings {
            kind: DetectorKind::HogSvm,
            model_path: Some(PathBuf::from("/nonexistent/people.json")),
            ..DetectorSettings::default()
        };
        let err = build_detector(&settings).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/people.json"));
    }

    #[test]
    fn builds_hog_svm_from_detector_vector_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("people.json");
        let mut coefficients = vec![0.0f32; hog::DESCRIPTOR_LEN];
        coefficients.push(-1.0);
        std::fs::write(&path, serde_json::to_string(&coefficients)?)?;
        let settings = DetectorSettings {
            kind: DetectorKind::HogSvm,
            model_path: Some(path),
            ..DetectorSettings::default()
        };
        assert_eq!(build_detector(&settings)?.name(), "hog-svm");
        Ok(())
    }

    #[test]
    fn builds_stub_detector() -> Result<()> {
        let settings = DetectorSettings {
            kind: DetectorKind::Stub,
            ..DetectorSettings::default()
        };
        assert_eq!(build_detector(&settings)?.name(), "stub");
        Ok(())
    }
}
