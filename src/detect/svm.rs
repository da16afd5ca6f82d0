use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::hog::DESCRIPTOR_LEN;

/// Linear SVM over HOG window descriptors: `score = w . x + bias`.
///
/// Stored on disk as JSON, either `{ "weights": [f32; 3780], "bias": f32 }`
/// or a flat detector vector as `HOGDescriptor::getSVMDetector` returns it:
/// 3780 weights followed by the bias.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LinearSvm {
    pub weights: Vec<f32>,
    pub bias: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModelFile {
    Linear(LinearSvm),
    Detector(Vec<f32>),
}

impl LinearSvm {
    pub fn new(weights: Vec<f32>, bias: f32) -> Result<Self> {
        let model = Self { weights, bias };
        model.validate()?;
        Ok(model)
    }

    /// Split a detector vector into weights and bias. A vector without the
    /// trailing bias gets a bias of zero.
    pub fn from_detector(coefficients: &[f32]) -> Result<Self> {
        match coefficients.len() {
            DESCRIPTOR_LEN => Self::new(coefficients.to_vec(), 0.0),
            n if n == DESCRIPTOR_LEN + 1 => Self::new(
                coefficients[..DESCRIPTOR_LEN].to_vec(),
                coefficients[DESCRIPTOR_LEN],
            ),
            n => Err(anyhow!(
                "detector vector has {} values, expected {} or {}",
                n,
                DESCRIPTOR_LEN,
                DESCRIPTOR_LEN + 1
            )),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read SVM model {}", path.display()))?;
        let file: ModelFile = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid SVM model {}: {}", path.display(), e))?;
        let model = match file {
            ModelFile::Linear(model) => model,
            ModelFile::Detector(coefficients) => Self::from_detector(&coefficients)
                .with_context(|| format!("invalid SVM model {}", path.display()))?,
        };
        model.validate()?;
        log::info!(
            "loaded linear SVM from {} ({} weights, bias {:.4})",
            path.display(),
            model.weights.len(),
            model.bias
        );
        Ok(model)
    }

    /// Write as `{ "weights": [...], "bias": f }`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write SVM model {}", path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.weights.len() != DESCRIPTOR_LEN {
            return Err(anyhow!(
                "SVM model has {} weights, HOG descriptor has {}",
                self.weights.len(),
                DESCRIPTOR_LEN
            ));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(anyhow!("SVM model contains non-finite values"));
        }
        Ok(())
    }
}
