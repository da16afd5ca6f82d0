use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{LoopSettings, DEFAULT_POLL_INTERVAL};
use crate::control::DEFAULT_STOP_COMMAND;
use crate::detect::{DetectorKind, DetectorSettings, HogScanParams};
use crate::dispatch::ShutdownPolicy;
use crate::ingest::{
    SourceSettings, DEFAULT_HEIGHT, DEFAULT_SOURCE_URI, DEFAULT_TARGET_FPS, DEFAULT_WIDTH,
};
use crate::motion::{
    BackgroundParams, LearningPolicy, MotionConfig, DEFAULT_AREA_THRESHOLD, DEFAULT_KERNEL_SIZE,
};
use crate::sink::DEFAULT_OUTPUT_PATH;

const DEFAULT_PREVIEW_EVERY: u64 = 1;

#[derive(Debug, Deserialize, Default)]
struct SentryConfigFile {
    source: Option<SourceConfigFile>,
    motion: Option<MotionConfigFile>,
    detector: Option<DetectorConfigFile>,
    output_path: Option<PathBuf>,
    preview: Option<PreviewConfigFile>,
    run: Option<RunConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    area_threshold: Option<f64>,
    kernel_size: Option<u32>,
    /// "always" or "skip-motion".
    learning: Option<String>,
    history: Option<u32>,
    var_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<String>,
    model_path: Option<PathBuf>,
    win_stride: Option<u32>,
    scale: Option<f32>,
    hit_threshold: Option<f32>,
    group_threshold: Option<usize>,
    stub_latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewConfigFile {
    dir: Option<PathBuf>,
    every_n_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RunConfigFile {
    poll_interval_ms: Option<u64>,
    max_frames: Option<u64>,
    join_on_exit: Option<bool>,
    stop_command: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub source: SourceSettings,
    pub motion: MotionConfig,
    pub detector: DetectorSettings,
    pub output_path: PathBuf,
    pub preview: PreviewSettings,
    pub run: LoopSettings,
    pub stop_command: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Snapshot directory. `None` runs headless.
    pub dir: Option<PathBuf>,
    pub every_n_frames: u64,
}

impl SentryConfig {
    /// Load from `SENTRY_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit config file, then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let cfg = Self::layered(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File and environment layers without validation, for callers that
    /// apply further overrides (command-line flags) before `validate()`.
    pub fn layered(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => SentryConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: SentryConfigFile) -> Result<Self> {
        let src = file.source.unwrap_or_default();
        let source = SourceSettings {
            uri: src.uri.unwrap_or_else(|| DEFAULT_SOURCE_URI.to_string()),
            width: src.width.unwrap_or(DEFAULT_WIDTH),
            height: src.height.unwrap_or(DEFAULT_HEIGHT),
            target_fps: src.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let m = file.motion.unwrap_or_default();
        let mut background = BackgroundParams::default();
        if let Some(history) = m.history {
            background.history = history;
        }
        if let Some(var_threshold) = m.var_threshold {
            background.var_threshold = var_threshold;
        }
        let motion = MotionConfig {
            area_threshold: m.area_threshold.unwrap_or(DEFAULT_AREA_THRESHOLD),
            kernel_size: m.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE),
            learning: match m.learning.as_deref() {
                Some(value) => parse_learning(value)?,
                None => LearningPolicy::default(),
            },
            background,
        };

        let d = file.detector.unwrap_or_default();
        let defaults = HogScanParams::default();
        let detector = DetectorSettings {
            kind: match d.kind.as_deref() {
                Some(kind) => kind.parse()?,
                None => DetectorKind::default(),
            },
            model_path: d.model_path,
            scan: HogScanParams {
                win_stride: d.win_stride.unwrap_or(defaults.win_stride),
                scale: d.scale.unwrap_or(defaults.scale),
                hit_threshold: d.hit_threshold.unwrap_or(defaults.hit_threshold),
                group_threshold: d.group_threshold.unwrap_or(defaults.group_threshold),
                ..defaults
            },
            stub_latency: Duration::from_millis(d.stub_latency_ms.unwrap_or(0)),
        };

        let p = file.preview.unwrap_or_default();
        let preview = PreviewSettings {
            dir: p.dir,
            every_n_frames: p.every_n_frames.unwrap_or(DEFAULT_PREVIEW_EVERY),
        };

        let r = file.run.unwrap_or_default();
        let run = LoopSettings {
            poll_interval: r
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_frames: r.max_frames,
            shutdown: if r.join_on_exit.unwrap_or(false) {
                ShutdownPolicy::Join
            } else {
                ShutdownPolicy::Abandon
            },
        };

        Ok(Self {
            source,
            motion,
            detector,
            output_path: file
                .output_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            preview,
            run,
            stop_command: r
                .stop_command
                .unwrap_or_else(|| DEFAULT_STOP_COMMAND.to_string()),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("SENTRY_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(path) = std::env::var("SENTRY_OUTPUT") {
            if !path.trim().is_empty() {
                self.output_path = PathBuf::from(path);
            }
        }
        if let Ok(kind) = std::env::var("SENTRY_DETECTOR") {
            if !kind.trim().is_empty() {
                self.detector.kind = kind.parse()?;
            }
        }
        if let Ok(path) = std::env::var("SENTRY_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(area) = std::env::var("SENTRY_MOTION_AREA") {
            self.motion.area_threshold = area
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTRY_MOTION_AREA must be a number"))?;
        }
        if let Ok(poll) = std::env::var("SENTRY_POLL_MS") {
            let millis: u64 = poll.trim().parse().map_err(|_| {
                anyhow!("SENTRY_POLL_MS must be an integer number of milliseconds")
            })?;
            self.run.poll_interval = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check every section. Called again by the binary after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.motion.validate()?;
        self.detector.validate()?;
        if self.output_path.as_os_str().is_empty() {
            return Err(anyhow!("output path must not be empty"));
        }
        if self.preview.every_n_frames == 0 {
            return Err(anyhow!("preview every_n_frames must be greater than zero"));
        }
        if self.run.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero"));
        }
        if self.stop_command.trim().is_empty() {
            return Err(anyhow!("stop command must not be empty"));
        }
        Ok(())
    }
}

fn parse_learning(value: &str) -> Result<LearningPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "always" => Ok(LearningPolicy::Always),
        "skip-motion" | "skip_motion" => Ok(LearningPolicy::SkipMotionFrames),
        other => Err(anyhow!(
            "unknown learning policy '{}' (expected always or skip-motion)",
            other
        )),
    }
}

fn read_config_file(path: &Path) -> Result<SentryConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
