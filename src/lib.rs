//! Motion Sentry
//!
//! A single-camera, motion-gated person detection loop.
//!
//! # Architecture
//!
//! The capture loop runs a cheap motion gate on every frame and starts the
//! expensive person detector only when motion is plausible:
//!
//! 1. **Acquire**: a `FrameSource` yields one owned `Frame`.
//! 2. **Gate**: `MotionGate` updates its background model and reports whether
//!    any foreground contour exceeds the area threshold.
//! 3. **Dispatch**: on motion, `DetectionDispatcher` starts a detection job on
//!    a deep-copied snapshot, unless one is already in flight (single flight).
//! 4. **Persist**: the job draws detections and overwrites one PNG via
//!    `ResultSink`, then returns the dispatcher to idle.
//!
//! # Module Structure
//!
//! - `frame`: owned frames and bounding boxes
//! - `motion`: background model, morphology, contour filtering
//! - `detect`: person detector trait, HOG + linear SVM backend, stub backend
//! - `dispatch`: single-flight job state and job threads
//! - `sink`: annotated result persistence
//! - `ingest`: frame sources (synthetic, image directory, video file, V4L2)
//! - `preview`: headless or snapshot preview
//! - `capture`: the loop itself
//! - `control`: stop signal, Ctrl-C and stdin stop command
//! - `config`: JSON config file and environment overrides

pub mod capture;
pub mod config;
pub mod control;
pub mod detect;
pub mod dispatch;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod preview;
pub mod sink;

pub use capture::{CaptureLoop, ExitReason, LoopSettings, LoopSummary};
pub use config::SentryConfig;
pub use control::StopSignal;
pub use detect::{Detection, DetectionResult, PersonDetector};
pub use dispatch::{DetectionDispatcher, DispatchDecision, JobState, ShutdownPolicy};
pub use frame::{BoundingBox, Frame};
pub use ingest::{open_source, FrameSource, SourceSettings};
pub use motion::{MotionConfig, MotionGate, MotionOutcome};
pub use preview::{HeadlessPreview, Preview, SnapshotPreview};
pub use sink::{FileSink, ResultSink, SinkOutcome};
