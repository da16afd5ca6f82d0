//! The capture loop.
//!
//! One thread drives acquire, gate, dispatch, and preview in capture order.
//! Detection work happens on job threads owned by the dispatcher; this loop
//! never waits for it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::SentryConfig;
use crate::control::StopSignal;
use crate::detect::build_detector;
use crate::dispatch::{DetectionDispatcher, DispatchDecision, ShutdownPolicy};
use crate::ingest::{open_source, FrameSource};
use crate::motion::MotionGate;
use crate::preview::{HeadlessPreview, Preview, PreviewFrame, SnapshotPreview};
use crate::sink::FileSink;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);
pub const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopSettings {
    /// Pause between iterations.
    pub poll_interval: Duration,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    pub shutdown: ShutdownPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_frames: None,
            shutdown: ShutdownPolicy::Abandon,
        }
    }
}

/// Why the loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    EndOfStream,
    CaptureFailed,
    StopRequested,
    FrameLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames_processed: u64,
    pub motion_frames: u64,
    pub jobs_launched: u64,
    /// Motion frames dropped because a job was already in flight.
    pub busy_frames: u64,
    /// Motion frames whose detection job could not be started.
    pub failed_launches: u64,
    pub exit_reason: ExitReason,
}

#[derive(Default)]
struct Counters {
    frames: u64,
    motion: u64,
    busy: u64,
    failed: u64,
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    gate: MotionGate,
    dispatcher: DetectionDispatcher,
    preview: Box<dyn Preview>,
    stop: StopSignal,
    settings: LoopSettings,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        gate: MotionGate,
        dispatcher: DetectionDispatcher,
        stop: StopSignal,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            gate,
            dispatcher,
            preview: Box::new(HeadlessPreview),
            stop,
            settings,
        }
    }

    pub fn with_preview(mut self, preview: Box<dyn Preview>) -> Self {
        self.preview = preview;
        self
    }

    /// Wire up source, gate, detector, sink and preview from configuration.
    pub fn from_config(cfg: &SentryConfig, stop: StopSignal) -> Result<Self> {
        let detector = build_detector(&cfg.detector)?;
        let sink = Arc::new(FileSink::new(&cfg.output_path)?);
        let gate = MotionGate::new(cfg.motion.clone())?;
        let source = open_source(&cfg.source)?;
        let preview: Box<dyn Preview> = match &cfg.preview.dir {
            Some(dir) => Box::new(SnapshotPreview::new(dir, cfg.preview.every_n_frames)?),
            None => Box::new(HeadlessPreview),
        };
        Ok(Self::new(
            source,
            gate,
            DetectionDispatcher::new(detector, sink),
            stop,
            cfg.run.clone(),
        )
        .with_preview(preview))
    }

    /// Run until end of stream, capture failure, stop request, or frame limit.
    ///
    /// The source is released exactly once and the preview closed on every
    /// path out, including a failed connect.
    pub fn run(self) -> Result<LoopSummary> {
        let CaptureLoop {
            mut source,
            mut gate,
            mut dispatcher,
            mut preview,
            stop,
            settings,
        } = self;

        let mut counters = Counters::default();
        let result = source
            .connect()
            .with_context(|| format!("failed to connect to {}", source.describe()))
            .and_then(|()| {
                drive(
                    source.as_mut(),
                    &mut gate,
                    &mut dispatcher,
                    preview.as_mut(),
                    &stop,
                    &settings,
                    &mut counters,
                )
            });

        source.release();
        preview.close();
        let jobs_launched = dispatcher.jobs_launched();
        dispatcher.shutdown(settings.shutdown);

        let exit_reason = result?;
        let summary = LoopSummary {
            frames_processed: counters.frames,
            motion_frames: counters.motion,
            jobs_launched,
            busy_frames: counters.busy,
            failed_launches: counters.failed,
            exit_reason,
        };
        log::info!(
            "capture loop finished ({:?}): frames={} motion={} jobs={} busy={} failed={}",
            summary.exit_reason,
            summary.frames_processed,
            summary.motion_frames,
            summary.jobs_launched,
            summary.busy_frames,
            summary.failed_launches
        );
        Ok(summary)
    }
}

fn drive(
    source: &mut dyn FrameSource,
    gate: &mut MotionGate,
    dispatcher: &mut DetectionDispatcher,
    preview: &mut dyn Preview,
    stop: &StopSignal,
    settings: &LoopSettings,
    counters: &mut Counters,
) -> Result<ExitReason> {
    let mut last_health_log = Instant::now();

    loop {
        if stop.is_stop_requested() {
            log::info!("stop requested");
            return Ok(ExitReason::StopRequested);
        }
        if settings.max_frames.is_some_and(|max| counters.frames >= max) {
            log::info!("frame limit of {} reached", counters.frames);
            return Ok(ExitReason::FrameLimit);
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("{}: end of stream", source.describe());
                return Ok(ExitReason::EndOfStream);
            }
            Err(err) => {
                log::warn!("{}: frame acquisition failed: {:#}", source.describe(), err);
                return Ok(ExitReason::CaptureFailed);
            }
        };
        counters.frames += 1;

        let outcome = gate.evaluate(&frame);
        if outcome.motion_detected {
            counters.motion += 1;
        }
        match dispatcher.dispatch(outcome.motion_detected, &frame) {
            DispatchDecision::Busy => {
                counters.busy += 1;
                log::trace!("frame #{}: motion while busy, dropped", frame.sequence);
            }
            DispatchDecision::Launched { job_id } => {
                log::debug!("frame #{}: motion, job #{}", frame.sequence, job_id);
            }
            DispatchDecision::Failed => counters.failed += 1,
            DispatchDecision::NoMotion => {}
        }

        let view = PreviewFrame {
            frame: &frame,
            regions: &outcome.regions,
            mask: &outcome.mask,
        };
        if let Err(err) = preview.present(&view) {
            log::warn!("preview failed: {:#}", err);
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            log::info!(
                "source={} frames={} motion={} jobs={} busy={} failed={} in_flight={}",
                stats.source,
                stats.frames_captured,
                counters.motion,
                dispatcher.jobs_launched(),
                counters.busy,
                counters.failed,
                dispatcher.is_busy()
            );
            last_health_log = Instant::now();
        }

        if !settings.poll_interval.is_zero() {
            std::thread::sleep(settings.poll_interval);
        }
    }
}
