//! Single-flight detection dispatch.
//!
//! The dispatcher owns one `JobState` flag. A detection job is launched only
//! when the current frame shows motion AND `try_begin()` flips the flag from
//! idle to running. The job clears the flag as its very last action through a
//! drop guard, so errors and panics inside the job cannot leave the
//! dispatcher stuck in `RUNNING`.
//!
//! Motion frames that arrive while a job is running are dropped from
//! detection: there is no queue and no preemption.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::detect::{DetectionResult, PersonDetector};
use crate::frame::Frame;
use crate::sink::{ResultSink, SinkOutcome};

// ----------------------------------------------------------------------------
// JobState: the in-flight flag
// ----------------------------------------------------------------------------

/// Shared `IDLE` / `RUNNING` flag.
#[derive(Debug, Default)]
pub struct JobState {
    in_flight: AtomicBool,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `IDLE -> RUNNING`. Returns false when a job is already running.
    pub fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `RUNNING -> IDLE`.
    pub fn end(&self) {
        self.in_flight.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Clears the flag when the job (or its closure, if spawning failed) drops.
struct InFlightGuard(Arc<JobState>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Outcome of offering one frame to the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchDecision {
    /// No motion on this frame.
    NoMotion,
    /// A new detection job was started.
    Launched { job_id: u64 },
    /// Motion, but a job is already in flight. The frame is dropped.
    Busy,
    /// Motion, but the job thread could not be started. The dispatcher is
    /// idle again and the next motion frame retries.
    Failed,
}

/// What to do with an in-flight job when the loop shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Leave the job running; it finishes on its own.
    #[default]
    Abandon,
    /// Wait for the job to finish.
    Join,
}

struct JobHandle {
    id: u64,
    join: JoinHandle<()>,
}

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Starts a job on a thread with the given name. On error the job must have
/// been dropped unrun.
pub(crate) type SpawnJob = fn(String, Job) -> io::Result<JoinHandle<()>>;

fn spawn_named(name: String, job: Job) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name(name).spawn(job)
}

pub struct DetectionDispatcher {
    state: Arc<JobState>,
    detector: Arc<dyn PersonDetector>,
    sink: Arc<dyn ResultSink>,
    jobs: Vec<JobHandle>,
    launched: u64,
    spawn: SpawnJob,
}

impl DetectionDispatcher {
    pub fn new(detector: Arc<dyn PersonDetector>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            state: Arc::new(JobState::new()),
            detector,
            sink,
            jobs: Vec::new(),
            launched: 0,
            spawn: spawn_named,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_spawner(mut self, spawn: SpawnJob) -> Self {
        self.spawn = spawn;
        self
    }

    /// True while a detection job is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.is_running()
    }

    /// Number of jobs launched so far.
    pub fn jobs_launched(&self) -> u64 {
        self.launched
    }

    /// Offer one gated frame.
    ///
    /// On launch the frame is deep-copied; the caller keeps its buffer. A
    /// job that cannot be started is logged and reported as `Failed`; it
    /// never ends the capture session.
    pub fn dispatch(&mut self, motion_detected: bool, frame: &Frame) -> DispatchDecision {
        self.reap_finished();

        if !motion_detected {
            return DispatchDecision::NoMotion;
        }
        if !self.state.try_begin() {
            return DispatchDecision::Busy;
        }

        let guard = InFlightGuard(self.state.clone());
        let job_id = self.launched + 1;
        let snapshot = frame.snapshot();
        let detector = self.detector.clone();
        let sink = self.sink.clone();

        let job: Job = Box::new(move || {
            // Clears the flag when this closure returns, after the sink.
            let _guard = guard;
            run_job(job_id, detector.as_ref(), sink.as_ref(), snapshot);
        });
        let join = match (self.spawn)(format!("detect-{}", job_id), job) {
            Ok(join) => join,
            Err(err) => {
                // Normally already cleared by the dropped guard.
                self.state.end();
                log::error!(
                    "failed to start detection job for frame #{}: {}",
                    frame.sequence,
                    err
                );
                return DispatchDecision::Failed;
            }
        };

        self.launched = job_id;
        self.jobs.push(JobHandle { id: job_id, join });
        log::debug!("detection job #{} launched on frame #{}", job_id, frame.sequence);
        DispatchDecision::Launched { job_id }
    }

    /// Apply the shutdown policy to any outstanding job.
    pub fn shutdown(mut self, policy: ShutdownPolicy) {
        self.reap_finished();
        match policy {
            ShutdownPolicy::Join => {
                for job in self.jobs.drain(..) {
                    log::info!("waiting for detection job #{} to finish", job.id);
                    observe(job);
                }
            }
            ShutdownPolicy::Abandon => {
                for job in self.jobs.drain(..) {
                    log::info!(
                        "detection job #{} still running at shutdown; leaving it to finish",
                        job.id
                    );
                }
            }
        }
    }

    /// Join finished job threads so panics are reported.
    fn reap_finished(&mut self) {
        let (done, running): (Vec<JobHandle>, Vec<JobHandle>) =
            self.jobs.drain(..).partition(|job| job.join.is_finished());
        self.jobs = running;
        for job in done {
            observe(job);
        }
    }
}

fn observe(job: JobHandle) {
    if job.join.join().is_err() {
        log::error!("detection job #{} panicked", job.id);
    }
}

fn run_job(job_id: u64, detector: &dyn PersonDetector, sink: &dyn ResultSink, frame: Frame) {
    let started = Instant::now();
    let sequence = frame.sequence;

    let detections = match detector.detect(&frame) {
        Ok(detections) => detections,
        Err(err) => {
            log::error!(
                "detection job #{} ({}) failed on frame #{}: {:#}",
                job_id,
                detector.name(),
                sequence,
                err
            );
            return;
        }
    };

    match sink.publish(DetectionResult::new(frame, detections)) {
        Ok(SinkOutcome::Persisted(path)) => log::debug!(
            "detection job #{} finished in {:?}, result at {}",
            job_id,
            started.elapsed(),
            path.display()
        ),
        Ok(SinkOutcome::Skipped) => log::debug!(
            "detection job #{} finished in {:?}, no person",
            job_id,
            started.elapsed()
        ),
        Err(err) => log::error!(
            "detection job #{} could not persist frame #{}: {:#}",
            job_id,
            sequence,
            err
        ),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use anyhow::{anyhow, Result};
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Scripted {
        fail: bool,
        panic: bool,
    }

    impl PersonDetector for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            if self.panic {
                panic!("detector blew up");
            }
            if self.fail {
                return Err(anyhow!("malformed frame"));
            }
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Counting {
        published: AtomicUsize,
    }

    impl ResultSink for Counting {
        fn publish(&self, _result: DetectionResult) -> Result<SinkOutcome> {
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(SinkOutcome::Skipped)
        }
    }

    fn frame() -> Frame {
        Frame::from_image(1, RgbImage::new(8, 8))
    }

    fn wait_idle(dispatcher: &DetectionDispatcher) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while dispatcher.is_busy() {
            assert!(Instant::now() < deadline, "job never finished");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn job_state_is_single_flight() {
        let state = JobState::new();
        assert!(state.try_begin());
        assert!(state.is_running());
        assert!(!state.try_begin());
        state.end();
        assert!(!state.is_running());
        assert!(state.try_begin());
    }

    #[test]
    fn no_motion_never_launches() -> Result<()> {
        let sink = Arc::new(Counting::default());
        let mut dispatcher = DetectionDispatcher::new(
            Arc::new(Scripted {
                fail: false,
                panic: false,
            }),
            sink.clone(),
        );
        for _ in 0..5 {
            assert_eq!(dispatcher.dispatch(false, &frame()), DispatchDecision::NoMotion);
        }
        assert_eq!(dispatcher.jobs_launched(), 0);
        assert_eq!(sink.published.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn failed_job_returns_to_idle() -> Result<()> {
        let sink = Arc::new(Counting::default());
        let mut dispatcher = DetectionDispatcher::new(
            Arc::new(Scripted {
                fail: true,
                panic: false,
            }),
            sink.clone(),
        );
        assert_eq!(
            dispatcher.dispatch(true, &frame()),
            DispatchDecision::Launched { job_id: 1 }
        );
        wait_idle(&dispatcher);
        assert_eq!(sink.published.load(Ordering::SeqCst), 0);
        assert_eq!(
            dispatcher.dispatch(true, &frame()),
            DispatchDecision::Launched { job_id: 2 }
        );
        dispatcher.shutdown(ShutdownPolicy::Join);
        Ok(())
    }

    #[test]
    fn panicking_job_returns_to_idle() -> Result<()> {
        let mut dispatcher = DetectionDispatcher::new(
            Arc::new(Scripted {
                fail: false,
                panic: true,
            }),
            Arc::new(Counting::default()),
        );
        dispatcher.dispatch(true, &frame());
        wait_idle(&dispatcher);
        assert!(matches!(
            dispatcher.dispatch(true, &frame()),
            DispatchDecision::Launched { job_id: 2 }
        ));
        dispatcher.shutdown(ShutdownPolicy::Join);
        Ok(())
    }

    fn refuse_to_spawn(_name: String, _job: Job) -> io::Result<JoinHandle<()>> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"))
    }

    #[test]
    fn spawn_failure_is_reported_and_recoverable() -> Result<()> {
        let sink = Arc::new(Counting::default());
        let detector = Arc::new(Scripted {
            fail: false,
            panic: false,
        });
        let mut dispatcher =
            DetectionDispatcher::new(detector, sink.clone()).with_spawner(refuse_to_spawn);
        assert_eq!(dispatcher.dispatch(true, &frame()), DispatchDecision::Failed);
        assert!(!dispatcher.is_busy());
        assert_eq!(dispatcher.jobs_launched(), 0);
        assert_eq!(dispatcher.dispatch(true, &frame()), DispatchDecision::Failed);

        dispatcher.spawn = spawn_named;
        assert_eq!(
            dispatcher.dispatch(true, &frame()),
            DispatchDecision::Launched { job_id: 1 }
        );
        dispatcher.shutdown(ShutdownPolicy::Join);
        assert_eq!(sink.published.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
