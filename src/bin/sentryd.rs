//! sentryd - motion-gated person detection daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source
//! 2. Runs the motion gate on every frame
//! 3. Starts at most one person detection job at a time on motion
//! 4. Overwrites the output image whenever a person is found
//!
//! Stop with Ctrl-C or by typing the stop command (default `q`) on stdin.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use motion_sentry::capture::CaptureLoop;
use motion_sentry::config::SentryConfig;
use motion_sentry::control::{
    install_interrupt_handler, spawn_stop_command_listener, StopSignal,
};
use motion_sentry::dispatch::ShutdownPolicy;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "SENTRY_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: stub://walker, /dev/video0, an image directory or a video file.
    #[arg(long)]
    source: Option<String>,
    /// Where to write the annotated detection image.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Person detector: opencv-hog, hog-svm or stub.
    #[arg(long)]
    detector: Option<String>,
    /// Linear SVM model (JSON) for the hog-svm detector. Default: models/people.json.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Write frame.png and mask.png previews into this directory.
    #[arg(long)]
    preview_dir: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Do not listen for the stop command on stdin.
    #[arg(long)]
    no_stdin: bool,
    /// Wait for an in-flight detection job before exiting.
    #[arg(long)]
    join_on_exit: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = SentryConfig::layered(args.config.as_deref())?;
    apply_args(&mut cfg, &args)?;
    cfg.validate()?;

    let stop = StopSignal::new();
    install_interrupt_handler(&stop)?;
    if !args.no_stdin {
        // Never joined: it stays blocked on stdin until the process exits.
        let _listener = spawn_stop_command_listener(stop.clone(), cfg.stop_command.clone())?;
    }

    log::info!(
        "sentryd {} watching {} (detector={:?}, output={})",
        env!("CARGO_PKG_VERSION"),
        cfg.source.uri,
        cfg.detector.kind,
        cfg.output_path.display()
    );
    log::info!(
        "motion area threshold {} px, kernel {}, learning {:?}",
        cfg.motion.area_threshold,
        cfg.motion.kernel_size,
        cfg.motion.learning
    );
    log::info!("type '{}' + Enter or press Ctrl-C to stop", cfg.stop_command);

    let summary = CaptureLoop::from_config(&cfg, stop)?.run()?;
    log::info!(
        "sentryd stopped ({:?}) after {} frames, {} with motion, {} detection jobs",
        summary.exit_reason,
        summary.frames_processed,
        summary.motion_frames,
        summary.jobs_launched
    );
    Ok(())
}

/// Command-line flags win over the config file and environment.
fn apply_args(cfg: &mut SentryConfig, args: &Args) -> Result<()> {
    if let Some(source) = &args.source {
        cfg.source.uri = source.clone();
    }
    if let Some(output) = &args.output {
        cfg.output_path = output.clone();
    }
    if let Some(detector) = &args.detector {
        cfg.detector.kind = detector.parse()?;
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = Some(model.clone());
    }
    if let Some(dir) = &args.preview_dir {
        cfg.preview.dir = Some(dir.clone());
    }
    if args.max_frames.is_some() {
        cfg.run.max_frames = args.max_frames;
    }
    if args.join_on_exit {
        cfg.run.shutdown = ShutdownPolicy::Join;
    }
    Ok(())
}
