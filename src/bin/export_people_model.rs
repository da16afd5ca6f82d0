//! export_people_model - write OpenCV's default people detector as a JSON
//! linear SVM model for the `hog-svm` backend

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use motion_sentry::detect::{default_people_detector, LinearSvm, DEFAULT_MODEL_PATH};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Output path for the model.
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    output: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let coefficients = default_people_detector()?.to_vec();
    let model = LinearSvm::from_detector(&coefficients)?;
    model.save(&args.output)?;
    log::info!(
        "wrote {} weights (bias {:.4}) to {}",
        model.weights.len(),
        model.bias,
        args.output.display()
    );
    Ok(())
}
