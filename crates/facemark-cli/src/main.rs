use anyhow::{Context, Result};
use clap::Parser;
use facemark_core::aligner::OnnxLandmarkAligner;
use facemark_core::detector::{DetectorConfig, OnnxFaceDetector};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod batch;
mod visualize;
mod writer;

/// Locate one face per listed image and write its bounding box and five
/// facial landmarks, one line per image.
#[derive(Parser)]
#[command(name = "facemark", about = "Batch face landmark locator")]
struct Cli {
    /// Face detection ONNX model
    detect_model: String,
    /// Landmark alignment ONNX model
    align_model: String,
    /// Text file listing one image path per line
    image_list: PathBuf,
    /// Destination file for the landmark records
    output: PathBuf,
    /// Pass any value to also save annotated image copies
    visualize: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // A malformed invocation prints usage and exits 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().context("printing usage")?;
            return Ok(());
        }
    };

    let config = DetectorConfig::default();
    let mut detector =
        OnnxFaceDetector::load(&cli.detect_model, &config).context("loading detection model")?;
    let mut aligner =
        OnnxLandmarkAligner::load(&cli.align_model).context("loading alignment model")?;

    let summary = batch::run(
        &mut detector,
        &mut aligner,
        &cli.image_list,
        &cli.output,
        cli.visualize.is_some(),
    )?;

    tracing::info!(
        lines = summary.lines_consumed,
        records = summary.records_written,
        "batch complete"
    );

    Ok(())
}
