//! The per-line batch loop: load, detect, align, write, annotate.
//!
//! One input line is fully processed before the next is read. Per-image
//! failures skip the line; only startup and output-stream failures abort.

use crate::visualize;
use crate::writer::RecordWriter;
use anyhow::{Context, Result};
use facemark_core::aligner::AlignLandmarks;
use facemark_core::detector::FaceDetect;
use facemark_core::loader;
use facemark_core::types::ResultRecord;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Emit a progress line every this many input lines consumed.
const PROGRESS_INTERVAL: usize = 7;

/// Counters reported once the whole list has been consumed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Input lines read, including blank and skipped ones.
    pub lines_consumed: usize,
    /// Records actually written to the output stream.
    pub records_written: usize,
}

/// Drive the whole list through load → detect → align → write.
///
/// The output file is created up front, so an empty or fully-skipped list
/// still leaves an empty output behind.
pub fn run<D: FaceDetect, A: AlignLandmarks>(
    detector: &mut D,
    aligner: &mut A,
    list_path: &Path,
    output_path: &Path,
    visualize_enabled: bool,
) -> Result<BatchSummary> {
    let list = File::open(list_path)
        .with_context(|| format!("opening image list {}", list_path.display()))?;
    let mut writer = RecordWriter::create(output_path)?;
    let mut summary = BatchSummary::default();

    for line in BufReader::new(list).lines() {
        let line =
            line.with_context(|| format!("reading image list {}", list_path.display()))?;
        summary.lines_consumed += 1;
        if summary.lines_consumed % PROGRESS_INTERVAL == 0 {
            tracing::info!(lines = summary.lines_consumed, "progress");
        }

        let path = line.trim();
        if path.is_empty() {
            continue;
        }

        let image = match loader::load_grayscale(Path::new(path)) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path, error = %err, "skipping unreadable image");
                continue;
            }
        };

        let faces = match detector.detect(&image) {
            Ok(faces) => faces,
            Err(err) => {
                tracing::warn!(path, error = %err, "detection failed, skipping image");
                continue;
            }
        };

        // Only the backend's top-ranked candidate is used; the rest are
        // discarded unseen.
        let Some(face) = faces.into_iter().next() else {
            tracing::debug!(path, "no face found");
            continue;
        };

        let landmarks = match aligner.align(&image, &face) {
            Ok(points) => points,
            Err(err) => {
                tracing::warn!(path, error = %err, "alignment failed, skipping image");
                continue;
            }
        };

        let record = ResultRecord {
            path: path.to_string(),
            face,
            landmarks,
        };
        writer.write_record(&record)?;
        summary.records_written += 1;

        if visualize_enabled {
            if let Err(err) = visualize::annotate_to_file(Path::new(path), &record) {
                tracing::warn!(path, error = %err, "annotation failed");
            }
        }
    }

    writer.finish()?;
    Ok(summary)
}
