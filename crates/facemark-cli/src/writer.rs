//! Line-oriented record output.

use anyhow::{Context, Result};
use facemark_core::types::ResultRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Buffered writer for the batch's output stream.
///
/// One line per record; nothing is written for skipped images. Buffered
/// content is flushed by [`finish`](Self::finish) at batch end.
pub struct RecordWriter {
    out: BufWriter<File>,
}

impl RecordWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("creating output file {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Append one record and its newline.
    pub fn write_record(&mut self, record: &ResultRecord) -> Result<()> {
        writeln!(self.out, "{}", format_record(record)).context("writing record")
    }

    /// Flush buffered records to disk.
    pub fn finish(mut self) -> Result<()> {
        self.out.flush().context("flushing output file")
    }
}

/// `<path> <x> <y> <w> <h>` followed by the five landmark pairs, single
/// spaces throughout, no trailing delimiter. Whole-valued landmark
/// coordinates print without a fractional part.
fn format_record(record: &ResultRecord) -> String {
    let face = &record.face;
    let mut line = format!(
        "{} {} {} {} {}",
        record.path, face.x, face.y, face.width, face.height
    );
    for point in &record.landmarks {
        line.push_str(&format!(" {} {}", point.x, point.y));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use facemark_core::types::{FaceRegion, Landmark};
    use std::path::PathBuf;

    fn sample_record() -> ResultRecord {
        ResultRecord {
            path: "a.jpg".to_string(),
            face: FaceRegion {
                x: 10,
                y: 20,
                width: 100,
                height: 100,
                confidence: 0.9,
            },
            landmarks: [
                Landmark { x: 30.0, y: 50.0 },
                Landmark { x: 70.0, y: 50.0 },
                Landmark { x: 50.0, y: 70.0 },
                Landmark { x: 35.0, y: 90.0 },
                Landmark { x: 65.0, y: 90.0 },
            ],
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("facemark-writer-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_format_record_exact_layout() {
        assert_eq!(
            format_record(&sample_record()),
            "a.jpg 10 20 100 100 30 50 70 50 50 70 35 90 65 90"
        );
    }

    #[test]
    fn test_format_record_fourteen_fields_after_path() {
        let line = format_record(&sample_record());
        let fields: Vec<&str> = line.split(' ').collect();
        assert_eq!(fields.len(), 15);
        assert_eq!(fields[0], "a.jpg");
        for field in &fields[1..] {
            assert!(field.parse::<f32>().is_ok(), "non-numeric field {field}");
        }
    }

    #[test]
    fn test_format_record_fractional_landmarks() {
        let mut record = sample_record();
        record.landmarks[0].x = 30.5;
        let line = format_record(&record);
        assert!(line.contains(" 30.5 50 "));
    }

    #[test]
    fn test_write_and_finish() {
        let path = temp_path("out.txt");
        let mut writer = RecordWriter::create(&path).unwrap();
        writer.write_record(&sample_record()).unwrap();
        writer.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "a.jpg 10 20 100 100 30 50 70 50 50 70 35 90 65 90\n"
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_empty_writer_creates_empty_file() {
        let path = temp_path("empty.txt");
        let writer = RecordWriter::create(&path).unwrap();
        writer.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        std::fs::remove_file(&path).ok();
    }
}
