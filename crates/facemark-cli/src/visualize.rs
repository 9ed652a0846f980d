//! Annotated copies of matched images — box outline plus landmark markers.

use facemark_core::loader::{self, LoadError};
use facemark_core::types::ResultRecord;
use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Appended to the source path to name the annotated copy; the extension
/// picks the encoder.
const ANNOTATED_SUFFIX: &str = ".landmarks.jpg";

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARKER_RADIUS: i32 = 2;

#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to save annotated image: {0}")]
    Save(#[from] image::ImageError),
}

/// Where the annotated copy of `source` lands.
pub fn annotated_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(ANNOTATED_SUFFIX);
    PathBuf::from(name)
}

/// Re-decode `source` in color, draw the record over it, and save the copy.
///
/// Failures here are best-effort territory: the caller logs and moves on.
pub fn annotate_to_file(source: &Path, record: &ResultRecord) -> Result<(), AnnotateError> {
    let mut img = loader::load_color(source)?;
    draw_annotations(&mut img, record);
    img.save(annotated_path(source))?;
    Ok(())
}

/// Hollow rectangle over the face box, filled circle on each landmark.
fn draw_annotations(img: &mut image::RgbImage, record: &ResultRecord) {
    let face = &record.face;
    if face.width > 0 && face.height > 0 {
        let rect = Rect::at(face.x, face.y).of_size(face.width as u32, face.height as u32);
        draw_hollow_rect_mut(img, rect, BOX_COLOR);
    }

    for point in &record.landmarks {
        draw_filled_circle_mut(
            img,
            (point.x.round() as i32, point.y.round() as i32),
            MARKER_RADIUS,
            MARKER_COLOR,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facemark_core::types::{FaceRegion, Landmark};

    fn sample_record() -> ResultRecord {
        ResultRecord {
            path: "x.jpg".to_string(),
            face: FaceRegion {
                x: 10,
                y: 10,
                width: 40,
                height: 40,
                confidence: 0.9,
            },
            landmarks: [
                Landmark { x: 20.0, y: 25.0 },
                Landmark { x: 40.0, y: 25.0 },
                Landmark { x: 30.0, y: 32.0 },
                Landmark { x: 22.0, y: 42.0 },
                Landmark { x: 38.0, y: 42.0 },
            ],
        }
    }

    #[test]
    fn test_annotated_path_appends_suffix() {
        assert_eq!(
            annotated_path(Path::new("photos/a.jpg")),
            PathBuf::from("photos/a.jpg.landmarks.jpg")
        );
    }

    #[test]
    fn test_draw_box_outline() {
        let mut img = image::RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        draw_annotations(&mut img, &sample_record());

        // Box corner is red.
        assert_eq!(*img.get_pixel(10, 10), Rgb([255, 0, 0]));
        // Box interior (away from any landmark) is untouched.
        assert_eq!(*img.get_pixel(15, 15), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_landmark_markers() {
        let mut img = image::RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        draw_annotations(&mut img, &sample_record());

        for point in &sample_record().landmarks {
            let pixel = img.get_pixel(point.x as u32, point.y as u32);
            assert_eq!(*pixel, Rgb([0, 255, 0]), "no marker at ({}, {})", point.x, point.y);
        }
    }

    #[test]
    fn test_draw_degenerate_box_does_not_panic() {
        let mut img = image::RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let mut record = sample_record();
        record.face.width = 0;
        record.face.height = 0;
        draw_annotations(&mut img, &record);
    }
}
