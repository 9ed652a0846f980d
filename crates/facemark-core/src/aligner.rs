//! Five-point landmark regression behind the pipeline's alignment seam.
//!
//! Crops the detected face region, resizes it to the model's square input,
//! and maps the regressed crop-relative coordinates back into image space.

use crate::buffer::ImageBuffer;
use crate::types::{FaceRegion, Landmark, Landmarks, LANDMARK_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ALIGN_INPUT_SIZE: usize = 112;
const ALIGN_MEAN: f32 = 127.5;
const ALIGN_STD: f32 = 128.0;
const ALIGN_OUTPUT_LEN: usize = LANDMARK_COUNT * 2;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected 10 landmark coordinates, got {0}")]
    BadOutput(usize),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Alignment seam: exactly five landmarks per face, in fixed anatomical
/// order — left eye, right eye, nose tip, left mouth corner, right mouth
/// corner.
///
/// Callers only invoke this with a region the detector actually proposed;
/// region validation is the backend's concern.
pub trait AlignLandmarks {
    fn align(&mut self, image: &ImageBuffer, face: &FaceRegion) -> Result<Landmarks, AlignError>;
}

/// ONNX-backed coarse-to-fine landmark regressor.
pub struct OnnxLandmarkAligner {
    session: Session,
}

impl OnnxLandmarkAligner {
    /// Load the alignment model from `model_path`. Startup-fatal on failure.
    pub fn load(model_path: &str) -> Result<Self, AlignError> {
        if !Path::new(model_path).exists() {
            return Err(AlignError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded alignment model"
        );

        Ok(Self { session })
    }

    /// Normalize a square grayscale crop into a NCHW tensor, Y replicated
    /// across the three channels.
    fn preprocess(crop: &[u8]) -> Array4<f32> {
        let size = ALIGN_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for y in 0..size {
            for x in 0..size {
                let pixel = crop.get(y * size + x).copied().unwrap_or(0) as f32;
                let normalized = (pixel - ALIGN_MEAN) / ALIGN_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        tensor
    }
}

impl AlignLandmarks for OnnxLandmarkAligner {
    fn align(&mut self, image: &ImageBuffer, face: &FaceRegion) -> Result<Landmarks, AlignError> {
        let crop = crop_region(image, face, ALIGN_INPUT_SIZE);
        let input = Self::preprocess(&crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AlignError::InferenceFailed(format!("landmark regression: {e}")))?;

        if raw.len() != ALIGN_OUTPUT_LEN {
            return Err(AlignError::BadOutput(raw.len()));
        }

        Ok(map_to_image(raw, face))
    }
}

/// Map regressed crop-normalized coordinates (x, y in [0, 1] pairs) back to
/// image coordinates within `face`.
fn map_to_image(raw: &[f32], face: &FaceRegion) -> Landmarks {
    std::array::from_fn(|i| Landmark {
        x: face.x as f32 + raw[i * 2] * face.width as f32,
        y: face.y as f32 + raw[i * 2 + 1] * face.height as f32,
    })
}

/// Resample `face` from `image` into a square `size`×`size` grayscale crop.
///
/// Border-clamped bilinear sampling: a region poking past the frame edge
/// repeats the edge pixel rather than failing, so an aggressive detector box
/// degrades instead of crashing the stage.
fn crop_region(image: &ImageBuffer, face: &FaceRegion, size: usize) -> Vec<u8> {
    let src = image.data();
    let src_w = image.width() as i64;
    let src_h = image.height() as i64;

    let mut crop = vec![0u8; size * size];
    if src_w == 0 || src_h == 0 {
        return crop;
    }

    let x_ratio = face.width as f32 / size as f32;
    let y_ratio = face.height as f32 / size as f32;

    let sample = |x: i64, y: i64| -> f32 {
        let cx = x.clamp(0, src_w - 1);
        let cy = y.clamp(0, src_h - 1);
        src[(cy * src_w + cx) as usize] as f32
    };

    for oy in 0..size {
        let sy = face.y as f32 + (oy as f32 + 0.5) * y_ratio - 0.5;
        let y0 = sy.floor() as i64;
        let fy = (sy - sy.floor()).clamp(0.0, 1.0);

        for ox in 0..size {
            let sx = face.x as f32 + (ox as f32 + 0.5) * x_ratio - 0.5;
            let x0 = sx.floor() as i64;
            let fx = (sx - sx.floor()).clamp(0.0, 1.0);

            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            crop[oy * size + ox] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    crop
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: i32, y: i32, w: i32, h: i32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    #[test]
    fn test_map_to_image_corners_and_center() {
        let raw = [
            0.0, 0.0, // top-left of the crop
            1.0, 0.0, // top-right
            0.5, 0.5, // center
            0.0, 1.0, // bottom-left
            1.0, 1.0, // bottom-right
        ];
        let face = region(10, 20, 100, 100);
        let points = map_to_image(&raw, &face);

        assert_eq!(points[0], Landmark { x: 10.0, y: 20.0 });
        assert_eq!(points[1], Landmark { x: 110.0, y: 20.0 });
        assert_eq!(points[2], Landmark { x: 60.0, y: 70.0 });
        assert_eq!(points[3], Landmark { x: 10.0, y: 120.0 });
        assert_eq!(points[4], Landmark { x: 110.0, y: 120.0 });
    }

    #[test]
    fn test_map_to_image_preserves_order() {
        let raw: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let face = region(0, 0, 10, 10);
        let points = map_to_image(&raw, &face);

        // Pair i must come from raw[2i], raw[2i+1] — the order the model
        // emits is the order callers see.
        for (i, point) in points.iter().enumerate() {
            assert!((point.x - (i as f32 * 2.0)).abs() < 1e-6);
            assert!((point.y - (i as f32 * 2.0 + 1.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_crop_region_uniform() {
        let image = ImageBuffer::new(vec![77u8; 200 * 200], 200, 200, 1).unwrap();
        let crop = crop_region(&image, &region(50, 50, 100, 100), 112);
        assert_eq!(crop.len(), 112 * 112);
        assert!(crop.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_crop_region_picks_correct_area() {
        // Left half black, right half white; crop the right half.
        let w = 100usize;
        let h = 100usize;
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in w / 2..w {
                data[y * w + x] = 255;
            }
        }
        let image = ImageBuffer::new(data, w as u32, h as u32, 1).unwrap();

        let crop = crop_region(&image, &region(60, 20, 30, 30), 112);
        assert!(crop.iter().all(|&p| p == 255));
    }

    #[test]
    fn test_crop_region_out_of_bounds_clamps() {
        let image = ImageBuffer::new(vec![42u8; 50 * 50], 50, 50, 1).unwrap();
        // Region hangs off every edge of the frame.
        let crop = crop_region(&image, &region(-20, -20, 90, 90), 112);
        assert_eq!(crop.len(), 112 * 112);
        assert!(crop.iter().all(|&p| p == 42));
    }

    #[test]
    fn test_crop_region_empty_image() {
        let image = ImageBuffer::new(vec![], 0, 0, 1).unwrap();
        let crop = crop_region(&image, &region(0, 0, 10, 10), 112);
        assert!(crop.iter().all(|&p| p == 0));
    }

    #[test]
    fn test_preprocess_normalization_range() {
        let crop = vec![255u8; ALIGN_INPUT_SIZE * ALIGN_INPUT_SIZE];
        let tensor = OnnxLandmarkAligner::preprocess(&crop);
        let v = tensor[[0, 0, 0, 0]];
        assert!((v - (255.0 - ALIGN_MEAN) / ALIGN_STD).abs() < 1e-6);
        // Replicated across channels.
        assert_eq!(tensor[[0, 1, 5, 5]], tensor[[0, 0, 5, 5]]);
        assert_eq!(tensor[[0, 2, 5, 5]], tensor[[0, 0, 5, 5]]);
    }
}
