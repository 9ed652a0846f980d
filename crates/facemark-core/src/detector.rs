//! Anchor-free ONNX face detector behind the pipeline's detection seam.
//!
//! Decodes 3-stride score/bbox heads, applies NMS, and returns candidates in
//! the detector's own confidence ranking. Callers must not re-sort: "first
//! candidate" means whatever this ranking puts first.

use crate::buffer::ImageBuffer;
use crate::types::FaceRegion;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_NMS_THRESHOLD: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Scan parameters handed to the detection engine at startup.
///
/// Built once before the batch loop and never mutated mid-run. The pyramid
/// and window-step fields describe pyramid-scanning backends; the bundled
/// anchor-free backend consumes `score_thresh` and `min_face_size` and
/// carries the rest through untouched.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Smallest face (edge length, pixels) worth reporting.
    pub min_face_size: u32,
    /// Candidate confidence cutoff, in the backend's own score scale.
    pub score_thresh: f32,
    /// Multiplicative step between image-pyramid levels.
    pub pyramid_scale_factor: f32,
    /// Sliding-window stride (x, y) at each pyramid level.
    pub window_step: (u32, u32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: 40,
            score_thresh: 0.5,
            pyramid_scale_factor: 0.8,
            window_step: (4, 4),
        }
    }
}

/// Detection seam: a backend proposes zero or more ranked face regions.
///
/// An empty result is an ordinary outcome, not an error.
pub trait FaceDetect {
    fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<FaceRegion>, DetectError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Candidate box in source-image coordinates, before ranking and filtering.
#[derive(Debug, Clone)]
struct Candidate {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    score: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// ONNX-backed face detector.
pub struct OnnxFaceDetector {
    session: Session,
    config: DetectorConfig,
    input_width: usize,
    input_height: usize,
    /// Per-stride output indices [(score, bbox)] for strides [8, 16, 32].
    /// Discovered by name at load time; falls back to positional ordering.
    stride_indices: [StrideOutputIndices; 3],
}

impl OnnxFaceDetector {
    /// Load the detection model from `model_path`.
    ///
    /// A missing or malformed model file is startup-fatal: the batch must not
    /// begin without a working detector.
    pub fn load(model_path: &str, config: &DetectorConfig) -> Result<Self, DetectError> {
        if !Path::new(model_path).exists() {
            return Err(DetectError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = model_path,
            min_face_size = config.min_face_size,
            score_thresh = config.score_thresh,
            outputs = ?output_names,
            "loaded detection model"
        );

        if output_names.len() < 6 {
            return Err(DetectError::InferenceFailed(format!(
                "detection model requires 6 outputs (3 strides × score/bbox), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "detection output tensor mapping");

        Ok(Self {
            session,
            config: config.clone(),
            input_width: DET_INPUT_SIZE,
            input_height: DET_INPUT_SIZE,
            stride_indices,
        })
    }

    /// Letterbox the grayscale buffer into a normalized NCHW tensor.
    fn preprocess(&self, image: &ImageBuffer) -> (Array4<f32>, LetterboxInfo) {
        let width = image.width() as usize;
        let height = image.height() as usize;

        let scale_w = self.input_width as f32 / width as f32;
        let scale_h = self.input_height as f32 / height as f32;
        let scale = scale_w.min(scale_h);

        let new_w = (width as f32 * scale).round() as usize;
        let new_h = (height as f32 * scale).round() as usize;
        let pad_x = (self.input_width - new_w) as f32 / 2.0;
        let pad_y = (self.input_height - new_h) as f32 / 2.0;

        let resized = resize_bilinear(image.data(), width, height, new_w, new_h);

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, self.input_height, self.input_width));

        for y in 0..self.input_height {
            for x in 0..self.input_width {
                let pixel = if y >= pad_y_start
                    && y < pad_y_start + new_h
                    && x >= pad_x_start
                    && x < pad_x_start + new_w
                {
                    resized[(y - pad_y_start) * new_w + (x - pad_x_start)] as f32
                } else {
                    DET_MEAN // pad value normalizes to 0.0
                };

                let normalized = (pixel - DET_MEAN) / DET_STD;
                // Grayscale → 3-channel: replicate Y across R, G, B.
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

impl FaceDetect for OnnxFaceDetector {
    fn detect(&mut self, image: &ImageBuffer) -> Result<Vec<FaceRegion>, DetectError> {
        let (input, letterbox) = self.preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();

        for (stride_pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(
                scores,
                bboxes,
                stride,
                self.input_width,
                &letterbox,
                self.config.score_thresh,
            ));
        }

        Ok(finalize(candidates, self.config.min_face_size))
    }
}

/// Discover output tensor ordering by name.
///
/// Exports may name tensors "score_8", "bbox_16", ... or use generic numeric
/// names. When the named pattern is present it wins; otherwise the standard
/// positional layout is assumed: [0-2] = scores, [3-5] = bboxes, each over
/// strides 8/16/32.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named = DET_STRIDES
        .iter()
        .all(|&stride| find("score", stride).is_some() && find("bbox", stride).is_some());

    if named {
        tracing::info!("detector: using name-based output tensor mapping");
        std::array::from_fn(|i| {
            let stride = DET_STRIDES[i];
            (find("score", stride).unwrap(), find("bbox", stride).unwrap())
        })
    } else {
        tracing::info!(
            ?names,
            "detector: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
        );
        [(0, 3), (1, 4), (2, 5)]
    }
}

/// Decode candidates for a single stride level into source-image coordinates.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_width: usize,
    letterbox: &LetterboxInfo,
    threshold: f32,
) -> Vec<Candidate> {
    let grid_w = input_width / stride;
    let num_anchors = scores.len().min(bboxes.len() / 4);

    let mut candidates = Vec::new();

    for idx in 0..num_anchors {
        let score = scores[idx];
        if score <= threshold {
            continue;
        }

        let anchor_idx = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = (anchor_idx % grid_w) as f32 * stride as f32;
        let anchor_cy = (anchor_idx / grid_w) as f32 * stride as f32;

        // bbox head holds [left, top, right, bottom] offsets in stride units.
        let off = idx * 4;
        let x1 = anchor_cx - bboxes[off] * stride as f32;
        let y1 = anchor_cy - bboxes[off + 1] * stride as f32;
        let x2 = anchor_cx + bboxes[off + 2] * stride as f32;
        let y2 = anchor_cy + bboxes[off + 3] * stride as f32;

        // Map from letterboxed space back to the source frame.
        let src_x1 = (x1 - letterbox.pad_x) / letterbox.scale;
        let src_y1 = (y1 - letterbox.pad_y) / letterbox.scale;
        let src_x2 = (x2 - letterbox.pad_x) / letterbox.scale;
        let src_y2 = (y2 - letterbox.pad_y) / letterbox.scale;

        candidates.push(Candidate {
            x: src_x1,
            y: src_y1,
            width: src_x2 - src_x1,
            height: src_y2 - src_y1,
            score,
        });
    }

    candidates
}

/// Suppress overlaps, rank by confidence, drop sub-minimum boxes, and round
/// to integer regions.
fn finalize(candidates: Vec<Candidate>, min_face_size: u32) -> Vec<FaceRegion> {
    let mut kept = nms(candidates, DET_NMS_THRESHOLD);
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let min = min_face_size as f32;
    kept.into_iter()
        .filter(|c| c.width >= min && c.height >= min)
        .map(|c| FaceRegion {
            x: c.x.round() as i32,
            y: c.y.round() as i32,
            width: (c.width.round() as i32).max(1),
            height: (c.height.round() as i32).max(1),
            confidence: c.score,
        })
        .collect()
}

/// Non-Maximum Suppression: remove overlapping candidates.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(candidates[i].clone());

        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && iou(&candidates[i], &candidates[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection-over-Union of two candidate boxes.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Bilinear resize of a packed single-channel buffer.
fn resize_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return vec![0u8; dst_w * dst_h];
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    let mut dst = vec![0u8; dst_w * dst_h];
    for y in 0..dst_h {
        let src_y = (y as f32 + 0.5) * y_ratio - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let src_x = (x as f32 + 0.5) * x_ratio - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * src_w + x0] as f32;
            let tr = src[y0 * src_w + x1] as f32;
            let bl = src[y1 * src_w + x0] as f32;
            let br = src[y1 * src_w + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            dst[y * dst_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    dst
}
