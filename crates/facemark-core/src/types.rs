use serde::{Deserialize, Serialize};

/// Number of landmarks located per face.
pub const LANDMARK_COUNT: usize = 5;

/// Axis-aligned face bounding box proposed by a detector, with its
/// confidence score. Coordinates are image-relative, top-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

/// A single 2D facial keypoint in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// Five landmarks in fixed anatomical order:
/// [left_eye, right_eye, nose_tip, left_mouth, right_mouth].
pub type Landmarks = [Landmark; LANDMARK_COUNT];

/// One output unit of the pipeline: source path, the face picked for that
/// image, and its five landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub path: String,
    pub face: FaceRegion,
    pub landmarks: Landmarks,
}
