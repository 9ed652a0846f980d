//! facemark-core — face detection and five-point landmark alignment.
//!
//! ONNX Runtime backends behind the `FaceDetect` and `AlignLandmarks` seams,
//! plus the packed pixel buffer both stages consume.

pub mod aligner;
pub mod buffer;
pub mod detector;
pub mod loader;
pub mod types;

pub use buffer::ImageBuffer;
pub use types::{FaceRegion, Landmark, Landmarks, ResultRecord, LANDMARK_COUNT};
