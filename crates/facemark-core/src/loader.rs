//! Image loading — decode files into packed grayscale or color buffers.

use crate::buffer::{BufferError, ImageBuffer};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

/// Decode the image at `path` into a single-channel grayscale buffer.
///
/// The decoded rows come back tightly packed from the `image` crate, so the
/// length-checked [`ImageBuffer`] constructor is the only stride guard needed.
/// A decode failure here is recoverable: callers skip the image and keep the
/// batch going.
pub fn load_grayscale(path: &Path) -> Result<ImageBuffer, LoadError> {
    let decoded = image::open(path).map_err(|source| LoadError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    let gray = decoded.to_luma8();
    let (width, height) = gray.dimensions();
    Ok(ImageBuffer::new(gray.into_raw(), width, height, 1)?)
}

/// Decode the image at `path` in color, for annotation output.
///
/// Deliberately a second decode of the same file: it only runs after
/// detection found a face, so images with no detections never pay for it.
pub fn load_color(path: &Path) -> Result<image::RgbImage, LoadError> {
    let decoded = image::open(path).map_err(|source| LoadError::Decode {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decoded.to_rgb8())
}
