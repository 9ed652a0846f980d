//! Owned, tightly packed pixel buffer with explicit geometry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer length mismatch: {width}x{height}x{channels} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
}

/// Row-major pixel buffer with no inter-row padding.
///
/// `data.len() == width * height * channels` always holds; any source row
/// stride must be stripped before construction. Downstream stages index rows
/// by `width` alone.
#[derive(Debug, Clone)]
pub struct ImageBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl ImageBuffer {
    /// Wrap a packed buffer, rejecting any length that does not match the
    /// stated geometry.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, BufferError> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(BufferError::LengthMismatch {
                width,
                height,
                channels,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }
}
