//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, transcode, crop, and resize.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! and `webp` crates. Components only ever see the trait, so tests swap in
//! the recording [`MockBackend`](tests::MockBackend).
//!
//! Every write operation is all-or-nothing: the encoded bytes go to a
//! temporary file in the output directory which is renamed into place only
//! after the encoder succeeded. A failed operation never leaves a partial
//! file at the output path.

use super::params::{CropParams, ResizeParams, TranscodeParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported image format: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Trait for image processing backends.
///
/// The write operations return the dimensions of the image they wrote.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Encode a JPEG, PNG or GIF source as lossy WebP.
    ///
    /// The source type is detected from content, not from the extension.
    /// Any other content is [`BackendError::Unsupported`].
    fn transcode(&self, params: &TranscodeParams) -> Result<Dimensions, BackendError>;

    /// Execute a crop operation (optional resize, crop, optional downscale).
    fn crop(&self, params: &CropParams) -> Result<Dimensions, BackendError>;

    /// Render a size variant.
    fn resize(&self, params: &ResizeParams) -> Result<Dimensions, BackendError>;
}
