//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the components (which decide what file to produce and
//! where) and the [`backend`](super::backend) (which does the pixel work).
//! All geometry arrives here already resolved: the backend never rescales
//! or clamps a rectangle itself.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`PixelRect`]: A crop region in whole pixels, known to lie inside the image.
//! - [`TranscodeParams`]: Source → WebP derivative.
//! - [`CropParams`]: Optional exact resize, crop, optional downscale, encode.
//! - [`ResizeParams`]: Size-variant rendering (fit or centre-crop fill).

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    /// Strict constructor for caller-supplied values: `None` when out of range.
    pub fn checked(value: u32) -> Option<Self> {
        (1..=100).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// A crop region in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Parameters for a transcode to the derivative format.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub quality: Quality,
}

/// Parameters for a crop operation.
///
/// Steps run in order: `resize` (exact, if any), crop `region`, `downscale`
/// to fit (if any), encode in the format named by `output`'s extension.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub resize: Option<(u32, u32)>,
    pub region: PixelRect,
    pub downscale: Option<(u32, u32)>,
    pub quality: Quality,
}

/// Parameters for rendering one size variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Fill the box and centre-crop instead of resizing to exactly `width`×`height`.
    pub fill: bool,
    pub quality: Quality,
}
