//! Image processing on the `image` and `webp` crates.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` (content sniffed) |
//! | **Transcode → WebP** | `image` decode + `webp::Encoder` |
//! | **Crop** | `resize_exact` + `crop_imm` (+ downscale) |
//! | **Size variant** | `resize_to_fill` (crop) or `resize_exact` (fit) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{
    MAX_RESIZE_PIXELS, MAX_RESIZE_SIDE, VariantGeometry, clamp_crop_rect, fit_within,
    resolve_resize, scale_crop_rect, variant_dimensions, within_resize_limits,
};
pub use operations::render_size_variants;
pub use params::{CropParams, PixelRect, Quality, ResizeParams, TranscodeParams};
pub use rust_backend::RustBackend;
