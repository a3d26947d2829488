//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate, format sniffed from content |
//! | Resize (exact) | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Size variant fill | `image::DynamicImage::resize_to_fill` |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Encode → WebP | `webp::Encoder` (libwebp, lossy) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with quality |
//! | Encode → PNG / GIF | `image::DynamicImage::write_to` |
//! | Atomic write | `tempfile::Builder::tempfile_in` + `persist` |
//!
//! Transcoding accepts JPEG, PNG and GIF sources only (a GIF contributes its
//! first frame). Crop and resize also accept WebP sources, since crop
//! profiles and variants may be cut from an existing derivative.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{CropParams, Quality, ResizeParams, TranscodeParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::{BufReader, Cursor, Write};
use std::fs::File;
use std::path::Path;

/// Source formats a transcode accepts.
const TRANSCODE_INPUTS: &[ImageFormat] = &[ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

/// Source formats crop and resize accept.
const EDIT_INPUTS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(path: &Path, err: ImageError) -> BackendError {
    match err {
        ImageError::IoError(e) => BackendError::Io(e),
        ImageError::Unsupported(e) => {
            BackendError::Unsupported(format!("{}: {}", path.display(), e))
        }
        other => BackendError::Decode(format!("Failed to decode {}: {}", path.display(), other)),
    }
}

fn open_reader(path: &Path) -> Result<ImageReader<BufReader<File>>, BackendError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader)
}

/// Load and decode an image from disk, accepting only `allowed` content types.
fn load_image(path: &Path, allowed: &[ImageFormat]) -> Result<DynamicImage, BackendError> {
    let reader = open_reader(path)?;
    match reader.format() {
        Some(format) if allowed.contains(&format) => {}
        Some(format) => {
            return Err(BackendError::Unsupported(format!(
                "{} is {:?}",
                path.display(),
                format
            )));
        }
        None => {
            return Err(BackendError::Unsupported(format!(
                "{} is not a recognized image",
                path.display()
            )));
        }
    }
    reader.decode().map_err(|e| decode_error(path, e))
}

/// Encode `img` in the format named by `path`'s extension.
fn encode_image(img: &DynamicImage, path: &Path, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut buf = Vec::new();
    let encode_err = |e: ImageError| BackendError::Encode(e.to_string());
    match ext.as_str() {
        "webp" => return encode_webp(img, quality),
        "jpg" | "jpeg" => {
            let rgb = img.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.value() as u8)
                .encode_image(&rgb)
                .map_err(encode_err)?;
        }
        "png" => img
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(encode_err)?,
        "gif" => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
            .map_err(encode_err)?,
        other => {
            return Err(BackendError::Unsupported(format!(
                "Unsupported output format: {}",
                other
            )));
        }
    }
    Ok(buf)
}

/// Largest width or height a WebP bitstream can carry.
const WEBP_MAX_DIMENSION: u32 = 16_383;

/// Lossy WebP via libwebp. The encoder only takes 8-bit RGB(A), so other
/// pixel layouts (16-bit, grey, palette expanded by the PNG decoder) are
/// normalized first, keeping alpha when the source has it.
fn encode_webp(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    if img.width() > WEBP_MAX_DIMENSION || img.height() > WEBP_MAX_DIMENSION {
        return Err(BackendError::Encode(format!(
            "{}x{} exceeds the WebP limit of {WEBP_MAX_DIMENSION} pixels per side",
            img.width(),
            img.height()
        )));
    }
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&normalized)
        .map_err(|e| BackendError::Encode(format!("WebP encoder rejected image: {e}")))?;
    let encoded = encoder
        .encode_simple(false, quality.value() as f32)
        .map_err(|e| BackendError::Encode(format!("WebP encoding failed: {e:?}")))?;
    if encoded.is_empty() {
        return Err(BackendError::Encode("WebP encoder produced no data".into()));
    }
    Ok(encoded.to_vec())
}

/// Write `bytes` to `path` via a temp file in the same directory.
///
/// The temp file is removed on any failure, so `path` either receives the
/// complete contents or is left as it was. The result carries the
/// permissions of `like` (the source image) instead of the temp file's
/// owner-only mode.
fn write_atomic(path: &Path, bytes: &[u8], like: &Path) -> Result<(), BackendError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".derive-")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    let permissions = std::fs::metadata(like)?.permissions();
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| BackendError::Io(e.error))?;
    Ok(())
}

fn save_image(
    img: &DynamicImage,
    path: &Path,
    source: &Path,
    quality: Quality,
) -> Result<Dimensions, BackendError> {
    let bytes = encode_image(img, path, quality)?;
    write_atomic(path, &bytes, source)?;
    Ok(Dimensions::new(img.width(), img.height()))
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = open_reader(path)?
            .into_dimensions()
            .map_err(|e| decode_error(path, e))?;
        Ok(Dimensions { width, height })
    }

    fn transcode(&self, params: &TranscodeParams) -> Result<Dimensions, BackendError> {
        let img = load_image(&params.source, TRANSCODE_INPUTS)?;
        let bytes = encode_webp(&img, params.quality)?;
        write_atomic(&params.output, &bytes, &params.source)?;
        Ok(Dimensions::new(img.width(), img.height()))
    }

    fn crop(&self, params: &CropParams) -> Result<Dimensions, BackendError> {
        let mut img = load_image(&params.source, EDIT_INPUTS)?;

        if let Some((w, h)) = params.resize {
            img = img.resize_exact(w, h, FilterType::Lanczos3);
        }

        let r = params.region;
        if r.width == 0
            || r.height == 0
            || r.x.saturating_add(r.width) > img.width()
            || r.y.saturating_add(r.height) > img.height()
        {
            return Err(BackendError::Encode(format!(
                "crop region {}x{}+{}+{} outside {}x{} image",
                r.width,
                r.height,
                r.x,
                r.y,
                img.width(),
                img.height()
            )));
        }
        let mut cropped = img.crop_imm(r.x, r.y, r.width, r.height);

        if let Some((w, h)) = params.downscale {
            cropped = cropped.resize_exact(w, h, FilterType::Lanczos3);
        }

        save_image(&cropped, &params.output, &params.source, params.quality)
    }

    fn resize(&self, params: &ResizeParams) -> Result<Dimensions, BackendError> {
        let img = load_image(&params.source, EDIT_INPUTS)?;
        let rendered = if params.fill {
            // Fill-resize then center-crop to exact dimensions
            img.resize_to_fill(params.width, params.height, FilterType::Lanczos3)
        } else {
            img.resize_exact(params.width, params.height, FilterType::Lanczos3)
        };
        save_image(&rendered, &params.output, &params.source, params.quality)
    }
}
