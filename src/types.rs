//! Shared types used by every component.
//!
//! These types are persisted in the metadata store and returned across the
//! caller-facing API, so their serialized shape is part of the contract with
//! the UI layer (which predicts file names and reads these records back).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable numeric identifier of a source asset.
pub type AssetId = u64;

/// A rectangle to cut out of an image, in pixels of the resolution it is
/// applied to.
///
/// Coordinates are floating point because the interactive selection UI works
/// in scaled display space; they are rounded to whole pixels when applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Optional resize applied before cropping. At least one side must be given;
/// the other is derived from the aspect ratio of the image being resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResizeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ResizeRequest {
    /// True when neither side carries a usable (non-zero) value.
    pub fn is_empty(&self) -> bool {
        self.width.unwrap_or(0) == 0 && self.height.unwrap_or(0) == 0
    }
}

/// A registered size-variant definition (process-wide configuration).
///
/// A zero `width` or `height` means that axis is unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeDefinition {
    pub name: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Crop to exactly `width`×`height` (centre crop) instead of fitting inside.
    #[serde(default)]
    pub crop: bool,
}

impl SizeDefinition {
    pub fn new(name: &str, width: u32, height: u32, crop: bool) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            crop,
        }
    }
}

/// A rendered size variant as recorded on the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeVariant {
    /// File name, in the same directory as the original.
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    /// File name of this variant's WebP derivative, when one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp_file: Option<String>,
}

/// The per-asset image metadata record.
///
/// `file` is the original's path as the store knows it; the variants in
/// `sizes` live next to it on disk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttachmentMetadata {
    pub file: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sizes: BTreeMap<String, SizeVariant>,
}

impl AttachmentMetadata {
    /// The record reduced to the original's own `file`, `width` and `height`.
    pub fn original_only(&self) -> Self {
        Self {
            file: self.file.clone(),
            width: self.width,
            height: self.height,
            sizes: BTreeMap::new(),
        }
    }
}

/// A user-named, persistent crop (+ optional resize) derivative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropProfile {
    pub filename: String,
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub created: String,
    /// The rectangle as the caller supplied it (before any resize rescaling).
    pub crop_data: CropRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_data: Option<ResizeRequest>,
}

/// Crop profiles of one asset, keyed by sanitized profile name.
pub type CropProfiles = BTreeMap<String, CropProfile>;

/// Status of one registered size on one asset, as shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeInfo {
    pub name: String,
    pub target_width: u32,
    pub target_height: u32,
    pub crop: bool,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_height: Option<u32>,
    /// Absolute path of the variant file; empty when the variant is missing.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_path: String,
}
