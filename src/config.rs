//! Engine configuration.
//!
//! One immutable [`EngineConfig`] is loaded at startup and handed to every
//! component when it is constructed. Algorithmic code never reads settings
//! from anywhere else.
//!
//! ## Config File
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [webp]
//! quality = 80            # WebP encoding quality (1-100)
//! auto_convert = true     # Transcode uploads and regenerated sizes
//! keep_original = true    # false = replace uploads by their WebP
//!
//! [features]
//! crop = true
//! regenerate = true
//!
//! [preview]
//! dir = "previews"        # Relative to the library root
//! max_edge = 300
//!
//! [processing]
//! # max_processes = 4     # Omit for auto = CPU cores
//! batch_size = 5          # Bulk regenerate / cleanup
//! convert_batch_size = 3  # Bulk convert
//!
//! [[sizes]]
//! name = "thumbnail"
//! width = 150
//! height = 150
//! crop = true
//! ```
//!
//! Config files are sparse: values not given keep their stock default.
//! A `[[sizes]]` list, when present, replaces the default list entirely.
//! Unknown keys are rejected to catch typos early.

use crate::imaging::Quality;
use crate::types::SizeDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Transcoding settings.
    pub webp: WebpConfig,
    /// Feature switches for the caller-facing operations.
    pub features: FeaturesConfig,
    /// Crop preview settings.
    pub preview: PreviewConfig,
    /// Parallelism and batching for bulk operations.
    pub processing: ProcessingConfig,
    /// Registered size variants, in display order.
    pub sizes: Vec<SizeDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            webp: WebpConfig::default(),
            features: FeaturesConfig::default(),
            preview: PreviewConfig::default(),
            processing: ProcessingConfig::default(),
            sizes: default_sizes(),
        }
    }
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.webp.quality) {
            return Err(ConfigError::Validation(
                "webp.quality must be 1-100".into(),
            ));
        }
        if self.preview.max_edge == 0 {
            return Err(ConfigError::Validation(
                "preview.max_edge must be non-zero".into(),
            ));
        }
        if self.processing.batch_size == 0 || self.processing.convert_batch_size == 0 {
            return Err(ConfigError::Validation(
                "processing batch sizes must be non-zero".into(),
            ));
        }
        let mut seen = HashSet::new();
        for size in &self.sizes {
            if size.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "sizes entries need a name".into(),
                ));
            }
            if size.width == 0 && size.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "size '{}' needs a non-zero width or height",
                    size.name
                )));
            }
            if !seen.insert(size.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "size '{}' is defined twice",
                    size.name
                )));
            }
        }
        Ok(())
    }

    /// Configured WebP quality as a [`Quality`].
    pub fn quality(&self) -> Quality {
        Quality::new(self.webp.quality)
    }
}

/// Transcoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebpConfig {
    /// WebP encoding quality (1 = worst, 100 = best).
    pub quality: u32,
    /// Transcode uploads and freshly generated size variants automatically.
    pub auto_convert: bool,
    /// Keep the uploaded original next to its WebP derivative.
    pub keep_original: bool,
}

impl Default for WebpConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            auto_convert: true,
            keep_original: true,
        }
    }
}

/// Feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeaturesConfig {
    pub crop: bool,
    pub regenerate: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            crop: true,
            regenerate: true,
        }
    }
}

/// Crop preview settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreviewConfig {
    /// Directory for preview files, relative to the library root.
    pub dir: String,
    /// Previews are scaled down to fit a `max_edge` square.
    pub max_edge: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            dir: "previews".to_string(),
            max_edge: 300,
        }
    }
}

/// Parallelism and batching for bulk operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Assets per batch for bulk regenerate and cleanup.
    pub batch_size: usize,
    /// Assets per batch for bulk conversion (encoding is slower).
    pub convert_batch_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            batch_size: 5,
            convert_batch_size: 3,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// The stock size registry.
pub fn default_sizes() -> Vec<SizeDefinition> {
    vec![
        SizeDefinition::new("thumbnail", 150, 150, true),
        SizeDefinition::new("medium", 300, 300, false),
        SizeDefinition::new("medium_large", 768, 0, false),
        SizeDefinition::new("large", 1024, 1024, false),
    ]
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(EngineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values (including arrays such as `sizes`) replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<EngineConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, or stock defaults when `path` is `None`.
///
/// A path that does not exist is an error: an explicitly named config file
/// silently falling back to defaults would hide typos.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let overlay = match path {
        Some(p) => {
            let content = fs::read_to_string(p)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(overlay)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# media-derive configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# WebP transcoding
# ---------------------------------------------------------------------------
[webp]
# Encoding quality, 1 (smallest) to 100 (best).
quality = 80

# Transcode new uploads and every regenerated size variant.
auto_convert = true

# Keep the uploaded original. When false, an upload is replaced by its WebP
# derivative and the asset points at the .webp file from then on.
keep_original = true

# ---------------------------------------------------------------------------
# Features
# ---------------------------------------------------------------------------
[features]
crop = true
regenerate = true

# ---------------------------------------------------------------------------
# Crop previews
# ---------------------------------------------------------------------------
[preview]
# Directory for preview JPEGs, relative to the library root.
dir = "previews"
# Previews are scaled down to fit a square of this edge length.
max_edge = 300

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for bulk operations.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Assets per batch for bulk regenerate / cleanup.
batch_size = 5

# Assets per batch for bulk conversion.
convert_batch_size = 3

# ---------------------------------------------------------------------------
# Registered sizes
# ---------------------------------------------------------------------------
# A zero width or height leaves that axis unconstrained. `crop = true` cuts
# the variant to exactly width x height around the centre; otherwise the
# image is fitted inside the box. Variants are never enlarged.
# Giving any [[sizes]] entry replaces this whole list.

[[sizes]]
name = "thumbnail"
width = 150
height = 150
crop = true

[[sizes]]
name = "medium"
width = 300
height = 300

[[sizes]]
name = "medium_large"
width = 768
height = 0

[[sizes]]
name = "large"
width = 1024
height = 1024
"##
}
