//! Transcoder: raster source → lossy WebP derivative.
//!
//! [`Transcoder::convert`] is the single-file primitive every other
//! component builds on. The derivative always lands at
//! [`derivative_path_for`] of the source, overwriting whatever was there, so
//! converting the same source twice with the same quality is idempotent.
//!
//! Every failure (missing source, undecodable or unsupported content,
//! encoder failure, write failure) surfaces as
//! [`EngineError::ConversionFailed`], whose [`kind`](EngineError::kind)
//! still tells the caller which of those it was. The backend writes
//! atomically, so a failed conversion never leaves a truncated derivative.
//!
//! The asset-level helpers layer the metadata store on top:
//! - [`Transcoder::convert_asset`] converts an asset's original and every
//!   recorded size variant, recording each derivative.
//! - [`Transcoder::ingest_upload`] is the upload hook: transcode when
//!   auto-conversion is on, then either keep the original or replace it.

use crate::config::WebpConfig;
use crate::error::EngineError;
use crate::imaging::{BackendError, ImageBackend, Quality, TranscodeParams};
use crate::naming::{self, derivative_path_for};
use crate::store::MetadataStore;
use crate::types::AssetId;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Outcome of converting an asset and its size variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetConversion {
    pub webp_path: PathBuf,
    /// Number of size variants that received a derivative.
    pub converted_sizes: usize,
    /// Size variants whose conversion failed (non-fatal).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sizes: Vec<String>,
}

/// What the upload hook did with a newly registered asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Auto-conversion is off or the source is not a convertible raster.
    Skipped,
    /// Derivative written next to the kept original.
    Converted { webp_path: PathBuf },
    /// Derivative written and the asset repointed at it; original removed.
    Replaced { webp_path: PathBuf },
}

pub struct Transcoder<'a, B: ImageBackend> {
    backend: &'a B,
}

impl<'a, B: ImageBackend> Transcoder<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Convert `source` to its WebP derivative. Returns the derivative path.
    pub fn convert(&self, source: &Path, quality: Quality) -> Result<PathBuf, EngineError> {
        self.try_convert(source, quality)
            .map_err(|cause| EngineError::ConversionFailed {
                path: source.to_path_buf(),
                cause: Box::new(cause),
            })
    }

    fn try_convert(&self, source: &Path, quality: Quality) -> Result<PathBuf, EngineError> {
        if !source.is_file() {
            return Err(EngineError::SourceNotFound(source.to_path_buf()));
        }
        let output = derivative_path_for(source);
        if output == source {
            return Err(BackendError::Unsupported(format!(
                "{} already has the derivative extension",
                source.display()
            ))
            .into());
        }

        self.backend.transcode(&TranscodeParams {
            source: source.to_path_buf(),
            output: output.clone(),
            quality,
        })?;
        tracing::debug!(source = %source.display(), output = %output.display(), quality = quality.value(), "transcoded");
        Ok(output)
    }

    /// Convert an asset's original and its recorded size variants.
    ///
    /// Failing to convert the original fails the operation. Variant
    /// failures are logged and listed in the outcome; variants whose file
    /// no longer exists are skipped.
    pub fn convert_asset(
        &self,
        store: &dyn MetadataStore,
        id: AssetId,
        quality: Quality,
    ) -> Result<AssetConversion, EngineError> {
        let source = store
            .attached_file(id)?
            .ok_or(EngineError::AssetNotFound(id))?;

        let webp_path = self.convert(&source, quality)?;
        store.set_webp_path(id, Some(&webp_path))?;

        let mut converted_sizes = 0;
        let mut failed_sizes = Vec::new();

        if let Some(mut metadata) = store.metadata(id)? {
            let dir = source.parent().unwrap_or(Path::new(""));
            for (name, variant) in metadata.sizes.iter_mut() {
                let Some(variant_path) = naming::sibling_path(dir, &variant.file) else {
                    continue;
                };
                if !variant_path.is_file() {
                    continue;
                }
                match self.convert(&variant_path, quality) {
                    Ok(derivative) => {
                        variant.webp_file = derivative
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned());
                        converted_sizes += 1;
                    }
                    Err(e) => {
                        tracing::warn!(asset = id, size = %name, error = %e, "size variant conversion failed");
                        failed_sizes.push(name.clone());
                    }
                }
            }
            if converted_sizes > 0 {
                store.set_metadata(id, &metadata)?;
            }
        }

        tracing::info!(asset = id, converted_sizes, "converted asset");
        Ok(AssetConversion {
            webp_path,
            converted_sizes,
            failed_sizes,
        })
    }

    /// Upload-time hook for a freshly registered asset.
    ///
    /// With `keep_original` off the asset is repointed at the derivative
    /// before the original is deleted. The two steps are not atomic: a crash
    /// in between leaves an orphaned original, never a dangling record.
    pub fn ingest_upload(
        &self,
        store: &dyn MetadataStore,
        id: AssetId,
        webp: &WebpConfig,
    ) -> Result<IngestOutcome, EngineError> {
        let source = store
            .attached_file(id)?
            .ok_or(EngineError::AssetNotFound(id))?;

        if !webp.auto_convert || !naming::has_convertible_extension(&source) {
            return Ok(IngestOutcome::Skipped);
        }

        let quality = Quality::checked(webp.quality).ok_or_else(|| {
            EngineError::validation(format!("quality {} outside 1-100", webp.quality))
        })?;
        let webp_path = self.convert(&source, quality)?;

        if webp.keep_original {
            store.set_webp_path(id, Some(&webp_path))?;
            return Ok(IngestOutcome::Converted { webp_path });
        }

        store.set_attached_file(id, &webp_path)?;
        store.set_webp_path(id, None)?;
        if let Some(mut metadata) = store.metadata(id)? {
            metadata.file = webp_path.display().to_string();
            store.set_metadata(id, &metadata)?;
        }
        if let Err(e) = std::fs::remove_file(&source) {
            tracing::warn!(path = %source.display(), error = %e, "could not remove replaced original");
        }
        Ok(IngestOutcome::Replaced { webp_path })
    }
}
