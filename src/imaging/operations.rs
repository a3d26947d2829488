//! High-level image operations.
//!
//! Combines the geometry calculations with backend execution.

use super::backend::{BackendError, ImageBackend};
use super::calculations::{VariantGeometry, variant_dimensions};
use super::params::{Quality, ResizeParams};
use crate::naming;
use crate::types::{SizeDefinition, SizeVariant};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Render the registered size variants of `source`.
///
/// Variants are written next to the source as `<stem>-<w>x<h>.<ext>`, in
/// the source's own format. Definitions that would reproduce the original
/// are skipped. Two definitions resolving to the same geometry share one
/// file. The first backend failure aborts the whole set and removes the
/// files this call already wrote.
pub fn render_size_variants(
    backend: &impl ImageBackend,
    source: &Path,
    original_dims: (u32, u32),
    definitions: &[SizeDefinition],
    quality: Quality,
) -> Result<BTreeMap<String, SizeVariant>> {
    let dir = source.parent().unwrap_or(Path::new(""));
    let mut written: Vec<PathBuf> = Vec::new();
    render_into(backend, source, dir, original_dims, definitions, quality, &mut written).inspect_err(
        |_| {
            for path in &written {
                let _ = std::fs::remove_file(path);
            }
        },
    )
}

fn render_into(
    backend: &impl ImageBackend,
    source: &Path,
    dir: &Path,
    original_dims: (u32, u32),
    definitions: &[SizeDefinition],
    quality: Quality,
    written: &mut Vec<PathBuf>,
) -> Result<BTreeMap<String, SizeVariant>> {
    let mime_type = naming::mime_type_for(source);
    let mut variants = BTreeMap::new();

    for def in definitions {
        let Some(VariantGeometry {
            width,
            height,
            fill,
        }) = variant_dimensions(original_dims, def)
        else {
            continue;
        };

        let file = naming::variant_file_name(source, width, height);
        let output = dir.join(&file);
        let rendered = backend.resize(&ResizeParams {
            source: source.to_path_buf(),
            output: output.clone(),
            width,
            height,
            fill,
            quality,
        })?;
        written.push(output);

        variants.insert(
            def.name.clone(),
            SizeVariant {
                file,
                width: rendered.width,
                height: rendered.height,
                mime_type: mime_type.to_string(),
                webp_file: None,
            },
        );
    }

    Ok(variants)
}
