//! Crop/Resize engine.
//!
//! Cuts rectangles out of an asset's original and keeps track of the
//! results. Three kinds of output, all written atomically by the backend:
//!
//! | Operation | Output | Metadata |
//! |---|---|---|
//! | [`apply_profile`](CropEngine::apply_profile) | `<stem>-<slug>.webp` | crop-profile map, keyed by slug |
//! | [`crop_size`](CropEngine::crop_size) | `<stem>[-<size>]-crop-<ts>.<ext>` | replaces the named size variant |
//! | [`preview`](CropEngine::preview) | `preview-<id>-<ts>.jpg` in the preview dir | none |
//!
//! ## Coordinate spaces
//!
//! The caller always draws its rectangle against the on-disk original.
//! When a profile requests a resize first, the rectangle is rescaled per
//! axis by `resized / original` before it is applied, then rounded and
//! clamped to the working image. A rectangle with no overlap at all is a
//! validation failure and nothing is written.
//!
//! ## Failure guarantees
//!
//! The profile record is written only after the file exists. If recording
//! a brand-new profile fails, its file is removed again, so the store never
//! points at a missing file and no orphan is left for a profile that was
//! never recorded.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::imaging::{
    CropParams, ImageBackend, MAX_RESIZE_PIXELS, MAX_RESIZE_SIDE, Quality, clamp_crop_rect,
    fit_within, resolve_resize, scale_crop_rect, within_resize_limits,
};
use crate::naming;
use crate::regenerate::{delete_variant_files, protected_paths};
use crate::store::{MetadataStore, VariantRegistry};
use crate::transcode::Transcoder;
use crate::types::{
    AssetId, AttachmentMetadata, CropProfile, CropProfiles, CropRect, ResizeRequest, SizeInfo,
    SizeVariant,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A freshly written crop profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileResult {
    pub profile: String,
    pub filename: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// A freshly written ad-hoc crop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdhocCrop {
    pub filename: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webp_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

pub struct CropEngine<'a, B: ImageBackend> {
    backend: &'a B,
    store: &'a dyn MetadataStore,
    registry: &'a dyn VariantRegistry,
    config: &'a EngineConfig,
    preview_root: Option<PathBuf>,
}

fn validate_rect(rect: &CropRect) -> Result<(), EngineError> {
    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(EngineError::validation("crop rectangle must be finite"));
    }
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return Err(EngineError::validation(
            "crop rectangle must have positive width and height",
        ));
    }
    Ok(())
}

fn outside_image() -> EngineError {
    EngineError::validation("crop rectangle lies outside the image")
}

fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove file"),
    }
}

impl<'a, B: ImageBackend> CropEngine<'a, B> {
    pub fn new(
        backend: &'a B,
        store: &'a dyn MetadataStore,
        registry: &'a dyn VariantRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            backend,
            store,
            registry,
            config,
            preview_root: None,
        }
    }

    /// Directory a relative `[preview] dir` is resolved against. Defaults
    /// to the asset's own directory.
    pub fn with_preview_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.preview_root = Some(root.into());
        self
    }

    /// Absolute path of an asset's original, which must exist on disk.
    fn source_of(&self, id: AssetId) -> Result<PathBuf, EngineError> {
        let source = self
            .store
            .attached_file(id)?
            .ok_or(EngineError::AssetNotFound(id))?;
        if !source.is_file() {
            return Err(EngineError::SourceNotFound(source));
        }
        Ok(source)
    }

    /// Crop (optionally after a resize) and save as the named profile.
    pub fn apply_profile(
        &self,
        id: AssetId,
        profile_name: &str,
        rect: CropRect,
        resize: Option<ResizeRequest>,
        quality: Quality,
    ) -> Result<ProfileResult, EngineError> {
        let slug = naming::sanitize_profile_name(profile_name)
            .ok_or_else(|| EngineError::validation("profile name is empty"))?;
        if naming::is_reserved_profile_slug(&slug) {
            return Err(EngineError::validation(format!(
                "profile name '{slug}' is reserved for size variants"
            )));
        }
        validate_rect(&rect)?;
        if resize.as_ref().is_some_and(ResizeRequest::is_empty) {
            return Err(EngineError::validation(
                "resize request needs a width or a height",
            ));
        }

        let source = self.source_of(id)?;
        let original = self.backend.identify(&source)?.as_tuple();

        let (working, working_rect, resize_to) = match &resize {
            Some(request) => {
                let resized = resolve_resize(original, request)
                    .ok_or_else(|| EngineError::validation("resize request has no usable size"))?;
                if !within_resize_limits(resized) {
                    return Err(EngineError::validation(format!(
                        "resize target {}x{} exceeds the limit of {MAX_RESIZE_SIDE}px per side and {MAX_RESIZE_PIXELS} pixels",
                        resized.0, resized.1
                    )));
                }
                (resized, scale_crop_rect(&rect, original, resized), Some(resized))
            }
            None => (original, rect, None),
        };
        let region = clamp_crop_rect(&working_rect, working).ok_or_else(outside_image)?;

        let filename = naming::profile_file_name(&source, &slug);
        let dir = source.parent().unwrap_or(Path::new(""));
        let output = dir.join(&filename);
        // Moved onto `output` only after the record is saved
        let staged = dir.join(format!(".staged-{filename}"));

        let previous = self.store.crop_profiles(id)?;
        let mut profiles = previous.clone();

        let rendered = match self.backend.crop(&CropParams {
            source: source.clone(),
            output: staged.clone(),
            resize: resize_to,
            region,
            downscale: None,
            quality,
        }) {
            Ok(rendered) => rendered,
            Err(e) => {
                remove_if_present(&staged);
                return Err(e.into());
            }
        };

        profiles.insert(
            slug.clone(),
            CropProfile {
                filename: filename.clone(),
                path: output.display().to_string(),
                width: rendered.width,
                height: rendered.height,
                created: local_timestamp(),
                crop_data: rect,
                resize_data: resize,
            },
        );
        if let Err(e) = self.store.set_crop_profiles(id, &profiles) {
            remove_if_present(&staged);
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&staged, &output) {
            remove_if_present(&staged);
            if let Err(restore) = self.store.set_crop_profiles(id, &previous) {
                tracing::error!(asset = id, profile = %slug, error = %restore, "could not restore crop profiles after failed move");
            }
            return Err(e.into());
        }

        tracing::info!(asset = id, profile = %slug, width = rendered.width, height = rendered.height, "saved crop profile");
        Ok(ProfileResult {
            profile: slug,
            filename,
            path: output,
            width: rendered.width,
            height: rendered.height,
        })
    }

    /// Remove a crop profile's record and its file.
    pub fn delete_profile(
        &self,
        id: AssetId,
        profile_name: &str,
    ) -> Result<CropProfile, EngineError> {
        let slug = naming::sanitize_profile_name(profile_name)
            .ok_or_else(|| EngineError::validation("profile name is empty"))?;

        let mut profiles = self.store.crop_profiles(id)?;
        let removed = profiles
            .remove(&slug)
            .ok_or_else(|| EngineError::ProfileNotFound {
                asset: id,
                profile: slug.clone(),
            })?;
        self.store.set_crop_profiles(id, &profiles)?;

        // Only the recorded file name is trusted, resolved next to the original
        let dir = match self.store.attached_file(id)? {
            Some(source) => source.parent().map(Path::to_path_buf),
            None => Path::new(&removed.path).parent().map(Path::to_path_buf),
        };
        if let Some(file) = dir.and_then(|d| naming::sibling_path(&d, &removed.filename)) {
            remove_if_present(&file);
        }

        tracing::info!(asset = id, profile = %slug, "deleted crop profile");
        Ok(removed)
    }

    /// Crop the original, keeping its format, and optionally make the
    /// result the new rendering of a registered size.
    pub fn crop_size(
        &self,
        id: AssetId,
        rect: CropRect,
        size_name: Option<&str>,
        quality: Quality,
    ) -> Result<AdhocCrop, EngineError> {
        validate_rect(&rect)?;
        let size_name = size_name.map(str::trim).filter(|s| !s.is_empty());
        if let Some(name) = size_name
            && !self.registry.definitions().iter().any(|d| d.name == name)
        {
            return Err(EngineError::validation(format!("unknown size '{name}'")));
        }

        let source = self.source_of(id)?;
        let original = self.backend.identify(&source)?.as_tuple();
        let region = clamp_crop_rect(&rect, original).ok_or_else(outside_image)?;

        let dir = source.parent().unwrap_or(Path::new("")).to_path_buf();
        let filename =
            naming::adhoc_crop_file_name(&source, size_name, chrono::Utc::now().timestamp());
        let output = dir.join(&filename);

        let rendered = self.backend.crop(&CropParams {
            source: source.clone(),
            output: output.clone(),
            resize: None,
            region,
            downscale: None,
            quality,
        })?;

        let webp_path = if self.config.webp.auto_convert {
            match Transcoder::new(self.backend).convert(&output, quality) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(path = %output.display(), error = %e, "ad-hoc crop conversion failed");
                    None
                }
            }
        } else {
            None
        };

        if let Some(name) = size_name {
            let mut metadata = self.store.metadata(id)?.unwrap_or_else(|| AttachmentMetadata {
                file: source.display().to_string(),
                width: original.0,
                height: original.1,
                sizes: BTreeMap::new(),
            });
            let replaced = metadata.sizes.insert(
                name.to_string(),
                SizeVariant {
                    file: filename.clone(),
                    width: rendered.width,
                    height: rendered.height,
                    mime_type: naming::mime_type_for(&output).to_string(),
                    webp_file: webp_path
                        .as_deref()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().into_owned()),
                },
            );

            if let Err(e) = self.store.set_metadata(id, &metadata) {
                remove_if_present(&output);
                if let Some(webp) = &webp_path {
                    remove_if_present(webp);
                }
                return Err(e.into());
            }

            // Retire the previous rendering unless another size still uses it
            if let Some(old) = replaced
                && !metadata.sizes.values().any(|v| v.file == old.file)
            {
                let protected = protected_paths(&dir, &source, &self.store.crop_profiles(id)?);
                delete_variant_files(&dir, &protected, &old);
            }
        }

        tracing::info!(asset = id, file = %filename, "saved ad-hoc crop");
        Ok(AdhocCrop {
            filename,
            path: output,
            width: rendered.width,
            height: rendered.height,
            size: size_name.map(str::to_string),
            webp_path,
        })
    }

    /// Render a small JPEG of the crop for on-screen confirmation.
    pub fn preview(&self, id: AssetId, rect: CropRect) -> Result<Preview, EngineError> {
        validate_rect(&rect)?;
        let source = self.source_of(id)?;
        let original = self.backend.identify(&source)?.as_tuple();
        let region = clamp_crop_rect(&rect, original).ok_or_else(outside_image)?;

        let edge = self.config.preview.max_edge;
        let fitted = fit_within((region.width, region.height), (edge, edge));
        let downscale = (fitted != (region.width, region.height)).then_some(fitted);

        let root = match &self.preview_root {
            Some(root) => root.clone(),
            None => source.parent().unwrap_or(Path::new("")).to_path_buf(),
        };
        let dir = root.join(&self.config.preview.dir);
        std::fs::create_dir_all(&dir)?;
        let output = dir.join(naming::preview_file_name(id, chrono::Utc::now().timestamp()));

        let rendered = self.backend.crop(&CropParams {
            source,
            output: output.clone(),
            resize: None,
            region,
            downscale,
            quality: self.config.quality(),
        })?;

        Ok(Preview {
            path: output,
            width: rendered.width,
            height: rendered.height,
        })
    }

    /// Registered sizes merged with what the asset actually has recorded.
    pub fn list_size_info(&self, id: AssetId) -> Result<Vec<SizeInfo>, EngineError> {
        let source = self
            .store
            .attached_file(id)?
            .ok_or(EngineError::AssetNotFound(id))?;
        let dir = source.parent().unwrap_or(Path::new(""));
        let metadata = self.store.metadata(id)?.unwrap_or_default();

        let info = self
            .registry
            .definitions()
            .iter()
            .map(|def| {
                let recorded = metadata.sizes.get(&def.name);
                SizeInfo {
                    name: def.name.clone(),
                    target_width: def.width,
                    target_height: def.height,
                    crop: def.crop,
                    exists: recorded.is_some(),
                    actual_width: recorded.map(|v| v.width),
                    actual_height: recorded.map(|v| v.height),
                    file_path: recorded
                        .and_then(|v| naming::sibling_path(dir, &v.file))
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                }
            })
            .collect();
        Ok(info)
    }

    /// The asset's crop profiles, keyed by slug.
    pub fn profiles(&self, id: AssetId) -> Result<CropProfiles, EngineError> {
        if self.store.attached_file(id)?.is_none() {
            return Err(EngineError::AssetNotFound(id));
        }
        Ok(self.store.crop_profiles(id)?)
    }
}
