//! Size-variant lifecycle: regenerate and cleanup.
//!
//! Both operations start with the same deletion routine over the asset's
//! recorded variants ([`delete_variant_files`]). For each variant it tries
//! to remove:
//!
//! 1. the variant file itself,
//! 2. the derivative predicted from that file name (extension swap),
//! 3. the derivative file name recorded on the variant, if any.
//!
//! Files that are already gone are skipped silently; any other removal
//! error is logged and swallowed. The original, its own derivative and
//! every crop profile file are never removed ([`protected_paths`]), and
//! recorded names are reduced to their final path component before use.
//! Regenerate also refuses to transcode a variant onto a protected path.
//!
//! Running either operation twice gives the same end state.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::imaging::{ImageBackend, render_size_variants};
use crate::naming::{self, derivative_path_for};
use crate::store::{MetadataStore, VariantRegistry};
use crate::transcode::Transcoder;
use crate::types::{AssetId, AttachmentMetadata, CropProfiles, SizeVariant};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Outcome of a regenerate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegenerateReport {
    pub deleted_files: usize,
    pub sizes: BTreeMap<String, SizeVariant>,
    /// Variants that received a transcoded derivative.
    pub converted: usize,
    /// Variants whose transcode failed (non-fatal).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversion_failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub deleted_files: usize,
    pub removed_sizes: usize,
}

/// Files of an asset the deletion routine must leave alone: the original,
/// its derivative and the file of every crop profile.
pub fn protected_paths(dir: &Path, source: &Path, profiles: &CropProfiles) -> Vec<PathBuf> {
    let mut protected = vec![source.to_path_buf(), derivative_path_for(source)];
    protected.extend(
        profiles
            .values()
            .filter_map(|p| naming::sibling_path(dir, &p.filename)),
    );
    protected
}

/// Remove one variant's file and its derivatives from `dir`, skipping
/// anything in `protected`.
///
/// Returns how many files were actually removed.
pub fn delete_variant_files(dir: &Path, protected: &[PathBuf], variant: &SizeVariant) -> usize {

    let mut candidates: Vec<PathBuf> = Vec::with_capacity(3);
    if let Some(file) = naming::sibling_path(dir, &variant.file) {
        candidates.push(derivative_path_for(&file));
        candidates.insert(0, file);
    }
    if let Some(recorded) = variant
        .webp_file
        .as_deref()
        .and_then(|w| naming::sibling_path(dir, w))
    {
        candidates.push(recorded);
    }
    candidates.dedup();

    let mut removed = 0;
    for path in candidates {
        if protected.contains(&path) {
            tracing::warn!(path = %path.display(), "variant record points at a protected file, not deleting");
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete variant file"),
        }
    }
    removed
}

/// Run the deletion routine over every recorded variant.
fn delete_all(dir: &Path, protected: &[PathBuf], metadata: &AttachmentMetadata) -> usize {
    metadata
        .sizes
        .values()
        .map(|variant| delete_variant_files(dir, protected, variant))
        .sum()
}

pub struct Regenerator<'a, B: ImageBackend> {
    backend: &'a B,
    store: &'a dyn MetadataStore,
    registry: &'a dyn VariantRegistry,
    config: &'a EngineConfig,
}

impl<'a, B: ImageBackend> Regenerator<'a, B> {
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
        }
    }

    fn attached(&self, id: AssetId) -> Result<PathBuf, EngineError> {
        self.store
            .attached_file(id)?
            .ok_or(EngineError::AssetNotFound(id))
    }

    /// Delete the recorded variants and rebuild the full set from the original.
    ///
    /// If rendering fails, the record is reduced to the original so it does
    /// not list files that were just deleted.
    pub fn regenerate(&self, id: AssetId) -> Result<RegenerateReport, EngineError> {
        let source = self.attached(id)?;
        if !source.is_file() {
            return Err(EngineError::SourceNotFound(source));
        }
        let dir = source.parent().unwrap_or(Path::new("")).to_path_buf();

        let existing = self.store.metadata(id)?;
        let protected = protected_paths(&dir, &source, &self.store.crop_profiles(id)?);
        let deleted_files = existing
            .as_ref()
            .map(|m| delete_all(&dir, &protected, m))
            .unwrap_or(0);

        let rendered = self
            .backend
            .identify(&source)
            .map_err(EngineError::from)
            .and_then(|dims| {
                let dims = dims.as_tuple();
                render_size_variants(
                    self.backend,
                    &source,
                    dims,
                    self.registry.definitions(),
                    self.config.quality(),
                )
                .map(|sizes| (dims, sizes))
                .map_err(EngineError::from)
            });

        let (dims, mut sizes) = match rendered {
            Ok(ok) => ok,
            Err(e) => {
                if let Some(meta) = &existing {
                    self.store.set_metadata(id, &meta.original_only())?;
                }
                return Err(e);
            }
        };

        let mut converted = 0;
        let mut conversion_failures = Vec::new();
        if self.config.webp.auto_convert {
            let transcoder = Transcoder::new(self.backend);
            for (name, variant) in sizes.iter_mut() {
                let Some(path) = naming::sibling_path(&dir, &variant.file) else {
                    continue;
                };
                if protected.contains(&derivative_path_for(&path)) {
                    tracing::warn!(asset = id, size = %name, "variant derivative would overwrite a protected file, not converting");
                    conversion_failures.push(name.clone());
                    continue;
                }
                match transcoder.convert(&path, self.config.quality()) {
                    Ok(webp) => {
                        variant.webp_file = webp
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned());
                        converted += 1;
                    }
                    Err(e) => {
                        tracing::warn!(asset = id, size = %name, error = %e, "variant transcode failed");
                        conversion_failures.push(name.clone());
                    }
                }
            }
        }

        let metadata = AttachmentMetadata {
            file: existing
                .map(|m| m.file)
                .unwrap_or_else(|| source.display().to_string()),
            width: dims.0,
            height: dims.1,
            sizes: sizes.clone(),
        };
        self.store.set_metadata(id, &metadata)?;

        tracing::info!(asset = id, sizes = sizes.len(), deleted_files, converted, "regenerated");
        Ok(RegenerateReport {
            deleted_files,
            sizes,
            converted,
            conversion_failures,
        })
    }

    /// Delete every recorded variant and reduce the record to the original.
    pub fn cleanup(&self, id: AssetId) -> Result<CleanupReport, EngineError> {
        let source = self.attached(id)?;
        let metadata = self
            .store
            .metadata(id)?
            .ok_or(EngineError::AssetNotFound(id))?;
        let dir = source.parent().unwrap_or(Path::new(""));
        let protected = protected_paths(dir, &source, &self.store.crop_profiles(id)?);

        let deleted_files = delete_all(dir, &protected, &metadata);
        self.store.set_metadata(id, &metadata.original_only())?;

        tracing::info!(asset = id, deleted_files, "cleaned up size variants");
        Ok(CleanupReport {
            deleted_files,
            removed_sizes: metadata.sizes.len(),
        })
    }

    /// Registered size names the asset has no recorded variant for.
    pub fn missing_sizes(&self, id: AssetId) -> Result<Vec<String>, EngineError> {
        self.attached(id)?;
        let metadata = self.store.metadata(id)?.unwrap_or_default();
        Ok(self
            .registry
            .definitions()
            .iter()
            .filter(|def| !metadata.sizes.contains_key(&def.name))
            .map(|def| def.name.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::test_helpers::MemoryStore;
    use crate::types::{CropProfile, CropRect};
    use tempfile::TempDir;

    fn variant(file: &str, webp_file: Option<&str>) -> SizeVariant {
        SizeVariant {
            file: file.into(),
            width: 150,
            height: 150,
            mime_type: "image/jpeg".into(),
            webp_file: webp_file.map(str::to_string),
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    fn original_only(dir: &Path) -> Vec<PathBuf> {
        protected_paths(dir, &dir.join("photo.jpg"), &CropProfiles::new())
    }

    fn profile_record(dir: &Path, filename: &str) -> CropProfile {
        CropProfile {
            filename: filename.into(),
            path: dir.join(filename).display().to_string(),
            width: 150,
            height: 150,
            created: "2024-05-01 10:00:00".into(),
            crop_data: CropRect::new(0.0, 0.0, 150.0, 150.0),
            resize_data: None,
        }
    }

    struct Fixture {
        tmp: TempDir,
        store: MemoryStore,
        config: EngineConfig,
        id: AssetId,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            touch(tmp.path(), "photo.jpg");
            let store = MemoryStore::new();
            let id = store.add(&tmp.path().join("photo.jpg"));
            Self {
                tmp,
                store,
                config: EngineConfig::default(),
                id,
            }
        }

        fn exists(&self, name: &str) -> bool {
            self.tmp.path().join(name).exists()
        }

        fn record(&self, sizes: &[(&str, SizeVariant)]) {
            let meta = AttachmentMetadata {
                file: "photo.jpg".into(),
                width: 2000,
                height: 1000,
                sizes: sizes
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.clone()))
                    .collect(),
            };
            self.store.set_metadata(self.id, &meta).unwrap();
        }

        fn regenerator<'a>(&'a self, backend: &'a MockBackend) -> Regenerator<'a, MockBackend> {
            Regenerator::new(backend, &self.store, &self.config.sizes, &self.config)
        }
    }

    // =========================================================================
    // delete_variant_files
    // =========================================================================

    #[test]
    fn deletes_file_predicted_and_recorded_derivatives() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        for name in ["photo-150x150.jpg", "photo-150x150.webp", "legacy-thumb.webp"] {
            touch(dir, name);
        }

        let removed = delete_variant_files(
            dir,
            &original_only(dir),
            &variant("photo-150x150.jpg", Some("legacy-thumb.webp")),
        );
        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 0);
    }

    #[test]
    fn missing_files_are_not_errors() {
        let tmp = TempDir::new().unwrap();
        let removed = delete_variant_files(
            tmp.path(),
            &original_only(tmp.path()),
            &variant("photo-150x150.jpg", Some("photo-150x150.webp")),
        );
        assert_eq!(removed, 0);
    }

    #[test]
    fn never_deletes_the_original() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "photo.jpg");
        touch(tmp.path(), "photo.webp");

        let removed = delete_variant_files(
            tmp.path(),
            &original_only(tmp.path()),
            &variant("../photo.jpg", None),
        );
        assert_eq!(removed, 0);
        assert!(tmp.path().join("photo.jpg").exists());
        assert!(tmp.path().join("photo.webp").exists());
    }

    #[test]
    fn protected_paths_cover_profile_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        let mut profiles = CropProfiles::new();
        profiles.insert("hero".into(), profile_record(dir, "photo-hero.webp"));
        profiles.insert("odd".into(), profile_record(dir, "../elsewhere/photo-odd.webp"));

        let protected = protected_paths(dir, &dir.join("photo.jpg"), &profiles);
        assert_eq!(
            protected,
            vec![
                dir.join("photo.jpg"),
                dir.join("photo.webp"),
                dir.join("photo-hero.webp"),
                dir.join("photo-odd.webp"),
            ]
        );
    }

    // =========================================================================
    // regenerate
    // =========================================================================

    #[test]
    fn regenerate_from_scratch_builds_registry_set() {
        let fx = Fixture::new();
        let backend = MockBackend::touching(2000, 1000);
        let report = fx.regenerator(&backend).regenerate(fx.id).unwrap();

        assert_eq!(report.deleted_files, 0);
        let names: Vec<&str> = report.sizes.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["large", "medium", "medium_large", "thumbnail"]);
        assert_eq!(report.converted, 4);
        assert!(fx.exists("photo-150x150.jpg"));
        assert!(fx.exists("photo-150x150.webp"));

        let meta = fx.store.metadata(fx.id).unwrap().unwrap();
        assert_eq!((meta.width, meta.height), (2000, 1000));
        assert_eq!(meta.sizes, report.sizes);
        assert_eq!(
            meta.sizes["thumbnail"].webp_file.as_deref(),
            Some("photo-150x150.webp")
        );
    }

    #[test]
    fn regenerate_deletes_stale_variants_first() {
        let fx = Fixture::new();
        touch(fx.tmp.path(), "photo-100x100.jpg");
        touch(fx.tmp.path(), "photo-100x100.webp");
        fx.record(&[("tiny", variant("photo-100x100.jpg", None))]);

        let backend = MockBackend::touching(2000, 1000);
        let report = fx.regenerator(&backend).regenerate(fx.id).unwrap();

        assert_eq!(report.deleted_files, 2);
        assert!(!fx.exists("photo-100x100.jpg"));
        assert!(!fx.exists("photo-100x100.webp"));
        assert!(!report.sizes.contains_key("tiny"));
        assert!(fx.exists("photo.jpg"));
    }

    #[test]
    fn regenerate_without_auto_convert_skips_transcode() {
        let mut fx = Fixture::new();
        fx.config.webp.auto_convert = false;
        let backend = MockBackend::touching(2000, 1000);
        let report = fx.regenerator(&backend).regenerate(fx.id).unwrap();

        assert_eq!(report.converted, 0);
        assert!(report.sizes.values().all(|v| v.webp_file.is_none()));
        assert!(
            !backend
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Transcode { .. }))
        );
    }

    #[test]
    fn variant_transcode_failure_is_not_fatal() {
        let fx = Fixture::new();
        let backend = MockBackend::touching(2000, 1000);
        backend.fail_output("photo-300x150.webp");
        let report = fx.regenerator(&backend).regenerate(fx.id).unwrap();

        assert_eq!(report.converted, 3);
        assert_eq!(report.conversion_failures, vec!["medium".to_string()]);
        assert_eq!(report.sizes["medium"].webp_file, None);
        assert!(report.sizes["large"].webp_file.is_some());
    }

    #[test]
    fn render_failure_aborts_and_resets_record() {
        let fx = Fixture::new();
        touch(fx.tmp.path(), "photo-100x100.jpg");
        fx.record(&[("tiny", variant("photo-100x100.jpg", None))]);

        let backend = MockBackend::touching(2000, 1000);
        backend.fail_output("photo-768x384.jpg");
        let err = fx.regenerator(&backend).regenerate(fx.id).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CodecFailure);
        let meta = fx.store.metadata(fx.id).unwrap().unwrap();
        assert!(meta.sizes.is_empty());
        assert!(!fx.exists("photo-150x150.jpg"));
    }

    #[test]
    fn regenerate_twice_is_stable() {
        let fx = Fixture::new();
        let backend = MockBackend::touching(2000, 1000);
        let regen = fx.regenerator(&backend);
        let first = regen.regenerate(fx.id).unwrap();
        let second = regen.regenerate(fx.id).unwrap();

        assert_eq!(first.sizes, second.sizes);
        // Every file from the first run (variant + derivative) was deleted
        assert_eq!(second.deleted_files, 8);
    }

    #[test]
    fn regenerate_missing_source_is_not_found() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.tmp.path().join("photo.jpg")).unwrap();
        let backend = MockBackend::touching(2000, 1000);
        let err = fx.regenerator(&backend).regenerate(fx.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn regenerate_never_transcodes_over_a_profile_file() {
        let fx = Fixture::new();
        let dir = fx.tmp.path();
        std::fs::write(dir.join("photo-150x150.webp"), b"profile pixels").unwrap();
        let mut profiles = CropProfiles::new();
        profiles.insert("150x150".into(), profile_record(dir, "photo-150x150.webp"));
        fx.store.set_crop_profiles(fx.id, &profiles).unwrap();

        let backend = MockBackend::touching(2000, 1000);
        let report = fx.regenerator(&backend).regenerate(fx.id).unwrap();

        assert_eq!(std::fs::read(dir.join("photo-150x150.webp")).unwrap(), b"profile pixels");
        assert_eq!(report.sizes["thumbnail"].webp_file, None);
        assert_eq!(report.conversion_failures, vec!["thumbnail".to_string()]);
        assert_eq!(report.converted, 3);

        // A second run deletes the thumbnail but still not the profile file
        let again = fx.regenerator(&backend).regenerate(fx.id).unwrap();
        assert!(again.sizes.contains_key("thumbnail"));
        assert_eq!(std::fs::read(dir.join("photo-150x150.webp")).unwrap(), b"profile pixels");
    }

    // =========================================================================
    // cleanup / missing_sizes
    // =========================================================================

    #[test]
    fn cleanup_keeps_profile_file_with_variant_shaped_name() {
        let fx = Fixture::new();
        let dir = fx.tmp.path();
        touch(dir, "photo-150x150.jpg");
        touch(dir, "photo-150x150.webp");
        fx.record(&[("thumbnail", variant("photo-150x150.jpg", Some("photo-150x150.webp")))]);
        let mut profiles = CropProfiles::new();
        profiles.insert("150x150".into(), profile_record(dir, "photo-150x150.webp"));
        fx.store.set_crop_profiles(fx.id, &profiles).unwrap();

        let backend = MockBackend::new();
        let report = fx.regenerator(&backend).cleanup(fx.id).unwrap();

        assert_eq!(report.deleted_files, 1);
        assert!(!fx.exists("photo-150x150.jpg"));
        assert!(fx.exists("photo-150x150.webp"));
        assert_eq!(fx.store.crop_profiles(fx.id).unwrap(), profiles);
    }

    #[test]
    fn cleanup_removes_variants_and_keeps_original() {
        let fx = Fixture::new();
        for name in ["photo-150x150.jpg", "photo-150x150.webp", "photo-300x150.jpg"] {
            touch(fx.tmp.path(), name);
        }
        fx.record(&[
            ("thumbnail", variant("photo-150x150.jpg", Some("photo-150x150.webp"))),
            ("medium", variant("photo-300x150.jpg", None)),
        ]);

        let backend = MockBackend::new();
        let report = fx.regenerator(&backend).cleanup(fx.id).unwrap();

        assert_eq!(report, CleanupReport { deleted_files: 3, removed_sizes: 2 });
        let meta = fx.store.metadata(fx.id).unwrap().unwrap();
        assert!(meta.sizes.is_empty());
        assert_eq!(meta.file, "photo.jpg");
        assert_eq!((meta.width, meta.height), (2000, 1000));
        assert!(fx.exists("photo.jpg"));
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn cleanup_without_metadata_is_not_found() {
        let fx = Fixture::new();
        let backend = MockBackend::new();
        let err = fx.regenerator(&backend).cleanup(fx.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn cleanup_leaves_crop_profiles_alone() {
        let fx = Fixture::new();
        touch(fx.tmp.path(), "photo-hero.webp");
        fx.record(&[("thumbnail", variant("photo-150x150.jpg", None))]);

        let backend = MockBackend::new();
        fx.regenerator(&backend).cleanup(fx.id).unwrap();
        assert!(fx.exists("photo-hero.webp"));
    }

    #[test]
    fn missing_sizes_in_registry_order() {
        let fx = Fixture::new();
        fx.record(&[("medium", variant("photo-300x150.jpg", None))]);
        let backend = MockBackend::new();
        let missing = fx.regenerator(&backend).missing_sizes(fx.id).unwrap();
        assert_eq!(missing, vec!["thumbnail", "medium_large", "large"]);
    }
}
