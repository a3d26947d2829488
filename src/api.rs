//! Caller-facing operation surface.
//!
//! Each operation takes a small request struct, validates it before any
//! imaging work starts, and returns either a typed result or an
//! [`EngineError`]. [`Response`] is the uniform JSON envelope a transport
//! layer (or the CLI's `--json` mode) hands back to its client:
//!
//! ```json
//! { "success": true,  "data": { ... } }
//! { "success": false, "message": "crop profile 'hero' not found on asset 3", "kind": "not_found" }
//! ```
//!
//! [`Service`] wires the components together from one immutable
//! [`EngineConfig`] and enforces its feature switches: with cropping
//! disabled the crop operations fail validation, likewise for regeneration.

use crate::bulk::{BulkEvent, BulkOperation, BulkSummary, run_bulk};
use crate::config::EngineConfig;
use crate::crop::{AdhocCrop, CropEngine, Preview, ProfileResult};
use crate::error::{EngineError, ErrorKind};
use crate::imaging::{ImageBackend, Quality};
use crate::regenerate::{CleanupReport, RegenerateReport, Regenerator};
use crate::store::MetadataStore;
use crate::transcode::{AssetConversion, IngestOutcome, Transcoder};
use crate::types::{AssetId, CropProfile, CropProfiles, CropRect, ResizeRequest, SizeInfo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::mpsc::Sender;

// ============================================================================
// Requests
// ============================================================================

fn require_asset(asset_id: Option<AssetId>) -> Result<AssetId, EngineError> {
    match asset_id {
        Some(id) if id > 0 => Ok(id),
        Some(_) => Err(EngineError::validation("invalid asset_id")),
        None => Err(EngineError::validation("missing asset_id")),
    }
}

fn require_crop(crop: Option<CropRect>) -> Result<CropRect, EngineError> {
    crop.ok_or_else(|| EngineError::validation("missing crop rectangle"))
}

fn resolve_quality(requested: Option<u32>, config: &EngineConfig) -> Result<Quality, EngineError> {
    match requested {
        Some(q) => Quality::checked(q)
            .ok_or_else(|| EngineError::validation(format!("quality {q} outside 1-100"))),
        None => Ok(config.quality()),
    }
}

/// Request naming a single asset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetRequest {
    pub asset_id: Option<AssetId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertRequest {
    pub asset_id: Option<AssetId>,
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplyProfileRequest {
    pub asset_id: Option<AssetId>,
    pub profile_name: Option<String>,
    pub crop: Option<CropRect>,
    pub resize: Option<ResizeRequest>,
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteProfileRequest {
    pub asset_id: Option<AssetId>,
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CropSizeRequest {
    pub asset_id: Option<AssetId>,
    pub crop: Option<CropRect>,
    pub size: Option<String>,
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewRequest {
    pub asset_id: Option<AssetId>,
    pub crop: Option<CropRect>,
}

// ============================================================================
// Responses
// ============================================================================

/// Uniform success/failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl Response {
    pub fn from_result<T: Serialize>(result: Result<T, EngineError>) -> Self {
        match result.map(|data| serde_json::to_value(data)) {
            Ok(Ok(data)) => Self {
                success: true,
                data: Some(data),
                message: None,
                kind: None,
            },
            Ok(Err(e)) => Self::failure(ErrorKind::StorageFailure, e.to_string()),
            Err(e) => Self::failure(e.kind(), e.to_string()),
        }
    }

    fn failure(kind: ErrorKind, message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            kind: Some(kind),
        }
    }
}

/// Size status plus whether the original's own derivative exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizesOverview {
    pub sizes: Vec<SizeInfo>,
    pub missing: Vec<String>,
    pub webp_exists: bool,
}

// ============================================================================
// Service
// ============================================================================

pub struct Service<'a, B: ImageBackend> {
    backend: &'a B,
    store: &'a dyn MetadataStore,
    config: &'a EngineConfig,
    preview_root: Option<PathBuf>,
}

impl<'a, B: ImageBackend> Service<'a, B> {
    pub fn new(backend: &'a B, store: &'a dyn MetadataStore, config: &'a EngineConfig) -> Self {
        Self {
            backend,
            store,
            config,
            preview_root: None,
        }
    }

    /// Directory relative preview paths resolve against.
    pub fn with_preview_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.preview_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    fn crop_engine(&self) -> Result<CropEngine<'a, B>, EngineError> {
        if !self.config.features.crop {
            return Err(EngineError::validation("cropping is disabled"));
        }
        let engine = CropEngine::new(self.backend, self.store, &self.config.sizes, self.config);
        Ok(match &self.preview_root {
            Some(root) => engine.with_preview_root(root.clone()),
            None => engine,
        })
    }

    fn regenerator(&self) -> Result<Regenerator<'a, B>, EngineError> {
        if !self.config.features.regenerate {
            return Err(EngineError::validation("regeneration is disabled"));
        }
        Ok(Regenerator::new(
            self.backend,
            self.store,
            &self.config.sizes,
            self.config,
        ))
    }

    /// Transcode an asset's original and recorded size variants.
    pub fn convert(&self, req: &ConvertRequest) -> Result<AssetConversion, EngineError> {
        let id = require_asset(req.asset_id)?;
        let quality = resolve_quality(req.quality, self.config)?;
        Transcoder::new(self.backend).convert_asset(self.store, id, quality)
    }

    /// Upload hook for a freshly registered asset.
    pub fn ingest(&self, req: &AssetRequest) -> Result<IngestOutcome, EngineError> {
        let id = require_asset(req.asset_id)?;
        Transcoder::new(self.backend).ingest_upload(self.store, id, &self.config.webp)
    }

    pub fn apply_profile(&self, req: &ApplyProfileRequest) -> Result<ProfileResult, EngineError> {
        let id = require_asset(req.asset_id)?;
        let name = req
            .profile_name
            .as_deref()
            .ok_or_else(|| EngineError::validation("missing profile_name"))?;
        let crop = require_crop(req.crop)?;
        let quality = resolve_quality(req.quality, self.config)?;
        self.crop_engine()?
            .apply_profile(id, name, crop, req.resize, quality)
    }

    pub fn delete_profile(&self, req: &DeleteProfileRequest) -> Result<CropProfile, EngineError> {
        let id = require_asset(req.asset_id)?;
        let name = req
            .profile_name
            .as_deref()
            .ok_or_else(|| EngineError::validation("missing profile_name"))?;
        self.crop_engine()?.delete_profile(id, name)
    }

    pub fn crop_size(&self, req: &CropSizeRequest) -> Result<AdhocCrop, EngineError> {
        let id = require_asset(req.asset_id)?;
        let crop = require_crop(req.crop)?;
        let quality = resolve_quality(req.quality, self.config)?;
        self.crop_engine()?
            .crop_size(id, crop, req.size.as_deref(), quality)
    }

    pub fn preview(&self, req: &PreviewRequest) -> Result<Preview, EngineError> {
        let id = require_asset(req.asset_id)?;
        let crop = require_crop(req.crop)?;
        self.crop_engine()?.preview(id, crop)
    }

    pub fn profiles(&self, req: &AssetRequest) -> Result<CropProfiles, EngineError> {
        let id = require_asset(req.asset_id)?;
        self.crop_engine()?.profiles(id)
    }

    /// Read-only; available regardless of the feature switches.
    pub fn list_size_info(&self, req: &AssetRequest) -> Result<Vec<SizeInfo>, EngineError> {
        let id = require_asset(req.asset_id)?;
        CropEngine::new(self.backend, self.store, &self.config.sizes, self.config)
            .list_size_info(id)
    }

    /// Size status, missing sizes and the original's derivative status.
    pub fn sizes_overview(&self, req: &AssetRequest) -> Result<SizesOverview, EngineError> {
        let id = require_asset(req.asset_id)?;
        let sizes = self.list_size_info(req)?;
        let missing = sizes
            .iter()
            .filter(|s| !s.exists)
            .map(|s| s.name.clone())
            .collect();
        let webp_exists = match self.store.webp_path(id)? {
            Some(path) => path.is_file(),
            None => self
                .store
                .attached_file(id)?
                .map(|p| crate::naming::derivative_path_for(&p).is_file())
                .unwrap_or(false),
        };
        Ok(SizesOverview {
            sizes,
            missing,
            webp_exists,
        })
    }

    pub fn regenerate(&self, req: &AssetRequest) -> Result<RegenerateReport, EngineError> {
        let id = require_asset(req.asset_id)?;
        self.regenerator()?.regenerate(id)
    }

    pub fn cleanup(&self, req: &AssetRequest) -> Result<CleanupReport, EngineError> {
        let id = require_asset(req.asset_id)?;
        self.regenerator()?.cleanup(id)
    }

    pub fn missing_sizes(&self, req: &AssetRequest) -> Result<Vec<String>, EngineError> {
        let id = require_asset(req.asset_id)?;
        self.regenerator()?.missing_sizes(id)
    }

    /// Run `op` over `ids` in configured batch sizes.
    pub fn bulk(
        &self,
        op: BulkOperation,
        ids: &[AssetId],
        events: Option<Sender<BulkEvent>>,
    ) -> Result<BulkSummary, EngineError> {
        let processing = &self.config.processing;
        let summary = match op {
            BulkOperation::Regenerate => {
                let regen = self.regenerator()?;
                run_bulk(
                    ids,
                    processing.batch_size,
                    |id| {
                        regen
                            .regenerate(id)
                            .map(|r| format!("{} sizes", r.sizes.len()))
                    },
                    events,
                )
            }
            BulkOperation::Cleanup => {
                let regen = self.regenerator()?;
                run_bulk(
                    ids,
                    processing.batch_size,
                    |id| {
                        regen
                            .cleanup(id)
                            .map(|r| format!("{} files deleted", r.deleted_files))
                    },
                    events,
                )
            }
            BulkOperation::Convert => {
                let transcoder = Transcoder::new(self.backend);
                let quality = self.config.quality();
                run_bulk(
                    ids,
                    processing.convert_batch_size,
                    |id| {
                        transcoder
                            .convert_asset(self.store, id, quality)
                            .map(|c| format!("{} sizes converted", c.converted_sizes))
                    },
                    events,
                )
            }
        };
        tracing::info!(operation = op.label(), total = summary.total, failed = summary.failed.len(), "bulk run finished");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::test_helpers::MemoryStore;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        store: MemoryStore,
        config: EngineConfig,
        id: AssetId,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let source = tmp.path().join("photo.jpg");
            std::fs::write(&source, b"original").unwrap();
            let store = MemoryStore::new();
            let id = store.add(&source);
            Self {
                tmp,
                store,
                config: EngineConfig::default(),
                id,
            }
        }
    }

    fn rect() -> Option<CropRect> {
        Some(CropRect::new(0.0, 0.0, 100.0, 100.0))
    }

    #[test]
    fn missing_fields_fail_validation_before_imaging() {
        let fx = Fixture::new();
        let backend = MockBackend::touching(400, 300);
        let service = Service::new(&backend, &fx.store, &fx.config);

        let cases: Vec<Result<ProfileResult, EngineError>> = vec![
            service.apply_profile(&ApplyProfileRequest::default()),
            service.apply_profile(&ApplyProfileRequest {
                asset_id: Some(fx.id),
                crop: rect(),
                ..Default::default()
            }),
            service.apply_profile(&ApplyProfileRequest {
                asset_id: Some(fx.id),
                profile_name: Some("hero".into()),
                ..Default::default()
            }),
            service.apply_profile(&ApplyProfileRequest {
                asset_id: Some(fx.id),
                profile_name: Some("hero".into()),
                crop: rect(),
                quality: Some(0),
                ..Default::default()
            }),
        ];
        for result in cases {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidationFailure);
        }
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn disabled_features_reject_operations() {
        let mut fx = Fixture::new();
        fx.config.features.crop = false;
        fx.config.features.regenerate = false;
        let backend = MockBackend::touching(400, 300);
        let service = Service::new(&backend, &fx.store, &fx.config);

        let crop = service.apply_profile(&ApplyProfileRequest {
            asset_id: Some(fx.id),
            profile_name: Some("hero".into()),
            crop: rect(),
            ..Default::default()
        });
        assert_eq!(crop.unwrap_err().kind(), ErrorKind::ValidationFailure);

        let regen = service.regenerate(&AssetRequest { asset_id: Some(fx.id) });
        assert_eq!(regen.unwrap_err().kind(), ErrorKind::ValidationFailure);

        // Read-only status stays available
        assert!(service.list_size_info(&AssetRequest { asset_id: Some(fx.id) }).is_ok());
    }

    #[test]
    fn response_envelope_shapes() {
        let ok = Response::from_result::<u32>(Ok(3));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"success": true, "data": 3})
        );

        let err = Response::from_result::<u32>(Err(EngineError::ProfileNotFound {
            asset: 3,
            profile: "hero".into(),
        }));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "success": false,
                "message": "crop profile 'hero' not found on asset 3",
                "kind": "not_found"
            })
        );
    }

    #[test]
    fn requests_deserialize_from_loose_json() {
        let req: ApplyProfileRequest = serde_json::from_str(
            r#"{"asset_id": 4, "profile_name": "Hero", "crop": {"x": 1, "y": 2, "width": 30.5, "height": 40},
                "resize": {"width": 800}}"#,
        )
        .unwrap();
        assert_eq!(req.asset_id, Some(4));
        assert_eq!(req.crop, Some(CropRect::new(1.0, 2.0, 30.5, 40.0)));
        assert_eq!(
            req.resize,
            Some(ResizeRequest {
                width: Some(800),
                height: None
            })
        );
    }

    #[test]
    fn sizes_overview_reports_missing_and_webp() {
        let fx = Fixture::new();
        std::fs::write(fx.tmp.path().join("photo.webp"), b"x").unwrap();
        let backend = MockBackend::new();
        let service = Service::new(&backend, &fx.store, &fx.config);

        let overview = service
            .sizes_overview(&AssetRequest { asset_id: Some(fx.id) })
            .unwrap();
        assert_eq!(overview.sizes.len(), 4);
        assert_eq!(overview.missing.len(), 4);
        assert!(overview.webp_exists);
    }

    #[test]
    fn bulk_regenerate_uses_batches_and_reports_failures() {
        let fx = Fixture::new();
        let backend = MockBackend::touching(2000, 1000);
        let service = Service::new(&backend, &fx.store, &fx.config);

        let summary = service
            .bulk(BulkOperation::Regenerate, &[fx.id, 999, fx.id], None)
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed[0].id, 999);
        assert_eq!(summary.failed[0].kind, ErrorKind::NotFound);
    }
}
