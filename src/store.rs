//! Metadata store and variant-definition registry.
//!
//! The engine never owns a durable index of its own: everything it records
//! (size variants, crop profiles, the transcoded-original path) goes through
//! a [`MetadataStore`]. The store is a plain synchronous key-value seam with
//! no transactions, so callers serialize operations per asset.
//!
//! [`JsonLibrary`] is the file-backed implementation the CLI uses: one JSON
//! document next to the media files, loaded once and rewritten after every
//! mutation.
//!
//! ## Document format
//!
//! ```json
//! {
//!   "version": 1,
//!   "next_id": 3,
//!   "assets": {
//!     "1": {
//!       "file": "2024/05/photo.jpg",
//!       "metadata": { "file": "2024/05/photo.jpg", "width": 2000, "height": 1000,
//!                     "sizes": { "thumbnail": { "file": "photo-150x150.jpg", ... } } },
//!       "crop_profiles": { "hero": { ... } },
//!       "webp_path": "2024/05/photo.webp"
//!     }
//!   }
//! }
//! ```
//!
//! Paths under the library's directory are stored relative to it; anything
//! else is stored absolute.

use crate::types::{AssetId, AttachmentMetadata, CropProfiles, SizeDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Version of the library document format.
const LIBRARY_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown asset {0}")]
    UnknownAsset(AssetId),
    #[error("library format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Per-asset metadata persistence.
///
/// Reads of an unknown asset return `None` (or an empty map); writes to an
/// unknown asset fail with [`StoreError::UnknownAsset`].
pub trait MetadataStore: Send + Sync {
    /// Absolute path of the asset's original file.
    fn attached_file(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError>;
    fn set_attached_file(&self, id: AssetId, path: &Path) -> Result<(), StoreError>;

    fn metadata(&self, id: AssetId) -> Result<Option<AttachmentMetadata>, StoreError>;
    fn set_metadata(&self, id: AssetId, metadata: &AttachmentMetadata) -> Result<(), StoreError>;

    fn crop_profiles(&self, id: AssetId) -> Result<CropProfiles, StoreError>;
    fn set_crop_profiles(&self, id: AssetId, profiles: &CropProfiles) -> Result<(), StoreError>;

    /// Path of the original's transcoded derivative, when one was recorded.
    fn webp_path(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError>;
    fn set_webp_path(&self, id: AssetId, path: Option<&Path>) -> Result<(), StoreError>;

    /// All known asset ids, ascending.
    fn asset_ids(&self) -> Result<Vec<AssetId>, StoreError>;
}

/// The ordered, read-only set of registered size definitions.
pub trait VariantRegistry: Send + Sync {
    fn definitions(&self) -> &[SizeDefinition];
}

impl VariantRegistry for Vec<SizeDefinition> {
    fn definitions(&self) -> &[SizeDefinition] {
        self
    }
}

impl VariantRegistry for [SizeDefinition] {
    fn definitions(&self) -> &[SizeDefinition] {
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AssetRecord {
    file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<AttachmentMetadata>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    crop_profiles: CropProfiles,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    webp_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LibraryDocument {
    version: u32,
    next_id: AssetId,
    assets: BTreeMap<AssetId, AssetRecord>,
}

impl LibraryDocument {
    fn empty() -> Self {
        Self {
            version: LIBRARY_VERSION,
            next_id: 1,
            assets: BTreeMap::new(),
        }
    }
}

/// JSON-file metadata store.
pub struct JsonLibrary {
    path: PathBuf,
    root: PathBuf,
    doc: Mutex<LibraryDocument>,
}

impl JsonLibrary {
    /// Open the library at `path`, starting empty when the file does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let doc = match std::fs::read_to_string(path) {
            Ok(content) => {
                let doc: LibraryDocument = serde_json::from_str(&content)?;
                if doc.version != LIBRARY_VERSION {
                    return Err(StoreError::UnsupportedVersion {
                        found: doc.version,
                        expected: LIBRARY_VERSION,
                    });
                }
                doc
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LibraryDocument::empty(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: path.to_path_buf(),
            root,
            doc: Mutex::new(doc),
        })
    }

    /// Directory every relative path in the library is resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a new asset whose original lives at `file`. Returns its id.
    pub fn register(&self, file: &Path) -> Result<AssetId, StoreError> {
        let stored = self.relativize(file);
        self.mutate(|doc| {
            let id = doc.next_id;
            doc.next_id += 1;
            doc.assets.insert(
                id,
                AssetRecord {
                    file: stored,
                    ..AssetRecord::default()
                },
            );
            Ok(id)
        })
    }

    fn relativize(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn resolve(&self, stored: &str) -> PathBuf {
        self.root.join(stored)
    }

    fn read<T>(&self, f: impl FnOnce(&LibraryDocument) -> T) -> T {
        let doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        f(&doc)
    }

    /// Apply `f` to a copy of the document, persist it, then publish it.
    /// A failed save leaves the in-memory document unchanged.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut LibraryDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.doc.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = doc.clone();
        let out = f(&mut next)?;
        self.save(&next)?;
        *doc = next;
        Ok(out)
    }

    fn update(
        &self,
        id: AssetId,
        f: impl FnOnce(&mut AssetRecord),
    ) -> Result<(), StoreError> {
        self.mutate(|doc| {
            let record = doc
                .assets
                .get_mut(&id)
                .ok_or(StoreError::UnknownAsset(id))?;
            f(record);
            Ok(())
        })
    }

    /// Mode the saved document should carry: the existing file's, or for a
    /// new file the library directory's minus execute bits.
    fn file_permissions(&self) -> Result<Option<std::fs::Permissions>, StoreError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => return Ok(Some(meta.permissions())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let dir_mode = std::fs::metadata(&self.root)?.permissions().mode();
            Ok(Some(std::fs::Permissions::from_mode(dir_mode & 0o666)))
        }
        #[cfg(not(unix))]
        {
            Ok(None)
        }
    }

    fn save(&self, doc: &LibraryDocument) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(doc)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(".library-")
            .tempfile_in(&self.root)?;
        tmp.write_all(json.as_bytes())?;
        if let Some(permissions) = self.file_permissions()? {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        tracing::debug!(path = %self.path.display(), assets = doc.assets.len(), "saved media library");
        Ok(())
    }
}

impl MetadataStore for JsonLibrary {
    fn attached_file(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.read(|doc| doc.assets.get(&id).map(|r| self.resolve(&r.file))))
    }

    fn set_attached_file(&self, id: AssetId, path: &Path) -> Result<(), StoreError> {
        let stored = self.relativize(path);
        self.update(id, |r| r.file = stored)
    }

    fn metadata(&self, id: AssetId) -> Result<Option<AttachmentMetadata>, StoreError> {
        Ok(self.read(|doc| doc.assets.get(&id).and_then(|r| r.metadata.clone())))
    }

    fn set_metadata(&self, id: AssetId, metadata: &AttachmentMetadata) -> Result<(), StoreError> {
        let metadata = metadata.clone();
        self.update(id, |r| r.metadata = Some(metadata))
    }

    fn crop_profiles(&self, id: AssetId) -> Result<CropProfiles, StoreError> {
        Ok(self.read(|doc| {
            doc.assets
                .get(&id)
                .map(|r| r.crop_profiles.clone())
                .unwrap_or_default()
        }))
    }

    fn set_crop_profiles(&self, id: AssetId, profiles: &CropProfiles) -> Result<(), StoreError> {
        let profiles = profiles.clone();
        self.update(id, |r| r.crop_profiles = profiles)
    }

    fn webp_path(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.read(|doc| {
            doc.assets
                .get(&id)
                .and_then(|r| r.webp_path.as_deref())
                .map(|p| self.resolve(p))
        }))
    }

    fn set_webp_path(&self, id: AssetId, path: Option<&Path>) -> Result<(), StoreError> {
        let stored = path.map(|p| self.relativize(p));
        self.update(id, |r| r.webp_path = stored)
    }

    fn asset_ids(&self) -> Result<Vec<AssetId>, StoreError> {
        Ok(self.read(|doc| doc.assets.keys().copied().collect()))
    }
}
