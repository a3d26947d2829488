//! Shared test utilities.
//!
//! [`MemoryStore`] is an in-memory [`MetadataStore`] whose writes can be
//! made to fail on demand; the `create_test_*` functions write small
//! synthetic images in each supported source format.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

use crate::store::{MetadataStore, StoreError};
use crate::types::{AssetId, AttachmentMetadata, CropProfiles};

// =========================================================================
// In-memory metadata store
// =========================================================================

#[derive(Debug, Clone, Default)]
struct Record {
    file: PathBuf,
    metadata: Option<AttachmentMetadata>,
    crop_profiles: CropProfiles,
    webp_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<AssetId, Record>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under the next free id.
    pub fn add(&self, file: &Path) -> AssetId {
        let mut records = self.records.lock().unwrap();
        let id = records.keys().next_back().map_or(1, |last| last + 1);
        records.insert(
            id,
            Record {
                file: file.to_path_buf(),
                ..Record::default()
            },
        );
        id
    }

    /// Make every subsequent write fail with an IO error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn read<T>(&self, id: AssetId, f: impl FnOnce(&Record) -> T) -> Option<T> {
        self.records.lock().unwrap().get(&id).map(f)
    }

    fn write(&self, id: AssetId, f: impl FnOnce(&mut Record)) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("simulated write failure")));
        }
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).ok_or(StoreError::UnknownAsset(id))?;
        f(record);
        Ok(())
    }
}

impl MetadataStore for MemoryStore {
    fn attached_file(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.read(id, |r| r.file.clone()))
    }

    fn set_attached_file(&self, id: AssetId, path: &Path) -> Result<(), StoreError> {
        self.write(id, |r| r.file = path.to_path_buf())
    }

    fn metadata(&self, id: AssetId) -> Result<Option<AttachmentMetadata>, StoreError> {
        Ok(self.read(id, |r| r.metadata.clone()).flatten())
    }

    fn set_metadata(&self, id: AssetId, metadata: &AttachmentMetadata) -> Result<(), StoreError> {
        self.write(id, |r| r.metadata = Some(metadata.clone()))
    }

    fn crop_profiles(&self, id: AssetId) -> Result<CropProfiles, StoreError> {
        Ok(self.read(id, |r| r.crop_profiles.clone()).unwrap_or_default())
    }

    fn set_crop_profiles(&self, id: AssetId, profiles: &CropProfiles) -> Result<(), StoreError> {
        self.write(id, |r| r.crop_profiles = profiles.clone())
    }

    fn webp_path(&self, id: AssetId) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.read(id, |r| r.webp_path.clone()).flatten())
    }

    fn set_webp_path(&self, id: AssetId, path: Option<&Path>) -> Result<(), StoreError> {
        self.write(id, |r| r.webp_path = path.map(Path::to_path_buf))
    }

    fn asset_ids(&self) -> Result<Vec<AssetId>, StoreError> {
        Ok(self.records.lock().unwrap().keys().copied().collect())
    }
}

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

/// RGBA PNG with a transparent left half.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, alpha])
    });
    DynamicImage::ImageRgba8(img)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

/// 4x2 indexed PNG: palette entry 0 is transparent (tRNS), entry 1 opaque
/// red. The left two columns use entry 0.
const PALETTE_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0x08, 0x03, 0x00, 0x00, 0x00, 0x48, 0x76, 0x8d,
    0x51, 0x00, 0x00, 0x00, 0x06, 0x50, 0x4c, 0x54, 0x45, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x1b,
    0xff, 0x8d, 0x22, 0x00, 0x00, 0x00, 0x01, 0x74, 0x52, 0x4e, 0x53, 0x00, 0x40, 0xe6, 0xd8, 0x66,
    0x00, 0x00, 0x00, 0x0f, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60, 0x60, 0x60, 0x64, 0x64,
    0x00, 0x11, 0x00, 0x00, 0x1a, 0x00, 0x05, 0xde, 0x28, 0x54, 0x0e, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub fn create_test_palette_png(path: &Path) {
    std::fs::write(path, PALETTE_PNG).unwrap();
}

pub fn create_test_gif(path: &Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(gradient(width, height))
        .to_rgba8()
        .save_with_format(path, ImageFormat::Gif)
        .unwrap();
}

#[test]
fn memory_store_ids_are_sequential() {
    let store = MemoryStore::new();
    assert_eq!(store.add(Path::new("/a.jpg")), 1);
    assert_eq!(store.add(Path::new("/b.jpg")), 2);
    assert_eq!(store.asset_ids().unwrap(), vec![1, 2]);
}

#[test]
fn memory_store_failing_writes_leave_state() {
    let store = MemoryStore::new();
    let id = store.add(Path::new("/a.jpg"));
    store.fail_writes(true);
    assert!(store.set_webp_path(id, Some(Path::new("/a.webp"))).is_err());
    assert_eq!(store.webp_path(id).unwrap(), None);
}
