//! Component-boundary error type.
//!
//! Every component operation returns `Result<_, EngineError>`. Callers (the
//! CLI, or any transport layer built on [`api`](crate::api)) map failures to
//! a user-visible message through [`EngineError::kind`]; no kind is fatal to
//! the process.

use crate::imaging::BackendError;
use crate::store::StoreError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source file, asset, or profile absent.
    NotFound,
    /// Decode target not one of the supported raster kinds.
    UnsupportedFormat,
    /// Decode/encode/resize/crop failed in the imaging library.
    CodecFailure,
    /// Bad request: missing fields, out-of-range quality, empty profile name.
    ValidationFailure,
    /// Metadata store or filesystem failure outside the codec.
    StorageFailure,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("asset {0} not found")]
    AssetNotFound(u64),
    #[error("crop profile '{profile}' not found on asset {asset}")]
    ProfileNotFound { asset: u64, profile: String },
    #[error("conversion of {} failed: {cause}", path.display())]
    ConversionFailed {
        path: PathBuf,
        cause: Box<EngineError>,
    },
    #[error(transparent)]
    Imaging(#[from] BackendError),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceNotFound(_) | Self::AssetNotFound(_) | Self::ProfileNotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::ConversionFailed { cause, .. } => cause.kind(),
            Self::Imaging(BackendError::Unsupported(_)) => ErrorKind::UnsupportedFormat,
            Self::Imaging(BackendError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Imaging(BackendError::Io(_)) => ErrorKind::StorageFailure,
            Self::Imaging(_) => ErrorKind::CodecFailure,
            Self::Validation(_) => ErrorKind::ValidationFailure,
            Self::Store(StoreError::UnknownAsset(_)) => ErrorKind::NotFound,
            Self::Store(_) | Self::Io(_) => ErrorKind::StorageFailure,
        }
    }
}
