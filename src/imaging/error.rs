//! Editor error taxonomy.
//!
//! Every kind is recoverable. Backend failures are wrapped with the operation
//! that triggered them so callers can match on what went wrong without parsing
//! messages.

use super::backend::BackendError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Source image not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("{origin}: {reason}")]
    InvalidImage {
        origin: String,
        reason: InvalidImageReason,
    },
    #[error("No usable image backend: {0}")]
    BackendUnavailable(String),
    #[error("Could not calculate resized dimensions for {width}x{height} into {max_w}x{max_h}")]
    DimensionError {
        width: u32,
        height: u32,
        max_w: u32,
        max_h: u32,
    },
    #[error("Image resize failed: {0}")]
    ResizeFailed(#[source] BackendError),
    #[error("Image crop failed: {0}")]
    CropFailed(#[source] BackendError),
    #[error("Image rotate failed: {0}")]
    RotateFailed(#[source] BackendError),
    #[error("Image flip failed: {0}")]
    FlipFailed(#[source] BackendError),
    #[error("Unsupported output format: {0}")]
    UnsupportedOutputFormat(String),
    #[error("Image encode failed: {0}")]
    EncodeFailed(#[source] BackendError),
}

/// Why a load produced no usable image.
#[derive(Error, Debug)]
pub enum InvalidImageReason {
    #[error("file is not an image ({0})")]
    Decode(String),
    #[error("could not read image size ({0})")]
    Size(String),
}

impl EditorError {
    pub(crate) fn invalid(origin: impl Into<String>, reason: InvalidImageReason) -> Self {
        Self::InvalidImage {
            origin: origin.into(),
            reason,
        }
    }
}
