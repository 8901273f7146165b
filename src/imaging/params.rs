//! Parameter and result types for editor operations.
//!
//! ## Types
//!
//! - [`Quality`]: Encoder quality (0–100, default 90). Clamped on construction.
//! - [`SizeSpec`]: One named target size of a multi-resize batch.
//! - [`RenditionResult`]: What a batch reports for each size it produced.
//! - [`SavedImage`]: What a save reports: where the file went and what it holds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quality setting for lossy image encoding (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.min(100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

/// A named target size for [`ImageEditor::multi_resize`](super::ImageEditor::multi_resize).
///
/// `key` is chosen by the caller (e.g. `"thumbnail"`) and must be unique
/// within one batch. A `0` bound leaves that axis unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    pub key: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub crop: bool,
}

impl SizeSpec {
    pub fn new(key: impl Into<String>, width: u32, height: u32, crop: bool) -> Self {
        Self {
            key: key.into(),
            width,
            height,
            crop,
        }
    }
}

/// One generated rendition in a batch result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionResult {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    /// Base name of the written file.
    pub file_name: String,
}

/// Result of a save: the full path plus everything a rendition reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub path: PathBuf,
    pub file: String,
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

impl From<SavedImage> for RenditionResult {
    fn from(saved: SavedImage) -> Self {
        Self {
            width: saved.width,
            height: saved.height,
            mime_type: saved.mime_type,
            file_name: saved.file,
        }
    }
}
