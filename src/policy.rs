//! Policy hooks consulted by the editor.
//!
//! Configuration can override a handful of decisions without the editor
//! knowing where the values come from: the starting quality, the decoder memory
//! ceiling, JPEG quality (keyed by what the write is for), the reported file
//! name of a rendition, and whether metadata is stripped before encoding.
//!
//! [`DefaultPolicy`] changes nothing. [`EditorConfig`](crate::config::EditorConfig)
//! implements the trait from `config.toml`.

use crate::imaging::Quality;
use std::path::{Path, PathBuf};

/// Memory ceiling applied when nothing overrides it (256 MiB).
pub const DEFAULT_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

/// Quality context for saves and batch renditions.
pub const CONTEXT_RESIZE: &str = "image_resize";
/// Quality context for streamed output.
pub const CONTEXT_STREAM: &str = "edit_image";

pub trait Policy: Send + Sync {
    /// Quality a session starts with when the caller sets none.
    fn default_quality(&self) -> Quality {
        Quality::default()
    }

    /// Bytes the decoder may allocate.
    fn memory_limit(&self, default: u64) -> u64 {
        default
    }

    /// JPEG encoder quality for a write in `context`.
    fn jpeg_quality(&self, quality: Quality, _context: &str) -> Quality {
        quality
    }

    /// Path reported for a freshly written rendition.
    fn intermediate_file_name(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }

    /// Strip embedded metadata before encoding.
    fn strip_metadata(&self) -> bool {
        true
    }
}

/// Policy with every hook at its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl Policy for DefaultPolicy {}
