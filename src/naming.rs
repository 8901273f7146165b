//! Output filename generation.
//!
//! Renditions are written next to their source (or into an explicit output
//! directory) as `{stem}-{suffix}.{ext}`, where the suffix is the rendition's
//! `{width}x{height}`:
//!
//! - `uploads/dawn.jpg` at 150x150 → `uploads/dawn-150x150.jpg`
//! - `uploads/logo.gif` at 300x120 as PNG → `uploads/logo-300x120.png`
//! - in-memory source at 64x64 → `image-64x64.jpg`

use std::path::{Path, PathBuf};

/// Stem used when the source has no file name (e.g. decoded from memory).
const FALLBACK_STEM: &str = "image";

/// Suffix identifying a rendition's size.
pub fn size_suffix(width: u32, height: u32) -> String {
    format!("{width}x{height}")
}

/// Build `{dir}/{stem}-{suffix}.{extension}` for a source file.
///
/// `dest_dir` overrides the source's own directory. With neither, the name is
/// relative to the working directory.
pub fn generate_filename(
    source: Option<&Path>,
    suffix: &str,
    dest_dir: Option<&Path>,
    extension: &str,
) -> PathBuf {
    let stem = source
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_STEM);

    let dir = dest_dir
        .map(Path::to_path_buf)
        .or_else(|| source.and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or_default();

    let name = if suffix.is_empty() {
        format!("{stem}.{extension}")
    } else {
        format!("{stem}-{suffix}.{extension}")
    };
    dir.join(name)
}

/// Whether a file name looks like one this module generated (`stem-WxH.ext`).
///
/// Batch runs use this to skip renditions left over from earlier runs.
pub fn has_size_suffix(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    let Some((_, suffix)) = stem.rsplit_once('-') else {
        return false;
    };
    let Some((w, h)) = suffix.split_once('x') else {
        return false;
    };
    let numeric = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    numeric(w) && numeric(h)
}

/// Base name of a path as a display string.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
