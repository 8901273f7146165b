//! CLI output formatting.
//!
//! Every entity is shown as a header line (what it is) followed by indented
//! context lines (where it came from, what was produced).
//!
//! # Output Format
//!
//! ## Backends
//!
//! ```text
//! Backends
//!     magick: available (selected)
//!     raster: available
//! ```
//!
//! ## Single-image commands
//!
//! ```text
//! dawn-150x150.jpg (150x150, image/jpeg)
//!     Path: uploads/dawn-150x150.jpg
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 dawn.jpg (2 of 3 sizes)
//!     Source: uploads/dawn.jpg
//!     thumbnail: dawn-150x150.jpg (150x150)
//!     medium: dawn-300x225.jpg (300x225)
//!     large: skipped
//!
//! Processed 1 image, 2 renditions, 1 skipped
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure
//! and do no I/O.

use crate::imaging::{Availability, BackendKind, Dimensions, RenditionResult, SavedImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Backends
// ============================================================================

/// Format the probe report, marking the engine a run would use.
pub fn format_backends(availability: Availability, selected: Option<BackendKind>) -> Vec<String> {
    let mut lines = vec!["Backends".to_string()];
    for kind in BackendKind::ALL {
        let status = if availability.contains(kind) {
            "available"
        } else {
            "not available"
        };
        let marker = if selected == Some(kind) {
            " (selected)"
        } else {
            ""
        };
        lines.push(format!("{}{kind}: {status}{marker}", indent(1)));
    }
    lines
}

pub fn print_backends(availability: Availability, selected: Option<BackendKind>) {
    for line in format_backends(availability, selected) {
        println!("{}", line);
    }
}

// ============================================================================
// Single-image commands
// ============================================================================

/// Format what `info` learned about a source.
pub fn format_info(path: &Path, size: Dimensions, mime_type: &str, backend: &str) -> Vec<String> {
    vec![
        display_name(path),
        format!("{}Size: {size}", indent(1)),
        format!("{}Type: {mime_type}", indent(1)),
        format!("{}Backend: {backend}", indent(1)),
    ]
}

pub fn print_info(path: &Path, size: Dimensions, mime_type: &str, backend: &str) {
    for line in format_info(path, size, mime_type, backend) {
        println!("{}", line);
    }
}

/// Format the result of a save.
pub fn format_saved(saved: &SavedImage) -> Vec<String> {
    vec![
        format!(
            "{} ({}x{}, {})",
            saved.file, saved.width, saved.height, saved.mime_type
        ),
        format!("{}Path: {}", indent(1), saved.path.display()),
    ]
}

pub fn print_saved(saved: &SavedImage) {
    for line in format_saved(saved) {
        println!("{}", line);
    }
}

// ============================================================================
// Batch
// ============================================================================

/// Outcome of one source in a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub source: PathBuf,
    /// Requested size keys, in configured order.
    pub requested: Vec<String>,
    pub renditions: BTreeMap<String, RenditionResult>,
    /// Set when the source could not be loaded at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchReport {
    pub fn skipped(&self) -> usize {
        self.requested.len().saturating_sub(self.renditions.len())
    }
}

/// Format one source of a batch run.
pub fn format_batch_report(index: usize, report: &BatchReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} ({} of {})",
        format_index(index),
        display_name(&report.source),
        report.renditions.len(),
        plural(report.requested.len(), "size", "sizes")
    )];
    lines.push(format!(
        "{}Source: {}",
        indent(1),
        report.source.display()
    ));
    if let Some(error) = &report.error {
        lines.push(format!("{}Error: {error}", indent(1)));
        return lines;
    }
    for key in &report.requested {
        match report.renditions.get(key) {
            Some(r) => lines.push(format!(
                "{}{key}: {} ({}x{})",
                indent(1),
                r.file_name,
                r.width,
                r.height
            )),
            None => lines.push(format!("{}{key}: skipped", indent(1))),
        }
    }
    lines
}

/// Format the closing summary of a batch run.
pub fn format_batch_summary(reports: &[BatchReport]) -> String {
    let renditions: usize = reports.iter().map(|r| r.renditions.len()).sum();
    let skipped: usize = reports.iter().map(BatchReport::skipped).sum();
    format!(
        "Processed {}, {}, {} skipped",
        plural(reports.len(), "image", "images"),
        plural(renditions, "rendition", "renditions"),
        skipped
    )
}

pub fn print_batch(reports: &[BatchReport]) {
    for (i, report) in reports.iter().enumerate() {
        for line in format_batch_report(i + 1, report) {
            println!("{}", line);
        }
    }
    if !reports.is_empty() {
        println!();
    }
    println!("{}", format_batch_summary(reports));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendition(file: &str, width: u32, height: u32) -> RenditionResult {
        RenditionResult {
            width,
            height,
            mime_type: "image/jpeg".into(),
            file_name: file.into(),
        }
    }

    fn report() -> BatchReport {
        let mut renditions = BTreeMap::new();
        renditions.insert("thumbnail".to_string(), rendition("dawn-150x150.jpg", 150, 150));
        renditions.insert("medium".to_string(), rendition("dawn-300x225.jpg", 300, 225));
        BatchReport {
            source: PathBuf::from("uploads/dawn.jpg"),
            requested: vec!["thumbnail".into(), "medium".into(), "large".into()],
            renditions,
            error: None,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_single_digit() {
        assert_eq!(format_index(1), "001");
    }

    #[test]
    fn format_index_triple_digit() {
        assert_eq!(format_index(123), "123");
    }

    #[test]
    fn plural_picks_form() {
        assert_eq!(plural(1, "image", "images"), "1 image");
        assert_eq!(plural(0, "image", "images"), "0 images");
    }

    // =========================================================================
    // Views
    // =========================================================================

    #[test]
    fn backends_mark_selected() {
        let lines = format_backends(
            Availability {
                raster: true,
                magick: false,
            },
            Some(BackendKind::Raster),
        );
        assert_eq!(
            lines,
            vec![
                "Backends",
                "    magick: not available",
                "    raster: available (selected)",
            ]
        );
    }

    #[test]
    fn info_lists_size_type_backend() {
        let lines = format_info(
            Path::new("/photos/dawn.jpg"),
            Dimensions::new(1600, 1200),
            "image/jpeg",
            "raster",
        );
        assert_eq!(lines[0], "dawn.jpg");
        assert_eq!(lines[1], "    Size: 1600x1200");
        assert_eq!(lines[2], "    Type: image/jpeg");
        assert_eq!(lines[3], "    Backend: raster");
    }

    #[test]
    fn saved_shows_file_then_path() {
        let saved = SavedImage {
            path: PathBuf::from("uploads/dawn-150x150.jpg"),
            file: "dawn-150x150.jpg".into(),
            width: 150,
            height: 150,
            mime_type: "image/jpeg".into(),
        };
        assert_eq!(
            format_saved(&saved),
            vec![
                "dawn-150x150.jpg (150x150, image/jpeg)",
                "    Path: uploads/dawn-150x150.jpg",
            ]
        );
    }

    #[test]
    fn batch_report_follows_requested_order() {
        let lines = format_batch_report(1, &report());
        assert_eq!(
            lines,
            vec![
                "001 dawn.jpg (2 of 3 sizes)",
                "    Source: uploads/dawn.jpg",
                "    thumbnail: dawn-150x150.jpg (150x150)",
                "    medium: dawn-300x225.jpg (300x225)",
                "    large: skipped",
            ]
        );
    }

    #[test]
    fn batch_report_shows_load_error() {
        let failed = BatchReport {
            renditions: BTreeMap::new(),
            error: Some("not an image".into()),
            ..report()
        };
        let lines = format_batch_report(2, &failed);
        assert_eq!(lines[0], "002 dawn.jpg (0 of 3 sizes)");
        assert_eq!(lines[2], "    Error: not an image");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn batch_summary_counts() {
        assert_eq!(
            format_batch_summary(&[report()]),
            "Processed 1 image, 2 renditions, 1 skipped"
        );
        assert_eq!(
            format_batch_summary(&[]),
            "Processed 0 images, 0 renditions, 0 skipped"
        );
    }

    #[test]
    fn batch_report_serializes_without_empty_error() {
        let json = serde_json::to_value(report()).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["renditions"]["medium"]["file_name"], "dawn-300x225.jpg");
    }
}
