//! Output format resolution, shared by save and stream.
//!
//! Only three encoders exist: GIF, PNG and JPEG. A caller-supplied MIME type
//! wins; otherwise the format the image was loaded from is reused. Anything
//! else is an [`EditorError::UnsupportedOutputFormat`], never a guess.

use super::backend::EncodeParams;
use super::error::EditorError;
use super::params::Quality;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Encoders available to every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Gif,
    Png,
    Jpeg,
}

impl OutputFormat {
    /// Map a MIME type to an encoder (case-insensitive).
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "image/gif" => Some(Self::Gif),
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Pick the encoder: the requested MIME type if any, else the original's.
pub fn resolve_format(
    requested_mime: Option<&str>,
    original_mime: &str,
) -> Result<OutputFormat, EditorError> {
    let mime = requested_mime.unwrap_or(original_mime);
    OutputFormat::from_mime(mime)
        .ok_or_else(|| EditorError::UnsupportedOutputFormat(mime.to_string()))
}

/// Whether a PNG write must go through palette reduction first.
///
/// Transforms always produce true colour. When the original was a palette
/// image, the rendition is reduced back so it keeps the original's colour-depth
/// class.
pub fn needs_palette_reduction(
    format: OutputFormat,
    original_indexed: bool,
    buffer_true_color: bool,
) -> bool {
    format == OutputFormat::Png && original_indexed && buffer_true_color
}

/// Encoder quality: JPEG consults the policy, everything else uses the session value.
pub fn resolve_quality(
    format: OutputFormat,
    session: Quality,
    policy: &dyn Policy,
    context: &str,
) -> Quality {
    match format {
        OutputFormat::Jpeg => policy.jpeg_quality(session, context),
        OutputFormat::Gif | OutputFormat::Png => session,
    }
}

/// What the session knows about the bitmap about to be written.
#[derive(Debug, Clone, Copy)]
pub struct SourceState<'a> {
    pub original_mime: &'a str,
    pub original_indexed: bool,
    pub true_color: bool,
    pub quality: Quality,
}

/// A fully resolved save/stream decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub format: OutputFormat,
    pub filename: PathBuf,
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub quality: Quality,
    pub palette_reduction: bool,
    pub strip_metadata: bool,
}

impl OutputPlan {
    pub fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            format: self.format,
            quality: self.quality,
            palette_reduction: self.palette_reduction,
            strip_metadata: self.strip_metadata,
        }
    }
}

/// Resolve format, filename, quality and pre-encode steps for one write.
///
/// `generate_filename` is only called when no filename was requested; it
/// receives the resolved extension.
pub fn resolve_output(
    requested_filename: Option<&Path>,
    requested_mime: Option<&str>,
    source: &SourceState<'_>,
    policy: &dyn Policy,
    context: &str,
    generate_filename: impl FnOnce(&str) -> PathBuf,
) -> Result<OutputPlan, EditorError> {
    let format = resolve_format(requested_mime, source.original_mime)?;
    let extension = format.extension();
    let filename = match requested_filename {
        Some(path) => path.to_path_buf(),
        None => generate_filename(extension),
    };

    Ok(OutputPlan {
        format,
        filename,
        extension,
        mime_type: format.mime_type(),
        quality: resolve_quality(format, source.quality, policy, context),
        palette_reduction: needs_palette_reduction(
            format,
            source.original_indexed,
            source.true_color,
        ),
        strip_metadata: policy.strip_metadata(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultPolicy;

    fn state(original_mime: &str) -> SourceState<'_> {
        SourceState {
            original_mime,
            original_indexed: false,
            true_color: true,
            quality: Quality::new(80),
        }
    }

    fn never_called(_: &str) -> PathBuf {
        panic!("filename generator should not be called")
    }

    #[test]
    fn mime_lookup_is_case_insensitive() {
        assert_eq!(OutputFormat::from_mime("IMAGE/PNG"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_mime("image/jpg"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_mime("image/webp"), None);
    }

    #[test]
    fn requested_mime_wins_over_original() {
        let format = resolve_format(Some("image/gif"), "image/jpeg").unwrap();
        assert_eq!(format, OutputFormat::Gif);
    }

    #[test]
    fn original_mime_is_the_fallback() {
        assert_eq!(
            resolve_format(None, "image/png").unwrap(),
            OutputFormat::Png
        );
    }

    #[test]
    fn webp_request_is_unsupported() {
        let err = resolve_output(
            None,
            Some("image/webp"),
            &state("image/jpeg"),
            &DefaultPolicy,
            "image_resize",
            never_called,
        )
        .unwrap_err();
        assert!(matches!(err, EditorError::UnsupportedOutputFormat(m) if m == "image/webp"));
    }

    #[test]
    fn unsupported_original_without_request_fails() {
        let err = resolve_format(None, "image/tiff").unwrap_err();
        assert!(matches!(err, EditorError::UnsupportedOutputFormat(_)));
    }

    #[test]
    fn png_from_palette_original_requires_reduction() {
        let source = SourceState {
            original_indexed: true,
            ..state("image/png")
        };
        let plan = resolve_output(
            None,
            Some("image/png"),
            &source,
            &DefaultPolicy,
            "image_resize",
            |ext| PathBuf::from(format!("out.{ext}")),
        )
        .unwrap();
        assert!(plan.palette_reduction);
        assert_eq!(plan.filename, PathBuf::from("out.png"));
        assert_eq!(plan.mime_type, "image/png");
    }

    #[test]
    fn png_from_true_color_original_skips_reduction() {
        assert!(!needs_palette_reduction(OutputFormat::Png, false, true));
        // Untouched palette bitmap is written as-is.
        assert!(!needs_palette_reduction(OutputFormat::Png, true, false));
        assert!(!needs_palette_reduction(OutputFormat::Jpeg, true, true));
    }

    #[test]
    fn requested_filename_is_kept() {
        let plan = resolve_output(
            Some(Path::new("/tmp/custom.jpeg")),
            None,
            &state("image/jpeg"),
            &DefaultPolicy,
            "image_resize",
            never_called,
        )
        .unwrap();
        assert_eq!(plan.filename, PathBuf::from("/tmp/custom.jpeg"));
        assert_eq!(plan.extension, "jpg");
    }

    struct FixedJpeg(u32);

    impl Policy for FixedJpeg {
        fn jpeg_quality(&self, _quality: Quality, context: &str) -> Quality {
            assert_eq!(context, "image_resize");
            Quality::new(self.0)
        }

        fn strip_metadata(&self) -> bool {
            false
        }
    }

    #[test]
    fn jpeg_quality_comes_from_policy() {
        let plan = resolve_output(
            None,
            None,
            &state("image/jpeg"),
            &FixedJpeg(60),
            "image_resize",
            |ext| PathBuf::from(format!("a.{ext}")),
        )
        .unwrap();
        assert_eq!(plan.quality.value(), 60);
        assert!(!plan.strip_metadata);
    }

    #[test]
    fn non_jpeg_quality_ignores_policy() {
        let q = resolve_quality(
            OutputFormat::Png,
            Quality::new(75),
            &FixedJpeg(10),
            "image_resize",
        );
        assert_eq!(q.value(), 75);
    }
}
