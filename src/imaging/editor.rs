//! Editing session: one source image, one backend, one decoded bitmap.
//!
//! [`ImageEditor`] owns the decoded handle for its whole life. Every transform
//! follows the same steps: compute geometry, ask the backend for a new bitmap,
//! measure it, then swap it in. If any step fails the old handle stays in place
//! and the half-built one is dropped before the error is returned.
//!
//! [`ImageEditor::multi_resize`] renders each size from the loaded bitmap
//! without installing the result, so the session is unchanged afterwards and
//! sizes never compound. It is the only operation that swallows errors: a size
//! that cannot be produced is logged and left out of the result.
//!
//! Sessions are not shared across threads. Parallel callers run one session
//! per source.

use super::backend::{BackendError, DecodeLimits, Dimensions, ImageBackend};
use super::error::{EditorError, InvalidImageReason};
use super::format::{self, OutputPlan, SourceState};
use super::geometry::{compute_crop_rect, compute_resize_geometry, flip_transform, rotate_angle_normalize};
use super::params::{Quality, RenditionResult, SavedImage, SizeSpec};
use crate::policy::{CONTEXT_RESIZE, CONTEXT_STREAM, DEFAULT_MEMORY_LIMIT, DefaultPolicy, Policy};
use crate::{fsutil, naming};
use log::{debug, info, warn};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the encoded source comes from.
#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// State that exists only once a bitmap is decoded.
struct Loaded<H> {
    handle: H,
    size: Dimensions,
    original_mime: String,
    original_indexed: bool,
}

/// An editing session over one image.
pub struct ImageEditor<B: ImageBackend> {
    backend: B,
    policy: Arc<dyn Policy>,
    source: Source,
    output_dir: Option<PathBuf>,
    quality: Option<Quality>,
    loaded: Option<Loaded<B::Handle>>,
}

fn not_loaded() -> EditorError {
    EditorError::invalid(
        "editor session",
        InvalidImageReason::Decode("no image loaded".into()),
    )
}

/// Measure a transform's output and install it in place of the current bitmap.
fn install<B: ImageBackend>(
    backend: &B,
    loaded: &mut Loaded<B::Handle>,
    next: B::Handle,
    operation: &str,
    failed: fn(BackendError) -> EditorError,
) -> Result<(), EditorError> {
    let size = backend.dimensions(&next).map_err(failed)?;
    debug!(
        "{operation}: {} -> {size} ({})",
        loaded.size,
        backend.name()
    );
    loaded.handle = next;
    loaded.size = size;
    Ok(())
}

/// Render a resize without installing it. `None` means the bitmap is already
/// at the target.
fn render_resize<B: ImageBackend>(
    backend: &B,
    loaded: &Loaded<B::Handle>,
    max_w: u32,
    max_h: u32,
    crop: bool,
) -> Result<Option<B::Handle>, EditorError> {
    let Dimensions { width, height } = loaded.size;
    if (width, height) == (max_w, max_h) {
        return Ok(None);
    }
    let rect = compute_resize_geometry(width, height, max_w, max_h, crop).ok_or(
        EditorError::DimensionError {
            width,
            height,
            max_w,
            max_h,
        },
    )?;
    backend
        .copy_resampled(&loaded.handle, &rect.into())
        .map(Some)
        .map_err(EditorError::ResizeFailed)
}

impl<B: ImageBackend> ImageEditor<B> {
    /// Session over a file on disk. Nothing is read until [`load`](Self::load).
    pub fn new(backend: B, path: impl Into<PathBuf>) -> Self {
        Self::with_source(backend, Source::File(path.into()))
    }

    /// Session over an encoded image already in memory.
    pub fn from_bytes(backend: B, bytes: Vec<u8>) -> Self {
        Self::with_source(backend, Source::Memory(bytes))
    }

    fn with_source(backend: B, source: Source) -> Self {
        Self {
            backend,
            policy: Arc::new(DefaultPolicy),
            source,
            output_dir: None,
            quality: None,
            loaded: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policy = policy;
        self
    }

    /// Directory for generated file names (defaults to the source's directory).
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Path of the current source file, if the session has one.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.source {
            Source::File(path) => Some(path),
            Source::Memory(_) => None,
        }
    }

    fn origin(&self) -> String {
        match &self.source {
            Source::File(path) => path.display().to_string(),
            Source::Memory(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    /// Current dimensions, once loaded.
    pub fn size(&self) -> Option<Dimensions> {
        self.loaded.as_ref().map(|l| l.size)
    }

    /// MIME type of the loaded source (or of the last save).
    pub fn mime_type(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.original_mime.as_str())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn quality(&self) -> Quality {
        self.quality
            .unwrap_or_else(|| self.policy.default_quality())
    }

    pub fn set_quality(&mut self, quality: Quality) {
        self.quality = Some(quality);
    }

    /// Decode the source. Calling it again after a success does nothing.
    pub fn load(&mut self) -> Result<(), EditorError> {
        if self.loaded.is_some() {
            return Ok(());
        }
        if !self.backend.is_available() {
            return Err(EditorError::BackendUnavailable(format!(
                "{} backend is not available",
                self.backend.name()
            )));
        }

        let origin = self.origin();
        let bytes: Cow<'_, [u8]> = match &self.source {
            Source::File(path) => {
                if !path.is_file() {
                    return Err(EditorError::SourceNotFound(path.clone()));
                }
                Cow::Owned(std::fs::read(path).map_err(|e| {
                    EditorError::invalid(&origin, InvalidImageReason::Decode(e.to_string()))
                })?)
            }
            Source::Memory(bytes) => Cow::Borrowed(bytes.as_slice()),
        };

        let limits = DecodeLimits {
            max_alloc: self.policy.memory_limit(DEFAULT_MEMORY_LIMIT),
        };
        let decoded = self.backend.decode(&bytes, &limits).map_err(|e| {
            EditorError::invalid(&origin, InvalidImageReason::Decode(e.to_string()))
        })?;
        let size = self.backend.dimensions(&decoded.handle).map_err(|e| {
            EditorError::invalid(&origin, InvalidImageReason::Size(e.to_string()))
        })?;

        info!(
            "Loaded {origin} ({size}, {}) with {}",
            decoded.mime_type,
            self.backend.name()
        );
        self.loaded = Some(Loaded {
            handle: decoded.handle,
            size,
            original_mime: decoded.mime_type,
            original_indexed: decoded.indexed,
        });
        if self.quality.is_none() {
            self.quality = Some(self.policy.default_quality());
        }
        Ok(())
    }

    /// Load on demand and split the borrow between backend and loaded state.
    fn session(&mut self) -> Result<(&B, &mut Loaded<B::Handle>), EditorError> {
        self.load()?;
        let backend = &self.backend;
        self.loaded
            .as_mut()
            .map(|loaded| (backend, loaded))
            .ok_or_else(not_loaded)
    }

    fn loaded(&self) -> Result<&Loaded<B::Handle>, EditorError> {
        self.loaded.as_ref().ok_or_else(not_loaded)
    }

    /// Fit inside (or, with `crop`, fill exactly) `max_w × max_h`.
    ///
    /// Already being at `max_w × max_h` is a success that touches nothing. A
    /// `0` bound leaves that axis free. Never enlarges.
    pub fn resize(&mut self, max_w: u32, max_h: u32, crop: bool) -> Result<(), EditorError> {
        let (backend, loaded) = self.session()?;
        match render_resize(backend, loaded, max_w, max_h, crop)? {
            Some(next) => install(backend, loaded, next, "resize", EditorError::ResizeFailed),
            None => Ok(()),
        }
    }

    /// Cut out a rectangle, optionally scaling it to `dst_w × dst_h`.
    ///
    /// With `absolute`, `src_w`/`src_h` are the right/bottom coordinates
    /// instead of extents.
    #[allow(clippy::too_many_arguments)]
    pub fn crop(
        &mut self,
        src_x: u32,
        src_y: u32,
        src_w: u32,
        src_h: u32,
        dst_w: Option<u32>,
        dst_h: Option<u32>,
        absolute: bool,
    ) -> Result<(), EditorError> {
        let (backend, loaded) = self.session()?;
        let rect = compute_crop_rect(src_x, src_y, src_w, src_h, dst_w, dst_h, absolute)
            .ok_or_else(|| {
                EditorError::CropFailed(BackendError::InvalidRegion(format!(
                    "empty crop {src_w}x{src_h} at ({src_x}, {src_y})"
                )))
            })?;
        let next = backend
            .copy_resampled(&loaded.handle, &rect.into())
            .map_err(EditorError::CropFailed)?;
        install(backend, loaded, next, "crop", EditorError::CropFailed)
    }

    /// Rotate counter-clockwise by `angle` degrees, whatever the backend's
    /// native direction.
    pub fn rotate(&mut self, angle: f64) -> Result<(), EditorError> {
        let (backend, loaded) = self.session()?;
        let effective = rotate_angle_normalize(angle, backend.rotation());
        let next = backend
            .rotate(&loaded.handle, effective)
            .map_err(EditorError::RotateFailed)?;
        install(backend, loaded, next, "rotate", EditorError::RotateFailed)
    }

    /// Mirror top-to-bottom (`horizontal`) and/or left-to-right (`vertical`).
    pub fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<(), EditorError> {
        let (backend, loaded) = self.session()?;
        let region = flip_transform(
            horizontal,
            vertical,
            loaded.size.width,
            loaded.size.height,
        );
        let next = backend
            .copy_resampled(&loaded.handle, &region)
            .map_err(EditorError::FlipFailed)?;
        install(backend, loaded, next, "flip", EditorError::FlipFailed)
    }

    /// Write one rendition per size, keyed by [`SizeSpec::key`].
    ///
    /// Every size is computed from the bitmap as it stands when the batch
    /// starts. Sizes that fail (bad bounds, upscaling, backend or write errors)
    /// and repeated keys are logged and omitted; the rest still succeed.
    pub fn multi_resize(&mut self, sizes: &[SizeSpec]) -> BTreeMap<String, RenditionResult> {
        let mut results = BTreeMap::new();
        if let Err(e) = self.load() {
            warn!("Skipping all sizes for {}: {e}", self.origin());
            return results;
        }

        for spec in sizes {
            if results.contains_key(&spec.key) {
                warn!("Skipping duplicate size key '{}'", spec.key);
                continue;
            }
            match self.render_size(spec) {
                Ok(rendition) => {
                    results.insert(spec.key.clone(), rendition);
                }
                Err(e) => warn!(
                    "Skipping size '{}' ({}x{}) for {}: {e}",
                    spec.key,
                    spec.width,
                    spec.height,
                    self.origin()
                ),
            }
        }
        results
    }

    fn render_size(&self, spec: &SizeSpec) -> Result<RenditionResult, EditorError> {
        let loaded = self.loaded()?;
        let rendered = render_resize(&self.backend, loaded, spec.width, spec.height, spec.crop)?;
        let saved = match &rendered {
            Some(handle) => {
                let size = self
                    .backend
                    .dimensions(handle)
                    .map_err(EditorError::ResizeFailed)?;
                self.write(loaded, handle, size, None, None)?
            }
            None => self.write(loaded, &loaded.handle, loaded.size, None, None)?,
        };
        Ok(saved.into())
    }

    /// Resolve format, file name, quality and pre-encode steps for a write.
    pub fn resolve_output(
        &self,
        filename: Option<&Path>,
        mime_type: Option<&str>,
    ) -> Result<OutputPlan, EditorError> {
        let loaded = self.loaded()?;
        self.plan(
            loaded,
            &loaded.handle,
            loaded.size,
            filename,
            mime_type,
            CONTEXT_RESIZE,
        )
    }

    fn plan(
        &self,
        loaded: &Loaded<B::Handle>,
        handle: &B::Handle,
        size: Dimensions,
        filename: Option<&Path>,
        mime_type: Option<&str>,
        context: &str,
    ) -> Result<OutputPlan, EditorError> {
        let state = SourceState {
            original_mime: &loaded.original_mime,
            original_indexed: loaded.original_indexed,
            true_color: self.backend.is_true_color(handle),
            quality: self.quality(),
        };
        format::resolve_output(
            filename,
            mime_type,
            &state,
            self.policy.as_ref(),
            context,
            |extension| {
                naming::generate_filename(
                    self.source_path(),
                    &naming::size_suffix(size.width, size.height),
                    self.output_dir.as_deref(),
                    extension,
                )
            },
        )
    }

    fn write(
        &self,
        loaded: &Loaded<B::Handle>,
        handle: &B::Handle,
        size: Dimensions,
        filename: Option<&Path>,
        mime_type: Option<&str>,
    ) -> Result<SavedImage, EditorError> {
        let plan = self.plan(loaded, handle, size, filename, mime_type, CONTEXT_RESIZE)?;
        let bytes = self
            .backend
            .encode(handle, &plan.encode_params())
            .map_err(EditorError::EncodeFailed)?;

        if let Some(parent) = plan.filename.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EditorError::EncodeFailed(BackendError::Io(e)))?;
        }
        std::fs::write(&plan.filename, &bytes)
            .map_err(|e| EditorError::EncodeFailed(BackendError::Io(e)))?;
        if let Err(e) = fsutil::normalize_permissions(&plan.filename) {
            warn!(
                "Could not set permissions on {}: {e}",
                plan.filename.display()
            );
        }

        info!(
            "Saved {} ({size}, {})",
            plan.filename.display(),
            plan.mime_type
        );
        let reported = self.policy.intermediate_file_name(&plan.filename);
        Ok(SavedImage {
            file: naming::base_name(&reported),
            path: plan.filename,
            width: size.width,
            height: size.height,
            mime_type: plan.mime_type.to_string(),
        })
    }

    /// Encode the current bitmap to a file.
    ///
    /// Without `filename` a name is generated from the source and the current
    /// size. On success the session points at the written file, so later
    /// generated names derive from it. The original format stays that of the
    /// decoded source.
    pub fn save(
        &mut self,
        filename: Option<&Path>,
        mime_type: Option<&str>,
    ) -> Result<SavedImage, EditorError> {
        self.load()?;
        let saved = {
            let loaded = self.loaded()?;
            self.write(loaded, &loaded.handle, loaded.size, filename, mime_type)?
        };
        self.source = Source::File(saved.path.clone());
        Ok(saved)
    }

    /// Encode the current bitmap to `out`, returning its content type.
    pub fn stream(
        &mut self,
        mime_type: Option<&str>,
        out: &mut impl Write,
    ) -> Result<&'static str, EditorError> {
        self.load()?;
        let loaded = self.loaded()?;
        let plan = self.plan(
            loaded,
            &loaded.handle,
            loaded.size,
            None,
            mime_type,
            CONTEXT_STREAM,
        )?;
        let bytes = self
            .backend
            .encode(&loaded.handle, &plan.encode_params())
            .map_err(EditorError::EncodeFailed)?;
        out.write_all(&bytes)
            .map_err(|e| EditorError::EncodeFailed(BackendError::Io(e)))?;
        debug!("Streamed {} bytes as {}", bytes.len(), plan.mime_type);
        Ok(plan.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, Primitive, RecordedOp};
    use crate::imaging::backend::{CopyRegion, RotationDirection};
    use crate::imaging::format::OutputFormat;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Temp dir holding a non-empty `photo.jpg` (the mock ignores its content).
    fn source_file() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo.jpg");
        std::fs::write(&path, b"fake jpeg bytes").unwrap();
        (tmp, path)
    }

    fn editor_for(backend: MockBackend) -> (TempDir, ImageEditor<MockBackend>) {
        let (tmp, path) = source_file();
        (tmp, ImageEditor::new(backend, path))
    }

    fn copies(editor: &ImageEditor<MockBackend>) -> Vec<CopyRegion> {
        editor
            .backend()
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Copy(region) => Some(region),
                _ => None,
            })
            .collect()
    }

    fn encodes(editor: &ImageEditor<MockBackend>) -> Vec<crate::imaging::EncodeParams> {
        editor
            .backend()
            .get_operations()
            .into_iter()
            .filter_map(|op| match op {
                RecordedOp::Encode(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // load
    // =========================================================================

    #[test]
    fn load_missing_file_is_source_not_found() {
        let tmp = TempDir::new().unwrap();
        let mut editor = ImageEditor::new(MockBackend::new(), tmp.path().join("nope.jpg"));
        assert!(matches!(
            editor.load(),
            Err(EditorError::SourceNotFound(_))
        ));
        assert!(!editor.is_loaded());
    }

    #[test]
    fn load_zero_byte_file_is_invalid_image() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();
        let mut editor = ImageEditor::new(MockBackend::new(), &path);
        assert!(matches!(
            editor.load(),
            Err(EditorError::InvalidImage {
                reason: InvalidImageReason::Decode(_),
                ..
            })
        ));
    }

    #[test]
    fn load_size_failure_is_size_variant() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Dimensions);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.load(),
            Err(EditorError::InvalidImage {
                reason: InvalidImageReason::Size(_),
                ..
            })
        ));
        assert!(!editor.is_loaded());
    }

    #[test]
    fn load_unavailable_backend_fails() {
        let backend = MockBackend {
            available: false,
            ..MockBackend::default()
        };
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.load(),
            Err(EditorError::BackendUnavailable(_))
        ));
        assert!(editor.backend().get_operations().is_empty());
    }

    #[test]
    fn load_is_idempotent() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.load().unwrap();
        editor.load().unwrap();
        let decodes = editor
            .backend()
            .get_operations()
            .iter()
            .filter(|op| matches!(op, RecordedOp::Decode { .. }))
            .count();
        assert_eq!(decodes, 1);
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
        assert_eq!(editor.mime_type(), Some("image/jpeg"));
        assert_eq!(editor.quality(), Quality::default());
    }

    #[test]
    fn load_from_memory() {
        let mut editor = ImageEditor::from_bytes(MockBackend::new(), b"bytes".to_vec());
        editor.load().unwrap();
        assert!(editor.source_path().is_none());
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    struct Limits;

    impl Policy for Limits {
        fn memory_limit(&self, default: u64) -> u64 {
            default * 2
        }

        fn default_quality(&self) -> Quality {
            Quality::new(70)
        }
    }

    #[test]
    fn load_applies_policy_limit_and_quality() {
        let (_tmp, editor) = editor_for(MockBackend::new());
        let mut editor = editor.with_policy(Arc::new(Limits));
        editor.load().unwrap();
        assert!(matches!(
            editor.backend().get_operations()[0],
            RecordedOp::Decode { max_alloc, .. } if max_alloc == DEFAULT_MEMORY_LIMIT * 2
        ));
        assert_eq!(editor.quality().value(), 70);
    }

    #[test]
    fn explicit_quality_survives_load() {
        let (_tmp, editor) = editor_for(MockBackend::new());
        let mut editor = editor.with_policy(Arc::new(Limits));
        editor.set_quality(Quality::new(55));
        editor.load().unwrap();
        assert_eq!(editor.quality().value(), 55);
    }

    // =========================================================================
    // resize
    // =========================================================================

    #[test]
    fn resize_fits_and_updates_size() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.resize(100, 100, false).unwrap();
        assert_eq!(editor.size(), Some(Dimensions::new(100, 75)));

        let copy = copies(&editor)[0];
        assert_eq!((copy.src_w, copy.src_h), (1600, 1200));
    }

    #[test]
    fn resize_to_current_size_is_noop() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.resize(1600, 1200, false).unwrap();
        assert_eq!(editor.backend().copy_count(), 0);
    }

    #[test]
    fn repeated_crop_resize_copies_once() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.resize(150, 150, true).unwrap();
        editor.resize(150, 150, true).unwrap();
        assert_eq!(editor.backend().copy_count(), 1);
        assert_eq!(editor.size(), Some(Dimensions::new(150, 150)));
    }

    #[test]
    fn resize_upscale_is_dimension_error() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let err = editor.resize(3200, 2400, false).unwrap_err();
        assert!(matches!(
            err,
            EditorError::DimensionError {
                width: 1600,
                height: 1200,
                ..
            }
        ));
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    #[test]
    fn resize_backend_failure_keeps_handle() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Copy);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.resize(100, 100, false),
            Err(EditorError::ResizeFailed(_))
        ));
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    // =========================================================================
    // crop / rotate / flip
    // =========================================================================

    #[test]
    fn crop_with_scale() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.crop(10, 20, 400, 300, Some(200), Some(150), false).unwrap();
        assert_eq!(editor.size(), Some(Dimensions::new(200, 150)));
        let copy = copies(&editor)[0];
        assert_eq!((copy.src_x, copy.src_y, copy.src_w, copy.src_h), (10, 20, 400, 300));
    }

    #[test]
    fn crop_absolute_coordinates() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.crop(100, 100, 500, 400, None, None, true).unwrap();
        assert_eq!(editor.size(), Some(Dimensions::new(400, 300)));
    }

    #[test]
    fn crop_outside_image_fails() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let err = editor.crop(1500, 0, 400, 300, None, None, false).unwrap_err();
        assert!(matches!(err, EditorError::CropFailed(BackendError::InvalidRegion(_))));
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    #[test]
    fn crop_empty_rect_fails() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        assert!(matches!(
            editor.crop(0, 0, 0, 10, None, None, false),
            Err(EditorError::CropFailed(_))
        ));
    }

    #[test]
    fn rotate_passes_angle_to_counter_clockwise_backend() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.rotate(90.0).unwrap();
        assert!(editor
            .backend()
            .get_operations()
            .contains(&RecordedOp::Rotate(90.0)));
        assert_eq!(editor.size(), Some(Dimensions::new(1200, 1600)));
    }

    #[test]
    fn rotate_inverts_angle_for_clockwise_backend() {
        let backend = MockBackend {
            direction: RotationDirection::Clockwise,
            ..MockBackend::default()
        };
        let (_tmp, mut editor) = editor_for(backend);
        editor.rotate(90.0).unwrap();
        assert!(editor
            .backend()
            .get_operations()
            .contains(&RecordedOp::Rotate(270.0)));
    }

    #[test]
    fn rotate_failure_is_rotate_failed() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Rotate);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.rotate(45.0),
            Err(EditorError::RotateFailed(_))
        ));
    }

    #[test]
    fn flip_uses_negative_extents() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.flip(true, true).unwrap();
        let copy = copies(&editor)[0];
        assert_eq!((copy.src_x, copy.src_y), (1599, 1199));
        assert_eq!((copy.src_w, copy.src_h), (-1600, -1200));
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    #[test]
    fn flip_failure_is_flip_failed() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Copy);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.flip(false, true),
            Err(EditorError::FlipFailed(_))
        ));
    }

    #[test]
    fn transform_without_source_fails_to_load() {
        let tmp = TempDir::new().unwrap();
        let mut editor = ImageEditor::new(MockBackend::new(), tmp.path().join("gone.png"));
        assert!(matches!(
            editor.rotate(90.0),
            Err(EditorError::SourceNotFound(_))
        ));
    }

    // =========================================================================
    // multi_resize
    // =========================================================================

    #[test]
    fn multi_resize_skips_invalid_size_and_restores() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        let results = editor.multi_resize(&[
            SizeSpec::new("k1", 100, 100, false),
            SizeSpec::new("k2", 0, 0, false),
        ]);

        assert_eq!(results.len(), 1);
        let k1 = &results["k1"];
        assert_eq!((k1.width, k1.height), (100, 75));
        assert_eq!(k1.file_name, "photo-100x75.jpg");
        assert_eq!(k1.mime_type, "image/jpeg");
        assert!(tmp.path().join("photo-100x75.jpg").exists());
        assert_eq!(editor.size(), Some(Dimensions::new(1600, 1200)));
    }

    #[test]
    fn multi_resize_never_compounds() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let results = editor.multi_resize(&[
            SizeSpec::new("medium", 800, 800, false),
            SizeSpec::new("thumb", 150, 150, true),
        ]);
        assert_eq!(results.len(), 2);

        let copies = copies(&editor);
        assert_eq!(copies.len(), 2);
        // The fit reads the full original; the fill reads a centred 1200x1200.
        assert_eq!((copies[0].src_w, copies[0].src_h), (1600, 1200));
        assert_eq!(
            (copies[1].src_x, copies[1].src_w, copies[1].src_h),
            (200, 1200, 1200)
        );
    }

    #[test]
    fn multi_resize_continues_after_backend_failure() {
        let backend = MockBackend::new();
        backend.fail_copies_to_width(300);
        let (_tmp, mut editor) = editor_for(backend);
        let results = editor.multi_resize(&[
            SizeSpec::new("small", 300, 300, false),
            SizeSpec::new("large", 1024, 1024, false),
        ]);
        assert!(!results.contains_key("small"));
        assert_eq!(results["large"].width, 1024);
    }

    #[test]
    fn multi_resize_skips_duplicate_keys() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let results = editor.multi_resize(&[
            SizeSpec::new("a", 400, 400, false),
            SizeSpec::new("a", 200, 200, false),
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(results["a"].width, 400);
        assert_eq!(editor.backend().copy_count(), 1);
    }

    #[test]
    fn multi_resize_at_current_size_writes_as_is() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let results = editor.multi_resize(&[SizeSpec::new("full", 1600, 1200, false)]);
        assert_eq!(results["full"].file_name, "photo-1600x1200.jpg");
        assert_eq!(editor.backend().copy_count(), 0);
    }

    #[test]
    fn multi_resize_on_unloadable_source_is_empty() {
        let tmp = TempDir::new().unwrap();
        let mut editor = ImageEditor::new(MockBackend::new(), tmp.path().join("none.jpg"));
        assert!(editor
            .multi_resize(&[SizeSpec::new("a", 10, 10, false)])
            .is_empty());
    }

    #[test]
    fn multi_resize_encode_failure_skips_entry() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Encode);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(editor
            .multi_resize(&[SizeSpec::new("a", 10, 10, false)])
            .is_empty());
    }

    // =========================================================================
    // save / stream
    // =========================================================================

    #[test]
    fn save_generates_name_and_repoints_session() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        editor.resize(400, 400, false).unwrap();
        let saved = editor.save(None, None).unwrap();

        assert_eq!(saved.path, tmp.path().join("photo-400x300.jpg"));
        assert_eq!(saved.file, "photo-400x300.jpg");
        assert_eq!((saved.width, saved.height), (400, 300));
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"jpg:400x300");
        assert_eq!(editor.source_path(), Some(saved.path.as_path()));
    }

    #[test]
    fn save_to_other_format_keeps_original_mime() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        let target = tmp.path().join("nested/out.png");
        let saved = editor.save(Some(&target), Some("image/png")).unwrap();
        assert_eq!(saved.mime_type, "image/png");
        assert!(target.exists());
        assert_eq!(editor.mime_type(), Some("image/jpeg"));
        assert_eq!(editor.source_path(), Some(target.as_path()));
    }

    #[test]
    fn later_outputs_default_to_the_source_format_after_a_conversion() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        editor
            .save(Some(&tmp.path().join("copy.png")), Some("image/png"))
            .unwrap();

        let results = editor.multi_resize(&[SizeSpec::new("thumb", 100, 100, false)]);
        assert_eq!(results["thumb"].mime_type, "image/jpeg");
        assert_eq!(results["thumb"].file_name, "copy-100x75.jpg");

        let mut out = Vec::new();
        assert_eq!(editor.stream(None, &mut out).unwrap(), "image/jpeg");
        let saved = editor.save(None, None).unwrap();
        assert_eq!(saved.mime_type, "image/jpeg");
    }

    #[test]
    fn save_into_output_dir() {
        let (_tmp, editor) = editor_for(MockBackend::new());
        let out = TempDir::new().unwrap();
        let mut editor = editor.with_output_dir(out.path());
        let saved = editor.save(None, Some("image/gif")).unwrap();
        assert_eq!(saved.path, out.path().join("photo-1600x1200.gif"));
    }

    #[test]
    fn save_unsupported_mime_writes_nothing() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        let err = editor.save(None, Some("image/webp")).unwrap_err();
        assert!(matches!(err, EditorError::UnsupportedOutputFormat(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn save_encode_failure_is_encode_failed() {
        let backend = MockBackend::new();
        backend.fail(Primitive::Encode);
        let (_tmp, mut editor) = editor_for(backend);
        assert!(matches!(
            editor.save(None, None),
            Err(EditorError::EncodeFailed(_))
        ));
    }

    #[test]
    fn palette_source_png_is_reduced_after_transform() {
        let backend = MockBackend {
            indexed: true,
            ..MockBackend::with_source(400, 400, "image/png")
        };
        let (_tmp, mut editor) = editor_for(backend);
        editor.save(None, None).unwrap();
        editor.resize(100, 100, false).unwrap();
        editor.save(None, None).unwrap();

        let params = encodes(&editor);
        assert_eq!(params[0].format, OutputFormat::Png);
        assert!(!params[0].palette_reduction, "untouched palette kept as-is");
        assert!(params[1].palette_reduction);
    }

    #[test]
    fn true_color_png_is_not_reduced() {
        let backend = MockBackend::with_source(400, 400, "image/png");
        let (_tmp, mut editor) = editor_for(backend);
        editor.resize(100, 100, false).unwrap();
        editor.save(None, None).unwrap();
        assert!(!encodes(&editor)[0].palette_reduction);
    }

    /// Records every JPEG quality context it is asked about.
    #[derive(Default)]
    struct Recording {
        contexts: Mutex<Vec<String>>,
    }

    impl Policy for Recording {
        fn jpeg_quality(&self, _quality: Quality, context: &str) -> Quality {
            self.contexts.lock().unwrap().push(context.to_string());
            Quality::new(42)
        }

        fn intermediate_file_name(&self, path: &Path) -> PathBuf {
            path.with_file_name("renamed.jpg")
        }

        fn strip_metadata(&self) -> bool {
            false
        }
    }

    #[test]
    fn policy_drives_quality_name_and_metadata() {
        let policy = Arc::new(Recording::default());
        let (_tmp, editor) = editor_for(MockBackend::new());
        let mut editor = editor.with_policy(policy.clone());

        let saved = editor.save(None, None).unwrap();
        assert_eq!(saved.file, "renamed.jpg");
        assert!(saved.path.ends_with("photo-1600x1200.jpg"));

        let mut sink = Vec::new();
        editor.stream(None, &mut sink).unwrap();

        let params = encodes(&editor);
        assert!(params.iter().all(|p| p.quality.value() == 42 && !p.strip_metadata));
        assert_eq!(
            *policy.contexts.lock().unwrap(),
            vec!["image_resize".to_string(), "edit_image".to_string()]
        );
    }

    #[test]
    fn stream_writes_bytes_and_returns_content_type() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        editor.resize(160, 160, true).unwrap();
        let mut sink = Vec::new();
        let content_type = editor.stream(Some("image/png"), &mut sink).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(sink, b"png:160x160");
    }

    #[test]
    fn stream_unsupported_mime_fails() {
        let (_tmp, mut editor) = editor_for(MockBackend::new());
        let mut sink = Vec::new();
        assert!(matches!(
            editor.stream(Some("image/bmp"), &mut sink),
            Err(EditorError::UnsupportedOutputFormat(_))
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn resolve_output_plans_without_writing() {
        let (tmp, mut editor) = editor_for(MockBackend::new());
        editor.load().unwrap();
        let plan = editor.resolve_output(None, None).unwrap();
        assert_eq!(plan.filename, tmp.path().join("photo-1600x1200.jpg"));
        assert_eq!(plan.mime_type, "image/jpeg");
        assert_eq!(editor.backend().get_operations().len(), 1);
    }
}
