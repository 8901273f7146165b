//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the only thing the editor knows about an
//! engine. A backend supplies primitives (decode, measure, resampling copy,
//! native rotate, encode) and nothing else: geometry, the no-op checks, batch
//! generation and output resolution live above it and are shared.
//!
//! Two implementations ship with the crate:
//!
//! | Backend | Engine | Native rotation |
//! |---|---|---|
//! | [`RustBackend`](super::rust_backend::RustBackend) | `image` crate, in process | counter-clockwise |
//! | [`MagickBackend`](super::magick_backend::MagickBackend) | ImageMagick CLI over pipes | clockwise |
//!
//! A backend's `Handle` is an owned decoded bitmap. Dropping it releases the
//! resource; the editor never clones or shares one.

use super::format::OutputFormat;
use super::params::Quality;
use std::fmt;
use thiserror::Error;

pub use super::geometry::{CopyRegion, RotationDirection};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Not supported by this backend: {0}")]
    Unsupported(String),
    #[error("Invalid copy region: {0}")]
    InvalidRegion(String),
}

/// Width and height of a bitmap in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resource ceilings handed to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Upper bound on bytes the decoder may allocate.
    pub max_alloc: u64,
}

impl DecodeLimits {
    /// Refuse a `width × height` RGBA canvas that would not fit in `max_alloc`.
    ///
    /// Transforms allocate their output from caller-supplied sizes, so every
    /// backend checks here before building one.
    pub fn check_canvas(&self, width: u32, height: u32) -> Result<(), BackendError> {
        let bytes = u64::from(width)
            .checked_mul(u64::from(height))
            .and_then(|pixels| pixels.checked_mul(4));
        match bytes {
            Some(bytes) if bytes <= self.max_alloc => Ok(()),
            _ => Err(BackendError::InvalidRegion(format!(
                "{width}x{height} canvas exceeds the {} byte memory limit",
                self.max_alloc
            ))),
        }
    }
}

/// A freshly decoded bitmap plus what the decoder learned about its source.
#[derive(Debug)]
pub struct Decoded<H> {
    pub handle: H,
    /// MIME type of the encoded input, e.g. `image/png`.
    pub mime_type: String,
    /// Whether the source stored palette indices rather than true colour.
    pub indexed: bool,
}

/// Everything an encoder needs to turn a handle into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub format: OutputFormat,
    pub quality: Quality,
    /// Reduce true colour to a palette before writing (PNG only).
    pub palette_reduction: bool,
    pub strip_metadata: bool,
}

/// Primitive operations every engine must provide.
///
/// Every method takes `&self` and borrows handles immutably: transforms return a
/// new handle and leave the input untouched, so a failed transform can never
/// corrupt the caller's bitmap.
pub trait ImageBackend {
    /// Owned decoded bitmap.
    type Handle;

    /// Short identifier used in logs and CLI output.
    fn name(&self) -> &'static str;

    /// Whether the native facility is present and minimally functional.
    fn is_available(&self) -> bool;

    /// Which way [`rotate`](Self::rotate) turns for a positive angle.
    fn rotation(&self) -> RotationDirection;

    /// Decode encoded bytes. Animated input yields its first frame.
    fn decode(
        &self,
        bytes: &[u8],
        limits: &DecodeLimits,
    ) -> Result<Decoded<Self::Handle>, BackendError>;

    /// Read the actual dimensions of a bitmap.
    fn dimensions(&self, handle: &Self::Handle) -> Result<Dimensions, BackendError>;

    /// Whether the bitmap currently holds true colour (as opposed to a palette).
    fn is_true_color(&self, handle: &Self::Handle) -> bool;

    /// Resampling copy into a new bitmap of `region.canvas()` size.
    ///
    /// Negative source extents mirror the corresponding axis. A region whose
    /// source window leaves the bitmap is rejected with
    /// [`BackendError::InvalidRegion`].
    fn copy_resampled(
        &self,
        handle: &Self::Handle,
        region: &CopyRegion,
    ) -> Result<Self::Handle, BackendError>;

    /// Rotate by `degrees` in this backend's native direction, expanding the
    /// canvas to fit and filling uncovered pixels with transparency.
    fn rotate(&self, handle: &Self::Handle, degrees: f64) -> Result<Self::Handle, BackendError>;

    /// Encode a bitmap.
    fn encode(&self, handle: &Self::Handle, params: &EncodeParams)
    -> Result<Vec<u8>, BackendError>;
}
