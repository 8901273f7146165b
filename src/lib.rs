//! # Rendition
//!
//! Image editing sessions over interchangeable engines: load an image, resize,
//! crop, rotate or flip it, write one or many renditions, or stream the result.
//! The same calls produce the same geometry whichever engine runs them.
//!
//! # Architecture: One Session, Two Engines
//!
//! ```text
//! ImageEditor<B>  ──  geometry (pure rectangles)
//!       │         ──  format   (what to write, how)
//!       │         ──  Policy   (quality, memory, naming overrides)
//!       ▼
//! B: ImageBackend ──  RustBackend   (image crate, in process)
//!                 ──  MagickBackend (ImageMagick CLI over pipes)
//! ```
//!
//! Engines only supply primitives: decode, measure, a resampling copy, a native
//! rotate, encode. Everything that decides *what* to do is written once, above
//! the [`ImageBackend`](imaging::ImageBackend) trait.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Editor session, geometry, output resolution, backend trait and both engines |
//! | [`policy`] | Overridable decisions: quality, memory ceiling, reported names, metadata |
//! | [`config`] | `rendition.toml` loading and validation; the config is a [`policy::Policy`] |
//! | [`naming`] | `{stem}-{W}x{H}.{ext}` file name generation |
//! | [`fsutil`] | Permission normalization after writes |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Geometry Is Pure
//!
//! Every transform is computed as integer rectangles before an engine sees it.
//! Flips are resampling copies with negative source extents; there is no flip
//! primitive. The one convention that differs between engines, which way a
//! positive angle turns, is corrected in
//! [`rotate_angle_normalize`](imaging::geometry::rotate_angle_normalize) and
//! nowhere else.
//!
//! ## Handles Are Owned Values
//!
//! A decoded bitmap is the backend's `Handle` type, owned by exactly one
//! session. Transforms build a new handle and swap it in only on success;
//! dropping replaces and frees the old one. Error paths drop whatever they
//! built, so nothing leaks and nothing is freed twice.
//!
//! ## Batches Tolerate Failure
//!
//! [`multi_resize`](imaging::ImageEditor::multi_resize) is the single place
//! where errors are absorbed: a size that cannot be produced is logged and
//! left out, and the session is unchanged afterwards. Every other operation
//! returns its error to the caller.
//!
//! ## Never Enlarge
//!
//! Resizes that would produce an image as large as or larger than the source
//! are refused with a dimension error. A batch simply omits such sizes.

pub mod config;
pub mod fsutil;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod policy;
