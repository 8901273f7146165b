//! Image editing over interchangeable engines.
//!
//! | Operation | Where |
//! |---|---|
//! | **Load** | [`ImageEditor::load`], backend `decode` + `dimensions` |
//! | **Resize / crop / flip** | [`geometry`] rectangles → backend `copy_resampled` |
//! | **Rotate** | [`geometry::rotate_angle_normalize`] → backend `rotate` |
//! | **Batch** | [`ImageEditor::multi_resize`] |
//! | **Save / stream** | [`format::resolve_output`] → backend `encode` |
//!
//! The module is split into:
//! - **Geometry**: Pure functions for rectangle math (unit testable)
//! - **Parameters**: Data structures describing requests and results
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] and [`MagickBackend`]
//! - **Selector**: Probing and choosing an engine once per process
//! - **Editor**: The session that combines geometry, policy and a backend

pub mod backend;
pub mod editor;
mod error;
pub mod format;
pub mod geometry;
pub mod magick_backend;
mod params;
pub mod rust_backend;
pub mod selector;

pub use backend::{BackendError, Dimensions, EncodeParams, ImageBackend};
pub use editor::ImageEditor;
pub use error::{EditorError, InvalidImageReason};
pub use format::{OutputFormat, OutputPlan};
pub use magick_backend::MagickBackend;
pub use params::{Quality, RenditionResult, SavedImage, SizeSpec};
pub use rust_backend::RustBackend;
pub use selector::{Availability, BackendKind, BackendPreference, WithBackend};
