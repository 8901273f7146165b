//! Backend capability probing and selection.
//!
//! Each engine is probed once per process; the answer never changes afterwards.
//! Callers pick a [`BackendPreference`], resolve it to a concrete
//! [`BackendKind`] with [`select`], and run generic code against that engine
//! through [`dispatch`].

use super::backend::ImageBackend;
use super::error::EditorError;
use super::magick_backend::{self, MagickBackend};
use super::rust_backend::{self, RustBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// A concrete engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// `image` crate, in process.
    Raster,
    /// ImageMagick command-line tools.
    Magick,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Magick, BackendKind::Raster];

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Raster => "raster",
            BackendKind::Magick => "magick",
        }
    }

    /// File extensions this engine is offered when discovering sources.
    pub fn input_extensions(self) -> &'static [&'static str] {
        match self {
            BackendKind::Raster => rust_backend::supported_input_extensions(),
            BackendKind::Magick => magick_backend::supported_input_extensions(),
        }
    }

    /// Whether `path` has an extension this engine decodes (case-insensitive).
    pub fn accepts(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| {
                let e = e.to_ascii_lowercase();
                self.input_extensions().contains(&e.as_str())
            })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which engine the user asked for.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// First available, ImageMagick preferred.
    #[default]
    Auto,
    Raster,
    Magick,
}

/// Probe results, computed once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub raster: bool,
    pub magick: bool,
}

impl Availability {
    pub fn contains(self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Raster => self.raster,
            BackendKind::Magick => self.magick,
        }
    }

    /// Resolve a preference against these probe results.
    pub fn select(self, preference: BackendPreference) -> Result<BackendKind, EditorError> {
        let wanted = match preference {
            BackendPreference::Auto => {
                return BackendKind::ALL
                    .into_iter()
                    .find(|&kind| self.contains(kind))
                    .ok_or_else(|| {
                        EditorError::BackendUnavailable(
                            "neither ImageMagick nor the raster engine is usable".into(),
                        )
                    });
            }
            BackendPreference::Raster => BackendKind::Raster,
            BackendPreference::Magick => BackendKind::Magick,
        };
        if self.contains(wanted) {
            Ok(wanted)
        } else {
            Err(EditorError::BackendUnavailable(format!(
                "{wanted} backend is not available"
            )))
        }
    }
}

static AVAILABILITY: OnceLock<Availability> = OnceLock::new();

/// Probe every engine (first call only).
pub fn availability() -> Availability {
    *AVAILABILITY.get_or_init(|| {
        let found = Availability {
            raster: RustBackend::new().is_available(),
            magick: MagickBackend::new().is_available(),
        };
        log::debug!("Backend availability: {found:?}");
        found
    })
}

pub fn is_available(kind: BackendKind) -> bool {
    availability().contains(kind)
}

/// Resolve a preference to an available engine.
pub fn select(preference: BackendPreference) -> Result<BackendKind, EditorError> {
    availability().select(preference)
}

/// Work that is generic over the engine it runs on.
pub trait WithBackend {
    type Output;

    fn run<B: ImageBackend>(self, backend: B) -> Self::Output;
}

/// Run `task` against a fresh instance of the chosen engine.
pub fn dispatch<T: WithBackend>(kind: BackendKind, task: T) -> T::Output {
    match kind {
        BackendKind::Raster => task.run(RustBackend::new()),
        BackendKind::Magick => task.run(MagickBackend::new()),
    }
}
