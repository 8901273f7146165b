//! Editor configuration module.
//!
//! Handles loading and validating `rendition.toml`. Every key is optional;
//! missing keys take the stock defaults shown below, and unknown keys are
//! rejected to catch typos early.
//!
//! ## Configuration Options
//!
//! ```toml
//! backend = "auto"          # "auto" | "raster" | "magick"
//!
//! [quality]
//! default = 90              # Session quality (0-100)
//! jpeg = 82                 # Optional JPEG-only override
//!
//! [memory]
//! limit = "256M"            # Decoder allocation ceiling (K/M/G suffix, -1 = unlimited)
//!
//! [output]
//! strip_metadata = true     # Drop EXIF/ICC/comments before encoding
//! directory = "renditions"  # Optional; defaults to next to each source
//!
//! [[sizes]]                 # Batch sizes, in order
//! key = "thumbnail"
//! width = 150
//! height = 150
//! crop = true
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! [`EditorConfig`] implements [`Policy`], so a loaded config can be handed
//! straight to an [`ImageEditor`](crate::imaging::ImageEditor).

use crate::imaging::{BackendPreference, Quality, SizeSpec};
use crate::policy::{DEFAULT_MEMORY_LIMIT, Policy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "rendition.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `rendition.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Which engine to run on.
    pub backend: BackendPreference,
    /// Encoder quality settings.
    pub quality: QualityConfig,
    /// Decoder memory ceiling.
    pub memory: MemoryConfig,
    /// Where and how renditions are written.
    pub output: OutputConfig,
    /// Sizes produced by `batch`, in order.
    pub sizes: Vec<SizeSpec>,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            quality: QualityConfig::default(),
            memory: MemoryConfig::default(),
            output: OutputConfig::default(),
            sizes: default_sizes(),
            processing: ProcessingConfig::default(),
        }
    }
}

fn default_sizes() -> Vec<SizeSpec> {
    vec![
        SizeSpec::new("thumbnail", 150, 150, true),
        SizeSpec::new("medium", 300, 300, false),
        SizeSpec::new("large", 1024, 1024, false),
    ]
}

impl EditorConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality.default > 100 {
            return Err(ConfigError::Validation(
                "quality.default must be 0-100".into(),
            ));
        }
        if self.quality.jpeg.is_some_and(|q| q > 100) {
            return Err(ConfigError::Validation("quality.jpeg must be 0-100".into()));
        }
        if parse_memory_limit(&self.memory.limit).is_none() {
            return Err(ConfigError::Validation(format!(
                "memory.limit '{}' is not a size like \"256M\"",
                self.memory.limit
            )));
        }
        let mut seen = HashSet::new();
        for size in &self.sizes {
            if size.key.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "sizes entries need a non-empty key".into(),
                ));
            }
            if !seen.insert(size.key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "sizes key '{}' appears more than once",
                    size.key
                )));
            }
        }
        Ok(())
    }
}

/// Encoder quality settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Quality every session starts with (0-100).
    pub default: u32,
    /// JPEG-only override, applied on top of the session quality.
    pub jpeg: Option<u32>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            default: Quality::default().value(),
            jpeg: None,
        }
    }
}

/// Decoder memory settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Allocation ceiling such as `"256M"`, `"1G"` or `"-1"` (unlimited).
    pub limit: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            limit: "256M".to_string(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Strip embedded metadata before encoding.
    pub strip_metadata: bool,
    /// Directory for generated renditions. Next to the source when absent.
    pub directory: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            strip_metadata: true,
            directory: None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse a size like `"256M"` into bytes.
///
/// Accepts a plain byte count or one `K`/`M`/`G` suffix (case-insensitive,
/// binary multiples). `"-1"` means unlimited and maps to `u64::MAX`.
///
/// ```
/// use rendition::config::parse_memory_limit;
/// assert_eq!(parse_memory_limit("256M"), Some(256 * 1024 * 1024));
/// assert_eq!(parse_memory_limit("lots"), None);
/// ```
pub fn parse_memory_limit(value: &str) -> Option<u64> {
    let value = value.trim();
    if value == "-1" {
        return Some(u64::MAX);
    }
    let (digits, shift) = match value.char_indices().last()? {
        (i, 'k' | 'K') => (&value[..i], 10),
        (i, 'm' | 'M') => (&value[..i], 20),
        (i, 'g' | 'G') => (&value[..i], 30),
        _ => (value, 0),
    };
    let number: u64 = digits.trim().parse().ok()?;
    number.checked_mul(1u64 << shift)
}

impl Policy for EditorConfig {
    fn default_quality(&self) -> Quality {
        Quality::new(self.quality.default)
    }

    fn memory_limit(&self, default: u64) -> u64 {
        parse_memory_limit(&self.memory.limit).unwrap_or(default)
    }

    fn jpeg_quality(&self, quality: Quality, _context: &str) -> Quality {
        self.quality.jpeg.map(Quality::new).unwrap_or(quality)
    }

    fn strip_metadata(&self) -> bool {
        self.output.strip_metadata
    }
}

// =============================================================================
// Config loading
// =============================================================================

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<EditorConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EditorConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `rendition.toml` from `dir`, or the stock defaults when there is none.
pub fn find_config(dir: &Path) -> Result<EditorConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(EditorConfig::default());
    }
    load_config(&path)
}

/// Returns a fully-commented stock `rendition.toml` with all keys and explanations.
pub fn stock_config_toml() -> &'static str {
    r##"# Rendition Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Image engine: "auto" (ImageMagick when installed, else built-in),
# "raster" (built-in) or "magick" (ImageMagick command-line tools).
backend = "auto"

# ---------------------------------------------------------------------------
# Encoder quality
# ---------------------------------------------------------------------------
[quality]
# Quality every session starts with (0 = worst, 100 = best).
default = 90

# JPEG-only override. Uncomment to pin JPEG output to a fixed quality.
# jpeg = 82

# ---------------------------------------------------------------------------
# Memory
# ---------------------------------------------------------------------------
[memory]
# Ceiling for decoder allocations. Accepts K/M/G suffixes; "-1" is unlimited.
limit = "256M"

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Remove EXIF, ICC profiles and comments from written files.
strip_metadata = true

# Write generated renditions here instead of next to each source.
# directory = "renditions"

# ---------------------------------------------------------------------------
# Batch sizes
# ---------------------------------------------------------------------------
# Each entry produces one rendition per source. `crop = true` fills the box
# exactly (centre crop); otherwise the image is fitted inside it. A 0 bound
# leaves that axis free. Sources are never enlarged.
[[sizes]]
key = "thumbnail"
width = 150
height = 150
crop = true

[[sizes]]
key = "medium"
width = 300
height = 300
crop = false

[[sizes]]
key = "large"
width = 1024
height = 1024
crop = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for batch runs. Omit for auto (= number of CPU cores).
# Values larger than the core count are clamped down.
# max_processes = 4
"##
}
