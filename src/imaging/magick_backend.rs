//! ImageMagick backend, driving the command-line tools over pipes.
//!
//! ImageMagick 7 ships a single `magick` binary (`magick identify ...`);
//! ImageMagick 6 ships `convert` and `identify`. Whichever answers `-version`
//! first is probed once per process and reused.
//!
//! A handle is an in-memory MIFF blob. MIFF is ImageMagick's lossless native
//! format, so chaining operations never re-quantizes pixels. Every primitive is
//! one `convert` invocation reading the blob from stdin and writing the result
//! to stdout; nothing touches the filesystem.
//!
//! The native rotation direction is clockwise.

use super::backend::{
    BackendError, CopyRegion, DecodeLimits, Decoded, Dimensions, EncodeParams, ImageBackend,
    RotationDirection,
};
use super::format::OutputFormat;
use super::geometry::rotated_bounds;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// Extensions batch discovery hands to ImageMagick. Its delegates read far
/// more; these are the ones every stock build decodes.
const INPUT_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "gif", "tif", "tiff", "webp", "bmp", "ico", "tga", "pnm", "ppm",
];

/// Returns the image file extensions batch runs offer to this backend.
pub fn supported_input_extensions() -> &'static [&'static str] {
    INPUT_EXTENSIONS
}

/// Which generation of the CLI is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toolchain {
    Seven,
    Six,
}

#[derive(Debug, Clone, Copy)]
enum Tool {
    Convert,
    Identify,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Convert => write!(f, "convert"),
            Tool::Identify => write!(f, "identify"),
        }
    }
}

impl Toolchain {
    fn command(self, tool: Tool) -> Command {
        match (self, tool) {
            (Toolchain::Seven, Tool::Convert) => Command::new("magick"),
            (Toolchain::Seven, Tool::Identify) => {
                let mut cmd = Command::new("magick");
                cmd.arg("identify");
                cmd
            }
            (Toolchain::Six, Tool::Convert) => Command::new("convert"),
            (Toolchain::Six, Tool::Identify) => Command::new("identify"),
        }
    }
}

static TOOLCHAIN: OnceLock<Option<Toolchain>> = OnceLock::new();

fn answers_version(program: &str) -> bool {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn probe() -> Option<Toolchain> {
    *TOOLCHAIN.get_or_init(|| {
        let found = if answers_version("magick") {
            Some(Toolchain::Seven)
        } else if answers_version("convert") {
            Some(Toolchain::Six)
        } else {
            None
        };
        log::debug!("ImageMagick probe: {found:?}");
        found
    })
}

/// Decoded bitmap owned by a [`MagickBackend`] session.
#[derive(Debug, Clone)]
pub struct MagickImage {
    blob: Vec<u8>,
    width: u32,
    height: u32,
    indexed: bool,
    limits: DecodeLimits,
}

impl MagickImage {
    /// The MIFF encoding of the bitmap.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

/// What `identify` reports about a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    format: String,
    width: u32,
    height: u32,
    pseudo_class: bool,
}

/// Parse `%m %w %h %r` output, e.g. `PNG 64 48 PseudoClass sRGB`.
fn parse_identity(text: &str) -> Option<Identity> {
    let mut fields = text.split_whitespace();
    let format = fields.next()?.to_string();
    let width = fields.next()?.parse().ok()?;
    let height = fields.next()?.parse().ok()?;
    let pseudo_class = fields.any(|f| f == "PseudoClass");
    Some(Identity {
        format,
        width,
        height,
        pseudo_class,
    })
}

fn mime_for_magick_format(format: &str) -> String {
    match format.to_ascii_uppercase().as_str() {
        "JPEG" | "JPG" => "image/jpeg".to_string(),
        "PNG" | "PNG8" | "PNG24" | "PNG32" => "image/png".to_string(),
        "GIF" | "GIF87" => "image/gif".to_string(),
        "TIFF" | "TIF" => "image/tiff".to_string(),
        "WEBP" => "image/webp".to_string(),
        other => format!("image/{}", other.to_ascii_lowercase()),
    }
}

/// ImageMagick CLI backend.
pub struct MagickBackend {
    toolchain: Option<Toolchain>,
}

impl MagickBackend {
    pub fn new() -> Self {
        Self {
            toolchain: probe(),
        }
    }

    fn toolchain(&self) -> Result<Toolchain, BackendError> {
        self.toolchain
            .ok_or_else(|| BackendError::Unsupported("ImageMagick is not installed".into()))
    }

    /// Run one tool with `input` on stdin and return its stdout.
    fn run(&self, tool: Tool, input: &[u8], args: &[String]) -> Result<Vec<u8>, BackendError> {
        let mut cmd = self.toolchain()?.command(tool);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn()?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::ProcessingFailed(format!("{tool}: stdin unavailable")))?;

        // Feed stdin from a second thread so a full stdout pipe cannot deadlock us.
        let (output, written) = std::thread::scope(|s| {
            let writer = s.spawn(move || stdin.write_all(input));
            let output = child.wait_with_output();
            (output, writer.join())
        });
        let output = output?;

        if !output.status.success() {
            return Err(BackendError::ProcessingFailed(format!(
                "{tool} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        match written {
            Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
            Ok(_) => {}
            Err(_) => {
                return Err(BackendError::ProcessingFailed(format!(
                    "{tool}: stdin writer panicked"
                )));
            }
        }
        Ok(output.stdout)
    }

    fn identify(&self, input: &[u8], extra: &[String]) -> Result<Identity, BackendError> {
        let mut args = extra.to_vec();
        args.extend(owned(["-format", "%m %w %h %r", "-[0]"]));
        let stdout = self.run(Tool::Identify, input, &args)?;
        let text = String::from_utf8_lossy(&stdout);
        parse_identity(&text).ok_or_else(|| {
            BackendError::ProcessingFailed(format!("Unexpected identify output: {text:?}"))
        })
    }

    /// Run `convert` on a handle and measure the result.
    ///
    /// The decode memory limit applies to every transform of the handle.
    fn transform(&self, handle: &MagickImage, ops: &[String]) -> Result<MagickImage, BackendError> {
        let mut args = limit_args(&handle.limits);
        args.push("miff:-".into());
        args.extend_from_slice(ops);
        args.push("miff:-".into());
        let blob = self.run(Tool::Convert, &handle.blob, &args)?;
        let identity = self.identify(&blob, &[])?;
        Ok(MagickImage {
            blob,
            width: identity.width,
            height: identity.height,
            indexed: false,
            limits: handle.limits,
        })
    }
}

impl Default for MagickBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// `-limit memory N`, with ImageMagick's own spelling for no limit.
fn limit_args(limits: &DecodeLimits) -> Vec<String> {
    let value = match limits.max_alloc {
        u64::MAX => "unlimited".to_string(),
        bytes => bytes.to_string(),
    };
    vec!["-limit".into(), "memory".into(), value]
}

fn owned<const N: usize>(items: [&str; N]) -> impl Iterator<Item = String> {
    items.into_iter().map(String::from)
}

impl ImageBackend for MagickBackend {
    type Handle = MagickImage;

    fn name(&self) -> &'static str {
        "magick"
    }

    fn is_available(&self) -> bool {
        self.toolchain.is_some()
    }

    fn rotation(&self) -> RotationDirection {
        RotationDirection::Clockwise
    }

    fn decode(
        &self,
        bytes: &[u8],
        limits: &DecodeLimits,
    ) -> Result<Decoded<MagickImage>, BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::ProcessingFailed("empty input".into()));
        }
        let limit = limit_args(limits);
        let identity = self.identify(bytes, &limit)?;

        let mut convert_args = limit;
        convert_args.extend(owned(["-[0]", "miff:-"]));
        let blob = self.run(Tool::Convert, bytes, &convert_args)?;

        Ok(Decoded {
            handle: MagickImage {
                blob,
                width: identity.width,
                height: identity.height,
                indexed: identity.pseudo_class,
                limits: *limits,
            },
            mime_type: mime_for_magick_format(&identity.format),
            indexed: identity.pseudo_class,
        })
    }

    fn dimensions(&self, handle: &MagickImage) -> Result<Dimensions, BackendError> {
        if handle.width == 0 || handle.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "Degenerate bitmap {}x{}",
                handle.width, handle.height
            )));
        }
        Ok(Dimensions::new(handle.width, handle.height))
    }

    fn is_true_color(&self, handle: &MagickImage) -> bool {
        !handle.indexed
    }

    fn copy_resampled(
        &self,
        handle: &MagickImage,
        region: &CopyRegion,
    ) -> Result<MagickImage, BackendError> {
        let window = region
            .source_window(handle.width, handle.height)
            .ok_or_else(|| {
                BackendError::InvalidRegion(format!(
                    "source ({}, {}) {}x{} outside {}x{}",
                    region.src_x,
                    region.src_y,
                    region.src_w,
                    region.src_h,
                    handle.width,
                    handle.height
                ))
            })?;
        let (canvas_w, canvas_h) = region.canvas();
        handle.limits.check_canvas(canvas_w, canvas_h)?;

        let mut ops = vec![
            "-crop".to_string(),
            format!(
                "{}x{}+{}+{}",
                window.width, window.height, window.x, window.y
            ),
            "+repage".to_string(),
        ];
        if window.mirror_x {
            ops.push("-flop".into());
        }
        if window.mirror_y {
            ops.push("-flip".into());
        }
        if (window.width, window.height) != (region.dst_w, region.dst_h) {
            ops.extend(owned(["-filter", "Lanczos", "-resize"]));
            ops.push(format!("{}x{}!", region.dst_w, region.dst_h));
        }
        if region.dst_x > 0 || region.dst_y > 0 {
            ops.extend(owned(["-background", "none", "-gravity", "northwest", "-splice"]));
            ops.push(format!("{}x{}", region.dst_x, region.dst_y));
        }
        self.transform(handle, &ops)
    }

    fn rotate(&self, handle: &MagickImage, degrees: f64) -> Result<MagickImage, BackendError> {
        if !degrees.is_finite() {
            return Err(BackendError::Unsupported(format!(
                "rotation by {degrees} degrees"
            )));
        }
        let (out_w, out_h) = rotated_bounds(handle.width, handle.height, degrees);
        handle.limits.check_canvas(out_w, out_h)?;
        let mut ops: Vec<String> = owned(["-background", "none", "-rotate"]).collect();
        ops.push(degrees.to_string());
        ops.push("+repage".into());
        self.transform(handle, &ops)
    }

    fn encode(
        &self,
        handle: &MagickImage,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, BackendError> {
        let mut convert_args = vec!["miff:-".to_string()];
        if params.strip_metadata {
            convert_args.push("-strip".into());
        }
        let target = match params.format {
            OutputFormat::Jpeg => {
                convert_args.push("-quality".into());
                convert_args.push(params.quality.value().to_string());
                "jpeg:-"
            }
            OutputFormat::Gif => "gif:-",
            OutputFormat::Png if params.palette_reduction => "png8:-",
            OutputFormat::Png => "png:-",
        };
        convert_args.push(target.into());
        self.run(Tool::Convert, &handle.blob, &convert_args)
    }
}
