use clap::{Parser, Subcommand};
use rayon::prelude::*;
use rendition::config::{self, EditorConfig};
use rendition::imaging::selector::{self, dispatch};
use rendition::imaging::{
    BackendKind, BackendPreference, ImageBackend, ImageEditor, Quality, WithBackend,
};
use rendition::naming;
use rendition::output::{self, BatchReport};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Where and how a single-image command writes its result.
#[derive(clap::Args, Clone, Debug)]
struct SaveArgs {
    /// Output file (default: `{stem}-{W}x{H}.{ext}` next to the source)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output MIME type: image/jpeg, image/png or image/gif (default: same as source)
    #[arg(long)]
    mime: Option<String>,

    /// Encoder quality, 0-100
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    quality: Option<u32>,
}

#[derive(Parser)]
#[command(name = "rendition")]
#[command(about = "Resize, crop, rotate and flip images on interchangeable engines")]
#[command(long_about = "\
Resize, crop, rotate and flip images on interchangeable engines

Two engines implement the same operations: the built-in raster engine and
ImageMagick (when `magick` or `convert` is installed). Results are the same
whichever one runs; angles are always counter-clockwise.

Generated file names follow `{stem}-{W}x{H}.{ext}`:

  uploads/dawn.jpg  --resize 150 150 --crop-->  uploads/dawn-150x150.jpg

Images are never enlarged. `batch` writes every [[sizes]] entry of the config
for each source; a size that cannot be produced is skipped, not fatal.

Run 'rendition gen-config' to generate a documented rendition.toml.")]
#[command(version = env!("RENDITION_VERSION"))]
struct Cli {
    /// Config file (default: ./rendition.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine to use, overriding the config
    #[arg(long, value_enum, global = true)]
    backend: Option<BackendPreference>,

    /// More logging (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which engines are available
    Backends,
    /// Print size and type of an image
    Info { file: PathBuf },
    /// Fit inside (or with --crop, fill) WIDTH x HEIGHT
    Resize {
        file: PathBuf,
        width: u32,
        height: u32,
        /// Fill the box exactly with a centred crop
        #[arg(long)]
        crop: bool,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Cut out a rectangle
    Crop {
        file: PathBuf,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        /// Scale the cut-out to W x H
        #[arg(long, num_args = 2, value_names = ["W", "H"])]
        dst: Option<Vec<u32>>,
        /// Treat WIDTH/HEIGHT as right/bottom coordinates
        #[arg(long)]
        absolute: bool,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Rotate counter-clockwise by DEGREES
    Rotate {
        file: PathBuf,
        #[arg(allow_negative_numbers = true)]
        degrees: f64,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Mirror an image
    Flip {
        file: PathBuf,
        /// Mirror top-to-bottom
        #[arg(long)]
        horizontal: bool,
        /// Mirror left-to-right
        #[arg(long)]
        vertical: bool,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Write the encoded image to stdout (content type on stderr)
    Stream {
        file: PathBuf,
        #[arg(long)]
        mime: Option<String>,
    },
    /// Write every configured size for each image found under PATH
    Batch {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock rendition.toml with all options documented
    GenConfig,
}

/// What a single-image command does once the source is loaded.
enum EditOp {
    Info,
    Resize {
        width: u32,
        height: u32,
        crop: bool,
    },
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        dst: Option<(u32, u32)>,
        absolute: bool,
    },
    Rotate(f64),
    Flip {
        horizontal: bool,
        vertical: bool,
    },
    Stream(Option<String>),
}

fn new_editor<B: ImageBackend>(
    backend: B,
    file: &Path,
    config: &Arc<EditorConfig>,
) -> ImageEditor<B> {
    let editor = ImageEditor::new(backend, file).with_policy(config.clone());
    match &config.output.directory {
        Some(dir) => editor.with_output_dir(dir),
        None => editor,
    }
}

/// One single-image command, run on whichever engine was selected.
struct Edit {
    file: PathBuf,
    op: EditOp,
    save: Option<SaveArgs>,
    config: Arc<EditorConfig>,
}

impl WithBackend for Edit {
    type Output = Result<(), Box<dyn Error>>;

    fn run<B: ImageBackend>(self, backend: B) -> Self::Output {
        let mut editor = new_editor(backend, &self.file, &self.config);
        if let Some(q) = self.save.as_ref().and_then(|s| s.quality) {
            editor.set_quality(Quality::new(q));
        }
        editor.load()?;

        match self.op {
            EditOp::Info => {
                let size = editor.size().ok_or("image has no size")?;
                let mime = editor.mime_type().unwrap_or("unknown");
                output::print_info(&self.file, size, mime, editor.backend().name());
                return Ok(());
            }
            EditOp::Stream(mime) => {
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                let content_type = editor.stream(mime.as_deref(), &mut out)?;
                out.flush()?;
                eprintln!("Content-Type: {content_type}");
                return Ok(());
            }
            EditOp::Resize {
                width,
                height,
                crop,
            } => editor.resize(width, height, crop)?,
            EditOp::Crop {
                x,
                y,
                width,
                height,
                dst,
                absolute,
            } => editor.crop(
                x,
                y,
                width,
                height,
                dst.map(|d| d.0),
                dst.map(|d| d.1),
                absolute,
            )?,
            EditOp::Rotate(degrees) => editor.rotate(degrees)?,
            EditOp::Flip {
                horizontal,
                vertical,
            } => editor.flip(horizontal, vertical)?,
        }

        let save = self.save.as_ref();
        let saved = editor.save(
            save.and_then(|s| s.output.as_deref()),
            save.and_then(|s| s.mime.as_deref()),
        )?;
        output::print_saved(&saved);
        Ok(())
    }
}

/// One source of a batch run.
struct BatchFile<'a> {
    file: &'a Path,
    config: &'a Arc<EditorConfig>,
}

impl WithBackend for BatchFile<'_> {
    type Output = BatchReport;

    fn run<B: ImageBackend>(self, backend: B) -> BatchReport {
        let requested = self.config.sizes.iter().map(|s| s.key.clone()).collect();
        let mut editor = new_editor(backend, self.file, self.config);
        let (renditions, error) = match editor.load() {
            Ok(()) => (editor.multi_resize(&self.config.sizes), None),
            Err(e) => {
                log::warn!("Skipping {}: {e}", self.file.display());
                (Default::default(), Some(e.to_string()))
            }
        };
        BatchReport {
            source: self.file.to_path_buf(),
            requested,
            renditions,
            error,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::find_config(Path::new("."))?,
    };
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    let config = Arc::new(config);

    match cli.command {
        Command::Backends => {
            let availability = selector::availability();
            let selected = availability.select(config.backend).ok();
            output::print_backends(availability, selected);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Batch { paths, json } => {
            let kind = selector::select(config.backend)?;
            init_thread_pool(&config.processing);
            let files = collect_sources(&paths, kind);
            let reports: Vec<BatchReport> = files
                .par_iter()
                .map(|file| {
                    dispatch(
                        kind,
                        BatchFile {
                            file,
                            config: &config,
                        },
                    )
                })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                output::print_batch(&reports);
            }
        }
        command => {
            let kind = selector::select(config.backend)?;
            let (file, op, save) = single_image_op(command)?;
            dispatch(
                kind,
                Edit {
                    file,
                    op,
                    save,
                    config,
                },
            )?;
        }
    }

    Ok(())
}

/// Split a single-image command into its source, operation and save flags.
fn single_image_op(
    command: Command,
) -> Result<(PathBuf, EditOp, Option<SaveArgs>), Box<dyn Error>> {
    Ok(match command {
        Command::Info { file } => (file, EditOp::Info, None),
        Command::Resize {
            file,
            width,
            height,
            crop,
            save,
        } => (
            file,
            EditOp::Resize {
                width,
                height,
                crop,
            },
            Some(save),
        ),
        Command::Crop {
            file,
            x,
            y,
            width,
            height,
            dst,
            absolute,
            save,
        } => {
            let dst = match dst.as_deref() {
                Some([w, h]) => Some((*w, *h)),
                Some(_) => return Err("--dst takes exactly two values".into()),
                None => None,
            };
            (
                file,
                EditOp::Crop {
                    x,
                    y,
                    width,
                    height,
                    dst,
                    absolute,
                },
                Some(save),
            )
        }
        Command::Rotate {
            file,
            degrees,
            save,
        } => (file, EditOp::Rotate(degrees), Some(save)),
        Command::Flip {
            file,
            horizontal,
            vertical,
            save,
        } => (
            file,
            EditOp::Flip {
                horizontal,
                vertical,
            },
            Some(save),
        ),
        Command::Stream { file, mime } => (file, EditOp::Stream(mime), None),
        Command::Backends | Command::Batch { .. } | Command::GenConfig => {
            return Err("not a single-image command".into());
        }
    })
}

/// Expand files and directories into the image files a batch should process.
///
/// Directories are walked recursively in name order and keep the files the
/// selected engine decodes. Files that look like earlier renditions
/// (`stem-WxH.ext`) are left alone.
fn collect_sources(paths: &[PathBuf], kind: BackendKind) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Cannot read {}: {e}", path.display());
                    continue;
                }
            };
            let candidate = entry.path();
            if entry.file_type().is_file()
                && kind.accepts(candidate)
                && !naming::has_size_suffix(candidate)
            {
                files.push(candidate.to_path_buf());
            }
        }
    }
    files
}

/// Install the logger. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
