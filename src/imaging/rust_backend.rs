//! Pure Rust raster backend, in process, statically linked.
//!
//! ## Crate mapping
//!
//! | Primitive | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, TIFF, WebP) | `image::ImageReader` with `Limits::max_alloc` |
//! | Resampling copy | `crop_imm` + `fliph`/`flipv` + `resize_exact` (`Lanczos3`) |
//! | Rotate (right angles) | `rotate90` / `rotate180` / `rotate270` |
//! | Rotate (other angles) | nearest-neighbour onto an expanded transparent canvas |
//! | Encode → JPEG / GIF / PNG | `image` encoders |
//! | Encode → indexed PNG | exact palette or `color_quant::NeuQuant`, written with `png` |
//!
//! The native rotation direction is counter-clockwise. The in-memory bitmap is
//! always expanded to true colour; whether the *source* was palette-based is
//! remembered on the handle until the first transform replaces it. `image`
//! encoders never write metadata, so `strip_metadata` needs no work here.

use super::backend::{
    BackendError, CopyRegion, DecodeLimits, Decoded, Dimensions, EncodeParams, ImageBackend,
    RotationDirection,
};
use super::format::OutputFormat;
use super::geometry::rotated_bounds;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const INPUT_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("gif", ImageFormat::Gif),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    INPUT_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Decoded bitmap owned by a [`RustBackend`] session.
///
/// The handle keeps the decode limits so that transforms derived from it are
/// held to the same memory budget.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: DynamicImage,
    indexed: bool,
    limits: DecodeLimits,
}

impl RasterImage {
    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    fn transformed(&self, pixels: DynamicImage) -> Self {
        Self {
            pixels,
            indexed: false,
            limits: self.limits,
        }
    }
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-primitive mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// PNG colour type 3 (IHDR byte 25) and every GIF store palette indices.
fn is_palette_source(bytes: &[u8], format: ImageFormat) -> bool {
    match format {
        ImageFormat::Gif => true,
        ImageFormat::Png => bytes.get(25) == Some(&3),
        _ => false,
    }
}

/// Rotate counter-clockwise by an arbitrary angle, nearest-neighbour.
fn rotate_nearest(
    src: &RgbaImage,
    degrees: f64,
    limits: &DecodeLimits,
) -> Result<RgbaImage, BackendError> {
    let (out_w, out_h) = rotated_bounds(src.width(), src.height(), degrees);
    limits.check_canvas(out_w, out_h)?;
    let (w, h) = (f64::from(src.width()), f64::from(src.height()));
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (f64::from(out_w) / 2.0, f64::from(out_h) / 2.0);

    Ok(RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = f64::from(x) + 0.5 - ox;
        let dy = f64::from(y) + 0.5 - oy;
        // Inverse of a counter-clockwise turn in y-down coordinates.
        let sx = dx * cos - dy * sin + cx;
        let sy = dx * sin + dy * cos + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *src.get_pixel(sx as u32, sy as u32)
        } else {
            Rgba([0, 0, 0, 0])
        }
    }))
}

/// Map every pixel to a palette slot, if the image has at most 256 colours.
fn exact_palette(rgba: &RgbaImage) -> Option<(Vec<[u8; 4]>, Vec<u8>)> {
    let mut slots: HashMap<[u8; 4], u8> = HashMap::new();
    let mut palette: Vec<[u8; 4]> = Vec::new();
    let mut indices = Vec::with_capacity((rgba.width() * rgba.height()) as usize);

    for pixel in rgba.pixels() {
        let index = match slots.get(&pixel.0) {
            Some(&i) => i,
            None => {
                if palette.len() == 256 {
                    return None;
                }
                let i = palette.len() as u8;
                slots.insert(pixel.0, i);
                palette.push(pixel.0);
                i
            }
        };
        indices.push(index);
    }
    Some((palette, indices))
}

/// Reduce to at most 256 colours with NeuQuant.
fn quantized_palette(rgba: &RgbaImage) -> (Vec<[u8; 4]>, Vec<u8>) {
    let quantizer = color_quant::NeuQuant::new(10, 256, rgba.as_raw());
    let indices = rgba
        .pixels()
        .map(|p| quantizer.index_of(&p.0) as u8)
        .collect();
    let palette = quantizer
        .color_map_rgba()
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    (palette, indices)
}

fn png_error(e: png::EncodingError) -> BackendError {
    BackendError::ProcessingFailed(format!("Indexed PNG encode failed: {e}"))
}

/// Write a palette-based PNG, with a tRNS chunk when any entry is translucent.
fn encode_indexed_png(pixels: &DynamicImage, out: &mut Vec<u8>) -> Result<(), BackendError> {
    let rgba = pixels.to_rgba8();
    let (width, height) = rgba.dimensions();
    let (palette, indices) = exact_palette(&rgba).unwrap_or_else(|| quantized_palette(&rgba));

    let rgb: Vec<u8> = palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    let alpha: Vec<u8> = palette.iter().map(|c| c[3]).collect();

    let mut encoder = png::Encoder::new(out, width, height);
    encoder.set_color(png::ColorType::Indexed);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_palette(rgb);
    if alpha.iter().any(|&a| a != u8::MAX) {
        encoder.set_trns(alpha);
    }
    let mut writer = encoder.write_header().map_err(png_error)?;
    writer.write_image_data(&indices).map_err(png_error)?;
    writer.finish().map_err(png_error)
}

fn encode_failed(format: OutputFormat, e: image::ImageError) -> BackendError {
    BackendError::ProcessingFailed(format!("{} encode failed: {e}", format.mime_type()))
}

impl ImageBackend for RustBackend {
    type Handle = RasterImage;

    fn name(&self) -> &'static str {
        "raster"
    }

    fn is_available(&self) -> bool {
        [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif]
            .iter()
            .any(|f| f.reading_enabled() && f.writing_enabled())
    }

    fn rotation(&self) -> RotationDirection {
        RotationDirection::CounterClockwise
    }

    fn decode(
        &self,
        bytes: &[u8],
        limits: &DecodeLimits,
    ) -> Result<Decoded<RasterImage>, BackendError> {
        let format = image::guess_format(bytes).map_err(|e| {
            BackendError::ProcessingFailed(format!("Unrecognized image data: {e}"))
        })?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        let mut decode_limits = image::Limits::default();
        decode_limits.max_alloc = Some(limits.max_alloc);
        reader.limits(decode_limits);

        let pixels = reader
            .decode()
            .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))?;
        let indexed = is_palette_source(bytes, format);

        Ok(Decoded {
            handle: RasterImage {
                pixels,
                indexed,
                limits: *limits,
            },
            mime_type: format.to_mime_type().to_string(),
            indexed,
        })
    }

    fn dimensions(&self, handle: &RasterImage) -> Result<Dimensions, BackendError> {
        let (width, height) = (handle.pixels.width(), handle.pixels.height());
        if width == 0 || height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "Degenerate bitmap {width}x{height}"
            )));
        }
        Ok(Dimensions { width, height })
    }

    fn is_true_color(&self, handle: &RasterImage) -> bool {
        !handle.indexed
    }

    fn copy_resampled(
        &self,
        handle: &RasterImage,
        region: &CopyRegion,
    ) -> Result<RasterImage, BackendError> {
        let (width, height) = (handle.pixels.width(), handle.pixels.height());
        let window = region.source_window(width, height).ok_or_else(|| {
            BackendError::InvalidRegion(format!(
                "source ({}, {}) {}x{} outside {width}x{height}",
                region.src_x, region.src_y, region.src_w, region.src_h
            ))
        })?;
        let (canvas_w, canvas_h) = region.canvas();
        handle.limits.check_canvas(canvas_w, canvas_h)?;

        let mut view = handle
            .pixels
            .crop_imm(window.x, window.y, window.width, window.height);
        if window.mirror_x {
            view = view.fliph();
        }
        if window.mirror_y {
            view = view.flipv();
        }
        if (view.width(), view.height()) != (region.dst_w, region.dst_h) {
            view = view.resize_exact(region.dst_w, region.dst_h, FilterType::Lanczos3);
        }

        if region.dst_x == 0 && region.dst_y == 0 {
            return Ok(handle.transformed(view));
        }
        let mut canvas = RgbaImage::new(canvas_w, canvas_h);
        image::imageops::overlay(
            &mut canvas,
            &view.to_rgba8(),
            i64::from(region.dst_x),
            i64::from(region.dst_y),
        );
        Ok(handle.transformed(DynamicImage::ImageRgba8(canvas)))
    }

    fn rotate(&self, handle: &RasterImage, degrees: f64) -> Result<RasterImage, BackendError> {
        if !degrees.is_finite() {
            return Err(BackendError::Unsupported(format!(
                "rotation by {degrees} degrees"
            )));
        }
        let degrees = degrees.rem_euclid(360.0);
        let right_angle = (degrees.fract() == 0.0).then_some(degrees as u32);

        let pixels = match right_angle {
            Some(0) => handle.pixels.clone(),
            // image's rotate90 turns clockwise
            Some(90) => handle.pixels.rotate270(),
            Some(180) => handle.pixels.rotate180(),
            Some(270) => handle.pixels.rotate90(),
            _ => DynamicImage::ImageRgba8(rotate_nearest(
                &handle.pixels.to_rgba8(),
                degrees,
                &handle.limits,
            )?),
        };
        Ok(handle.transformed(pixels))
    }

    fn encode(
        &self,
        handle: &RasterImage,
        params: &EncodeParams,
    ) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        match params.format {
            OutputFormat::Jpeg => {
                let quality = params.quality.value().clamp(1, 100) as u8;
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                DynamicImage::ImageRgb8(handle.pixels.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| encode_failed(params.format, e))?;
            }
            OutputFormat::Gif => {
                DynamicImage::ImageRgba8(handle.pixels.to_rgba8())
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
                    .map_err(|e| encode_failed(params.format, e))?;
            }
            // The expanded bitmap of an untouched palette source goes back to a palette too.
            OutputFormat::Png if params.palette_reduction || handle.indexed => {
                encode_indexed_png(&handle.pixels, &mut buf)?;
            }
            OutputFormat::Png => {
                handle
                    .pixels
                    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(|e| encode_failed(params.format, e))?;
            }
        }
        Ok(buf)
    }
}
