//! Pure geometry for resize, crop, flip and rotate.
//!
//! All functions here are pure and testable without any I/O or images. Every
//! backend sees the same rectangles; the only place backend conventions leak in
//! is [`rotate_angle_normalize`], which takes the backend's native
//! [`RotationDirection`] as an argument.
//!
//! ## Rounding
//!
//! All arithmetic is done in integers. Scaled extents are truncated, never
//! rounded up, so a source rectangle can never reach past the original. When a
//! centered crop leaves an odd remainder, the extra pixel stays on the right /
//! bottom edge (`offset = floor((orig - crop) / 2)`).

/// Direction in which a backend's native rotate primitive turns for a positive angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDirection {
    Clockwise,
    CounterClockwise,
}

/// Destination and source rectangles of a resampling copy.
///
/// Field order follows the classic `(dst_x, dst_y, src_x, src_y, dst_w, dst_h,
/// src_w, src_h)` tuple. The source rectangle always lies inside the image it
/// was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect8 {
    pub dst_x: u32,
    pub dst_y: u32,
    pub src_x: u32,
    pub src_y: u32,
    pub dst_w: u32,
    pub dst_h: u32,
    pub src_w: u32,
    pub src_h: u32,
}

/// Parameters of a resampling copy as handed to a backend.
///
/// Unlike [`Rect8`], the source extents are signed: a negative width reads
/// columns right-to-left starting at `src_x`, a negative height reads rows
/// bottom-to-top starting at `src_y`. That is how flips are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub dst_x: u32,
    pub dst_y: u32,
    pub dst_w: u32,
    pub dst_h: u32,
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: i64,
    pub src_h: i64,
}

/// A [`CopyRegion`] source rectangle resolved to positive extents plus mirror flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub mirror_x: bool,
    pub mirror_y: bool,
}

impl From<Rect8> for CopyRegion {
    fn from(rect: Rect8) -> Self {
        Self {
            dst_x: rect.dst_x,
            dst_y: rect.dst_y,
            dst_w: rect.dst_w,
            dst_h: rect.dst_h,
            src_x: rect.src_x,
            src_y: rect.src_y,
            src_w: i64::from(rect.src_w),
            src_h: i64::from(rect.src_h),
        }
    }
}

impl CopyRegion {
    /// Size of the canvas the copy is drawn onto (destination offset included).
    pub fn canvas(&self) -> (u32, u32) {
        (
            self.dst_x.saturating_add(self.dst_w),
            self.dst_y.saturating_add(self.dst_h),
        )
    }

    /// Resolve the signed source rectangle against an image of `width × height`.
    ///
    /// Returns `None` when any extent is zero or the rectangle leaves the image.
    pub fn source_window(&self, width: u32, height: u32) -> Option<SourceWindow> {
        if self.dst_w == 0 || self.dst_h == 0 {
            return None;
        }
        let (x, w, mirror_x) = resolve_axis(self.src_x, self.src_w, width)?;
        let (y, h, mirror_y) = resolve_axis(self.src_y, self.src_h, height)?;
        Some(SourceWindow {
            x,
            y,
            width: w,
            height: h,
            mirror_x,
            mirror_y,
        })
    }
}

fn resolve_axis(origin: u32, extent: i64, limit: u32) -> Option<(u32, u32, bool)> {
    if extent == 0 {
        return None;
    }
    let len = extent.unsigned_abs();
    // Negative extents count back from `origin`, which is itself included.
    let start = if extent < 0 {
        i64::from(origin) + 1 + extent
    } else {
        i64::from(origin)
    };
    if start < 0 || start as u64 + len > u64::from(limit) {
        return None;
    }
    Some((start as u32, len as u32, extent < 0))
}

/// `a * num / den`, truncated. `den` must be non-zero.
fn scale(a: u32, num: u32, den: u32) -> u32 {
    (u64::from(a) * u64::from(num) / u64::from(den)) as u32
}

/// Shrink `current` to fit inside `max`, preserving aspect ratio.
///
/// A bound of `0` means "unbounded" on that axis. Never enlarges: dimensions
/// already inside the box come back unchanged. When both axes constrain, the
/// smaller scale factor wins and the constrained axis lands exactly on its bound.
///
/// # Examples
/// ```
/// # use rendition::imaging::geometry::constrain_dimensions;
/// assert_eq!(constrain_dimensions(1000, 750, 100, 100), (100, 75));
/// assert_eq!(constrain_dimensions(600, 800, 300, 0), (300, 400));
/// assert_eq!(constrain_dimensions(50, 40, 100, 100), (50, 40));
/// ```
pub fn constrain_dimensions(cur_w: u32, cur_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if cur_w == 0 || cur_h == 0 {
        return (cur_w, cur_h);
    }
    let limit_w = max_w > 0 && cur_w > max_w;
    let limit_h = max_h > 0 && cur_h > max_h;

    let by_width = || (max_w, scale(cur_h, max_w, cur_w));
    let by_height = || (scale(cur_w, max_h, cur_h), max_h);

    match (limit_w, limit_h) {
        (false, false) => (cur_w, cur_h),
        (true, false) => by_width(),
        (false, true) => by_height(),
        // max_w / cur_w <= max_h / cur_h, cross-multiplied
        (true, true) if u64::from(max_w) * u64::from(cur_h) <= u64::from(max_h) * u64::from(cur_w) => {
            by_width()
        }
        (true, true) => by_height(),
    }
}

/// Compute how to scale an `orig_w × orig_h` image into a `max_w × max_h` box.
///
/// - `crop == false` (fit): the whole image is scaled to fit inside the box; the
///   source rectangle is the full image.
/// - `crop == true` (fill): the output is exactly the box (each bound clamped to
///   the original), and the source rectangle is the centered sub-rectangle with
///   the box's aspect ratio.
///
/// A bound of `0` leaves that axis free. Returns `None` when the inputs are
/// degenerate, when any computed extent is zero, or when the result would not
/// be smaller than the original (images are never enlarged).
///
/// # Examples
/// ```
/// # use rendition::imaging::geometry::compute_resize_geometry;
/// let fit = compute_resize_geometry(1000, 500, 200, 200, false).unwrap();
/// assert_eq!((fit.dst_w, fit.dst_h), (200, 100));
///
/// let fill = compute_resize_geometry(1000, 500, 200, 200, true).unwrap();
/// assert_eq!((fill.dst_w, fill.dst_h), (200, 200));
/// assert_eq!((fill.src_x, fill.src_w), (250, 500));
/// ```
pub fn compute_resize_geometry(
    orig_w: u32,
    orig_h: u32,
    max_w: u32,
    max_h: u32,
    crop: bool,
) -> Option<Rect8> {
    if orig_w == 0 || orig_h == 0 || (max_w == 0 && max_h == 0) {
        return None;
    }

    let (dst_w, dst_h, src_x, src_y, src_w, src_h) = if crop {
        let mut new_w = max_w.min(orig_w);
        let mut new_h = max_h.min(orig_h);
        if new_w == 0 {
            new_w = scale(new_h, orig_w, orig_h);
        }
        if new_h == 0 {
            new_h = scale(new_w, orig_h, orig_w);
        }
        if new_w == 0 || new_h == 0 {
            return None;
        }

        // The axis with the larger scale factor keeps its full source extent.
        let (crop_w, crop_h) =
            if u64::from(new_w) * u64::from(orig_h) >= u64::from(new_h) * u64::from(orig_w) {
                (orig_w, scale(new_h, orig_w, new_w))
            } else {
                (scale(new_w, orig_h, new_h), orig_h)
            };

        (
            new_w,
            new_h,
            (orig_w - crop_w) / 2,
            (orig_h - crop_h) / 2,
            crop_w,
            crop_h,
        )
    } else {
        let (new_w, new_h) = constrain_dimensions(orig_w, orig_h, max_w, max_h);
        (new_w, new_h, 0, 0, orig_w, orig_h)
    };

    if dst_w == 0 || dst_h == 0 || src_w == 0 || src_h == 0 {
        return None;
    }
    if dst_w >= orig_w && dst_h >= orig_h {
        return None;
    }

    Some(Rect8 {
        dst_x: 0,
        dst_y: 0,
        src_x,
        src_y,
        dst_w,
        dst_h,
        src_w,
        src_h,
    })
}

/// Build the copy rectangle for a crop.
///
/// `dst_w` / `dst_h` default to the crop size (pure crop, no scaling); `Some(0)`
/// counts as omitted. With `absolute`, `src_w` / `src_h` are right / bottom
/// coordinates and are converted to extents first. Returns `None` for an empty
/// or inverted rectangle. Bounds against the image are checked by the backend.
pub fn compute_crop_rect(
    src_x: u32,
    src_y: u32,
    src_w: u32,
    src_h: u32,
    dst_w: Option<u32>,
    dst_h: Option<u32>,
    absolute: bool,
) -> Option<Rect8> {
    let (src_w, src_h) = if absolute {
        (src_w.checked_sub(src_x)?, src_h.checked_sub(src_y)?)
    } else {
        (src_w, src_h)
    };
    if src_w == 0 || src_h == 0 {
        return None;
    }

    Some(Rect8 {
        dst_x: 0,
        dst_y: 0,
        src_x,
        src_y,
        dst_w: dst_w.filter(|&w| w > 0).unwrap_or(src_w),
        dst_h: dst_h.filter(|&h| h > 0).unwrap_or(src_h),
        src_w,
        src_h,
    })
}

/// Express a mirror as a same-size copy with negative source extents.
///
/// `horizontal` mirrors across the horizontal axis (top ↔ bottom): the copy
/// starts at row `h - 1` with height `-h`. `vertical` mirrors across the
/// vertical axis (left ↔ right): it starts at column `w - 1` with width `-w`.
pub fn flip_transform(horizontal: bool, vertical: bool, w: u32, h: u32) -> CopyRegion {
    CopyRegion {
        dst_x: 0,
        dst_y: 0,
        dst_w: w,
        dst_h: h,
        src_x: if vertical { w.saturating_sub(1) } else { 0 },
        src_y: if horizontal { h.saturating_sub(1) } else { 0 },
        src_w: if vertical { -i64::from(w) } else { i64::from(w) },
        src_h: if horizontal { -i64::from(h) } else { i64::from(h) },
    }
}

/// Translate a counter-clockwise-positive angle into a backend's native angle.
///
/// Clockwise backends get `360 - angle`; counter-clockwise backends get the
/// angle unchanged. The result is reduced into `[0, 360)`.
pub fn rotate_angle_normalize(requested: f64, native: RotationDirection) -> f64 {
    let effective = match native {
        RotationDirection::Clockwise => 360.0 - requested,
        RotationDirection::CounterClockwise => requested,
    };
    effective.rem_euclid(360.0)
}

/// Size of the canvas that holds a `width × height` image turned by `degrees`.
///
/// Direction does not matter: the bounding box is symmetric.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (w, h) = (f64::from(width), f64::from(height));
    let (sin, cos) = degrees.to_radians().sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).round().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs()).round().max(1.0) as u32;
    (out_w, out_h)
}
