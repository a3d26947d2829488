//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::PixelRect;
use crate::types::{CropRect, ResizeRequest, SizeDefinition};

/// Resolve a resize request against the dimensions of the image being resized.
///
/// Both sides given → exactly that size. One side given → the other follows
/// the source aspect ratio (rounded, never below 1). Returns `None` when the
/// request carries no usable side.
///
/// # Examples
/// ```
/// # use media_derive::imaging::resolve_resize;
/// # use media_derive::types::ResizeRequest;
/// let req = ResizeRequest { width: Some(1000), height: None };
/// assert_eq!(resolve_resize((2000, 1000), &req), Some((1000, 500)));
/// ```
pub fn resolve_resize(source: (u32, u32), request: &ResizeRequest) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let width = request.width.filter(|&w| w > 0);
    let height = request.height.filter(|&h| h > 0);

    match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => {
            let h = (w as f64 * src_h as f64 / src_w as f64).round() as u32;
            Some((w, h.max(1)))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h as f64).round() as u32;
            Some((w.max(1), h))
        }
        (None, None) => None,
    }
}

/// Largest width or height a resize request may produce. Matches the WebP
/// bitstream limit, since crop profiles are always written as WebP.
pub const MAX_RESIZE_SIDE: u32 = 16_383;

/// Largest pixel count a resize request may produce.
pub const MAX_RESIZE_PIXELS: u64 = 100_000_000;

/// Whether a resolved resize target can be rendered without an unbounded
/// allocation.
pub fn within_resize_limits(target: (u32, u32)) -> bool {
    let (w, h) = target;
    w <= MAX_RESIZE_SIDE && h <= MAX_RESIZE_SIDE && w as u64 * h as u64 <= MAX_RESIZE_PIXELS
}

/// Rescale a crop rectangle from one resolution to another.
///
/// The caller draws its rectangle against `from` (the on-disk original);
/// after a resize the working image is `to`. Each axis is scaled by
/// `to / from` for that axis.
pub fn scale_crop_rect(rect: &CropRect, from: (u32, u32), to: (u32, u32)) -> CropRect {
    let scale_x = to.0 as f64 / from.0 as f64;
    let scale_y = to.1 as f64 / from.1 as f64;
    CropRect {
        x: rect.x * scale_x,
        y: rect.y * scale_y,
        width: rect.width * scale_x,
        height: rect.height * scale_y,
    }
}

/// Round a crop rectangle to whole pixels and clamp it to `bounds`.
///
/// Edges are rounded to the nearest pixel, then intersected with the image.
/// Returns `None` when nothing of the rectangle lies inside the image.
pub fn clamp_crop_rect(rect: &CropRect, bounds: (u32, u32)) -> Option<PixelRect> {
    if !(rect.x.is_finite() && rect.y.is_finite() && rect.width.is_finite() && rect.height.is_finite())
    {
        return None;
    }
    let (max_x, max_y) = (bounds.0 as f64, bounds.1 as f64);

    let left = rect.x.round().max(0.0);
    let top = rect.y.round().max(0.0);
    let right = (rect.x + rect.width).round().min(max_x);
    let bottom = (rect.y + rect.height).round().min(max_y);

    if right <= left || bottom <= top {
        return None;
    }
    Some(PixelRect {
        x: left as u32,
        y: top as u32,
        width: (right - left) as u32,
        height: (bottom - top) as u32,
    })
}

/// Constrain `source` to fit inside `max` (0 = unconstrained), preserving
/// aspect ratio and never enlarging.
pub fn fit_within(source: (u32, u32), max: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = max;
    if src_w == 0 || src_h == 0 {
        return source;
    }

    let ratio_w = if max_w > 0 && max_w < src_w {
        max_w as f64 / src_w as f64
    } else {
        1.0
    };
    let ratio_h = if max_h > 0 && max_h < src_h {
        max_h as f64 / src_h as f64
    } else {
        1.0
    };
    let ratio = ratio_w.min(ratio_h);

    let w = ((src_w as f64 * ratio).round() as u32).max(1);
    let h = ((src_h as f64 * ratio).round() as u32).max(1);
    (w, h)
}

/// Output geometry for one registered size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantGeometry {
    pub width: u32,
    pub height: u32,
    /// Render by fill + centre crop instead of a plain resize.
    pub fill: bool,
}

/// Dimensions a registered size renders at for an original of `source`.
///
/// - Crop policy: each axis is `min(target, original)`; an unconstrained
///   axis follows the original aspect ratio.
/// - Fit policy: [`fit_within`].
///
/// Returns `None` when the variant would just reproduce the original
/// (same dimensions) or the definition constrains nothing.
pub fn variant_dimensions(source: (u32, u32), def: &SizeDefinition) -> Option<VariantGeometry> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 || (def.width == 0 && def.height == 0) {
        return None;
    }

    let (w, h) = if def.crop {
        let aspect = src_w as f64 / src_h as f64;
        let mut w = if def.width > 0 { def.width.min(src_w) } else { 0 };
        let mut h = if def.height > 0 { def.height.min(src_h) } else { 0 };
        if w == 0 {
            w = ((h as f64 * aspect).round() as u32).clamp(1, src_w);
        }
        if h == 0 {
            h = ((w as f64 / aspect).round() as u32).clamp(1, src_h);
        }
        (w, h)
    } else {
        fit_within(source, (def.width, def.height))
    };

    if (w, h) == source {
        return None;
    }
    Some(VariantGeometry {
        width: w,
        height: h,
        fill: def.crop,
    })
}
