//! Centralized file-naming conventions for derived files.
//!
//! Every component predicts where a derivative lives from the source path
//! alone, so the rules live here and nowhere else. The UI layer builds URLs
//! from the same rules, which makes them bit-exact contracts:
//!
//! | Derivative | Source `name.ext` becomes |
//! |---|---|
//! | WebP transcode | `name.webp` |
//! | Crop profile `p` | `name-p.webp` |
//! | Ad-hoc crop for size `s` | `name-s-crop-<unix-ts>.ext` |
//! | Ad-hoc crop, no size | `name-crop-<unix-ts>.ext` |
//! | Size variant `w`×`h` | `name-wxh.ext` |
//!
//! ## Profile Slugs
//!
//! User-entered profile names are lower-cased and every character outside
//! `[a-z0-9_-]` becomes `-`. Distinct names can collide on the same slug
//! (`"Hero Shot"` and `"hero-shot"`); the later one wins.
//!
//! Slugs shaped like a size variant (`150x150`) or an ad-hoc crop suffix
//! (`crop-1714557600`, `thumbnail-crop-1714557600`) are reserved: their
//! profile file would share a name with a variant's WebP derivative.

use std::path::{Path, PathBuf};

/// Extension of every transcoded derivative.
pub const DERIVATIVE_EXTENSION: &str = "webp";

/// Source extensions whose derivative path is predictable by extension swap.
const CONVERTIBLE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Path where the transcoded derivative of `path` lives (or would live).
///
/// Directory and base name are kept; only the extension changes. Pure string
/// transform, no I/O.
pub fn derivative_path_for(path: &Path) -> PathBuf {
    path.with_extension(DERIVATIVE_EXTENSION)
}

/// True when `path` carries one of the convertible raster extensions.
pub fn has_convertible_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            CONVERTIBLE_EXTENSIONS
                .iter()
                .any(|c| e.eq_ignore_ascii_case(c))
        })
}

/// File stem of `path` as an owned string (lossy for non-UTF-8 names).
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extension of `path` as an owned string, empty when there is none.
pub fn extension(path: &Path) -> String {
    path.extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sanitize a user-entered profile name into a file-safe slug.
///
/// Surrounding whitespace is trimmed first. Returns `None` when nothing is
/// left to name the profile with.
pub fn sanitize_profile_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    let slug = trimmed
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    Some(slug)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// True when profile `slug` would name the same file as a size variant or
/// ad-hoc crop derivative of the same source.
pub fn is_reserved_profile_slug(slug: &str) -> bool {
    if let Some((w, h)) = slug.split_once('x')
        && is_digits(w)
        && is_digits(h)
    {
        return true;
    }
    match slug.rsplit_once("crop-") {
        Some((prefix, ts)) if is_digits(ts) => prefix.is_empty() || prefix.ends_with('-'),
        _ => false,
    }
}

/// File name of crop profile `slug` for source `source`: `name-slug.webp`.
pub fn profile_file_name(source: &Path, slug: &str) -> String {
    format!("{}-{}.{}", file_stem(source), slug, DERIVATIVE_EXTENSION)
}

/// File name of an ad-hoc crop, kept in the source's own format.
pub fn adhoc_crop_file_name(source: &Path, size_name: Option<&str>, timestamp: i64) -> String {
    let suffix = match size_name {
        Some(size) if !size.is_empty() => format!("-{size}-crop"),
        _ => "-crop".to_string(),
    };
    let ext = extension(source);
    if ext.is_empty() {
        format!("{}{}-{}", file_stem(source), suffix, timestamp)
    } else {
        format!("{}{}-{}.{}", file_stem(source), suffix, timestamp, ext)
    }
}

/// File name of a rendered size variant: `name-WxH.ext`.
pub fn variant_file_name(source: &Path, width: u32, height: u32) -> String {
    let ext = extension(source);
    if ext.is_empty() {
        format!("{}-{}x{}", file_stem(source), width, height)
    } else {
        format!("{}-{}x{}.{}", file_stem(source), width, height, ext)
    }
}

/// File name of a crop preview for asset `id`.
pub fn preview_file_name(id: u64, timestamp: i64) -> String {
    format!("preview-{id}-{timestamp}.jpg")
}

/// MIME type for a file extension, as recorded on size variants.
pub fn mime_type_for(path: &Path) -> &'static str {
    match extension(path).to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Join a recorded file name onto `dir`, keeping only its final component.
///
/// Metadata comes from an external store; a record naming `../x` must not
/// reach outside the asset's directory.
pub fn sibling_path(dir: &Path, recorded: &str) -> Option<PathBuf> {
    Path::new(recorded).file_name().map(|name| dir.join(name))
}
