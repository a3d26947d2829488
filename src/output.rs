//! CLI output formatting for every operation.
//!
//! Output leads with the asset or variant identity (`#12`, `thumbnail`),
//! with file paths as indented context lines:
//!
//! ```text
//! #12 regenerated (4 sizes, 3 stale files removed)
//!     thumbnail: photo-150x150.jpg 150x150 (+ photo-150x150.webp)
//!     medium: photo-300x200.jpg 300x200
//! ```
//!
//! Each function returns `Vec<String>` so it can be tested without I/O;
//! [`print_lines`] writes them to stdout.

use crate::api::SizesOverview;
use crate::bulk::{AssetOutcome, BulkEvent, BulkOperation, BulkSummary};
use crate::crop::{AdhocCrop, Preview, ProfileResult};
use crate::regenerate::{CleanupReport, RegenerateReport};
use crate::transcode::{AssetConversion, IngestOutcome};
use crate::types::{AssetId, CropProfiles, ResizeRequest};
use std::path::Path;

const INDENT: &str = "    ";

fn asset_label(id: AssetId) -> String {
    format!("#{id}")
}

fn dims(width: u32, height: u32) -> String {
    format!("{width}x{height}")
}

fn resize_label(resize: &ResizeRequest) -> String {
    let side = |v: Option<u32>| v.filter(|&n| n > 0).map_or("auto".to_string(), |n| n.to_string());
    format!("{}x{}", side(resize.width), side(resize.height))
}

pub fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Library
// ============================================================================

/// Registered assets, one per line.
///
/// ```text
/// #1 2024/photo.jpg
/// #2 2024/banner.png (missing)
/// ```
pub fn format_asset_list(assets: &[(AssetId, &Path)]) -> Vec<String> {
    if assets.is_empty() {
        return vec!["No assets".to_string()];
    }
    assets
        .iter()
        .map(|(id, path)| {
            let missing = if path.is_file() { "" } else { " (missing)" };
            format!("{} {}{}", asset_label(*id), path.display(), missing)
        })
        .collect()
}

pub fn format_import(id: AssetId, source: &Path, outcome: &IngestOutcome) -> Vec<String> {
    let mut lines = vec![format!("{} imported", asset_label(id))];
    lines.push(format!("{INDENT}Source: {}", source.display()));
    match outcome {
        IngestOutcome::Skipped => {}
        IngestOutcome::Converted { webp_path } => {
            lines.push(format!("{INDENT}WebP: {}", webp_path.display()));
        }
        IngestOutcome::Replaced { webp_path } => {
            lines.push(format!("{INDENT}WebP: {} (original removed)", webp_path.display()));
        }
    }
    lines
}

// ============================================================================
// Transcoder
// ============================================================================

pub fn format_conversion(id: AssetId, conversion: &AssetConversion) -> Vec<String> {
    let mut lines = vec![format!(
        "{} converted ({} sizes)",
        asset_label(id),
        conversion.converted_sizes
    )];
    lines.push(format!("{INDENT}WebP: {}", conversion.webp_path.display()));
    for name in &conversion.failed_sizes {
        lines.push(format!("{INDENT}{name}: conversion failed"));
    }
    lines
}

// ============================================================================
// Crop engine
// ============================================================================

pub fn format_profile_result(id: AssetId, result: &ProfileResult) -> Vec<String> {
    vec![
        format!(
            "{} profile '{}' saved ({})",
            asset_label(id),
            result.profile,
            dims(result.width, result.height)
        ),
        format!("{INDENT}File: {}", result.path.display()),
    ]
}

pub fn format_adhoc_crop(id: AssetId, crop: &AdhocCrop) -> Vec<String> {
    let target = crop
        .size
        .as_deref()
        .map_or(String::new(), |s| format!(" for {s}"));
    let mut lines = vec![format!(
        "{} cropped{} ({})",
        asset_label(id),
        target,
        dims(crop.width, crop.height)
    )];
    lines.push(format!("{INDENT}File: {}", crop.path.display()));
    if let Some(webp) = &crop.webp_path {
        lines.push(format!("{INDENT}WebP: {}", webp.display()));
    }
    lines
}

pub fn format_preview(id: AssetId, preview: &Preview) -> Vec<String> {
    vec![
        format!(
            "{} preview ({})",
            asset_label(id),
            dims(preview.width, preview.height)
        ),
        format!("{INDENT}File: {}", preview.path.display()),
    ]
}

/// Crop profiles, in slug order.
///
/// ```text
/// hero 800x450 (crop 10,20 1600x900, resize 1600xauto)
///     File: photo-hero.webp
///     Created: 2024-05-01 10:00:00
/// ```
pub fn format_profiles(id: AssetId, profiles: &CropProfiles) -> Vec<String> {
    if profiles.is_empty() {
        return vec![format!("{} has no crop profiles", asset_label(id))];
    }
    let mut lines = Vec::new();
    for (name, profile) in profiles {
        let rect = &profile.crop_data;
        let mut detail = format!(
            "crop {},{} {}x{}",
            rect.x, rect.y, rect.width, rect.height
        );
        if let Some(resize) = &profile.resize_data {
            detail.push_str(&format!(", resize {}", resize_label(resize)));
        }
        lines.push(format!(
            "{} {} ({})",
            name,
            dims(profile.width, profile.height),
            detail
        ));
        lines.push(format!("{INDENT}File: {}", profile.filename));
        lines.push(format!("{INDENT}Created: {}", profile.created));
    }
    lines
}

// ============================================================================
// Sizes and regeneration
// ============================================================================

/// Per-size status.
///
/// ```text
/// thumbnail 150x150 crop: 150x150 /lib/photo-150x150.jpg
/// large 1024x1024: missing
/// WebP original: present
/// ```
pub fn format_sizes(overview: &SizesOverview) -> Vec<String> {
    let mut lines = Vec::new();
    for size in &overview.sizes {
        let policy = if size.crop { " crop" } else { "" };
        let status = match (size.exists, size.actual_width, size.actual_height) {
            (true, Some(w), Some(h)) => format!("{} {}", dims(w, h), size.file_path),
            _ => "missing".to_string(),
        };
        lines.push(format!(
            "{} {}{}: {}",
            size.name,
            dims(size.target_width, size.target_height),
            policy,
            status
        ));
    }
    lines.push(format!(
        "WebP original: {}",
        if overview.webp_exists { "present" } else { "missing" }
    ));
    lines
}

pub fn format_regenerate_report(id: AssetId, report: &RegenerateReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} regenerated ({} sizes, {} stale files removed)",
        asset_label(id),
        report.sizes.len(),
        report.deleted_files
    )];
    for (name, variant) in &report.sizes {
        let webp = variant
            .webp_file
            .as_deref()
            .map_or(String::new(), |w| format!(" (+ {w})"));
        lines.push(format!(
            "{INDENT}{}: {} {}{}",
            name,
            variant.file,
            dims(variant.width, variant.height),
            webp
        ));
    }
    for name in &report.conversion_failures {
        lines.push(format!("{INDENT}{name}: conversion failed"));
    }
    lines
}

pub fn format_cleanup_report(id: AssetId, report: &CleanupReport) -> Vec<String> {
    vec![format!(
        "{} cleaned ({} sizes, {} files removed)",
        asset_label(id),
        report.removed_sizes,
        report.deleted_files
    )]
}

// ============================================================================
// Bulk runs
// ============================================================================

/// A single bulk progress event.
///
/// ```text
/// [1/3] #4 ok: 4 sizes
/// [2/3] #9 failed (not_found): asset 9 not found
/// batch 1/2 done (2/3)
/// ```
pub fn format_bulk_event(event: &BulkEvent) -> Vec<String> {
    match event {
        BulkEvent::AssetFinished {
            id,
            processed,
            total,
            outcome,
        } => {
            let status = match outcome {
                AssetOutcome::Succeeded { detail } if detail.is_empty() => "ok".to_string(),
                AssetOutcome::Succeeded { detail } => format!("ok: {detail}"),
                AssetOutcome::Failed { kind, message } => {
                    format!("failed ({}): {message}", kind_label(*kind))
                }
            };
            vec![format!(
                "[{processed}/{total}] {} {status}",
                asset_label(*id)
            )]
        }
        BulkEvent::BatchFinished {
            batch,
            batches,
            processed,
            total,
        } => vec![format!("batch {batch}/{batches} done ({processed}/{total})")],
    }
}

pub fn format_bulk_summary(op: BulkOperation, summary: &BulkSummary) -> Vec<String> {
    let mut lines = vec![format!(
        "{}: {} succeeded, {} failed of {}",
        op.label(),
        summary.succeeded,
        summary.failed.len(),
        summary.total
    )];
    for failure in &summary.failed {
        lines.push(format!(
            "{INDENT}{} {}: {}",
            asset_label(failure.id),
            kind_label(failure.kind),
            failure.message
        ));
    }
    lines
}

fn kind_label(kind: crate::error::ErrorKind) -> &'static str {
    use crate::error::ErrorKind;
    match kind {
        ErrorKind::NotFound => "not_found",
        ErrorKind::UnsupportedFormat => "unsupported_format",
        ErrorKind::CodecFailure => "codec_failure",
        ErrorKind::ValidationFailure => "validation_failure",
        ErrorKind::StorageFailure => "storage_failure",
    }
}
