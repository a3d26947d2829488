use clap::{Parser, Subcommand};
use media_derive::api::{
    ApplyProfileRequest, AssetRequest, ConvertRequest, CropSizeRequest, DeleteProfileRequest,
    PreviewRequest, Response, Service,
};
use media_derive::bulk::BulkOperation;
use media_derive::error::EngineError;
use media_derive::imaging::RustBackend;
use media_derive::regenerate::RegenerateReport;
use media_derive::store::{JsonLibrary, MetadataStore};
use media_derive::transcode::IngestOutcome;
use media_derive::types::{AssetId, CropRect, ResizeRequest};
use media_derive::{config, output};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Config file picked up from the library directory when `--config` is absent.
const LIBRARY_CONFIG: &str = "media-derive.toml";

#[derive(Parser)]
#[command(name = "media-derive")]
#[command(about = "Derived images for a media library: WebP, crop profiles, size variants")]
#[command(long_about = "\
Derived images for a media library: WebP, crop profiles, size variants

Originals are registered in a JSON library file. Every derived file lives
next to its original:

  photo.jpg                 original
  photo.webp                transcoded original
  photo-150x150.jpg         size variant (+ photo-150x150.webp)
  photo-hero.webp           crop profile \"Hero\"

Configuration is read from --config, else media-derive.toml next to the
library file, else stock defaults. Run 'media-derive gen-config' for a
documented file.")]
#[command(version)]
struct Cli {
    /// JSON library file holding per-asset metadata
    #[arg(long, default_value = "media-library.json", global = true)]
    library: PathBuf,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print raw JSON responses instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// A crop rectangle in original-image pixels.
#[derive(clap::Args, Clone, Copy)]
struct RectArgs {
    #[arg(long)]
    x: f64,
    #[arg(long)]
    y: f64,
    #[arg(long)]
    width: f64,
    #[arg(long)]
    height: f64,
}

impl From<RectArgs> for CropRect {
    fn from(r: RectArgs) -> Self {
        CropRect::new(r.x, r.y, r.width, r.height)
    }
}

/// Asset selection for bulk commands.
#[derive(clap::Args, Clone)]
struct Selection {
    /// Asset ids
    ids: Vec<AssetId>,

    /// Every asset in the library
    #[arg(long, conflicts_with = "ids")]
    all: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Register originals, convert them and render their size variants
    Import { files: Vec<PathBuf> },
    /// List registered assets
    List,
    /// Transcode an asset's original and size variants to WebP
    Convert {
        id: AssetId,
        /// WebP quality 1-100 (default from config)
        #[arg(long)]
        quality: Option<u32>,
    },
    /// Save a named crop profile
    Crop {
        id: AssetId,
        /// Profile name
        #[arg(long)]
        name: String,
        #[command(flatten)]
        rect: RectArgs,
        /// Resize the original to this width before cropping
        #[arg(long)]
        resize_width: Option<u32>,
        /// Resize the original to this height before cropping
        #[arg(long)]
        resize_height: Option<u32>,
        #[arg(long)]
        quality: Option<u32>,
    },
    /// Crop the original, optionally replacing a registered size
    CropSize {
        id: AssetId,
        #[command(flatten)]
        rect: RectArgs,
        /// Size variant the crop replaces
        #[arg(long)]
        size: Option<String>,
        #[arg(long)]
        quality: Option<u32>,
    },
    /// Render a small JPEG preview of a crop
    Preview {
        id: AssetId,
        #[command(flatten)]
        rect: RectArgs,
    },
    /// List an asset's crop profiles
    Profiles { id: AssetId },
    /// Delete a crop profile and its file
    DeleteProfile { id: AssetId, name: String },
    /// Show registered sizes and which exist for an asset
    Sizes { id: AssetId },
    /// Delete and rebuild size variants
    Regenerate(Selection),
    /// Delete size variants and their records
    Cleanup(Selection),
    /// Transcode many assets
    BulkConvert(Selection),
    /// Print a stock media-derive.toml with all options documented
    GenConfig,
}

#[derive(Serialize)]
struct ImportResult {
    id: AssetId,
    source: PathBuf,
    ingest: IngestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    regenerate: Option<RegenerateReport>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let library = JsonLibrary::open(&std::path::absolute(&cli.library)?)?;
    let config_path = cli.config.clone().or_else(|| {
        let candidate = library.root().join(LIBRARY_CONFIG);
        candidate.is_file().then_some(candidate)
    });
    let engine_config = config::load_config(config_path.as_deref())?;
    init_thread_pool(&engine_config.processing);

    let backend = RustBackend::new();
    let service =
        Service::new(&backend, &library, &engine_config).with_preview_root(library.root());
    let json = cli.json;

    match cli.command {
        Command::Import { files } => {
            for file in files {
                let result = import(&library, &service, &file);
                emit(json, result, |r| {
                    let mut lines = output::format_import(r.id, &r.source, &r.ingest);
                    if let Some(report) = &r.regenerate {
                        lines.extend(output::format_regenerate_report(r.id, report));
                    }
                    lines
                })?;
            }
        }
        Command::List => {
            let mut assets = Vec::new();
            for id in library.asset_ids()? {
                if let Some(path) = library.attached_file(id)? {
                    assets.push((id, path));
                }
            }
            if json {
                let listed: Vec<_> = assets
                    .iter()
                    .map(|(id, path)| serde_json::json!({"id": id, "file": path}))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                let borrowed: Vec<(AssetId, &Path)> =
                    assets.iter().map(|(id, p)| (*id, p.as_path())).collect();
                output::print_lines(output::format_asset_list(&borrowed));
            }
        }
        Command::Convert { id, quality } => {
            let result = service.convert(&ConvertRequest {
                asset_id: Some(id),
                quality,
            });
            emit(json, result, |c| output::format_conversion(id, c))?;
        }
        Command::Crop {
            id,
            name,
            rect,
            resize_width,
            resize_height,
            quality,
        } => {
            let resize = ResizeRequest {
                width: resize_width,
                height: resize_height,
            };
            let result = service.apply_profile(&ApplyProfileRequest {
                asset_id: Some(id),
                profile_name: Some(name),
                crop: Some(rect.into()),
                resize: (!resize.is_empty()).then_some(resize),
                quality,
            });
            emit(json, result, |r| output::format_profile_result(id, r))?;
        }
        Command::CropSize {
            id,
            rect,
            size,
            quality,
        } => {
            let result = service.crop_size(&CropSizeRequest {
                asset_id: Some(id),
                crop: Some(rect.into()),
                size,
                quality,
            });
            emit(json, result, |c| output::format_adhoc_crop(id, c))?;
        }
        Command::Preview { id, rect } => {
            let result = service.preview(&PreviewRequest {
                asset_id: Some(id),
                crop: Some(rect.into()),
            });
            emit(json, result, |p| output::format_preview(id, p))?;
        }
        Command::Profiles { id } => {
            let result = service.profiles(&AssetRequest { asset_id: Some(id) });
            emit(json, result, |p| output::format_profiles(id, p))?;
        }
        Command::DeleteProfile { id, name } => {
            let result = service.delete_profile(&DeleteProfileRequest {
                asset_id: Some(id),
                profile_name: Some(name.clone()),
            });
            emit(json, result, |p| {
                vec![format!("#{id} profile '{name}' deleted ({})", p.filename)]
            })?;
        }
        Command::Sizes { id } => {
            let result = service.sizes_overview(&AssetRequest { asset_id: Some(id) });
            emit(json, result, output::format_sizes)?;
        }
        Command::Regenerate(selection) => {
            run_bulk(&service, &library, BulkOperation::Regenerate, &selection, json)?;
        }
        Command::Cleanup(selection) => {
            run_bulk(&service, &library, BulkOperation::Cleanup, &selection, json)?;
        }
        Command::BulkConvert(selection) => {
            run_bulk(&service, &library, BulkOperation::Convert, &selection, json)?;
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// Register one original, run the upload hook, then render its sizes.
fn import(
    library: &JsonLibrary,
    service: &Service<'_, RustBackend>,
    file: &Path,
) -> Result<ImportResult, EngineError> {
    if !file.is_file() {
        return Err(EngineError::SourceNotFound(file.to_path_buf()));
    }
    let source = std::fs::canonicalize(file)?;
    let id = library.register(&source)?;
    let request = AssetRequest { asset_id: Some(id) };
    let ingest = service.ingest(&request)?;
    let regenerate = if service.config().features.regenerate {
        Some(service.regenerate(&request)?)
    } else {
        None
    };
    Ok(ImportResult {
        id,
        source,
        ingest,
        regenerate,
    })
}

fn run_bulk(
    service: &Service<'_, RustBackend>,
    library: &JsonLibrary,
    op: BulkOperation,
    selection: &Selection,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let ids = if selection.all {
        library.asset_ids()?
    } else {
        selection.ids.clone()
    };

    if json {
        let result = service.bulk(op, &ids, None);
        println!("{}", serde_json::to_string_pretty(&Response::from_result(result))?);
        return Ok(());
    }

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_bulk_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = service.bulk(op, &ids, Some(tx));
    printer.join().map_err(|_| "progress printer panicked")?;
    output::print_lines(output::format_bulk_summary(op, &result?));
    Ok(())
}

/// Print a result as a JSON envelope or as formatted lines.
///
/// In text mode a failure is returned so the process exits non-zero.
fn emit<T: Serialize>(
    json: bool,
    result: Result<T, EngineError>,
    format: impl FnOnce(&T) -> Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&Response::from_result(result))?);
        return Ok(());
    }
    let value = result?;
    output::print_lines(format(&value));
    Ok(())
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
