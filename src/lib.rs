//! # Media Derive
//!
//! Derived-image management for a media library: every registered original
//! (JPEG, PNG, GIF) can carry a WebP derivative, a set of registered size
//! variants, named crop profiles and ad-hoc crops. The crate keeps those
//! files and the per-asset metadata that describes them in step.
//!
//! # Components
//!
//! ```text
//! Transcoder      original/variant  →  <stem>.webp           (transcode)
//! Crop engine     original + rect   →  <stem>-<profile>.webp (crop)
//! Regenerator     metadata          →  fresh size variants   (regenerate)
//! ```
//!
//! All three talk to an [`imaging::ImageBackend`] for pixels and a
//! [`store::MetadataStore`] for records; neither is global state. The
//! caller-facing surface in [`api`] validates requests, enforces the
//! configured feature switches and wraps results in a uniform envelope.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`api`] | Request validation, feature switches, the `Service` facade and JSON envelope |
//! | [`transcode`] | WebP derivatives of originals and size variants; the upload hook |
//! | [`crop`] | Named crop profiles, ad-hoc crops of a size, crop previews, size status |
//! | [`regenerate`] | Delete-and-rebuild of size variants; cleanup; the deletion routine |
//! | [`bulk`] | Batched, parallel application of an operation over many assets |
//! | [`store`] | `MetadataStore` / `VariantRegistry` contracts and the JSON library file |
//! | [`imaging`] | Geometry calculations, backend trait, pure-Rust backend, variant rendering |
//! | [`config`] | `media-derive.toml` loading, stock defaults, validation |
//! | [`naming`] | Derived file names, profile slugs, MIME types |
//! | [`error`] | Component-boundary error and the caller-visible error kinds |
//! | [`output`] | CLI output formatting |
//! | [`types`] | Records shared between components and persisted in the store |
//!
//! # Derivative Files
//!
//! Every derived file lives next to its original and is named from the
//! original's stem:
//!
//! ```text
//! photo.jpg                      original
//! photo.webp                     transcoded original
//! photo-150x150.jpg              size variant (+ photo-150x150.webp)
//! photo-hero.webp                crop profile "Hero"
//! photo-thumbnail-crop-1714557600.jpg   ad-hoc crop replacing "thumbnail"
//! ```
//!
//! The deletion routine only ever removes names derived this way, and never
//! the original or a crop profile's file.

pub mod api;
pub mod bulk;
pub mod config;
pub mod crop;
pub mod error;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod regenerate;
pub mod store;
pub mod transcode;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
