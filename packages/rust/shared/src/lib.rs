//! Shared types, error model, and configuration for cmsmigrate.
//!
//! This crate is the foundation depended on by all other cmsmigrate crates.
//! It provides:
//! - [`MigrateError`]: the unified error type
//! - Domain types ([`DocumentType`], [`Block`], [`AssetRecord`], [`AssetManifest`], ...)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DownloadConfig, DownloadSettings, PathsConfig, PipelineConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{MigrateError, Result};
pub use types::{
    AssetKind, AssetManifest, AssetRecord, Block, BlockStyle, ContentTypeMapping, DocumentType,
    DownloadManifest, DownloadMetadata, ImageAsset, ImageRef, ProcessedContent, Reference, Slug,
    Span, iso_timestamp, now_iso,
};
