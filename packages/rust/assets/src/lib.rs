//! Asset discovery and download.
//!
//! This crate provides:
//! - [`discovery`]: URL extraction, content-addressed naming, source tree scan
//! - [`downloader`]: bounded worker pool that fetches each asset once

pub mod discovery;
pub mod downloader;

pub use discovery::{
    DiscoveredAssets, FRONTMATTER_IMAGE_KEYS, classify_asset, discover_assets,
    extract_frontmatter_image_urls, extract_gallery_urls, extract_image_urls, generate_asset_id,
    get_file_extension,
};
pub use downloader::{DownloadOutput, Downloader};
