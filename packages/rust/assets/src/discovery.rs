//! Asset URL discovery over the source content tree.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

use cmsmigrate_content::{Frontmatter, parse_frontmatter};
use cmsmigrate_shared::{AssetKind, MigrateError, PipelineConfig, Result};

/// Frontmatter keys that may hold a single image URL.
pub const FRONTMATTER_IMAGE_KEYS: [&str; 5] = ["image", "coverImage", "hero", "logo", "avatar"];

/// Extensions stored under `images/`; everything else goes to `files/`.
const IMAGE_EXTENSIONS: [&str; 11] = [
    "jpg", "jpeg", "png", "gif", "webp", "svg", "avif", "bmp", "ico", "tif", "tiff",
];

/// URLs found in one pass over the source tree.
#[derive(Debug, Clone, Default)]
pub struct DiscoveredAssets {
    /// Unique remote URLs in first-seen order.
    pub urls: Vec<String>,
    /// Number of content files scanned.
    pub scanned_files: usize,
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Remote URLs of `![alt](url)` embeds, deduplicated in first-seen order.
pub fn extract_image_urls(body: &str) -> Vec<String> {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

    let mut seen = HashSet::new();
    IMAGE_RE
        .captures_iter(body)
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str())
        .filter(|url| is_remote(url) && seen.insert(*url))
        .map(str::to_string)
        .collect()
}

/// Remote URLs held by the well-known image keys.
pub fn extract_frontmatter_image_urls(frontmatter: &Frontmatter) -> Vec<String> {
    FRONTMATTER_IMAGE_KEYS
        .iter()
        .filter_map(|key| frontmatter.get(*key))
        .filter(|value| is_remote(value))
        .cloned()
        .collect()
}

/// Remote URLs in a comma-separated `gallery` value.
pub fn extract_gallery_urls(frontmatter: &Frontmatter) -> Vec<String> {
    frontmatter
        .get("gallery")
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|url| is_remote(url))
        .map(str::to_string)
        .collect()
}

/// Full 40-char SHA-1 hex digest of the URL.
pub fn generate_asset_id(url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Path extension of the URL including the dot, `.jpg` when there is none.
pub fn get_file_extension(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            Path::new(u.path())
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| !e.is_empty())
                .map(|e| format!(".{e}"))
        })
        .unwrap_or_else(|| ".jpg".to_string())
}

/// Image or generic file, judged by the URL's extension.
pub fn classify_asset(url: &str) -> AssetKind {
    let ext = get_file_extension(url);
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        AssetKind::Image
    } else {
        AssetKind::File
    }
}

/// Scan every configured content directory for asset URLs.
pub fn discover_assets(config: &PipelineConfig) -> Result<DiscoveredAssets> {
    let mut seen = HashSet::new();
    let mut found = DiscoveredAssets::default();

    for mapping in &config.content_types {
        let dir = config.source_dir.join(&mapping.directory);
        if !dir.is_dir() {
            info!(dir = %dir.display(), "content directory not found, skipping");
            continue;
        }

        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !config.is_content_file(entry.path()) {
                continue;
            }

            let raw = match std::fs::read_to_string(entry.path()) {
                Ok(raw) => raw,
                Err(e) => {
                    let e = MigrateError::io(entry.path(), e);
                    warn!(error = %e, "failed to scan content file");
                    continue;
                }
            };

            let parsed = parse_frontmatter(&raw);
            let urls = extract_image_urls(&parsed.body)
                .into_iter()
                .chain(extract_frontmatter_image_urls(&parsed.frontmatter))
                .chain(extract_gallery_urls(&parsed.frontmatter));
            for url in urls {
                if seen.insert(url.clone()) {
                    found.urls.push(url);
                }
            }
            found.scanned_files += 1;
        }

        debug!(directory = %mapping.directory, "scanned content directory");
    }

    info!(
        urls = found.urls.len(),
        files = found.scanned_files,
        "asset discovery complete"
    );

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_remote_embeds_in_order() {
        let body = "![a](https://x.test/1.png)\n![b](./local.png)\n![c](http://x.test/2.jpg) ![a again](https://x.test/1.png)";
        assert_eq!(
            extract_image_urls(body),
            vec!["https://x.test/1.png", "http://x.test/2.jpg"]
        );
    }

    #[test]
    fn frontmatter_keys_are_fixed() {
        let mut fm = Frontmatter::new();
        fm.insert("image".into(), "https://x.test/hero.png".into());
        fm.insert("avatar".into(), "me.png".into());
        fm.insert("banner".into(), "https://x.test/banner.png".into());
        assert_eq!(extract_frontmatter_image_urls(&fm), vec!["https://x.test/hero.png"]);
    }

    #[test]
    fn gallery_values_split_on_commas() {
        let mut fm = Frontmatter::new();
        fm.insert(
            "gallery".into(),
            "https://x.test/1.png, local.png ,https://x.test/2.png".into(),
        );
        assert_eq!(
            extract_gallery_urls(&fm),
            vec!["https://x.test/1.png", "https://x.test/2.png"]
        );
    }

    #[test]
    fn asset_ids_are_full_sha1() {
        let id = generate_asset_id("https://x.test/1.png");
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, generate_asset_id("https://x.test/1.png"));
        assert_ne!(id, generate_asset_id("https://x.test/2.png"));
    }

    #[test]
    fn file_extension_defaults_to_jpg() {
        assert_eq!(get_file_extension("https://x.test/a/b.webp?w=10"), ".webp");
        assert_eq!(get_file_extension("https://x.test/a/b"), ".jpg");
        assert_eq!(get_file_extension("not a url"), ".jpg");
    }

    #[test]
    fn classification_by_extension() {
        assert_eq!(classify_asset("https://x.test/a.PNG"), AssetKind::Image);
        assert_eq!(classify_asset("https://x.test/no-extension"), AssetKind::Image);
        assert_eq!(classify_asset("https://x.test/brochure.pdf"), AssetKind::File);
    }
}
