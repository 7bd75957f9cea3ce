//! Core domain types shared by the migration stages.
//!
//! Wire names follow the destination CMS (`_id`, `_type`, `_ref`, camelCase
//! fields), so these types serialize straight into the interchange files.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{MigrateError, Result};

// ---------------------------------------------------------------------------
// DocumentType
// ---------------------------------------------------------------------------

/// Target document taxonomy of the destination CMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Post,
    Person,
    Page,
    Category,
    Home,
    Settings,
}

impl DocumentType {
    /// Every known document type.
    pub const ALL: [DocumentType; 6] = [
        Self::Post,
        Self::Person,
        Self::Page,
        Self::Category,
        Self::Home,
        Self::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Person => "person",
            Self::Page => "page",
            Self::Category => "category",
            Self::Home => "home",
            Self::Settings => "settings",
        }
    }

    /// Fields an exported document of this type must carry.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Post => &["_id", "_type", "title", "slug", "publishedAt"],
            Self::Person => &["_id", "_type", "name", "slug"],
            Self::Page | Self::Category => &["_id", "_type", "title", "slug"],
            Self::Home | Self::Settings => &["_id", "_type", "title"],
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = MigrateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MigrateError::parse(format!("unknown document type: {s}")))
    }
}

/// Maps one source directory to the document type its files become.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeMapping {
    /// Directory name under the source root (the document's source type).
    pub directory: String,
    /// Destination document type.
    pub document_type: DocumentType,
}

// ---------------------------------------------------------------------------
// Rich text
// ---------------------------------------------------------------------------

/// Paragraph/heading style of a text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockStyle {
    Normal,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
}

impl BlockStyle {
    /// Heading style for a `#` run of the given length, capped at `h6`.
    pub fn heading(level: usize) -> Self {
        match level {
            0 | 1 => Self::H1,
            2 => Self::H2,
            3 => Self::H3,
            4 => Self::H4,
            5 => Self::H5,
            _ => Self::H6,
        }
    }
}

/// A run of plain text inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "span")]
pub struct Span {
    pub text: String,
}

/// One element of a rich-text body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_type")]
pub enum Block {
    /// Paragraph or heading.
    #[serde(rename = "block")]
    Text { style: BlockStyle, children: Vec<Span> },

    /// Embedded Vimeo player.
    #[serde(rename = "vimeoBlock", rename_all = "camelCase")]
    Vimeo {
        url: String,
        vimeo_id: String,
        aspect_ratio: String,
        autoplay: bool,
        controls: bool,
        responsive: bool,
    },
}

impl Block {
    /// A block holding a single span of text.
    pub fn text(style: BlockStyle, text: impl Into<String>) -> Self {
        Self::Text {
            style,
            children: vec![Span { text: text.into() }],
        }
    }

    /// A Vimeo embed with the default player settings.
    pub fn vimeo(url: impl Into<String>, vimeo_id: impl Into<String>) -> Self {
        Self::Vimeo {
            url: url.into(),
            vimeo_id: vimeo_id.into(),
            aspect_ratio: "16:9".into(),
            autoplay: false,
            controls: true,
            responsive: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Typed objects
// ---------------------------------------------------------------------------

/// URL-safe document slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "slug")]
pub struct Slug {
    pub current: String,
}

/// Pointer to another document or to an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "reference")]
pub struct Reference {
    #[serde(rename = "_ref")]
    pub target: String,
}

impl Reference {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

/// Image field whose binary lives in the asset manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "image")]
pub struct ImageAsset {
    pub asset: Reference,
}

impl ImageAsset {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset: Reference::to(asset_id),
        }
    }
}

/// Image reference found in frontmatter, before asset resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    /// Remote URL, kept verbatim so the exporter can look it up in the manifest.
    Remote(String),
    /// Local file, handed to the importer as a file asset.
    LocalFile(PathBuf),
}

#[derive(Serialize)]
#[serde(tag = "_type", rename = "image")]
struct LocalImage {
    #[serde(rename = "_sanityAsset")]
    sanity_asset: String,
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Remote(url) => serializer.serialize_str(url),
            Self::LocalFile(path) => LocalImage {
                sanity_asset: format!("image@file://{}", path.display()),
            }
            .serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessedContent
// ---------------------------------------------------------------------------

/// Intermediate per-document file written by the content processor and read
/// by the exporter. Every field is optional on read so that incomplete files
/// can be reported and skipped instead of failing the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedContent {
    /// Content-hash identifier assigned by the processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Destination document type.
    #[serde(rename = "type", default)]
    pub document_type: Option<String>,
    /// Canonical slug string.
    #[serde(default)]
    pub slug: Option<String>,
    /// Path of the source file, for traceability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Document fields merged over the system fields at export time.
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Kind of a downloaded asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    #[default]
    Image,
    File,
    /// Any other `_type` found in a manifest written by another tool.
    #[serde(other)]
    Unknown,
}

/// One downloaded (or already present) asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// SHA-1 of the original URL.
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_type", default)]
    pub kind: AssetKind,
    #[serde(default)]
    pub original_url: String,
    /// `id` plus the URL's extension.
    #[serde(default)]
    pub file_name: String,
    /// Local copy on disk.
    #[serde(default, alias = "localPath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Set only when this run fetched the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<String>,
}

/// Flat asset manifest: original URL → record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest(pub BTreeMap<String, AssetRecord>);

/// Aggregate counts written alongside a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownloadMetadata {
    pub total_assets: usize,
    pub total_images: usize,
    pub total_files: usize,
    pub failed_downloads: usize,
    pub processed_files: usize,
    pub generated_at: String,
}

/// Manifest shape produced by the asset downloader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadManifest {
    pub images: Vec<AssetRecord>,
    pub files: Vec<AssetRecord>,
    #[serde(default)]
    pub metadata: DownloadMetadata,
}

impl DownloadManifest {
    /// Re-key the record lists by original URL.
    pub fn into_flat(self) -> AssetManifest {
        AssetManifest(
            self.images
                .into_iter()
                .chain(self.files)
                .map(|record| (record.original_url.clone(), record))
                .collect(),
        )
    }
}

impl AssetManifest {
    /// Parse either manifest shape. An object with an `images` or `files`
    /// array is the downloader shape; anything else must be the flat map.
    pub fn from_json_str(content: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let is_download_shape = ["images", "files"]
            .iter()
            .any(|key| value.get(*key).is_some_and(serde_json::Value::is_array));

        if is_download_shape {
            serde_json::from_value::<DownloadManifest>(value).map(DownloadManifest::into_flat)
        } else {
            serde_json::from_value(value)
        }
    }

    /// Read a manifest file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
        Self::from_json_str(&content)
            .map(Some)
            .map_err(|e| MigrateError::Manifest {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    pub fn get(&self, url: &str) -> Option<&AssetRecord> {
        self.0.get(url)
    }

    pub fn insert(&mut self, record: AssetRecord) {
        self.0.insert(record.original_url.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AssetRecord)> {
        self.0.iter()
    }

    /// Set of asset ids present in the manifest values.
    pub fn asset_ids(&self) -> HashSet<&str> {
        self.0
            .values()
            .filter(|r| !r.id.is_empty())
            .map(|r| r.id.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Canonical ISO-8601 form with milliseconds and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in canonical ISO form.
pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}
