//! Application configuration for cmsmigrate.
//!
//! User config lives at `~/.cmsmigrate/cmsmigrate.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::types::{ContentTypeMapping, DocumentType};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "cmsmigrate.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".cmsmigrate";

// ---------------------------------------------------------------------------
// Config structs (matching cmsmigrate.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source and output locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Asset download settings.
    #[serde(default)]
    pub download: DownloadSettings,

    /// Source directory → document type mappings, scanned in order.
    #[serde(default = "default_content_types")]
    pub content_types: Vec<ContentTypeMapping>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            download: DownloadSettings::default(),
            content_types: default_content_types(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the source content tree.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Directory receiving intermediate files, assets and the export.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Extension (without the dot) of source content files.
    #[serde(default = "default_content_extension")]
    pub content_extension: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            content_extension: default_content_extension(),
        }
    }
}

fn default_source_dir() -> String {
    "content".into()
}
fn default_output_dir() -> String {
    "migration".into()
}
fn default_content_extension() -> String {
    "mdx".into()
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Maximum simultaneous in-flight downloads.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    30
}

fn default_content_types() -> Vec<ContentTypeMapping> {
    [
        ("blog", DocumentType::Post),
        ("staff", DocumentType::Person),
        ("webinars", DocumentType::Post),
        ("pages", DocumentType::Page),
        ("services", DocumentType::Page),
        ("about", DocumentType::Page),
        ("media", DocumentType::Post),
        ("categories", DocumentType::Category),
    ]
    .into_iter()
    .map(|(directory, document_type)| ContentTypeMapping {
        directory: directory.into(),
        document_type,
    })
    .collect()
}

impl AppConfig {
    /// Reject values that would make a pipeline run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.download.concurrency == 0 {
            return Err(MigrateError::config(
                "download.concurrency must be greater than zero",
            ));
        }
        if self.download.timeout_secs == 0 {
            return Err(MigrateError::config(
                "download.timeout_secs must be greater than zero",
            ));
        }
        if self.paths.content_extension.trim().is_empty() {
            return Err(MigrateError::config(
                "paths.content_extension must not be empty",
            ));
        }
        for mapping in &self.content_types {
            if mapping.directory.trim().is_empty() {
                return Err(MigrateError::config(
                    "content_types entries need a non-empty directory",
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime download settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Worker pool size.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::from(&DownloadSettings::default())
    }
}

impl From<&DownloadSettings> for DownloadConfig {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Runtime pipeline configuration, passed explicitly to every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the source content tree.
    pub source_dir: PathBuf,
    /// Root of all generated output.
    pub output_dir: PathBuf,
    /// Content file extension, without the dot.
    pub content_extension: String,
    /// Directories scanned under `source_dir`, in order.
    pub content_types: Vec<ContentTypeMapping>,
    /// Download settings.
    pub download: DownloadConfig,
    /// Remove intermediate files after a successful run.
    pub cleanup: bool,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            source_dir: PathBuf::from(&config.paths.source_dir),
            output_dir: PathBuf::from(&config.paths.output_dir),
            content_extension: config
                .paths
                .content_extension
                .trim_start_matches('.')
                .to_string(),
            content_types: config.content_types.clone(),
            download: DownloadConfig::from(&config.download),
            cleanup: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults rooted at the given source and output directories.
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self::from(&AppConfig::default())
            .with_source_dir(source_dir)
            .with_output_dir(output_dir)
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Per-document intermediate JSON files.
    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    /// Downloaded images, also the base for relative image references.
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }

    /// Downloaded non-image assets.
    pub fn files_dir(&self) -> PathBuf {
        self.output_dir.join("files")
    }

    /// The NDJSON export handed to the destination CMS.
    pub fn data_file(&self) -> PathBuf {
        self.output_dir.join("data.ndjson")
    }

    /// The asset manifest.
    pub fn assets_file(&self) -> PathBuf {
        self.output_dir.join("assets.json")
    }

    /// Whether `path` carries the configured content extension.
    pub fn is_content_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.content_extension))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.cmsmigrate/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| MigrateError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.cmsmigrate/cmsmigrate.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load and validate the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| MigrateError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MigrateError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MigrateError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MigrateError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
