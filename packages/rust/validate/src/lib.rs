//! Post-export validation of the NDJSON interchange file and asset manifest.
//!
//! Every check collects error strings instead of failing fast, so a single
//! run reports everything that is wrong with an export. Only a missing or
//! malformed input file aborts validation.

pub mod tree;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use cmsmigrate_shared::{
    AssetManifest, DocumentType, MigrateError, PipelineConfig, Result, iso_timestamp,
};

pub use tree::{TypedNode, Visitor, Walk, find_asset_references, find_references, walk};

/// Fields every exported document must carry.
pub const SYSTEM_FIELDS: [&str; 5] = ["_id", "_type", "_createdAt", "_updatedAt", "_rev"];

/// Fields checked for canonical ISO-8601 timestamps.
pub const DATE_FIELDS: [&str; 3] = ["_createdAt", "_updatedAt", "publishedAt"];

static ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentCounts {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCounts {
    pub total: usize,
    pub with_local_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationCounts {
    pub errors: usize,
    pub warnings: usize,
    pub status: ValidationStatus,
}

/// Aggregate view of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub documents: DocumentCounts,
    pub assets: AssetCounts,
    pub validation: ValidationCounts,
}

/// Result of [`validate_migration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// `true` when no errors were found.
    pub success: bool,
    pub errors: Vec<String>,
    pub summary: ValidationSummary,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse an NDJSON file, one document per line. A whitespace-only file holds
/// zero documents.
pub fn load_ndjson_data(path: &Path) -> Result<Vec<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MigrateError::not_found(path));
        }
        Err(e) => return Err(MigrateError::io(path, e)),
    };

    let content = content.trim();
    if content.is_empty() {
        return Ok(Vec::new());
    }

    content
        .split('\n')
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line.trim_end_matches('\r')).map_err(|e| {
                MigrateError::InvalidNdjson {
                    line: i + 1,
                    message: e.to_string(),
                }
            })
        })
        .collect()
}

/// Load the asset manifest. A missing file yields an empty manifest.
pub fn load_assets_data(path: &Path) -> Result<AssetManifest> {
    match AssetManifest::load(path)? {
        Some(manifest) => Ok(manifest),
        None => {
            warn!(path = %path.display(), "assets file not found, continuing without assets");
            Ok(AssetManifest::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Presence test: `null`, `false`, `0` and `""` count as absent.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "undefined".to_string(),
    }
}

fn document_label(doc: &Value) -> String {
    if truthy(doc.get("_id")) {
        display_value(doc.get("_id"))
    } else {
        "unknown".to_string()
    }
}

/// `true` iff `s` parses as a timestamp whose canonical millisecond form is
/// exactly `s`.
pub fn is_valid_iso_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| iso_timestamp(dt.with_timezone(&Utc)) == s)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Structural checks for the document at 0-based `index`.
pub fn validate_document_structure(doc: &Value, index: usize) -> Vec<String> {
    let mut errors = Vec::new();

    for field in SYSTEM_FIELDS {
        if !truthy(doc.get(field)) {
            errors.push(format!("Missing required system field: {field}"));
        }
    }

    let type_value = doc.get("_type");
    let doc_type = type_value
        .and_then(Value::as_str)
        .and_then(|t| DocumentType::from_str(t).ok());

    match doc_type {
        Some(doc_type) => {
            for field in doc_type.required_fields() {
                if !truthy(doc.get(*field)) {
                    errors.push(format!("Missing required field for {doc_type}: {field}"));
                }
            }
        }
        None => errors.push(format!(
            "Invalid document type: {}",
            display_value(type_value)
        )),
    }

    let id = doc.get("_id");
    if truthy(id) && !id.and_then(Value::as_str).is_some_and(|s| ID_RE.is_match(s)) {
        errors.push(format!("Invalid _id format: {}", display_value(id)));
    }

    let slug = doc.get("slug");
    if truthy(slug) {
        match slug {
            Some(Value::Object(slug)) => {
                if slug.get("_type").and_then(Value::as_str) != Some("slug") {
                    errors.push("Slug must have _type: 'slug'".to_string());
                }
                if !truthy(slug.get("current")) {
                    errors.push("Slug must have 'current' field".to_string());
                }
            }
            _ => errors
                .push("Slug should be an object with _type and current fields".to_string()),
        }
    }

    for field in DATE_FIELDS {
        let value = doc.get(field);
        if truthy(value) && !value.and_then(Value::as_str).is_some_and(is_valid_iso_date) {
            errors.push(format!(
                "Invalid date format for {field}: {}",
                display_value(value)
            ));
        }
    }

    let label = document_label(doc);
    errors
        .into_iter()
        .map(|e| format!("Document {} ({label}): {e}", index + 1))
        .collect()
}

/// Every document reference must name a document `_id` in the same export.
pub fn validate_references(documents: &[Value]) -> Vec<String> {
    let ids: HashSet<&str> = documents
        .iter()
        .filter_map(|d| d.get("_id").and_then(Value::as_str))
        .collect();

    let mut errors = Vec::new();
    for (i, doc) in documents.iter().enumerate() {
        for reference in find_references(doc) {
            if !ids.contains(reference.target.as_str()) {
                errors.push(format!(
                    "Document {} ({}): Reference to non-existent document: {}",
                    i + 1,
                    document_label(doc),
                    reference.target
                ));
            }
        }
    }
    errors
}

/// Every image asset reference must name an asset id in the manifest.
pub fn validate_asset_references(documents: &[Value], manifest: &AssetManifest) -> Vec<String> {
    let asset_ids = manifest.asset_ids();

    let mut errors = Vec::new();
    for (i, doc) in documents.iter().enumerate() {
        for reference in find_asset_references(doc) {
            if !asset_ids.contains(reference.target.as_str()) {
                errors.push(format!(
                    "Document {} ({}): Reference to non-existent asset: {}",
                    i + 1,
                    document_label(doc),
                    reference.target
                ));
            }
        }
    }
    errors
}

/// Manifest entries with a recorded local path must exist on disk.
pub fn validate_asset_files(manifest: &AssetManifest) -> Vec<String> {
    manifest
        .iter()
        .filter_map(|(url, record)| {
            let path = record.file_path.as_deref()?;
            if path.as_os_str().is_empty() || path.exists() {
                return None;
            }
            Some(format!(
                "Asset file not found: {} (referenced by {url})",
                path.display()
            ))
        })
        .collect()
}

/// Flags every repeated `_id` after its first occurrence.
pub fn validate_ndjson_format(documents: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .filter_map(|doc| doc.get("_id"))
        .filter(|id| !seen.insert(id.to_string()))
        .map(|id| format!("Duplicate document ID: {}", display_value(Some(id))))
        .collect()
}

pub fn generate_summary(
    documents: &[Value],
    manifest: &AssetManifest,
    errors: &[String],
) -> ValidationSummary {
    let mut by_type = BTreeMap::new();
    for doc in documents {
        let key = match doc.get("_type") {
            Some(t) => display_value(Some(t)),
            None => "unknown".to_string(),
        };
        *by_type.entry(key).or_insert(0) += 1;
    }

    ValidationSummary {
        documents: DocumentCounts {
            total: documents.len(),
            by_type,
        },
        assets: AssetCounts {
            total: manifest.len(),
            with_local_files: manifest
                .iter()
                .filter(|(_, r)| r.file_path.as_ref().is_some_and(|p| !p.as_os_str().is_empty()))
                .count(),
        },
        validation: ValidationCounts {
            errors: errors.len(),
            warnings: 0,
            status: if errors.is_empty() {
                ValidationStatus::Pass
            } else {
                ValidationStatus::Fail
            },
        },
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run every check over the exported files named by `config`.
#[instrument(skip_all, fields(data = %config.data_file().display()))]
pub fn validate_migration(config: &PipelineConfig) -> Result<ValidationReport> {
    info!("starting migration validation");

    let documents = load_ndjson_data(&config.data_file())?;
    let manifest = load_assets_data(&config.assets_file())?;
    info!(
        documents = documents.len(),
        assets = manifest.len(),
        "loaded migration data"
    );

    let mut errors = Vec::new();

    debug!("validating ndjson format");
    errors.extend(validate_ndjson_format(&documents));

    debug!("validating document structure");
    for (i, doc) in documents.iter().enumerate() {
        errors.extend(validate_document_structure(doc, i));
    }

    debug!("validating document references");
    errors.extend(validate_references(&documents));

    if !manifest.is_empty() {
        debug!("validating asset references");
        errors.extend(validate_asset_references(&documents, &manifest));

        debug!("validating asset files");
        errors.extend(validate_asset_files(&manifest));
    }

    let summary = generate_summary(&documents, &manifest, &errors);
    let success = errors.is_empty();

    if success {
        info!(documents = summary.documents.total, "migration validation passed");
    } else {
        warn!(errors = errors.len(), "migration validation failed");
    }

    Ok(ValidationReport {
        success,
        errors,
        summary,
    })
}
