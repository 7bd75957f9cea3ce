//! Export: processed documents + asset manifest → NDJSON interchange file.
//!
//! Canonical document ids are re-derived from `type.slug`, so references
//! written by the processor as raw slugs resolve to the right targets even
//! when the documents were processed independently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use cmsmigrate_shared::{
    AssetManifest, ImageAsset, MigrateError, PipelineConfig, ProcessedContent, Reference, Result,
    now_iso,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One record of the NDJSON interchange file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportedDocument(pub Map<String, Value>);

impl ExportedDocument {
    pub fn id(&self) -> Option<&str> {
        self.0.get("_id").and_then(Value::as_str)
    }

    pub fn document_type(&self) -> Option<&str> {
        self.0.get("_type").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Result of an export run.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Number of documents written.
    pub documents: usize,
    /// Number of manifest entries written.
    pub assets: usize,
    pub output_file: PathBuf,
    pub assets_file: PathBuf,
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Canonical exported id: `type.slug`.
pub fn document_id(document_type: &str, slug: &str) -> String {
    format!("{document_type}.{slug}")
}

fn image_value(asset_id: &str) -> serde_json::Result<Value> {
    serde_json::to_value(ImageAsset::new(asset_id))
}

fn reference_value(target: String) -> serde_json::Result<Value> {
    serde_json::to_value(Reference::to(target))
}

/// Build the interchange record for one processed document.
///
/// Returns `Ok(None)` (with a warning) unless type, slug and data are all
/// present. A single `image` missing from the manifest passes through
/// unchanged, while unresolved `gallery` entries are dropped.
pub fn convert_document(
    content: &ProcessedContent,
    manifest: &AssetManifest,
) -> Result<Option<ExportedDocument>> {
    let document_type = content.document_type.as_deref().filter(|t| !t.is_empty());
    let slug = content.slug.as_deref().filter(|s| !s.is_empty());

    let (Some(document_type), Some(slug), Some(data)) =
        (document_type, slug, content.data.as_ref())
    else {
        warn!(
            document_type = content.document_type.as_deref().unwrap_or(""),
            slug = content.slug.as_deref().unwrap_or(""),
            has_data = content.data.is_some(),
            "skipping document: missing required fields"
        );
        return Ok(None);
    };

    let now = now_iso();
    let mut doc = Map::new();
    doc.insert("_id".into(), Value::String(document_id(document_type, slug)));
    doc.insert("_type".into(), Value::String(document_type.to_string()));
    doc.insert("_createdAt".into(), Value::String(now.clone()));
    doc.insert("_updatedAt".into(), Value::String(now));
    doc.insert("_rev".into(), Value::String("1".into()));
    for (key, value) in data {
        doc.insert(key.clone(), value.clone());
    }

    if let Some(Value::String(url)) = data.get("image") {
        if let Some(record) = manifest.get(url) {
            doc.insert("image".into(), image_value(&record.id)?);
        }
    }

    if let Some(Value::Array(gallery)) = data.get("gallery") {
        let resolved = gallery
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|url| manifest.get(url))
            .map(|record| image_value(&record.id))
            .collect::<serde_json::Result<Vec<_>>>()?;
        doc.insert("gallery".into(), Value::Array(resolved));
    }

    for (key, target_type) in [("author", "person"), ("category", "category")] {
        if let Some(Value::String(target)) = data.get(key) {
            if !target.is_empty() {
                doc.insert(key.into(), reference_value(document_id(target_type, target))?);
            }
        }
    }

    Ok(Some(ExportedDocument(doc)))
}

/// One JSON document per line, no trailing newline.
pub fn generate_ndjson(documents: &[ExportedDocument]) -> Result<String> {
    let lines = documents
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read every `*.json` file in `dir`, sorted by name. A missing directory is
/// empty; unreadable or invalid files are skipped with a warning.
pub fn load_processed_content(dir: &Path) -> Result<Vec<ProcessedContent>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "processed directory not found");
            return Ok(Vec::new());
        }
        Err(e) => return Err(MigrateError::io(dir, e)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "json"))
        .collect();
    paths.sort();

    let mut content = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| MigrateError::io(&path, e))
            .and_then(|raw| serde_json::from_str::<ProcessedContent>(&raw).map_err(Into::into));
        match parsed {
            Ok(item) => content.push(item),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid or unreadable file"),
        }
    }

    Ok(content)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Convert all processed documents and write `data.ndjson` plus the flat
/// asset manifest.
#[instrument(skip_all, fields(output = %config.output_dir.display()))]
pub fn export_migration(config: &PipelineConfig) -> Result<ExportOutput> {
    info!("starting migration export");

    let content = load_processed_content(&config.processed_dir())?;
    info!(count = content.len(), "loaded processed content");

    let assets_file = config.assets_file();
    let manifest = AssetManifest::load(&assets_file)?.unwrap_or_default();
    info!(count = manifest.len(), "loaded asset metadata");

    let documents = content
        .iter()
        .filter_map(|item| convert_document(item, &manifest).transpose())
        .collect::<Result<Vec<_>>>()?;
    info!(count = documents.len(), "converted documents");

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| MigrateError::io(&config.output_dir, e))?;

    let output_file = config.data_file();
    let ndjson = generate_ndjson(&documents)?;
    std::fs::write(&output_file, ndjson).map_err(|e| MigrateError::io(&output_file, e))?;

    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(&assets_file, manifest_json).map_err(|e| MigrateError::io(&assets_file, e))?;

    let output = ExportOutput {
        documents: documents.len(),
        assets: manifest.len(),
        output_file,
        assets_file,
    };

    info!(
        documents = output.documents,
        assets = output.assets,
        output = %output.output_file.display(),
        "migration export complete"
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmsmigrate_shared::AssetRecord;
    use serde_json::json;
    use uuid::Uuid;

    fn content(value: Value) -> ProcessedContent {
        serde_json::from_value(value).expect("processed content")
    }

    fn manifest() -> AssetManifest {
        let mut manifest = AssetManifest::default();
        manifest.insert(AssetRecord {
            id: "image.abc123".into(),
            original_url: "https://example.com/image.jpg".into(),
            file_name: "image.jpg".into(),
            ..Default::default()
        });
        manifest
    }

    #[test]
    fn document_ids_join_type_and_slug() {
        assert_eq!(document_id("person", "john-doe"), "person.john-doe");
        assert_eq!(document_id("category", "insurance"), "category.insurance");
    }

    #[test]
    fn ndjson_lines_match_documents() {
        let docs = vec![
            ExportedDocument(json!({"_id": "1", "name": "John"}).as_object().cloned().expect("obj")),
            ExportedDocument(json!({"_id": "2", "name": "Jane"}).as_object().cloned().expect("obj")),
        ];
        let ndjson = generate_ndjson(&docs).expect("ndjson");
        let lines: Vec<&str> = ndjson.split('\n').collect();
        assert_eq!(lines.len(), 2);
        let first: Value = serde_json::from_str(lines[0]).expect("line 1");
        assert_eq!(first, json!({"_id": "1", "name": "John"}));

        assert_eq!(generate_ndjson(&[]).expect("empty"), "");
    }

    #[test]
    fn plain_documents_keep_their_data() {
        let doc = convert_document(
            &content(json!({"type": "page", "slug": "about", "data": {"title": "About", "heading": "Us"}})),
            &AssetManifest::default(),
        )
        .expect("convert")
        .expect("converted");

        assert_eq!(doc.id(), Some("page.about"));
        assert_eq!(doc.document_type(), Some("page"));
        assert_eq!(doc.get("_rev"), Some(&json!("1")));
        assert_eq!(doc.get("title"), Some(&json!("About")));
        assert_eq!(doc.get("heading"), Some(&json!("Us")));
        assert_eq!(doc.get("_createdAt"), doc.get("_updatedAt"));
        assert_eq!(doc.0.len(), 7);
    }

    #[test]
    fn data_overrides_system_fields() {
        let doc = convert_document(
            &content(json!({"type": "post", "slug": "a", "data": {"_rev": "7"}})),
            &AssetManifest::default(),
        )
        .expect("convert")
        .expect("converted");
        assert_eq!(doc.get("_rev"), Some(&json!("7")));
    }

    #[test]
    fn missing_required_fields_are_skipped() {
        let manifest = AssetManifest::default();
        assert!(convert_document(&content(json!({"slug": "a", "data": {}})), &manifest).expect("convert").is_none());
        assert!(convert_document(&content(json!({"type": "post", "data": {}})), &manifest).expect("convert").is_none());
        assert!(convert_document(&content(json!({"type": "post", "slug": "a"})), &manifest).expect("convert").is_none());
        assert!(convert_document(&content(json!({"type": "post", "slug": "", "data": {}})), &manifest).expect("convert").is_none());
    }

    #[test]
    fn image_resolves_or_passes_through() {
        let manifest = manifest();
        let resolved = convert_document(
            &content(json!({"type": "post", "slug": "a", "data": {"image": "https://example.com/image.jpg"}})),
            &manifest,
        )
        .expect("convert")
        .expect("converted");
        assert_eq!(
            resolved.get("image"),
            Some(&json!({"_type": "image", "asset": {"_type": "reference", "_ref": "image.abc123"}}))
        );

        let unresolved = convert_document(
            &content(json!({"type": "post", "slug": "b", "data": {"image": "https://example.com/other.jpg"}})),
            &manifest,
        )
        .expect("convert")
        .expect("converted");
        assert_eq!(unresolved.get("image"), Some(&json!("https://example.com/other.jpg")));
    }

    #[test]
    fn gallery_drops_unknown_entries() {
        let doc = convert_document(
            &content(json!({"type": "post", "slug": "a", "data": {"gallery": [
                "https://example.com/image.jpg",
                "https://example.com/unknown.jpg"
            ]}})),
            &manifest(),
        )
        .expect("convert")
        .expect("converted");

        let gallery = doc.get("gallery").and_then(Value::as_array).expect("gallery");
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0]["asset"]["_ref"], "image.abc123");
    }

    #[test]
    fn built_values_match_the_interchange_shapes() {
        assert_eq!(
            image_value("image.abc123").expect("image"),
            json!({"_type": "image", "asset": {"_type": "reference", "_ref": "image.abc123"}})
        );
        assert_eq!(
            reference_value("person.jane".into()).expect("reference"),
            json!({"_type": "reference", "_ref": "person.jane"})
        );
    }

    #[test]
    fn author_and_category_become_references() {
        let doc = convert_document(
            &content(json!({"type": "post", "slug": "a", "data": {"author": "john-doe", "category": "insurance"}})),
            &AssetManifest::default(),
        )
        .expect("convert")
        .expect("converted");

        assert_eq!(doc.get("author"), Some(&json!({"_type": "reference", "_ref": "person.john-doe"})));
        assert_eq!(doc.get("category"), Some(&json!({"_type": "reference", "_ref": "category.insurance"})));
    }

    #[test]
    fn export_reads_json_files_and_either_manifest_shape() {
        let root = std::env::temp_dir().join(format!("cmsmigrate-export-{}", Uuid::now_v7()));
        let config = PipelineConfig::new(root.join("content"), &root);
        let processed = config.processed_dir();
        std::fs::create_dir_all(&processed).expect("mkdir");

        std::fs::write(
            processed.join("b.json"),
            json!({"type": "post", "slug": "hello", "data": {"title": "Hello", "image": "https://example.com/image.jpg"}}).to_string(),
        )
        .expect("write");
        std::fs::write(
            processed.join("a.json"),
            json!({"type": "person", "slug": "jo", "data": {"name": "Jo"}}).to_string(),
        )
        .expect("write");
        std::fs::write(processed.join("broken.json"), "{ not json").expect("write");
        std::fs::write(processed.join("documents.ndjson"), "ignored").expect("write");
        std::fs::write(
            config.assets_file(),
            json!({
                "images": [{"_id": "image.abc123", "_type": "image", "originalUrl": "https://example.com/image.jpg", "fileName": "abc.jpg"}],
                "files": [],
                "metadata": {"totalAssets": 1}
            })
            .to_string(),
        )
        .expect("write");

        let output = export_migration(&config).expect("export");
        assert_eq!(output.documents, 2);
        assert_eq!(output.assets, 1);

        let ndjson = std::fs::read_to_string(&output.output_file).expect("ndjson");
        let docs: Vec<Value> = ndjson
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(docs[0]["_id"], "person.jo");
        assert_eq!(docs[1]["image"]["asset"]["_ref"], "image.abc123");

        let flat = AssetManifest::load(&config.assets_file())
            .expect("load")
            .expect("present");
        assert!(flat.get("https://example.com/image.jpg").is_some());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn export_without_inputs_writes_empty_files() {
        let root = std::env::temp_dir().join(format!("cmsmigrate-export-empty-{}", Uuid::now_v7()));
        let config = PipelineConfig::new(root.join("content"), &root);

        let output = export_migration(&config).expect("export");
        assert_eq!(output.documents, 0);
        assert_eq!(std::fs::read_to_string(&output.output_file).expect("read"), "");
        assert_eq!(std::fs::read_to_string(&output.assets_file).expect("read"), "{}");

        let _ = std::fs::remove_dir_all(&root);
    }
}
