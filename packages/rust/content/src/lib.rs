//! Content processing: source files → normalized documents.
//!
//! Walks the configured content directories, parses each file's frontmatter
//! and body, and writes one intermediate JSON file per document for the
//! exporter to pick up.

mod blocks;
mod frontmatter;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use cmsmigrate_shared::{
    DocumentType, ImageRef, MigrateError, PipelineConfig, ProcessedContent, Result, Slug,
    iso_timestamp, now_iso,
};

pub use blocks::body_to_blocks;
pub use frontmatter::{Frontmatter, ParsedSource, parse_frontmatter};

/// File name of the NDJSON copy of the processed set, next to the per-document files.
pub const PROCESSED_NDJSON: &str = "documents.ndjson";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One processed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDocument {
    /// `type.<hash8>`, stable for identical content.
    pub id: String,
    pub document_type: DocumentType,
    pub title: String,
    /// Canonical slug; also the suffix of the exported `_id`.
    pub slug: String,
    pub source_path: PathBuf,
    /// Document fields as they will appear in the export.
    pub data: Map<String, Value>,
}

impl NormalizedDocument {
    /// The intermediate file representation.
    pub fn to_processed(&self) -> ProcessedContent {
        ProcessedContent {
            id: Some(self.id.clone()),
            document_type: Some(self.document_type.to_string()),
            slug: Some(self.slug.clone()),
            source_path: Some(self.source_path.display().to_string()),
            data: Some(self.data.clone()),
        }
    }
}

/// Result of a full processing run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Successfully processed documents, in discovery order.
    pub documents: Vec<NormalizedDocument>,
    /// Every content file found, including ones that failed to process.
    pub processed_files: Vec<PathBuf>,
}

// ---------------------------------------------------------------------------
// Identifiers and field helpers
// ---------------------------------------------------------------------------

/// `type.` followed by the first 8 hex chars of the content's SHA-1.
pub fn generate_document_id(content: &str, document_type: DocumentType) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("{document_type}.{}", &hex[..8])
}

/// Lower-case ASCII slug: alphanumerics kept, every other run becomes `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Rewrite RFC 3339 and `YYYY-MM-DD` dates into canonical ISO form.
/// Anything else is returned unchanged.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return iso_timestamp(dt.with_timezone(&Utc));
    }

    if let Some(dt) = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return iso_timestamp(dt.and_utc());
    }

    value.to_string()
}

/// Classify an image path or URL.
///
/// Relative paths resolve by file name only against `images_dir`.
pub fn resolve_image_reference(value: &str, images_dir: &Path) -> Option<ImageRef> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        return Some(ImageRef::Remote(value.to_string()));
    }

    let path = Path::new(value);
    if path.is_absolute() {
        return Some(ImageRef::LocalFile(path.to_path_buf()));
    }

    let file_name = path.file_name()?;
    Some(ImageRef::LocalFile(images_dir.join(file_name)))
}

// ---------------------------------------------------------------------------
// Per-file processing
// ---------------------------------------------------------------------------

/// Process one source file. Failures are logged and yield `None`.
pub fn process_source_file(
    path: &Path,
    document_type: DocumentType,
    config: &PipelineConfig,
) -> Option<NormalizedDocument> {
    match try_process(path, document_type, config) {
        Ok(doc) => {
            debug!(path = %path.display(), id = %doc.id, "processed content file");
            Some(doc)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to process content file");
            None
        }
    }
}

fn try_process(
    path: &Path,
    document_type: DocumentType,
    config: &PipelineConfig,
) -> Result<NormalizedDocument> {
    let raw = std::fs::read_to_string(path).map_err(|e| MigrateError::io(path, e))?;
    let ParsedSource { frontmatter, body } = parse_frontmatter(&raw);

    let id = generate_document_id(&raw, document_type);
    let images_dir = std::path::absolute(config.images_dir()).unwrap_or_else(|_| config.images_dir());

    let field = |key: &str| {
        frontmatter
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    };

    let title = field("title")
        .or_else(|| field("name"))
        .unwrap_or("Untitled")
        .to_string();
    let slug = resolve_slug(
        field("slug"),
        field("path"),
        path,
        id.split_once('.').map_or(id.as_str(), |(_, hash)| hash),
    );

    let mut data = Map::new();
    data.insert("title".into(), Value::String(title.clone()));
    data.insert(
        "slug".into(),
        serde_json::to_value(Slug {
            current: slug.clone(),
        })?,
    );

    let image = |key: &str| -> Result<Option<Value>> {
        field(key)
            .and_then(|v| resolve_image_reference(v, &images_dir))
            .map(|r| serde_json::to_value(r).map_err(MigrateError::from))
            .transpose()
    };
    let blocks = || serde_json::to_value(body_to_blocks(&body));

    match document_type {
        DocumentType::Post => {
            let published_at = field("date")
                .or_else(|| field("publishedAt"))
                .map(normalize_date)
                .unwrap_or_else(now_iso);
            data.insert("publishedAt".into(), Value::String(published_at));
            data.insert(
                "excerpt".into(),
                Value::String(
                    field("excerpt")
                        .or_else(|| field("description"))
                        .unwrap_or_default()
                        .to_string(),
                ),
            );
            data.insert("body".into(), blocks()?);
            for key in ["author", "category"] {
                let target = field(key).map(slugify).filter(|s| !s.is_empty());
                if let Some(target) = target {
                    data.insert(key.into(), Value::String(target));
                }
            }
            if let Some(image) = image("image")? {
                data.insert("image".into(), image);
            }
            let gallery: Vec<Value> = field("gallery")
                .into_iter()
                .flat_map(|v| v.split(','))
                .filter_map(|entry| resolve_image_reference(entry, &images_dir))
                .map(serde_json::to_value)
                .collect::<serde_json::Result<_>>()?;
            if !gallery.is_empty() {
                data.insert("gallery".into(), Value::Array(gallery));
            }
        }
        DocumentType::Person => {
            let name = field("name")
                .or_else(|| field("title"))
                .unwrap_or("Unknown");
            data.insert("name".into(), Value::String(name.to_string()));
            data.insert(
                "title".into(),
                Value::String(
                    field("jobTitle")
                        .or_else(|| field("position"))
                        .unwrap_or_default()
                        .to_string(),
                ),
            );
            for key in ["position", "email", "phone"] {
                if let Some(v) = field(key) {
                    data.insert(key.into(), Value::String(v.to_string()));
                }
            }
            data.insert("bio".into(), blocks()?);
            if let Some(image) = image("image")? {
                data.insert("image".into(), image);
            }
        }
        DocumentType::Page => {
            data.insert(
                "heading".into(),
                Value::String(
                    field("heading")
                        .or_else(|| field("title"))
                        .unwrap_or_default()
                        .to_string(),
                ),
            );
            data.insert("description".into(), blocks()?);
            if let Some(cover) = image("coverImage")? {
                data.insert("coverImage".into(), cover);
            }
        }
        DocumentType::Category => {
            data.insert(
                "description".into(),
                Value::String(field("description").unwrap_or_default().to_string()),
            );
        }
        DocumentType::Home | DocumentType::Settings => {
            data.insert("body".into(), blocks()?);
        }
    }

    Ok(NormalizedDocument {
        id,
        document_type,
        title,
        slug,
        source_path: path.to_path_buf(),
        data,
    })
}

/// Slug precedence: `slug`, last segment of `path`, file stem, content hash.
fn resolve_slug(slug: Option<&str>, route: Option<&str>, file: &Path, hash: &str) -> String {
    let route_tail = route.and_then(|r| r.split('/').rev().find(|s| !s.trim().is_empty()));
    let stem = file.file_stem().and_then(|s| s.to_str());

    [slug, route_tail, stem]
        .into_iter()
        .flatten()
        .map(slugify)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| hash.to_string())
}

// ---------------------------------------------------------------------------
// Batch processing
// ---------------------------------------------------------------------------

/// Process every content file under the configured directories and write
/// the intermediate files.
#[instrument(skip_all, fields(source = %config.source_dir.display()))]
pub fn process_all_content(config: &PipelineConfig) -> Result<ProcessOutput> {
    let processed_dir = config.processed_dir();
    let images_dir = config.images_dir();
    for dir in [&processed_dir, &images_dir] {
        std::fs::create_dir_all(dir).map_err(|e| MigrateError::io(dir, e))?;
    }
    clear_processed(&processed_dir)?;

    info!("starting content processing");

    let mut output = ProcessOutput::default();

    for mapping in &config.content_types {
        let dir = config.source_dir.join(&mapping.directory);
        if !dir.is_dir() {
            info!(dir = %dir.display(), "content directory not found, skipping");
            continue;
        }

        let mut count = 0usize;
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

            output.processed_files.push(entry.path().to_path_buf());
            if let Some(doc) = process_source_file(entry.path(), mapping.document_type, config) {
                output.documents.push(doc);
                count += 1;
            }
        }

        info!(
            directory = %mapping.directory,
            document_type = %mapping.document_type,
            count,
            "processed content directory"
        );
    }

    disambiguate_slugs(&mut output.documents)?;
    write_processed(&processed_dir, &output.documents)?;

    info!(
        documents = output.documents.len(),
        files = output.processed_files.len(),
        "content processing complete"
    );

    Ok(output)
}

/// Remove per-document files left by an earlier run.
fn clear_processed(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| MigrateError::io(dir, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json") {
            std::fs::remove_file(&path).map_err(|e| MigrateError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Make every `(type, slug)` pair unique, first file wins.
///
/// A later duplicate takes the content hash as its slug, with a numeric
/// suffix when identical content already claimed that too.
fn disambiguate_slugs(documents: &mut [NormalizedDocument]) -> Result<()> {
    let mut taken: HashSet<(DocumentType, String)> = HashSet::new();

    for doc in documents.iter_mut() {
        if taken.insert((doc.document_type, doc.slug.clone())) {
            continue;
        }

        let hash = doc
            .id
            .split_once('.')
            .map_or(doc.id.as_str(), |(_, hash)| hash)
            .to_string();
        let mut candidate = hash.clone();
        let mut n = 2;
        while !taken.insert((doc.document_type, candidate.clone())) {
            candidate = format!("{hash}-{n}");
            n += 1;
        }

        warn!(
            path = %doc.source_path.display(),
            slug = %doc.slug,
            replacement = %candidate,
            "duplicate slug for document type, using replacement"
        );
        doc.slug = candidate;
        doc.data.insert(
            "slug".into(),
            serde_json::to_value(Slug {
                current: doc.slug.clone(),
            })?,
        );
    }

    Ok(())
}

/// Per-document files are named `type.slug.json`, unique after
/// [`disambiguate_slugs`].
fn write_processed(dir: &Path, documents: &[NormalizedDocument]) -> Result<()> {
    let mut lines = Vec::with_capacity(documents.len());

    for doc in documents {
        let processed = doc.to_processed();
        let path = dir.join(format!("{}.{}.json", doc.document_type, doc.slug));
        let json = serde_json::to_string_pretty(&processed)?;
        std::fs::write(&path, json).map_err(|e| MigrateError::io(&path, e))?;
        lines.push(serde_json::to_string(&processed)?);
    }

    let ndjson_path = dir.join(PROCESSED_NDJSON);
    std::fs::write(&ndjson_path, lines.join("\n"))
        .map_err(|e| MigrateError::io(&ndjson_path, e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("cmsmigrate-content-{label}-{}", Uuid::now_v7()))
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn document_id_is_type_prefixed_hash() {
        let id = generate_document_id("hello", DocumentType::Post);
        // sha1("hello") = aaf4c61d...
        assert_eq!(id, "post.aaf4c61d");
        assert_eq!(id, generate_document_id("hello", DocumentType::Post));
        assert_ne!(id, generate_document_id("hello!", DocumentType::Post));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("John Doe"), "john-doe");
        assert_eq!(slugify("  Café & Bar -- 2024 "), "caf-bar-2024");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn dates_are_normalized_when_parseable() {
        assert_eq!(normalize_date("2024-01-01"), "2024-01-01T00:00:00.000Z");
        assert_eq!(
            normalize_date("2024-01-01T10:00:00+01:00"),
            "2024-01-01T09:00:00.000Z"
        );
        assert_eq!(normalize_date("January 2024"), "January 2024");
    }

    #[test]
    fn image_references_by_kind() {
        let images = Path::new("/out/images");
        assert_eq!(resolve_image_reference("", images), None);
        assert_eq!(
            resolve_image_reference("https://cdn.test/a.png", images),
            Some(ImageRef::Remote("https://cdn.test/a.png".into()))
        );
        assert_eq!(
            resolve_image_reference("/abs/b.png", images),
            Some(ImageRef::LocalFile(PathBuf::from("/abs/b.png")))
        );
        assert_eq!(
            resolve_image_reference("../assets/team/c.jpg", images),
            Some(ImageRef::LocalFile(PathBuf::from("/out/images/c.jpg")))
        );
    }

    #[test]
    fn post_fields_are_mapped() {
        let root = scratch("post");
        let file = root.join("blog").join("first-post.mdx");
        write(
            &file,
            "---\ntitle: First Post\ndate: 2024-01-01\nauthor: John Doe\ndescription: Short\nimage: https://cdn.test/hero.png\n---\n# Hello\nBody text.",
        );
        let config = PipelineConfig::new(&root, root.join("out"));

        let doc = process_source_file(&file, DocumentType::Post, &config).expect("processed");
        assert!(doc.id.starts_with("post."));
        assert_eq!(doc.slug, "first-post");
        assert_eq!(doc.data["title"], "First Post");
        assert_eq!(doc.data["slug"]["current"], "first-post");
        assert_eq!(doc.data["publishedAt"], "2024-01-01T00:00:00.000Z");
        assert_eq!(doc.data["excerpt"], "Short");
        assert_eq!(doc.data["author"], "john-doe");
        assert_eq!(doc.data["image"], "https://cdn.test/hero.png");
        assert_eq!(doc.data["body"].as_array().map(Vec::len), Some(2));
        assert!(doc.data.get("category").is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn person_title_comes_from_job_title() {
        let root = scratch("person");
        let file = root.join("staff").join("jane.mdx");
        write(
            &file,
            "---\nname: Jane Roe\nslug: jane-roe\njobTitle: Director\nimage: jane.png\n---\nBio line.",
        );
        let config = PipelineConfig::new(&root, root.join("out"));

        let doc = process_source_file(&file, DocumentType::Person, &config).expect("processed");
        assert_eq!(doc.slug, "jane-roe");
        assert_eq!(doc.data["name"], "Jane Roe");
        assert_eq!(doc.data["title"], "Director");
        assert_eq!(doc.data["image"]["_type"], "image");
        let asset = doc.data["image"]["_sanityAsset"].as_str().expect("asset");
        assert!(asset.starts_with("image@file://"));
        assert!(asset.ends_with("images/jane.png"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn unreadable_file_yields_none() {
        let config = PipelineConfig::new("/nonexistent", "/nonexistent/out");
        let missing = Path::new("/nonexistent/blog/missing.mdx");
        assert!(process_source_file(missing, DocumentType::Post, &config).is_none());
    }

    #[test]
    fn same_stem_in_nested_directories_gets_distinct_slugs() {
        let root = scratch("index");
        let source = root.join("content");
        write(&source.join("blog/2023/index.mdx"), "---\ntitle: Old\n---\nOld post");
        write(&source.join("blog/2024/index.mdx"), "---\ntitle: New\n---\nNew post");
        let config = PipelineConfig::new(&source, root.join("out"));

        let output = process_all_content(&config).expect("process");
        let slugs: Vec<&str> = output.documents.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs.len(), 2);
        assert_eq!(slugs[0], "index");
        let second = &output.documents[1];
        assert_eq!(Some(second.slug.as_str()), second.id.split_once('.').map(|(_, h)| h));
        assert_eq!(second.data["slug"]["current"], second.slug.as_str());

        let json_files = std::fs::read_dir(config.processed_dir())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .count();
        assert_eq!(json_files, 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn identical_files_in_several_post_directories_are_all_kept() {
        let root = scratch("twins");
        let source = root.join("content");
        let body = "---\ntitle: Same\n---\nSame body";
        write(&source.join("blog/same.mdx"), body);
        write(&source.join("webinars/same.mdx"), body);
        write(&source.join("media/same.mdx"), body);
        let config = PipelineConfig::new(&source, root.join("out"));

        let output = process_all_content(&config).expect("process");
        assert_eq!(output.documents.len(), 3);
        assert_eq!(output.documents[0].id, output.documents[1].id);
        let hash = output.documents[0].id.split_once('.').map(|(_, h)| h).expect("hash");
        assert_eq!(output.documents[0].slug, "same");
        assert_eq!(output.documents[1].slug, hash);
        assert_eq!(output.documents[2].slug, format!("{hash}-2"));

        let json_files = std::fs::read_dir(config.processed_dir())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .count();
        assert_eq!(json_files, 3);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn process_all_writes_intermediate_files() {
        let root = scratch("all");
        let source = root.join("content");
        write(&source.join("blog/a.mdx"), "---\ntitle: A\n---\nOne");
        write(&source.join("blog/nested/b.mdx"), "---\ntitle: B\n---\nTwo");
        write(&source.join("blog/notes.txt"), "ignored");
        write(&source.join("pages/about.mdx"), "---\ntitle: About\n---\nUs");
        let config = PipelineConfig::new(&source, root.join("out"));

        let output = process_all_content(&config).expect("process");
        assert_eq!(output.documents.len(), 3);
        assert_eq!(output.processed_files.len(), 3);

        let json_files = std::fs::read_dir(config.processed_dir())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .count();
        assert_eq!(json_files, 3);

        let ndjson = std::fs::read_to_string(config.processed_dir().join(PROCESSED_NDJSON))
            .expect("ndjson");
        assert_eq!(ndjson.lines().count(), 3);
        assert!(config.images_dir().is_dir());

        let _ = std::fs::remove_dir_all(&root);
    }
}
