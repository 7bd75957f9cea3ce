//! End-to-end migration: source tree → processed docs → assets → NDJSON → report.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use cmsmigrate_assets::{DownloadOutput, Downloader};
use cmsmigrate_content::{ProcessOutput, process_all_content};
use cmsmigrate_export::{ExportOutput, export_migration};
use cmsmigrate_shared::{MigrateError, PipelineConfig, Result};
use cmsmigrate_validate::{ValidationReport, validate_migration};

/// Stage names in execution order.
pub const STAGES: [&str; 4] = [
    "Processing content",
    "Downloading assets",
    "Exporting migration data",
    "Validating migration data",
];

/// Maximum number of validation errors listed in a failure message.
const ERROR_LIST_LIMIT: usize = 5;

/// Outputs of every stage of a completed migration.
#[derive(Debug)]
pub struct MigrationResult {
    pub content: ProcessOutput,
    pub assets: DownloadOutput,
    pub export: ExportOutput,
    pub validation: ValidationReport,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering stage `index` (1-based) of [`STAGES`].
    fn stage(&self, index: usize, name: &str);
    /// Called with a one-line outcome of the current stage.
    fn item(&self, detail: &str);
    /// Called with the validation report, whether or not it passed, before
    /// `run_migration` returns.
    fn validated(&self, report: &ValidationReport);
    /// Called when the migration completes successfully.
    fn done(&self, result: &MigrationResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _index: usize, _name: &str) {}
    fn item(&self, _detail: &str) {}
    fn validated(&self, _report: &ValidationReport) {}
    fn done(&self, _result: &MigrationResult) {}
}

/// The first `limit` errors as bullet lines, then a count of the rest.
pub fn format_error_list(errors: &[String], limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = errors.iter().take(limit).map(|e| format!("• {e}")).collect();
    if errors.len() > limit {
        lines.push(format!("... and {} more errors", errors.len() - limit));
    }
    lines
}

/// Run all four stages.
///
/// A failed validation is an error; its message carries the capped error
/// list and the full report goes to [`ProgressReporter::validated`]. Cleanup
/// of the processed directory runs only after a successful validation and
/// never fails the run.
#[instrument(skip_all, fields(source = %config.source_dir.display(), output = %config.output_dir.display()))]
pub async fn run_migration(
    config: &PipelineConfig,
    progress: &dyn ProgressReporter,
) -> Result<MigrationResult> {
    let start = Instant::now();
    info!("starting complete migration workflow");

    if !config.source_dir.is_dir() {
        return Err(MigrateError::config(format!(
            "source directory not found: {}",
            config.source_dir.display()
        )));
    }

    // --- Stage 1: Process ---
    progress.stage(1, STAGES[0]);
    let content = process_all_content(config)?;
    progress.item(&format!(
        "processed {} files, generated {} documents",
        content.processed_files.len(),
        content.documents.len()
    ));

    // --- Stage 2: Download ---
    progress.stage(2, STAGES[1]);
    let downloader = Downloader::new(config.download.clone())?;
    let assets = downloader.download_all(config).await?;
    progress.item(&format!(
        "downloaded {} assets, {} failed",
        assets.assets.len(),
        assets.failed.len()
    ));

    // --- Stage 3: Export ---
    progress.stage(3, STAGES[2]);
    let export = export_migration(config)?;
    progress.item(&format!(
        "exported {} documents and {} assets",
        export.documents, export.assets
    ));

    // --- Stage 4: Validate ---
    progress.stage(4, STAGES[3]);
    let validation = validate_migration(config)?;
    progress.item(&format!("validation {}", validation.summary.validation.status));
    progress.validated(&validation);

    if !validation.success {
        let mut message = format!(
            "migration validation failed with {} errors",
            validation.errors.len()
        );
        for line in format_error_list(&validation.errors, ERROR_LIST_LIMIT) {
            message.push_str("\n  ");
            message.push_str(&line);
        }
        return Err(MigrateError::validation(message));
    }

    if config.cleanup {
        cleanup(&config.processed_dir());
    }

    let result = MigrationResult {
        content,
        assets,
        export,
        validation,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        documents = result.export.documents,
        assets = result.assets.assets.len(),
        elapsed_ms = result.elapsed.as_millis(),
        "migration complete"
    );

    Ok(result)
}

/// Remove intermediate files. Failure is logged, not propagated.
fn cleanup(processed_dir: &Path) {
    match std::fs::remove_dir_all(processed_dir) {
        Ok(()) => info!(dir = %processed_dir.display(), "removed intermediate files"),
        Err(e) => {
            let e = MigrateError::io(processed_dir, e);
            warn!(error = %e, "cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn workspace(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cmsmigrate-core-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn write(path: PathBuf, content: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        std::fs::write(path, content).expect("write source file");
    }

    #[derive(Default)]
    struct RecordingProgress {
        stages: Mutex<Vec<String>>,
        report: Mutex<Option<ValidationReport>>,
        done: Mutex<bool>,
    }

    impl ProgressReporter for RecordingProgress {
        fn stage(&self, index: usize, name: &str) {
            self.stages.lock().expect("lock").push(format!("{index}:{name}"));
        }
        fn item(&self, _detail: &str) {}
        fn validated(&self, report: &ValidationReport) {
            *self.report.lock().expect("lock") = Some(report.clone());
        }
        fn done(&self, _result: &MigrationResult) {
            *self.done.lock().expect("lock") = true;
        }
    }

    #[test]
    fn error_list_is_capped() {
        let errors: Vec<String> = (1..=7).map(|i| format!("error {i}")).collect();
        let lines = format_error_list(&errors, 5);
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "• error 1");
        assert_eq!(lines[5], "... and 2 more errors");

        let short = format_error_list(&errors[..2], 5);
        assert_eq!(short, vec!["• error 1", "• error 2"]);
    }

    #[tokio::test]
    async fn missing_source_directory_is_fatal() {
        let root = workspace("nosource");
        let config = PipelineConfig::new(root.join("missing"), root.join("out"));
        let err = run_migration(&config, &SilentProgress).await.unwrap_err();
        assert!(err.to_string().contains("source directory not found"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn full_migration_resolves_cross_references() {
        let root = workspace("e2e");
        let source = root.join("content");
        write(
            source.join("blog").join("hello.mdx"),
            "---\ntitle: Hello World\ndate: 2024-01-15\nauthor: Jane Doe\n---\n# Welcome\nFirst post.\n",
        );
        write(
            source.join("staff").join("jane-doe.mdx"),
            "---\nname: Jane Doe\nposition: Editor\n---\nWrites things.\n",
        );

        let config = PipelineConfig::new(&source, root.join("out")).with_cleanup(true);
        let progress = RecordingProgress::default();
        let result = run_migration(&config, &progress).await.expect("migration");

        assert!(result.validation.success, "errors: {:?}", result.validation.errors);
        assert_eq!(result.validation.summary.documents.total, 2);
        assert_eq!(result.export.documents, 2);
        assert!(result.assets.assets.is_empty());
        assert!(config.data_file().exists());
        assert!(!config.processed_dir().exists());

        let stages = progress.stages.lock().expect("lock").clone();
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[3], "4:Validating migration data");
        assert!(*progress.done.lock().expect("lock"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn nested_index_files_export_unique_ids() {
        let root = workspace("index");
        let source = root.join("content");
        write(
            source.join("blog").join("2023").join("index.mdx"),
            "---\ntitle: Old\ndate: 2023-05-01\n---\nOld news.\n",
        );
        write(
            source.join("blog").join("2024").join("index.mdx"),
            "---\ntitle: New\ndate: 2024-05-01\n---\nNew news.\n",
        );

        let config = PipelineConfig::new(&source, root.join("out"));
        let result = run_migration(&config, &SilentProgress).await.expect("migration");
        assert!(result.validation.success, "errors: {:?}", result.validation.errors);
        assert_eq!(result.export.documents, 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn dangling_reference_fails_the_run() {
        let root = workspace("dangling");
        let source = root.join("content");
        write(
            source.join("blog").join("orphan.mdx"),
            "---\ntitle: Orphan\ndate: 2024-01-15\nauthor: Nobody Here\n---\nBody.\n",
        );

        let config = PipelineConfig::new(&source, root.join("out")).with_cleanup(true);
        let progress = RecordingProgress::default();
        let err = run_migration(&config, &progress).await.unwrap_err();
        assert!(matches!(err, MigrateError::Validation { .. }));
        assert!(err.to_string().contains("person.nobody-here"));
        assert!(config.processed_dir().exists());
        assert!(!*progress.done.lock().expect("lock"));

        let report = progress.report.lock().expect("lock").clone().expect("report");
        assert!(!report.success);
        assert_eq!(report.summary.documents.total, 1);
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.ends_with("Reference to non-existent document: person.nobody-here"))
        );

        let _ = std::fs::remove_dir_all(&root);
    }
}
