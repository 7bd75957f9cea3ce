//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use cmsmigrate_assets::Downloader;
use cmsmigrate_core::pipeline::{MigrationResult, ProgressReporter, STAGES, format_error_list};
use cmsmigrate_shared::{AppConfig, PipelineConfig, init_config, load_config, load_config_from};
use cmsmigrate_validate::ValidationReport;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// cmsmigrate: move a markdown content tree into a headless CMS.
#[derive(Parser)]
#[command(
    name = "cmsmigrate",
    version,
    about = "Convert a frontmatter/markdown content tree into an NDJSON import file plus local assets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.cmsmigrate/cmsmigrate.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Source content directory (overrides config).
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Output directory (overrides config).
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the complete migration: process, download, export, validate.
    Run {
        /// Remove intermediate files after a successful run.
        #[arg(long)]
        cleanup: bool,
    },

    /// Convert source files into processed documents.
    Process,

    /// Download every remote asset referenced by the source files.
    Download,

    /// Write the NDJSON export from processed documents.
    Export,

    /// Validate the NDJSON export and asset manifest.
    Validate {
        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cmsmigrate=info",
        1 => "cmsmigrate=debug",
        _ => "cmsmigrate=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Config { ref action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&cli),
        },
        Command::Run { cleanup } => {
            let config = pipeline_config(&cli)?.with_cleanup(cleanup);
            cmd_run(&config).await
        }
        Command::Process => cmd_process(&pipeline_config(&cli)?),
        Command::Download => cmd_download(&pipeline_config(&cli)?).await,
        Command::Export => cmd_export(&pipeline_config(&cli)?),
        Command::Validate { json } => cmd_validate(&pipeline_config(&cli)?, json),
    }
}

/// Load the config file named by `--config`, or the default one.
fn app_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Resolve the runtime config: file settings, then command-line overrides.
fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from(&app_config(cli)?);
    if let Some(source) = &cli.source {
        config = config.with_source_dir(source);
    }
    if let Some(output) = &cli.output {
        config = config.with_output_dir(output);
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &PipelineConfig) -> Result<()> {
    info!(
        source = %config.source_dir.display(),
        output = %config.output_dir.display(),
        cleanup = config.cleanup,
        "running migration"
    );

    let reporter = CliProgress::new();
    let result = cmsmigrate_core::run_migration(config, &reporter).await;
    reporter.finish();
    let result = result?;

    println!();
    println!("  Migration completed successfully!");
    println!("  Content files: {}", result.content.processed_files.len());
    println!("  Documents:     {}", result.export.documents);
    println!("  Assets:        {}", result.assets.assets.len());
    println!("  Failed:        {}", result.assets.failed.len());
    println!("  Validation:    {}", result.validation.summary.validation.status);
    println!();
    println!("  Output files:");
    println!("    {}", result.export.output_file.display());
    println!("    {}", result.export.assets_file.display());
    println!("    {} (directory)", config.images_dir().display());
    println!("    {} (directory)", config.files_dir().display());
    println!();
    println!("  Time: {:.2}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_process(config: &PipelineConfig) -> Result<()> {
    let output = cmsmigrate_content::process_all_content(config)?;

    println!();
    println!("  Content processing completed");
    println!("  Files:     {}", output.processed_files.len());
    println!("  Documents: {}", output.documents.len());
    println!("  Output:    {}", config.processed_dir().display());
    println!();

    Ok(())
}

async fn cmd_download(config: &PipelineConfig) -> Result<()> {
    let downloader = Downloader::new(config.download.clone())?;
    let output = downloader.download_all(config).await?;

    println!();
    println!("  Asset download completed");
    println!("  Downloaded: {}", output.assets.len());
    println!("  Images:     {}", output.metadata.total_images);
    println!("  Files:      {}", output.metadata.total_files);
    println!("  Failed:     {}", output.failed.len());
    for url in &output.failed {
        println!("    • {url}");
    }
    println!("  Manifest:   {}", config.assets_file().display());
    println!();

    Ok(())
}

fn cmd_export(config: &PipelineConfig) -> Result<()> {
    let output = cmsmigrate_export::export_migration(config)?;

    println!();
    println!("  Migration export completed");
    println!("  Documents:   {}", output.documents);
    println!("  Assets:      {}", output.assets);
    println!("  Output file: {}", output.output_file.display());
    println!("  Assets file: {}", output.assets_file.display());
    println!();

    Ok(())
}

fn cmd_validate(config: &PipelineConfig, json: bool) -> Result<()> {
    let report = cmsmigrate_validate::validate_migration(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.success {
        Ok(())
    } else {
        Err(eyre!(
            "migration validation failed with {} errors",
            report.errors.len()
        ))
    }
}

fn print_report(report: &ValidationReport) {
    let summary = &report.summary;

    println!();
    println!("  Validation summary");
    println!("  Documents:   {}", summary.documents.total);
    for (doc_type, count) in &summary.documents.by_type {
        println!("    {doc_type}: {count}");
    }
    println!("  Assets:      {}", summary.assets.total);
    println!("  Asset files: {}", summary.assets.with_local_files);
    println!("  Status:      {}", summary.validation.status);

    if !report.errors.is_empty() {
        println!("  Errors:      {}", report.errors.len());
        for line in format_error_list(&report.errors, report.errors.len()) {
            println!("    {line}");
        }
    }
    println!();
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = app_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, index: usize, name: &str) {
        self.spinner
            .set_message(format!("[{index}/{}] {name}...", STAGES.len()));
    }

    fn item(&self, detail: &str) {
        self.spinner.println(format!("  ✓ {detail}"));
    }

    fn validated(&self, report: &ValidationReport) {
        if report.success {
            return;
        }
        let summary = &report.summary;
        self.spinner.println(format!(
            "  ✗ {} errors in {} documents and {} assets",
            report.errors.len(),
            summary.documents.total,
            summary.assets.total
        ));
        for line in format_error_list(&report.errors, report.errors.len()) {
            self.spinner.println(format!("    {line}"));
        }
    }

    fn done(&self, _result: &MigrationResult) {
        self.spinner.finish_and_clear();
    }
}
