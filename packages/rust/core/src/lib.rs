//! Migration orchestration for cmsmigrate.
//!
//! This crate runs the four stages (process, download, export, validate)
//! in order against one [`PipelineConfig`](cmsmigrate_shared::PipelineConfig)
//! and reports progress through [`pipeline::ProgressReporter`].

pub mod pipeline;

pub use pipeline::{
    MigrationResult, ProgressReporter, STAGES, SilentProgress, format_error_list, run_migration,
};
