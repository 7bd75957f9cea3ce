//! Bounded-concurrency asset downloader.
//!
//! Discovered URLs are queued once each and drained by a fixed pool of
//! workers. Results flow back over a channel and are restored to discovery
//! order before the manifest is written.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, instrument, warn};

use cmsmigrate_shared::{
    AssetKind, AssetRecord, DownloadConfig, DownloadManifest, DownloadMetadata, MigrateError,
    PipelineConfig, Result, now_iso,
};

use crate::discovery::{classify_asset, discover_assets, generate_asset_id, get_file_extension};

/// User-Agent string for download requests.
const USER_AGENT: &str = concat!("cmsmigrate/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// DownloadOutput
// ---------------------------------------------------------------------------

/// Summary of a completed download run.
#[derive(Debug, Clone, Default)]
pub struct DownloadOutput {
    /// Successful records, in discovery order.
    pub assets: Vec<AssetRecord>,
    /// URLs that could not be fetched.
    pub failed: Vec<String>,
    pub metadata: DownloadMetadata,
}

impl DownloadOutput {
    /// The `{images, files, metadata}` manifest for this run.
    pub fn manifest(&self) -> DownloadManifest {
        let (images, files): (Vec<_>, Vec<_>) = self
            .assets
            .iter()
            .cloned()
            .partition(|record| record.kind == AssetKind::Image);
        DownloadManifest {
            images,
            files,
            metadata: self.metadata.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Downloader
// ---------------------------------------------------------------------------

/// HTTP asset fetcher sharing one client across all workers.
#[derive(Clone)]
pub struct Downloader {
    config: DownloadConfig,
    client: Client,
}

impl Downloader {
    /// Create a downloader with the given settings.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.timeout)
            .build()
            .map_err(|e| MigrateError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Stream `url` into `dest`. One attempt; a partial file is removed on failure.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MigrateError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(MigrateError::Network(format!("{url}: HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| MigrateError::io(dest, e))?;

        let written = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| MigrateError::Network(format!("{url}: body read failed: {e}")))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| MigrateError::io(dest, e))?;
            }
            file.flush().await.map_err(|e| MigrateError::io(dest, e))
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = tokio::fs::remove_file(dest).await {
                debug!(path = %dest.display(), error = %remove_err, "could not remove partial file");
            }
            return Err(e);
        }

        Ok(dest.to_path_buf())
    }

    /// Materialize one asset under `target_dir`.
    ///
    /// An existing file is reported without a request. Failures are logged
    /// and yield `None`.
    pub async fn process_asset(
        &self,
        url: &str,
        kind: AssetKind,
        target_dir: &Path,
    ) -> Option<AssetRecord> {
        let id = generate_asset_id(url);
        let file_name = format!("{id}{}", get_file_extension(url));
        let path = target_dir.join(&file_name);
        let file_path = std::path::absolute(&path).unwrap_or_else(|_| path.clone());

        let mut record = AssetRecord {
            id,
            kind,
            original_url: url.to_string(),
            file_name,
            file_path: Some(file_path),
            size: None,
            downloaded_at: None,
        };

        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.is_file() {
                debug!(url, file = %record.file_name, "asset already exists");
                record.size = Some(meta.len());
                return Some(record);
            }
        }

        if let Err(e) = self.download_file(url, &path).await {
            warn!(url, error = %e, "failed to download asset");
            return None;
        }

        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                record.size = Some(meta.len());
                record.downloaded_at = Some(now_iso());
                debug!(url, file = %record.file_name, size = meta.len(), "downloaded asset");
                Some(record)
            }
            Err(e) => {
                warn!(url, error = %MigrateError::io(&path, e), "downloaded asset is unreadable");
                None
            }
        }
    }

    /// Discover every asset URL in the source tree, download each once and
    /// write the manifest.
    #[instrument(skip_all, fields(concurrency = self.config.concurrency))]
    pub async fn download_all(&self, config: &PipelineConfig) -> Result<DownloadOutput> {
        let images_dir = config.images_dir();
        let files_dir = config.files_dir();
        for dir in [&images_dir, &files_dir] {
            std::fs::create_dir_all(dir).map_err(|e| MigrateError::io(dir, e))?;
        }

        let discovered = discover_assets(config)?;
        let total = discovered.urls.len();

        let jobs: VecDeque<(usize, String, AssetKind)> = discovered
            .urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| {
                let kind = classify_asset(&url);
                (index, url, kind)
            })
            .collect();

        let workers = self.config.concurrency.clamp(1, total.max(1));
        info!(total, workers, "starting asset downloads");

        let queue = Arc::new(Mutex::new(jobs));
        let (tx, mut rx) = mpsc::channel(workers);
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let downloader = self.clone();
            let images_dir = images_dir.clone();
            let files_dir = files_dir.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = queue.lock().await.pop_front();
                    let Some((index, url, kind)) = job else {
                        break;
                    };
                    let dir = match kind {
                        AssetKind::Image => &images_dir,
                        AssetKind::File | AssetKind::Unknown => &files_dir,
                    };
                    let record = downloader.process_asset(&url, kind, dir).await;
                    if tx.send((index, url, record)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download worker failed");
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut output = DownloadOutput::default();
        for (_, url, record) in results {
            match record {
                Some(record) => output.assets.push(record),
                None => output.failed.push(url),
            }
        }

        let total_images = output
            .assets
            .iter()
            .filter(|r| r.kind == AssetKind::Image)
            .count();
        output.metadata = DownloadMetadata {
            total_assets: output.assets.len(),
            total_images,
            total_files: output.assets.len() - total_images,
            failed_downloads: output.failed.len(),
            processed_files: discovered.scanned_files,
            generated_at: now_iso(),
        };

        let assets_file = config.assets_file();
        let json = serde_json::to_string_pretty(&output.manifest())?;
        std::fs::write(&assets_file, json).map_err(|e| MigrateError::io(&assets_file, e))?;

        info!(
            downloaded = output.metadata.total_assets,
            failed = output.metadata.failed_downloads,
            manifest = %assets_file.display(),
            "asset download complete"
        );

        Ok(output)
    }
}
