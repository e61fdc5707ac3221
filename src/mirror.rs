//! Top-level mirror run: fetch catalog metadata, then download everything that changed.

use crate::cache::CacheStore;
use crate::catalog::{HttpCatalog, MetadataSource, PageSource};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::ArtifactFetcher;
use crate::pipeline::ArchivePipeline;
use crate::progress::ProgressSink;
use crate::scheduler::Scheduler;
use crate::types::{Event, ItemDescriptor, RunReport};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// One configured mirror (cloneable; the HTTP client and progress sink are shared)
#[derive(Clone)]
pub struct Mirror {
    config: Arc<Config>,
    client: reqwest::Client,
    progress: ProgressSink,
}

impl Mirror {
    /// Validate `config` and build the shared HTTP client
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(config.download.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config: Arc::new(config),
            client,
            progress: ProgressSink::default(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.progress.subscribe()
    }

    /// Create the archive, output and cache directories
    pub async fn prepare_directories(&self) -> Result<()> {
        let storage = &self.config.storage;
        let mut dirs = vec![storage.archive_path(), storage.output_path()];
        if let Some(parent) = storage.cache_path().parent() {
            dirs.push(parent.to_path_buf());
        }

        for dir in dirs {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }
        Ok(())
    }

    /// Page through the configured catalog
    pub async fn fetch_metadata(&self) -> Result<Vec<ItemDescriptor>> {
        let catalog = HttpCatalog::new(self.client.clone(), &self.config.catalog)?;
        self.fetch_metadata_from(Arc::new(catalog)).await
    }

    /// Page through an arbitrary catalog source using the configured bounds
    pub async fn fetch_metadata_from(
        &self,
        source: Arc<dyn PageSource>,
    ) -> Result<Vec<ItemDescriptor>> {
        let catalog = &self.config.catalog;
        MetadataSource::new(source, self.progress.clone(), catalog.extra_pages)
            .fetch(catalog.target_count, catalog.page_size)
            .await
    }

    /// Run the download pool over `items`; directories must already exist
    pub async fn download(&self, items: Vec<ItemDescriptor>) -> RunReport {
        let storage = &self.config.storage;
        let cache = Arc::new(CacheStore::new(storage.cache_path()));
        let fetcher = ArtifactFetcher::new(
            self.client.clone(),
            storage.archive_path(),
            storage.output_path(),
            self.config.download.timeout,
        );
        let pipeline = Arc::new(ArchivePipeline::new(cache, fetcher));

        Scheduler::new(self.config.download.max_concurrent, self.progress.clone())
            .run(items, pipeline)
            .await
    }

    /// Full run: prepare directories, fetch metadata, download changed items
    ///
    /// Only a metadata fetch that yields no items at all (or an unusable local
    /// layout) is an error; individual item failures are reported in the returned
    /// [`RunReport`].
    pub async fn run(&self) -> Result<RunReport> {
        self.prepare_directories().await?;

        let items = self.fetch_metadata().await?;
        info!(count = items.len(), "fetched item metadata");

        Ok(self.download(items).await)
    }
}
