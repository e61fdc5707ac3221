//! Per-item pipeline: cache check, fetch, unpack, record.
//!
//! ```text
//! Pending ──(cache hit)──────────────────────────────────────> Skipped
//! Pending ──> Fetching ──> Unpacking ──> Recording ──────────> Succeeded
//!                │             │             │
//!                └─────────────┴─────────────┴──────────────> Failed(stage, reason)
//! ```
//!
//! Stages run strictly in order for one item, so the cache entry is written only
//! after the archive is fully downloaded and extracted. Nothing is recorded for a
//! failed item, which makes it eligible again on the next run.

use crate::cache::CacheStore;
use crate::error::Error;
use crate::fetcher::ArtifactFetcher;
use crate::types::{ItemDescriptor, PipelineOutcome, Stage};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Work performed for one item by the scheduler, enabling testability.
#[async_trait::async_trait]
pub trait ItemPipeline: Send + Sync + 'static {
    /// Drive one item to a terminal outcome; must not panic on item-level failures
    async fn process(&self, item: &ItemDescriptor) -> PipelineOutcome;
}

/// Production [`ItemPipeline`] backed by the shared cache and an artifact fetcher.
pub struct ArchivePipeline {
    cache: Arc<CacheStore>,
    fetcher: ArtifactFetcher,
}

impl ArchivePipeline {
    /// Create a pipeline sharing `cache` with every other pipeline of the run
    pub fn new(cache: Arc<CacheStore>, fetcher: ArtifactFetcher) -> Self {
        Self { cache, fetcher }
    }

    fn failed(item: &ItemDescriptor, stage: Stage, error: Error) -> PipelineOutcome {
        warn!(
            item_id = %item.id(),
            stage = %stage,
            error = %error,
            "item failed"
        );
        PipelineOutcome::Failed {
            stage: error.stage().unwrap_or(stage),
            reason: error.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ItemPipeline for ArchivePipeline {
    async fn process(&self, item: &ItemDescriptor) -> PipelineOutcome {
        let id = item.id();

        if self.cache.is_cached(id, item.version_marker()).await {
            debug!(item_id = %id, version = %item.version_marker(), "cache hit, skipping");
            return PipelineOutcome::Skipped;
        }

        if let Err(e) = self.fetcher.fetch(id, item.download_location()).await {
            return Self::failed(item, Stage::Fetching, e);
        }

        if let Err(e) = self.fetcher.unpack(id).await {
            return Self::failed(item, Stage::Unpacking, e);
        }

        if let Err(e) = self.cache.record(id, item.version_marker()).await {
            return Self::failed(item, Stage::Recording, e);
        }

        info!(item_id = %id, version = %item.version_marker(), "item updated");
        PipelineOutcome::Succeeded
    }
}
