//! Core types for plugin-mirror

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Metadata for one downloadable catalog item
///
/// Immutable once constructed: the id is guaranteed non-empty and the download
/// location is a parsed URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    id: String,
    download_location: Url,
    version_marker: String,
}

impl ItemDescriptor {
    /// Create a descriptor, rejecting an empty id
    pub fn new(
        id: impl Into<String>,
        download_location: Url,
        version_marker: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Other(
                "item descriptor id must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id,
            download_location,
            version_marker: version_marker.into(),
        })
    }

    /// Unique item identifier (the catalog slug)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Where the item's archive can be downloaded from
    pub fn download_location(&self) -> &Url {
        &self.download_location
    }

    /// Opaque marker that changes whenever the remote content changes
    pub fn version_marker(&self) -> &str {
        &self.version_marker
    }
}

/// Per-item pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Not started yet
    Pending,
    /// Streaming the archive to disk
    Fetching,
    /// Extracting the archive into the output tree
    Unpacking,
    /// Persisting the version marker into the cache
    Recording,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Pending => "pending",
            Stage::Fetching => "fetching",
            Stage::Unpacking => "unpacking",
            Stage::Recording => "recording",
        };
        f.write_str(s)
    }
}

/// Terminal result of one item's pipeline
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The cache already held this exact version; nothing was done
    Skipped,
    /// Downloaded, unpacked and recorded
    Succeeded,
    /// A stage failed; the item is not recorded and will be retried next run
    Failed {
        /// Stage that failed
        stage: Stage,
        /// Error message
        reason: String,
    },
}

/// Event emitted while a mirror run makes progress
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A catalog page was processed
    MetadataProgress {
        /// Descriptors collected so far
        fetched: usize,
        /// Descriptors wanted
        target: usize,
    },

    /// Catalog paging finished
    MetadataComplete {
        /// Descriptors collected
        count: usize,
        /// Page requests issued
        pages: u32,
    },

    /// An item's pipeline reached a terminal state
    ItemFinished {
        /// Item identifier
        id: String,
        /// How it ended
        outcome: PipelineOutcome,
        /// Pipelines finished so far (including this one)
        completed: usize,
        /// Pipelines in the batch
        total: usize,
    },

    /// The whole batch finished
    RunComplete {
        /// Items skipped as cached
        skipped: usize,
        /// Items downloaded and recorded
        succeeded: usize,
        /// Items that failed
        failed: usize,
    },
}

impl Event {
    /// Human-readable status line for console display
    pub fn status_line(&self) -> String {
        match self {
            Event::MetadataProgress { fetched, target } => {
                format!("Fetching metadata {fetched}/{target}")
            }
            Event::MetadataComplete { count, pages } => {
                format!("Fetched metadata for {count} items in {pages} page(s)")
            }
            Event::ItemFinished {
                completed, total, ..
            } => format!("Downloading uncached or updated items {completed}/{total}"),
            Event::RunComplete {
                skipped,
                succeeded,
                failed,
            } => format!("Done: {succeeded} updated, {skipped} cached, {failed} failed"),
        }
    }
}

/// Item that failed during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Item identifier
    pub id: String,
    /// Stage that failed
    pub stage: Stage,
    /// Error message
    pub reason: String,
}

/// Aggregate result of one scheduler run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// When the last pipeline finished
    pub finished_at: DateTime<Utc>,
    /// Items submitted
    pub total: usize,
    /// Items skipped as cached
    pub skipped: usize,
    /// Items downloaded and recorded
    pub succeeded: usize,
    /// Items that failed, in completion order
    pub failed: Vec<FailedItem>,
}

impl RunReport {
    /// Empty report for a batch of `total` items
    pub fn new(total: usize) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            total,
            skipped: 0,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    /// Fold one item's outcome into the report
    pub fn record(&mut self, id: &str, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Skipped => self.skipped += 1,
            PipelineOutcome::Succeeded => self.succeeded += 1,
            PipelineOutcome::Failed { stage, reason } => self.failed.push(FailedItem {
                id: id.to_string(),
                stage: *stage,
                reason: reason.clone(),
            }),
        }
    }

    /// Items that reached a terminal state
    pub fn completed(&self) -> usize {
        self.skipped + self.succeeded + self.failed.len()
    }

    /// Wall-clock duration of the batch
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
