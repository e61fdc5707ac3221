//! # plugin-mirror
//!
//! Mirrors a paginated plugin catalog into a local tree, re-downloading only the
//! items whose version changed since the last run.
//!
//! A run has two phases:
//! 1. **Metadata** - [`MetadataSource`] pages through the catalog until it holds the
//!    requested number of [`ItemDescriptor`]s.
//! 2. **Download** - [`Scheduler`] pushes every descriptor through an
//!    [`ArchivePipeline`] (cache check, fetch, unpack, record) with bounded
//!    concurrency. Items run independently; one failure never aborts the batch.
//!
//! Progress is published as [`Event`]s on a broadcast channel and never blocks the
//! workers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use plugin_mirror::{Config, Mirror};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.catalog.target_count = 250;
//!
//!     let mirror = Mirror::new(config)?;
//!
//!     let mut events = mirror.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("{}", event.status_line());
//!         }
//!     });
//!
//!     let report = mirror.run().await?;
//!     println!("{} updated, {} failed", report.succeeded, report.failed.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// File-backed version cache
pub mod cache;
/// Catalog metadata paging
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Artifact download and extraction
pub mod fetcher;
/// Top-level mirror orchestration
pub mod mirror;
/// Per-item pipeline
pub mod pipeline;
/// Progress events and console rendering
pub mod progress;
/// Bounded-concurrency pool
pub mod scheduler;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use cache::CacheStore;
pub use catalog::{HttpCatalog, MetadataSource, PageSource};
pub use config::Config;
pub use error::{CacheWriteError, DownloadError, Error, MetadataFetchError, Result, UnpackError};
pub use fetcher::ArtifactFetcher;
pub use mirror::Mirror;
pub use pipeline::{ArchivePipeline, ItemPipeline};
pub use progress::ProgressSink;
pub use scheduler::Scheduler;
pub use types::{Event, FailedItem, ItemDescriptor, PipelineOutcome, RunReport, Stage};
