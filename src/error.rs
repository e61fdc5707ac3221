//! Error types for plugin-mirror
//!
//! This module provides the error taxonomy for the mirror:
//! - Catalog paging failures ([`MetadataFetchError`])
//! - Artifact transfer failures ([`DownloadError`])
//! - Archive extraction failures ([`UnpackError`])
//! - Cache persistence failures ([`CacheWriteError`])
//!
//! Every domain error carries the context needed to name the failing page or item
//! in a log line.

use crate::types::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for plugin-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for plugin-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "catalog.page_size")
        key: Option<String>,
    },

    /// Catalog page request or payload failure
    #[error("metadata fetch error: {0}")]
    MetadataFetch(#[from] MetadataFetchError),

    /// Artifact download failure
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Archive extraction failure
    #[error("unpack error: {0}")]
    Unpack(#[from] UnpackError),

    /// Cache persistence failure
    #[error("cache write error: {0}")]
    CacheWrite(#[from] CacheWriteError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Pipeline stage an error belongs to, if it came out of the per-item pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Download(_) => Some(Stage::Fetching),
            Error::Unpack(_) => Some(Stage::Unpacking),
            Error::CacheWrite(_) => Some(Stage::Recording),
            _ => None,
        }
    }
}

/// Catalog paging errors
///
/// A failing page is logged and contributes no items; only [`MetadataFetchError::NoItems`]
/// is fatal to a run.
#[derive(Debug, Error)]
pub enum MetadataFetchError {
    /// The request never produced a response (connect, timeout, body read)
    #[error("request for page {page} failed: {reason}")]
    RequestFailed {
        /// Catalog page number (1-based)
        page: u32,
        /// Underlying failure
        reason: String,
    },

    /// The catalog answered with a non-success status
    #[error("page {page} returned HTTP {status}")]
    HttpStatus {
        /// Catalog page number (1-based)
        page: u32,
        /// HTTP status code
        status: u16,
    },

    /// The response body was not the expected JSON shape
    #[error("page {page} has a malformed payload: {reason}")]
    MalformedPayload {
        /// Catalog page number (1-based)
        page: u32,
        /// Parse failure detail
        reason: String,
    },

    /// Paging finished without collecting a single item
    #[error("no item metadata could be fetched after {pages} page request(s)")]
    NoItems {
        /// Number of page requests issued
        pages: u32,
    },
}

/// Artifact download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network failure while requesting or streaming the artifact
    #[error("request for {id} failed: {reason}")]
    RequestFailed {
        /// Item identifier
        id: String,
        /// Underlying failure
        reason: String,
    },

    /// The artifact host answered with a non-success status
    #[error("{id}: {url} returned HTTP {status}")]
    HttpStatus {
        /// Item identifier
        id: String,
        /// Requested location
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The archive file could not be written locally
    #[error("{id}: failed to write archive {path}: {reason}")]
    WriteFailed {
        /// Item identifier
        id: String,
        /// Archive path being written
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

/// Archive extraction errors
///
/// The archive file is left in place for inspection whenever one of these is returned.
#[derive(Debug, Error)]
pub enum UnpackError {
    /// No archive exists for the item
    #[error("{id}: archive not found at {archive}")]
    ArchiveMissing {
        /// Item identifier
        id: String,
        /// Expected archive path
        archive: PathBuf,
    },

    /// The archive is corrupt or not a zip file
    #[error("{id}: corrupt archive {archive}: {reason}")]
    Corrupt {
        /// Item identifier
        id: String,
        /// Archive path
        archive: PathBuf,
        /// Reader failure detail
        reason: String,
    },

    /// Writing an extracted entry failed
    #[error("{id}: failed to extract {archive}: {reason}")]
    ExtractionFailed {
        /// Item identifier
        id: String,
        /// Archive path
        archive: PathBuf,
        /// Underlying failure
        reason: String,
    },
}

/// Cache persistence errors
///
/// On any of these the previously persisted cache file is left untouched.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    /// Reading the current snapshot failed
    #[error("failed to read cache {path}: {reason}")]
    ReadFailed {
        /// Cache file path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The current snapshot is not a JSON object of strings
    #[error("cache {path} is not valid: {reason}")]
    ParseFailed {
        /// Cache file path
        path: PathBuf,
        /// Parse failure detail
        reason: String,
    },

    /// Writing or replacing the snapshot failed
    #[error("failed to persist cache {path}: {reason}")]
    WriteFailed {
        /// Cache file path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },
}
