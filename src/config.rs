//! Configuration types for plugin-mirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest page size the catalog accepts
pub const MAX_PAGE_SIZE: u32 = 100;

/// Remote catalog settings (endpoint, query, paging bounds)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog query endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Value of the `action` query parameter (default: "query_plugins")
    #[serde(default = "default_action")]
    pub action: String,

    /// Opaque filter/sort passed as the `browse` query parameter (default: "popular")
    #[serde(default = "default_browse")]
    pub browse: String,

    /// Number of item descriptors to collect (default: 1800)
    #[serde(default = "default_target_count")]
    pub target_count: usize,

    /// Items requested per page, 1..=100 (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Page requests allowed beyond the minimum needed before paging gives up (default: 5)
    ///
    /// Failed pages still consume a request, so a persistently failing catalog stops
    /// after `ceil(target_count / page_size) + extra_pages` requests.
    #[serde(default = "default_extra_pages")]
    pub extra_pages: u32,

    /// Per-page request timeout (default: 30 seconds)
    #[serde(default = "default_catalog_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            action: default_action(),
            browse: default_browse(),
            target_count: default_target_count(),
            page_size: default_page_size(),
            extra_pages: default_extra_pages(),
            timeout: default_catalog_timeout(),
        }
    }
}

/// Local filesystem layout
///
/// Relative directory names resolve against `base_dir`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory (default: ".")
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Raw archive directory (default: "Zips")
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Unpacked output directory (default: "Plugins")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Cache file (default: "cache.json")
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            archive_dir: default_archive_dir(),
            output_dir: default_output_dir(),
            cache_file: default_cache_file(),
        }
    }
}

impl StorageConfig {
    /// Resolved raw archive directory
    pub fn archive_path(&self) -> PathBuf {
        self.base_dir.join(&self.archive_dir)
    }

    /// Resolved unpacked output directory
    pub fn output_path(&self) -> PathBuf {
        self.base_dir.join(&self.output_dir)
    }

    /// Resolved cache file path
    pub fn cache_path(&self) -> PathBuf {
        self.base_dir.join(&self.cache_file)
    }
}

/// Download pool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum pipelines running at once (default: 50)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-artifact request timeout (default: 300 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent sent on every request (default: "Wp-Shadow")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout: default_download_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for a mirror run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote catalog settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Local filesystem layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Download pool settings
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
            key: None,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the mirror cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.catalog.page_size) {
            return Err(Error::Config {
                message: format!(
                    "page size must be between 1 and {}, got {}",
                    MAX_PAGE_SIZE, self.catalog.page_size
                ),
                key: Some("catalog.page_size".to_string()),
            });
        }

        if self.catalog.target_count == 0 {
            return Err(Error::Config {
                message: "target count must be at least 1".to_string(),
                key: Some("catalog.target_count".to_string()),
            });
        }

        if url::Url::parse(&self.catalog.endpoint).is_err() {
            return Err(Error::Config {
                message: format!("invalid catalog endpoint '{}'", self.catalog.endpoint),
                key: Some("catalog.endpoint".to_string()),
            });
        }

        if self.download.max_concurrent == 0 {
            return Err(Error::Config {
                message: "max concurrent downloads must be at least 1".to_string(),
                key: Some("download.max_concurrent".to_string()),
            });
        }

        Ok(())
    }
}

fn default_endpoint() -> String {
    "https://api.wordpress.org/plugins/info/1.2/".to_string()
}

fn default_action() -> String {
    "query_plugins".to_string()
}

fn default_browse() -> String {
    "popular".to_string()
}

fn default_target_count() -> usize {
    1800
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_extra_pages() -> u32 {
    5
}

fn default_catalog_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("Zips")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("Plugins")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("cache.json")
}

fn default_max_concurrent() -> usize {
    50
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    "Wp-Shadow".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
