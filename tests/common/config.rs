//! Test configuration helpers pointing a mirror at a mock catalog

use plugin_mirror::Config;
use plugin_mirror::config::{CatalogConfig, DownloadConfig, StorageConfig};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

use super::fixtures::CATALOG_PATH;

/// Config mirroring `target_count` items from `server` into `dir`
pub fn test_config(server: &MockServer, dir: &TempDir, target_count: usize) -> Config {
    Config {
        catalog: CatalogConfig {
            endpoint: format!("{}{}", server.uri(), CATALOG_PATH),
            target_count,
            extra_pages: 1,
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        storage: StorageConfig {
            base_dir: dir.path().to_path_buf(),
            ..Default::default()
        },
        download: DownloadConfig {
            max_concurrent: 4,
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
    }
}
