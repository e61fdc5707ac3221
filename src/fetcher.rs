//! Artifact download and extraction
//!
//! [`ArtifactFetcher`] streams an item's archive to `<archive_dir>/<id>.zip` and
//! extracts it into the shared output directory. Extraction is flat: entries land
//! at whatever paths the archive holds, so two items shipping the same top-level
//! path overwrite each other. Archives are kept after extraction for inspection.

use crate::error::{DownloadError, Error, Result, UnpackError};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};
use url::Url;

/// Write buffer size for streamed archives
const CHUNK_SIZE: usize = 64 * 1024;

/// Downloads item archives and unpacks them into the output tree
#[derive(Clone, Debug)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    archive_dir: PathBuf,
    output_dir: PathBuf,
    timeout: Duration,
}

impl ArtifactFetcher {
    /// Create a fetcher writing archives to `archive_dir` and extracting into `output_dir`
    ///
    /// Both directories must exist before the first fetch.
    pub fn new(
        client: reqwest::Client,
        archive_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            archive_dir: archive_dir.into(),
            output_dir: output_dir.into(),
            timeout,
        }
    }

    /// Shared output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deterministic archive location for an item; distinct ids never share a path
    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.archive_dir.join(archive_file_name(id))
    }

    /// Stream the archive at `location` to the item's archive path
    pub async fn fetch(&self, id: &str, location: &Url) -> Result<PathBuf> {
        let request_failed = |e: reqwest::Error| {
            let reason = if e.is_timeout() {
                format!("timed out after {} seconds", self.timeout.as_secs())
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                e.to_string()
            };
            Error::Download(DownloadError::RequestFailed {
                id: id.to_string(),
                reason,
            })
        };

        debug!(item_id = %id, url = %location, "requesting archive");

        let response = self
            .client
            .get(location.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Download(DownloadError::HttpStatus {
                id: id.to_string(),
                url: location.to_string(),
                status: status.as_u16(),
            }));
        }

        let archive_path = self.archive_path(id);
        let write_failed = |e: std::io::Error| {
            Error::Download(DownloadError::WriteFailed {
                id: id.to_string(),
                path: archive_path.clone(),
                reason: e.to_string(),
            })
        };

        let file = tokio::fs::File::create(&archive_path)
            .await
            .map_err(write_failed)?;
        let mut writer = tokio::io::BufWriter::with_capacity(CHUNK_SIZE, file);

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(request_failed)?;
            writer.write_all(&chunk).await.map_err(write_failed)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(write_failed)?;

        info!(item_id = %id, bytes = written, path = ?archive_path, "archive downloaded");
        Ok(archive_path)
    }

    /// Extract the item's archive into the shared output directory
    ///
    /// Returns the files written. Extraction runs on the blocking pool.
    pub async fn unpack(&self, id: &str) -> Result<Vec<PathBuf>> {
        let archive_path = self.archive_path(id);
        if !tokio::fs::try_exists(&archive_path).await.unwrap_or(false) {
            return Err(Error::Unpack(UnpackError::ArchiveMissing {
                id: id.to_string(),
                archive: archive_path,
            }));
        }

        let id_owned = id.to_string();
        let archive_owned = archive_path.clone();
        let dest_owned = self.output_dir.clone();

        let files = spawn_blocking(move || extract_zip(&id_owned, &archive_owned, &dest_owned))
            .await
            .map_err(|e| {
                Error::Unpack(UnpackError::ExtractionFailed {
                    id: id.to_string(),
                    archive: archive_path.clone(),
                    reason: format!("extraction task panicked: {}", e),
                })
            })??;

        info!(
            item_id = %id,
            extracted_count = files.len(),
            "archive extracted"
        );
        Ok(files)
    }
}

/// Map an item id onto a single file name component inside the archive directory
///
/// Percent-encoding leaves only `[A-Za-z0-9._~-]` and escapes `%` itself, so the
/// mapping is injective and no separator can survive.
fn archive_file_name(id: &str) -> String {
    format!("{}.zip", urlencoding::encode(id))
}

/// Extract every entry of a zip archive under `dest_path`
fn extract_zip(id: &str, archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
    let extraction_failed = |reason: String| {
        Error::Unpack(UnpackError::ExtractionFailed {
            id: id.to_string(),
            archive: archive_path.to_path_buf(),
            reason,
        })
    };
    let corrupt = |e: zip::result::ZipError| {
        Error::Unpack(UnpackError::Corrupt {
            id: id.to_string(),
            archive: archive_path.to_path_buf(),
            reason: e.to_string(),
        })
    };

    let file = std::fs::File::open(archive_path)
        .map_err(|e| extraction_failed(format!("failed to open archive: {}", e)))?;
    let mut archive = zip::ZipArchive::new(file).map_err(corrupt)?;

    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(corrupt)?;

        let file_path = match entry.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(item_id = %id, entry = %entry.name(), "skipping entry with unsafe path");
                continue;
            }
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&file_path)
                .map_err(|e| extraction_failed(format!("failed to create directory: {}", e)))?;
            continue;
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                extraction_failed(format!("failed to create parent directories: {}", e))
            })?;
        }

        let mut outfile = std::fs::File::create(&file_path)
            .map_err(|e| extraction_failed(format!("failed to create output file: {}", e)))?;

        // Decompression errors surface here for entries with a damaged body
        std::io::copy(&mut entry, &mut outfile).map_err(|e| {
            Error::Unpack(UnpackError::Corrupt {
                id: id.to_string(),
                archive: archive_path.to_path_buf(),
                reason: format!("failed to extract {}: {}", entry.name(), e),
            })
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&file_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| {
                        extraction_failed(format!("failed to set permissions: {}", e))
                    })?;
            }
        }

        extracted_files.push(file_path);
    }

    Ok(extracted_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Build a zip archive in memory from (name, content) pairs
    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = ::zip::ZipWriter::new(&mut cursor);
            let options = ::zip::write::FileOptions::default()
                .compression_method(::zip::CompressionMethod::Stored);
            for (name, content) in files {
                writer.start_file(*name, options).unwrap();
                std::io::Write::write_all(&mut writer, content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    fn fetcher_in(dir: &TempDir) -> ArtifactFetcher {
        let archives = dir.path().join("Zips");
        let output = dir.path().join("Plugins");
        std::fs::create_dir_all(&archives).unwrap();
        std::fs::create_dir_all(&output).unwrap();
        ArtifactFetcher::new(
            reqwest::Client::new(),
            archives,
            output,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_archive_file_name_escapes_separators() {
        assert_eq!(archive_file_name("akismet"), "akismet.zip");
        assert_eq!(
            archive_file_name("../../etc/passwd"),
            "..%2F..%2Fetc%2Fpasswd.zip"
        );
        assert_eq!(archive_file_name("a\\b"), "a%5Cb.zip");
    }

    #[test]
    fn test_distinct_ids_get_distinct_archives() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        let ids = ["a b", "a_b", "a%20b", "a/b", "a%2Fb", "a.b"];

        let paths: std::collections::HashSet<PathBuf> =
            ids.iter().map(|id| fetcher.archive_path(id)).collect();

        assert_eq!(paths.len(), ids.len());
        for path in &paths {
            assert_eq!(path.parent(), Some(dir.path().join("Zips").as_path()));
        }
    }

    #[test]
    fn test_archive_path_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        assert_eq!(
            fetcher.archive_path("akismet"),
            dir.path().join("Zips").join("akismet.zip")
        );
        assert_eq!(fetcher.archive_path("akismet"), fetcher.archive_path("akismet"));
    }

    #[tokio::test]
    async fn test_fetch_streams_body_to_archive_path() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        let body = zip_bytes(&[("akismet/akismet.php", "<?php")]);

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin/akismet.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/plugin/akismet.zip", mock_server.uri())).unwrap();
        let archive = fetcher.fetch("akismet", &url).await.unwrap();

        assert_eq!(archive, fetcher.archive_path("akismet"));
        assert_eq!(std::fs::read(&archive).unwrap(), body);
    }

    #[tokio::test]
    async fn test_fetch_rejects_error_status() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plugin/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/plugin/missing.zip", mock_server.uri())).unwrap();
        let result = fetcher.fetch("missing", &url).await;

        match result {
            Err(Error::Download(DownloadError::HttpStatus { id, status, .. })) => {
                assert_eq!(id, "missing");
                assert_eq!(status, 404);
            }
            other => panic!("expected HTTP status error, got {:?}", other),
        }
        assert!(!fetcher.archive_path("missing").exists());
    }

    #[tokio::test]
    async fn test_unpack_extracts_into_shared_output() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        std::fs::write(
            fetcher.archive_path("akismet"),
            zip_bytes(&[
                ("akismet/akismet.php", "<?php // main"),
                ("akismet/readme.txt", "readme"),
            ]),
        )
        .unwrap();

        let files = fetcher.unpack("akismet").await.unwrap();

        assert_eq!(files.len(), 2);
        let main = fetcher.output_dir().join("akismet").join("akismet.php");
        assert_eq!(std::fs::read(&main).unwrap(), b"<?php // main");
        // Archive is retained after extraction
        assert!(fetcher.archive_path("akismet").exists());
    }

    #[tokio::test]
    async fn test_unpack_corrupt_archive_fails_and_keeps_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        std::fs::write(fetcher.archive_path("broken"), b"definitely not a zip").unwrap();

        let result = fetcher.unpack("broken").await;

        assert!(matches!(
            result,
            Err(Error::Unpack(UnpackError::Corrupt { .. }))
        ));
        assert!(fetcher.archive_path("broken").exists());
    }

    #[tokio::test]
    async fn test_unpack_without_archive_fails() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);

        let result = fetcher.unpack("never-fetched").await;
        assert!(matches!(
            result,
            Err(Error::Unpack(UnpackError::ArchiveMissing { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unpack_flattens_colliding_paths() {
        let dir = TempDir::new().unwrap();
        let fetcher = fetcher_in(&dir);
        std::fs::write(
            fetcher.archive_path("first"),
            zip_bytes(&[("shared/index.php", "first")]),
        )
        .unwrap();
        std::fs::write(
            fetcher.archive_path("second"),
            zip_bytes(&[("shared/index.php", "second")]),
        )
        .unwrap();

        fetcher.unpack("first").await.unwrap();
        fetcher.unpack("second").await.unwrap();

        let shared = fetcher.output_dir().join("shared").join("index.php");
        assert_eq!(std::fs::read(shared).unwrap(), b"second");
    }
}
