//! Catalog pages and archive fixtures served through wiremock

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock catalog answers on
pub const CATALOG_PATH: &str = "/plugins/info/1.2/";

/// A plugin as the mock catalog advertises it
#[derive(Clone, Debug)]
pub struct FakePlugin {
    /// Catalog slug
    pub slug: String,
    /// Version marker (`last_updated`)
    pub version: String,
}

impl FakePlugin {
    /// Plugin `slug` at `version`
    pub fn new(slug: &str, version: &str) -> Self {
        Self {
            slug: slug.to_string(),
            version: version.to_string(),
        }
    }

    /// Path its archive is served from
    pub fn archive_path(&self) -> String {
        format!("/plugin/{}.zip", self.slug)
    }
}

/// Build a zip archive in memory from (name, content) pairs
pub fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

/// Catalog page body advertising `plugins`, with download links on `server`
pub fn catalog_page(server: &MockServer, plugins: &[FakePlugin]) -> serde_json::Value {
    let records: Vec<_> = plugins
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.slug.to_uppercase(),
                "slug": p.slug,
                "version": "1.0.0",
                "download_link": format!("{}{}", server.uri(), p.archive_path()),
                "last_updated": p.version,
            })
        })
        .collect();
    serde_json::json!({
        "info": { "page": 1, "pages": 1, "results": plugins.len() },
        "plugins": records,
    })
}

/// Mount a single catalog page (page 1) listing `plugins`
pub async fn mount_catalog(server: &MockServer, plugins: &[FakePlugin]) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_page(server, plugins)))
        .mount(server)
        .await;
}

/// Mount the archive for `plugin`, expecting exactly `expected_hits` downloads
pub async fn mount_archive(server: &MockServer, plugin: &FakePlugin, expected_hits: u64) {
    let main_file = format!("{}/{}.php", plugin.slug, plugin.slug);
    let readme = format!("{}/readme.txt", plugin.slug);
    let body = zip_bytes(&[
        (main_file.as_str(), plugin.version.as_str()),
        (readme.as_str(), "=== readme ==="),
    ]);
    Mock::given(method("GET"))
        .and(path(plugin.archive_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(expected_hits)
        .mount(server)
        .await;
}
