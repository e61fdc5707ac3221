//! Catalog metadata paging
//!
//! [`MetadataSource`] pages through the remote catalog until it holds the requested
//! number of [`ItemDescriptor`]s. A page that fails for any reason (request error,
//! error status, unparsable body) is logged and contributes nothing; paging goes
//! on with the next page. The number of page requests is capped so a catalog that
//! keeps failing cannot keep the loop alive forever.
//!
//! The catalog derives its offset from `(page - 1) * per_page`, so shrinking
//! `per_page` for the last request makes that page overlap ones already fetched.
//! Ids seen before are dropped and only new ids count toward the target, which
//! keeps paging until the overlap is passed.

use crate::config::{CatalogConfig, MAX_PAGE_SIZE};
use crate::error::{Error, MetadataFetchError, Result};
use crate::progress::ProgressSink;
use crate::types::{Event, ItemDescriptor};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Abstraction over fetching one catalog page, enabling testability.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) holding at most `per_page` items
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> std::result::Result<Vec<ItemDescriptor>, MetadataFetchError>;
}

/// Wire shape of a catalog page
#[derive(Debug, Deserialize)]
struct CatalogPage {
    plugins: Vec<serde_json::Value>,
}

/// Wire shape of a single catalog record
#[derive(Debug, Deserialize)]
struct CatalogRecord {
    slug: String,
    download_link: String,
    last_updated: String,
}

/// Production [`PageSource`] querying the plugin directory's HTTP API.
pub struct HttpCatalog {
    client: reqwest::Client,
    endpoint: Url,
    action: String,
    browse: String,
    timeout: Duration,
}

impl HttpCatalog {
    /// Create a catalog client from configuration
    pub fn new(client: reqwest::Client, config: &CatalogConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| Error::Config {
            message: format!("invalid catalog endpoint '{}': {}", config.endpoint, e),
            key: Some("catalog.endpoint".to_string()),
        })?;

        Ok(Self {
            client,
            endpoint,
            action: config.action.clone(),
            browse: config.browse.clone(),
            timeout: config.timeout,
        })
    }
}

#[async_trait::async_trait]
impl PageSource for HttpCatalog {
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
    ) -> std::result::Result<Vec<ItemDescriptor>, MetadataFetchError> {
        let per_page_param = per_page.to_string();
        let page_param = page.to_string();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("action", self.action.as_str()),
                ("per_page", per_page_param.as_str()),
                ("browse", self.browse.as_str()),
                ("page", page_param.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MetadataFetchError::RequestFailed {
                page,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataFetchError::HttpStatus {
                page,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MetadataFetchError::RequestFailed {
                page,
                reason: e.to_string(),
            })?;

        parse_page(page, &body)
    }
}

/// Parse a page body, skipping individual records that are incomplete
fn parse_page(
    page: u32,
    body: &[u8],
) -> std::result::Result<Vec<ItemDescriptor>, MetadataFetchError> {
    let parsed: CatalogPage =
        serde_json::from_slice(body).map_err(|e| MetadataFetchError::MalformedPayload {
            page,
            reason: e.to_string(),
        })?;

    let mut items = Vec::with_capacity(parsed.plugins.len());
    for value in parsed.plugins {
        let record: CatalogRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(page, error = %e, "skipping incomplete catalog record");
                continue;
            }
        };

        let location = match Url::parse(&record.download_link) {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    page,
                    item_id = %record.slug,
                    error = %e,
                    "skipping catalog record with invalid download link"
                );
                continue;
            }
        };

        match ItemDescriptor::new(record.slug, location, record.last_updated) {
            Ok(item) => items.push(item),
            Err(e) => warn!(page, error = %e, "skipping catalog record"),
        }
    }

    Ok(items)
}

/// Collects item descriptors from a paginated [`PageSource`]
pub struct MetadataSource {
    source: Arc<dyn PageSource>,
    progress: ProgressSink,
    extra_pages: u32,
}

impl MetadataSource {
    /// Create a pager over `source`, allowing `extra_pages` requests beyond the minimum
    pub fn new(source: Arc<dyn PageSource>, progress: ProgressSink, extra_pages: u32) -> Self {
        Self {
            source,
            progress,
            extra_pages,
        }
    }

    /// Fetch `target_count` descriptors, `page_size` (clamped to 1..=100) per page
    ///
    /// Each page asks for `min(page_size, remaining)` items. Paging stops once the
    /// target is reached, the catalog returns an empty page, or the request ceiling
    /// (`ceil(target_count / page_size) + extra_pages`) is hit. Returned ids are
    /// unique; repeats are dropped. Fewer descriptors than requested is not an
    /// error; none at all is.
    pub async fn fetch(&self, target_count: usize, page_size: u32) -> Result<Vec<ItemDescriptor>> {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let max_pages = page_ceiling(target_count, page_size, self.extra_pages);

        let mut items: Vec<ItemDescriptor> = Vec::with_capacity(target_count);
        let mut seen: HashSet<String> = HashSet::with_capacity(target_count);
        let mut page: u32 = 1;
        let mut requests: u32 = 0;

        while items.len() < target_count && requests < max_pages {
            let remaining = target_count - items.len();
            let per_page = u32::try_from(remaining).map_or(page_size, |r| r.min(page_size));
            requests += 1;

            debug!(page, per_page, "requesting catalog page");

            match self.source.fetch_page(page, per_page).await {
                Ok(batch) if batch.is_empty() => {
                    info!(page, "catalog returned an empty page, no more items available");
                    break;
                }
                Ok(batch) => {
                    let returned = batch.len();
                    let mut added = 0usize;
                    let mut repeated = 0usize;
                    for item in batch {
                        if added == remaining {
                            break;
                        }
                        if seen.insert(item.id().to_string()) {
                            items.push(item);
                            added += 1;
                        } else {
                            repeated += 1;
                        }
                    }
                    if repeated > 0 {
                        debug!(page, repeated, "dropped repeated item ids");
                    }
                    if returned > added + repeated {
                        debug!(
                            page,
                            returned,
                            remaining,
                            "catalog returned more items than requested, truncating"
                        );
                    }
                }
                Err(e) => {
                    warn!(page, error = %e, "failed to fetch catalog page, skipping");
                }
            }

            page += 1;
            self.progress.emit(Event::MetadataProgress {
                fetched: items.len(),
                target: target_count,
            });
        }

        if items.is_empty() {
            return Err(MetadataFetchError::NoItems { pages: requests }.into());
        }

        if items.len() < target_count {
            warn!(
                fetched = items.len(),
                target = target_count,
                pages = requests,
                "collected fewer items than requested"
            );
        } else {
            info!(
                fetched = items.len(),
                pages = requests,
                "collected item metadata"
            );
        }

        self.progress.emit(Event::MetadataComplete {
            count: items.len(),
            pages: requests,
        });

        Ok(items)
    }
}

/// Maximum page requests for one fetch
fn page_ceiling(target_count: usize, page_size: u32, extra_pages: u32) -> u32 {
    let needed = target_count.div_ceil(page_size.max(1) as usize);
    u32::try_from(needed)
        .unwrap_or(u32::MAX)
        .saturating_add(extra_pages)
}
