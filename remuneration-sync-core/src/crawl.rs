//! Default processing pipeline: crawl an index page and push every
//! spreadsheet it links to through storage, parsing and persistence.
//!
//! The index is either a remote page (`http(s)://`) or one produced by
//! [`crate::index::generate_index`] (`file://`). Local locators are read as
//! raw paths after the scheme, without percent-decoding, matching how the
//! generator builds them.

use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};

use crate::contract::{
    Clients, MonthRecord, ParseRequest, ProcessError, ProcessReport, ProcessRequest, Processor,
    StoredSpreadsheet,
};
use crate::index::LOCAL_SCHEME;

/// Crawls an index page and processes the spreadsheets it links to, in page order.
pub struct CrawlProcessor {
    http: reqwest::Client,
}

impl CrawlProcessor {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for CrawlProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for CrawlProcessor {
    async fn process(
        &self,
        request: &ProcessRequest,
        clients: &Clients,
    ) -> Result<ProcessReport, ProcessError> {
        let period = request.period;
        info!(index_url = %request.index_url, %period, "[CRAWL] Fetching index");

        let page = match self.fetch(&request.index_url).await? {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => {
                return Err(ProcessError::Fetch {
                    locator: request.index_url.clone(),
                    reason: "index locator is a directory".into(),
                })
            }
        };
        let links = discover_links(&request.index_url, &page);
        info!(links = links.len(), "[CRAWL] Discovered links");

        let mut spreadsheets = Vec::new();
        let mut records = Vec::new();

        for link in links {
            let Some(content) = self.fetch(&link).await? else {
                debug!(link = %link, "[CRAWL] Skipping directory");
                continue;
            };
            let name = file_name_of(&link);
            let sha256 = format!("{:x}", Sha256::digest(&content));
            let size = content.len();
            let key = format!("{}/{:02}/{}", period.year(), period.month(), name);

            info!(file = %name, size, "[CRAWL] Uploading spreadsheet");
            let stored = clients
                .storage
                .upload(&key, content.clone())
                .await
                .map_err(|source| {
                    error!(file = %name, error = ?source, "[CRAWL][ERROR] Upload failed");
                    ProcessError::Upload {
                        name: name.clone(),
                        source,
                    }
                })?;

            let parsed = clients
                .parser
                .parse(ParseRequest {
                    file_name: name.clone(),
                    period,
                    content,
                })
                .await
                .map_err(|source| {
                    error!(file = %name, error = ?source, "[CRAWL][ERROR] Parsing failed");
                    ProcessError::Parse {
                        name: name.clone(),
                        source,
                    }
                })?;
            debug!(file = %name, records = parsed.len(), "[CRAWL] Parsed spreadsheet");
            records.extend(parsed);

            spreadsheets.push(StoredSpreadsheet {
                name,
                source: link,
                sha256,
                size,
                storage: stored,
            });
        }

        if spreadsheets.is_empty() {
            error!(index_url = %request.index_url, "[CRAWL][ERROR] Index lists no spreadsheets");
            return Err(ProcessError::EmptyIndex(request.index_url.clone()));
        }

        let record = MonthRecord {
            period,
            spreadsheets,
            records,
        };
        clients
            .database
            .store_month(&record)
            .await
            .map_err(|source| {
                error!(%period, error = ?source, "[CRAWL][ERROR] Storing month failed");
                ProcessError::Store { period, source }
            })?;

        info!(
            %period,
            spreadsheets = record.spreadsheets.len(),
            records = record.records.len(),
            "[CRAWL] Month stored"
        );
        Ok(ProcessReport {
            period,
            records: record.records.len(),
            spreadsheets: record.spreadsheets,
        })
    }
}

impl CrawlProcessor {
    /// Loads a resource. `None` means the locator names a local directory.
    async fn fetch(&self, locator: &str) -> Result<Option<Vec<u8>>, ProcessError> {
        let fetch_error = |reason: String| ProcessError::Fetch {
            locator: locator.to_string(),
            reason,
        };

        if let Some(path) = locator.strip_prefix(LOCAL_SCHEME) {
            let metadata = tokio::fs::metadata(path)
                .await
                .map_err(|e| fetch_error(e.to_string()))?;
            if metadata.is_dir() {
                return Ok(None);
            }
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| fetch_error(e.to_string()))?;
            return Ok(Some(bytes));
        }

        let url = reqwest::Url::parse(locator).map_err(|e| fetch_error(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(fetch_error(format!("unsupported scheme {}", url.scheme())));
        }
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

static HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*"([^"]*)""#).expect("href pattern is valid"));

/// Extracts spreadsheet links from an index page, resolved against the page's own locator.
///
/// Navigation links of a directory listing (sort links, `../`, sub-directories)
/// are dropped.
pub fn discover_links(index_url: &str, page: &str) -> Vec<String> {
    let mut links = Vec::new();
    for captures in HREF.captures_iter(page) {
        let target = unescape_attribute(&captures[1]);
        if target.is_empty() || target.starts_with('#') {
            continue;
        }
        match resolve(index_url, &target) {
            Some(link) if is_spreadsheet_link(index_url, &link) => links.push(link),
            Some(link) => debug!(link = %link, "Ignoring navigation link"),
            None => debug!(href = %target, "Ignoring unsupported link"),
        }
    }
    links
}

fn is_spreadsheet_link(index_url: &str, link: &str) -> bool {
    if file_name_of(link).is_empty() {
        return false;
    }
    let link_path = strip_query(link);
    let index_path = strip_query(index_url);
    // The page itself, or one of the directories above it.
    link_path != index_path && !index_path.starts_with(&format!("{link_path}/"))
}

fn strip_query(locator: &str) -> &str {
    if locator.starts_with(LOCAL_SCHEME) {
        locator
    } else {
        locator.split(['?', '#']).next().unwrap_or(locator)
    }
}

fn resolve(index_url: &str, target: &str) -> Option<String> {
    if target.starts_with(LOCAL_SCHEME)
        || target.starts_with("http://")
        || target.starts_with("https://")
    {
        return Some(target.to_string());
    }
    if target.contains(':') && !target.starts_with('/') && !target.starts_with('.') {
        // mailto:, javascript: and friends
        return None;
    }
    if let Some(index_path) = index_url.strip_prefix(LOCAL_SCHEME) {
        let base = Path::new(index_path).parent().unwrap_or(Path::new("/"));
        let joined: PathBuf = base.join(target);
        return Some(format!("{LOCAL_SCHEME}{}", joined.display()));
    }
    let base = reqwest::Url::parse(index_url).ok()?;
    base.join(target).ok().map(String::from)
}

fn unescape_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn file_name_of(locator: &str) -> String {
    let path = strip_query(locator);
    path.rsplit('/').next().unwrap_or(path).to_string()
}
