//! HTTP fetching with landing-page resolution
//!
//! Many open-data portals link to the actual file from an HTML page. When a
//! fetch returns HTML, the first `href` pointing at a supported data file is
//! followed once, with the page URL sent as `Referer`.

use regex::Regex;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::{Client, redirect};
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

use reshape_core::Settings;

use crate::error::{Error, Result};
use crate::shutdown::ShutdownSignal;

/// Bytes of a landing page scanned for data links
pub const LANDING_SCAN_BYTES: usize = 512 * 1024;

/// Extensions that mark an `href` as a data file
const DATA_EXTENSIONS: &[&str] = &[".xlsx", ".csv", ".json", ".xml"];

static HREF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .expect("href pattern should compile")
});

/// A fetched payload
#[derive(Debug, Clone)]
pub struct FetchedContent {
    /// Response body
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// URL the body was finally read from
    pub final_url: String,
}

/// Fetches remote resources for conversion
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
}

impl ContentFetcher {
    /// Create a fetcher with an explicit user agent and timeout
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(Error::Client)?;

        Ok(Self { client })
    }

    /// Create a fetcher from project settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.user_agent,
            Duration::from_secs(settings.request_timeout_seconds),
        )
    }

    /// Fetch `url`, following a data link if the response is a landing page
    pub async fn fetch(&self, url: &str, shutdown: &ShutdownSignal) -> Result<FetchedContent> {
        let first = self.get(url, None, shutdown).await?;
        if !looks_like_html(first.content_type.as_deref(), &first.bytes) {
            return Ok(first);
        }

        let scan_len = first.bytes.len().min(LANDING_SCAN_BYTES);
        let html = String::from_utf8_lossy(&first.bytes[..scan_len]);
        let Some(link) = find_data_link(&html) else {
            tracing::debug!(url, "HTML response without a data link");
            return Ok(first);
        };

        let base = Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let target = base.join(&link).map_err(|source| Error::InvalidUrl {
            url: link.clone(),
            source,
        })?;

        tracing::debug!(url, data_url = %target, "following landing page link");
        self.get(target.as_str(), Some(url), shutdown).await
    }

    async fn get(&self, url: &str, referer: Option<&str>, shutdown: &ShutdownSignal) -> Result<FetchedContent> {
        shutdown.check()?;

        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }

        let http_error = |source| Error::Http {
            url: url.to_string(),
            source,
        };

        let mut response = shutdown
            .cancellable(request.send())
            .await?
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = shutdown
            .cancellable(response.chunk())
            .await?
            .map_err(http_error)?
        {
            bytes.extend_from_slice(&chunk);
        }

        tracing::debug!(url, len = bytes.len(), content_type = ?content_type, "fetched");
        Ok(FetchedContent {
            bytes,
            content_type,
            final_url,
        })
    }
}

/// Whether a response is an HTML page rather than a data file
pub fn looks_like_html(content_type: Option<&str>, body: &[u8]) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("html")) {
        return true;
    }

    let prefix = &body[..body.len().min(256)];
    let prefix = prefix.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(prefix);
    let text = String::from_utf8_lossy(prefix);
    let text = text.trim_start().to_ascii_lowercase();
    text.starts_with("<!doctype") || text.starts_with("<html")
}

/// First `href` whose value names a supported data file
pub fn find_data_link(html: &str) -> Option<String> {
    HREF_PATTERN.captures_iter(html).find_map(|caps| {
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))?
            .as_str();
        let lower = value.to_ascii_lowercase();
        DATA_EXTENSIONS
            .iter()
            .any(|ext| lower.contains(ext))
            .then(|| value.trim().replace("&amp;", "&"))
    })
}
