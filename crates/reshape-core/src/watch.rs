//! Watched sources and conversion history
//!
//! A watched source is a remote URL that is re-converted with a mapping
//! template whenever its content changes. History records are append-only and
//! decide when an entry is next due.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A remote resource polled for changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedSource {
    /// Resource URL as registered (fragment included)
    pub url: String,

    /// Minimum minutes between conversions
    #[serde(default = "default_interval_minutes", alias = "interval_minutes")]
    pub interval_minutes: u32,

    /// Mapping template (profile) applied on change
    #[serde(alias = "mapping_template_id", alias = "profile")]
    pub mapping_template_id: String,
}

fn default_interval_minutes() -> u32 {
    60
}

impl WatchedSource {
    /// Create a watched source
    pub fn new(url: impl Into<String>, interval_minutes: u32, mapping_template_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval_minutes,
            mapping_template_id: mapping_template_id.into(),
        }
    }

    /// URL used for fetching and keying
    pub fn fetch_url(&self) -> &str {
        strip_fragment(&self.url)
    }

    /// Time of the latest conversion of this source, if any
    pub fn last_conversion_time(&self, history: &[ConversionRecord]) -> Option<DateTime<Utc>> {
        history
            .iter()
            .filter(|r| r.input_ref == self.url && r.mapping_template_id == self.mapping_template_id)
            .map(|r| r.converted_at)
            .max()
    }

    /// Whether a conversion cycle should be scheduled at `now`
    pub fn is_due(&self, history: &[ConversionRecord], now: DateTime<Utc>) -> bool {
        match self.last_conversion_time(history) {
            None => true,
            Some(last) => now - last >= Duration::minutes(i64::from(self.interval_minutes)),
        }
    }
}

/// One completed conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecord {
    /// When the conversion finished
    pub converted_at: DateTime<Utc>,
    /// Input reference (the watched URL as registered)
    pub input_ref: String,
    /// Where the output was written
    pub output_link: String,
    /// Mapping template used
    pub mapping_template_id: String,
}

/// Drop a `#fragment` suffix from a URL
pub fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(base, _)| base)
}
