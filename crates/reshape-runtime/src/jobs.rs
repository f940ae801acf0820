//! Conversion cycle results

use serde::{Deserialize, Serialize};

use reshape_core::WatchedSource;

use crate::error::Result;

/// How a conversion cycle for one watched source ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Content hash matched the stored fingerprint
    Unchanged,
    /// Content changed and was converted
    Converted {
        /// Link returned by the executor
        output_link: String,
        /// Fingerprint stored after conversion
        sha256: String,
    },
}

impl CycleOutcome {
    /// Whether a conversion happened
    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted { .. })
    }
}

/// A finished cycle and the source it ran for
#[derive(Debug)]
pub struct CycleReport {
    /// Watched source the cycle ran for
    pub source: WatchedSource,
    /// Outcome, or why the cycle was abandoned
    pub result: Result<CycleOutcome>,
}

impl CycleReport {
    /// Log the report at the level its result calls for
    pub fn log(&self) {
        let url = self.source.url.as_str();
        let mapping = self.source.mapping_template_id.as_str();
        match &self.result {
            Ok(CycleOutcome::Unchanged) => {
                tracing::debug!(url, mapping, "source unchanged");
            }
            Ok(CycleOutcome::Converted {
                output_link,
                sha256,
            }) => {
                tracing::info!(url, mapping, output = %output_link, sha256 = %sha256, "source converted");
            }
            Err(e) if e.is_cancelled() => {
                tracing::debug!(url, mapping, "cycle cancelled");
            }
            Err(e) => {
                tracing::warn!(url, mapping, error = %e, "cycle failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_converted() {
        assert!(!CycleOutcome::Unchanged.is_converted());
        assert!(
            CycleOutcome::Converted {
                output_link: "out.jsonl".to_string(),
                sha256: "ab".to_string(),
            }
            .is_converted()
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = CycleOutcome::Converted {
            output_link: "out.jsonl".to_string(),
            sha256: "ab".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            json,
            r#"{"outcome":"converted","output_link":"out.jsonl","sha256":"ab"}"#
        );

        let parsed: CycleOutcome = serde_json::from_str(r#"{"outcome":"unchanged"}"#).unwrap();
        assert_eq!(parsed, CycleOutcome::Unchanged);
    }
}
