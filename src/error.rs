//! Error types for the extraction and translation core
//!
//! Extractors never fail: malformed input yields empty sequences. These
//! errors cover the few places where a caller can choose how to react.

use thiserror::Error;

pub type PrismResult<T> = Result<T, PrismError>;

#[derive(Debug, Error)]
pub enum PrismError {
    /// No comparator, bare number or "any" keyword in the threshold text.
    #[error("could not extract threshold value from: {text}")]
    ThresholdNotFound { text: String },

    /// One of the opaque JSON sections of a dashboard suggestion did not parse.
    #[error("error parsing {field} JSON: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Alert type that routes to no known alerting backend.
    #[error("unsupported alert type: {kind}")]
    UnsupportedTarget { kind: String },

    /// Dashboard type with no payload builder.
    #[error("unsupported dashboard type: {kind}")]
    UnsupportedDashboard { kind: String },
}
