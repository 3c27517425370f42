//! Threshold extraction from free text
//!
//! Alert suggestions carry thresholds as prose ("> 5", "0.05", "fires on any
//! match"). Vendor payloads need a number.

use crate::error::{PrismError, PrismResult};
use crate::text::compile;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

static LEADING_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"^\s*(?:[<>]=?\s*)?(\d+(?:\.\d+)?)"));

/// Value returned for "any"-style thresholds.
pub const ANY_MATCH_THRESHOLD: f64 = 1.0;

/// Read a threshold from text.
///
/// Tries a leading `>`/`<` comparator or a bare leading number, then the
/// case-insensitive keyword "any" (which means `1.0`). Anything else is
/// `ThresholdNotFound`.
pub fn extract_threshold(text: &str) -> PrismResult<f64> {
    let number = LEADING_NUMBER
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    if let Some(value) = number {
        return Ok(value);
    }

    if text.to_lowercase().contains("any") {
        return Ok(ANY_MATCH_THRESHOLD);
    }

    Err(PrismError::ThresholdNotFound {
        text: text.to_string(),
    })
}

/// Read a threshold, substituting `default` (with a warning) when none is found.
pub fn threshold_or_default(text: &str, default: f64) -> f64 {
    match extract_threshold(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, default, "using default threshold");
            default
        }
    }
}
