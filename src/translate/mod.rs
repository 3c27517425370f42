//! Cross-vendor query translation
//!
//! Converts search-style and PromQL/LogQL-style queries into the log and metric
//! rollup syntax of the alerting vendor, and reconciles dashboard layouts
//! between grid conventions.

pub mod layout;
pub mod render;
pub mod shape;
pub mod threshold;

use crate::defaults::Defaults;
use serde::{Deserialize, Serialize};
use shape::{classify, looks_like_search, match_fragment, QueryShape};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use layout::{reconcile_dashboard_layout, PanelSpec, PositionedWidget, QueryRef};
pub use threshold::{extract_threshold, threshold_or_default};

/// Query language of the incoming query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceDialect {
    /// `index=* "term" NOT "term"` search syntax
    Search,
    /// Rate, ratio, absence and count expressions over labeled streams
    TimeSeries,
}

impl SourceDialect {
    /// Search queries name an index; everything else is treated as time series.
    pub fn detect(query: &str) -> Self {
        if looks_like_search(query) {
            SourceDialect::Search
        } else {
            SourceDialect::TimeSeries
        }
    }
}

impl FromStr for SourceDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" | "splunk" => Ok(SourceDialect::Search),
            "time-series" | "timeseries" | "promql" | "logql" => Ok(SourceDialect::TimeSeries),
            other => Err(format!("unknown source dialect: {}", other)),
        }
    }
}

/// Query language of the produced query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetDialect {
    /// Log rollups and metric queries for Datadog monitors
    #[default]
    Datadog,
}

impl FromStr for TargetDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "datadog" => Ok(TargetDialect::Datadog),
            other => Err(format!("unknown target dialect: {}", other)),
        }
    }
}

/// A target-dialect query; never empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TranslatedQuery(String);

impl TranslatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TranslatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Translator bound to a set of defaults
#[derive(Debug, Clone, Default)]
pub struct QueryTranslator {
    defaults: Defaults,
}

impl QueryTranslator {
    pub fn new(defaults: Defaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Recognize the structure of `query` without rendering it.
    pub fn classify(&self, query: &str, source: SourceDialect) -> QueryShape {
        classify(query, source)
    }

    /// Translate `query` compared against `threshold`.
    ///
    /// Unrecognized input yields the fallback query, so the result is always a
    /// complete target-dialect query.
    pub fn translate(
        &self,
        query: &str,
        threshold: f64,
        source: SourceDialect,
        target: TargetDialect,
    ) -> TranslatedQuery {
        let shape = classify(query, source);
        let rendered = match target {
            TargetDialect::Datadog => render::render_shape(&shape, threshold, &self.defaults),
        };
        debug!(shape = shape.name(), query, translated = %rendered, "translated query");

        if rendered.trim().is_empty() {
            return TranslatedQuery(self.defaults.fallback_query(threshold));
        }
        TranslatedQuery(rendered)
    }

    /// Translate with the source dialect detected from the query text.
    pub fn translate_detected(&self, query: &str, threshold: f64) -> TranslatedQuery {
        self.translate(
            query,
            threshold,
            SourceDialect::detect(query),
            TargetDialect::Datadog,
        )
    }

    /// Translate a dashboard series expression (no comparison).
    ///
    /// Expressions that are not a single recognized fragment pass through as-is.
    pub fn translate_series(&self, expr: &str) -> String {
        match match_fragment(expr) {
            Some(fragment) => render::render_fragment(&fragment, &self.defaults),
            None => expr.to_string(),
        }
    }
}

/// Translate with the default constants.
pub fn translate_query(
    query: &str,
    threshold: f64,
    source: SourceDialect,
    target: TargetDialect,
) -> TranslatedQuery {
    QueryTranslator::default().translate(query, threshold, source, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dialect() {
        assert_eq!(SourceDialect::detect("index=* \"x\""), SourceDialect::Search);
        assert_eq!(SourceDialect::detect("rate(x[5m])"), SourceDialect::TimeSeries);
        assert_eq!(SourceDialect::detect("index = * \"x\""), SourceDialect::Search);
        assert_eq!(SourceDialect::detect(r#"rate({index="logs"}[5m])"#), SourceDialect::TimeSeries);
    }

    #[test]
    fn test_spaced_search_keeps_terms() {
        let out = QueryTranslator::default().translate_detected("index = * \"error\"", 3.0);
        assert_eq!(
            out.as_str(),
            r#"logs("error").index("*").rollup("count").last("15m") > 3"#
        );
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("splunk".parse::<SourceDialect>().unwrap(), SourceDialect::Search);
        assert_eq!("PromQL".parse::<SourceDialect>().unwrap(), SourceDialect::TimeSeries);
        assert!("sql".parse::<SourceDialect>().is_err());
        assert_eq!("datadog".parse::<TargetDialect>().unwrap(), TargetDialect::Datadog);
    }

    #[test]
    fn test_search_translation_keeps_terms_and_threshold() {
        let out = translate_query(
            r#"index=* "error" NOT "timeout""#,
            12.5,
            SourceDialect::Search,
            TargetDialect::Datadog,
        );
        let text = out.as_str();
        assert!(text.contains("error"));
        assert!(text.contains(r#"-\"timeout\""#));
        assert!(text.ends_with("> 12.5"));
    }

    #[test]
    fn test_translation_is_never_empty() {
        for query in ["", "   ", "???", "index=*", "rate(", "absent()"] {
            for dialect in [SourceDialect::Search, SourceDialect::TimeSeries] {
                let out = translate_query(query, 1.0, dialect, TargetDialect::Datadog);
                assert!(!out.as_str().is_empty(), "empty output for {:?}", query);
            }
        }
    }

    #[test]
    fn test_translation_is_deterministic() {
        let query = r#"sum(rate(span_count{status_code="ERROR"}[5m])) / sum(rate(span_count[5m]))"#;
        let first = translate_query(query, 1.0, SourceDialect::TimeSeries, TargetDialect::Datadog);
        let second = translate_query(query, 1.0, SourceDialect::TimeSeries, TargetDialect::Datadog);
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_fallback_window() {
        let defaults = Defaults {
            fallback_window: "30m".to_string(),
            ..Defaults::default()
        };
        let translator = QueryTranslator::new(defaults);
        let out = translator.translate_detected("something odd", 2.0);
        assert_eq!(out.to_string(), r#"logs("*").index("*").rollup("count").last("30m") > 2"#);
    }

    #[test]
    fn test_translate_series_passes_unknown_through() {
        let translator = QueryTranslator::default();
        assert_eq!(
            translator.translate_series(r#"sum(rate(http_requests_total{service="api"}[5m]))"#),
            "sum(last_5m):sum:http_requests_total{service:api}.as_count()"
        );
        assert_eq!(
            translator.translate_series("histogram_quantile(0.95, x)"),
            "histogram_quantile(0.95, x)"
        );
    }
}
