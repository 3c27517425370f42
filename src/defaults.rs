//! Named defaults for translation and layout
//!
//! Every fallback constant the translator or layout engine relies on lives
//! here so callers (and tests) can override them explicitly.

use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f64 = 1.0;
pub const DEFAULT_RATIO_THRESHOLD: f64 = 0.2;
pub const GRID_COLUMNS: u32 = 12;
pub const DEFAULT_WIDGET_HEIGHT: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Substituted when a threshold cannot be read from free text
    pub threshold: f64,
    /// Window for queries whose shape is not recognized
    pub fallback_window: String,
    /// Window for quoted-term search queries
    pub search_window: String,
    /// Window for `count(field=~"...")` queries
    pub count_window: String,
    /// Window for absence checks
    pub absence_window: String,
    /// Ratio threshold when the source expression carries none
    pub ratio_threshold: f64,
    pub widget_width: u32,
    pub widget_height: u32,
    pub grid_columns: u32,
    /// Search used for placeholder widgets and unresolved panels
    pub default_query: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            fallback_window: "15m".to_string(),
            search_window: "15m".to_string(),
            count_window: "5m".to_string(),
            absence_window: "24h".to_string(),
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            widget_width: GRID_COLUMNS,
            widget_height: DEFAULT_WIDGET_HEIGHT,
            grid_columns: GRID_COLUMNS,
            default_query: "*".to_string(),
        }
    }
}

impl Defaults {
    /// The query emitted when nothing else can be produced.
    ///
    /// Always a complete, non-empty target-dialect query.
    pub fn fallback_query(&self, threshold: f64) -> String {
        format!(
            "logs(\"{}\").index(\"*\").rollup(\"count\").last(\"{}\") > {}",
            self.default_query, self.fallback_window, threshold
        )
    }

    /// Rollup query used for placeholder dashboard widgets (no comparison).
    pub fn placeholder_widget_query(&self) -> String {
        format!(
            "logs(\"{}\").index(\"*\").rollup(\"count\").last(\"{}\")",
            self.default_query, self.fallback_window
        )
    }
}
