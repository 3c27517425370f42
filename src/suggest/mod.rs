//! Suggestion records extracted from LLM review output
//!
//! Two grammars produce the same records: the labeled block format the model
//! answers in (`parse`) and the markdown PR comments those records are posted
//! as (`comment`).

pub mod comment;
pub mod parse;

use serde::{Deserialize, Serialize};

pub use parse::{
    extract_alert_suggestions, extract_batch, extract_dashboard_suggestions,
    extract_file_suggestions, extract_summary,
};

/// An inline code change proposed for one line of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSuggestion {
    pub file_name: String,
    /// Decimal line number, kept as text
    pub line_number: String,
    /// Added lines of the diff with their `+` prefix removed
    pub content: String,
}

/// An alerting rule proposed for the code under review
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSuggestion {
    pub name: String,
    /// Free-form routing hint: "prometheus", "datadog", "metric", "log", ...
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: String,
    /// Query in the source dialect
    pub query: String,
    #[serde(default)]
    pub description: String,
    /// Comparator expression (`> 5`), bare number or keyword such as "any"
    #[serde(default)]
    pub threshold: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub notification: String,
    #[serde(default)]
    pub runbook_link: String,
}

impl AlertSuggestion {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, priority: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            priority: priority.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_threshold(mut self, threshold: impl Into<String>) -> Self {
        self.threshold = threshold.into();
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = duration.into();
        self
    }

    pub fn with_notification(mut self, notification: impl Into<String>) -> Self {
        self.notification = notification.into();
        self
    }

    pub fn with_runbook_link(mut self, link: impl Into<String>) -> Self {
        self.runbook_link = link.into();
        self
    }

    pub fn priority_bucket(&self) -> Priority {
        Priority::from_label(&self.priority)
    }
}

/// A dashboard proposal; the three JSON sections stay as raw text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSuggestion {
    pub name: String,
    /// "grafana", "amplitude" or "datadog"
    #[serde(rename = "type")]
    pub kind: String,
    pub priority: String,
    pub queries: String,
    pub panels: String,
    pub alerts: String,
}

/// Everything extracted from a single response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionBatch {
    pub files: Vec<FileSuggestion>,
    pub alerts: Vec<AlertSuggestion>,
    pub dashboards: Vec<DashboardSuggestion>,
    pub summary: String,
}

impl SuggestionBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.alerts.is_empty() && self.dashboards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len() + self.alerts.len() + self.dashboards.len()
    }
}

/// Priority bucket for free-text priority labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Case-insensitive bucket; unknown labels land in `Medium`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "p0" | "p1" | "critical" => Priority::Critical,
            "p2" | "high" => Priority::High,
            "p3" | "medium" => Priority::Medium,
            "p4" | "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }

    /// Numeric level, 1 is most urgent
    pub fn level(&self) -> u8 {
        match self {
            Priority::Critical => 1,
            Priority::High => 2,
            Priority::Medium => 3,
            Priority::Low => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}
