//! PR comment rendering and re-parsing
//!
//! Suggestions posted to a pull request are markdown comments. When a reviewer
//! later asks to create one of them by name, the comment text is the only
//! record left, so it is parsed back into the same suggestion types.
//!
//! Round-trip notes: plain sections are trimmed, and a field value containing
//! a blank line followed by `### ` ends its section early.

use super::{AlertSuggestion, DashboardSuggestion, FileSuggestion};
use crate::text::{compile, contains_no_changes_marker, fenced_block_at};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::debug;

pub const ALERT_HEADING: &str = "## Alert Suggestion: ";
pub const DASHBOARD_HEADING: &str = "## Dashboard Suggestion: ";

static CREATE_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"<!-- (ALERT|DASHBOARD)_CREATE:([^:\n]*):(.*?) -->")
});

static LINK: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"^\[[^\]]*\]\((.*)\)$"));

/// Which kind of suggestion a comment or marker refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Alert,
    Dashboard,
}

impl CommentKind {
    fn heading(&self) -> &'static str {
        match self {
            CommentKind::Alert => ALERT_HEADING,
            CommentKind::Dashboard => DASHBOARD_HEADING,
        }
    }

    fn command(&self) -> &'static str {
        match self {
            CommentKind::Alert => "alert",
            CommentKind::Dashboard => "dashboard",
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            CommentKind::Alert => "alerts",
            CommentKind::Dashboard => "dashboards",
        }
    }
}

/// Hidden `<!-- KIND_CREATE:type:name -->` marker left in each comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMarker {
    pub kind: CommentKind,
    pub suggestion_type: String,
    pub name: String,
}

// ============================================================================
// Rendering
// ============================================================================

pub fn render_alert_comment(alert: &AlertSuggestion) -> String {
    let mut body = String::new();
    let _ = write!(body, "{}{}\n\n", ALERT_HEADING, alert.name);
    let _ = writeln!(body, "**Type:** {}", alert.kind);
    let _ = write!(body, "**Priority:** {}\n\n", alert.priority);

    let _ = write!(body, "### Query\n```json\n{}\n```\n\n", alert.query);
    let _ = write!(body, "### Description\n{}\n\n", alert.description);
    let _ = write!(body, "### Threshold\n{}\n\n", alert.threshold);
    let _ = write!(body, "### Duration\n{}\n\n", alert.duration);
    let _ = write!(body, "### Notification\n{}\n\n", alert.notification);
    if !alert.runbook_link.is_empty() {
        let _ = write!(body, "### Runbook\n[Link to Runbook]({})\n\n", alert.runbook_link);
    }

    body.push_str(&create_details(CommentKind::Alert, &alert.kind, &alert.name));
    body
}

pub fn render_dashboard_comment(dashboard: &DashboardSuggestion) -> String {
    let mut body = String::new();
    let _ = write!(body, "{}{}\n\n", DASHBOARD_HEADING, dashboard.name);
    let _ = writeln!(body, "**Type:** {}", dashboard.kind);
    let _ = write!(body, "**Priority:** {}\n\n", dashboard.priority);

    let _ = write!(body, "### Queries\n```json\n{}\n```\n\n", dashboard.queries);
    let _ = write!(body, "### Panels\n```json\n{}\n```\n\n", dashboard.panels);
    let _ = write!(body, "### Alerts\n```json\n{}\n```\n\n", dashboard.alerts);

    body.push_str(&create_details(
        CommentKind::Dashboard,
        &dashboard.kind,
        &dashboard.name,
    ));
    body
}

fn create_details(kind: CommentKind, suggestion_type: &str, name: &str) -> String {
    let command = kind.command();
    format!(
        "<details>\n<summary>Click to create this {command}</summary>\n\n\
         To create this {command}, comment with:\n\n`prism {command} --create {name}`\n\n\
         <!-- {marker}_CREATE:{suggestion_type}:{name} -->\n</details>\n",
        marker = command.to_uppercase(),
    )
}

/// Trailing comment offering to create every suggestion of one kind.
pub fn render_create_all_comment(kind: CommentKind) -> String {
    let plural = kind.plural();
    let title = match kind {
        CommentKind::Alert => "Alerts",
        CommentKind::Dashboard => "Dashboards",
    };
    format!(
        "## Create All {title}\n\nTo create all suggested {plural}, comment with:\n\n`prism {} --create-all`\n\n",
        kind.command()
    )
}

/// Body of an inline review comment GitHub renders as an applicable suggestion.
pub fn render_inline_suggestion(file: &FileSuggestion) -> String {
    format!("```suggestion\n{}\n```", file.content)
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one alert comment. Returns `None` when the heading or name is missing.
pub fn parse_alert_comment(comment: &str) -> Option<AlertSuggestion> {
    let name = heading_value(comment, ALERT_HEADING)?;

    let runbook = section(comment, "Runbook")
        .map(unwrap_link)
        .unwrap_or_default();

    Some(AlertSuggestion {
        name,
        kind: bold_field(comment, "Type").unwrap_or_default(),
        priority: bold_field(comment, "Priority").unwrap_or_default(),
        query: fenced_section(comment, "Query").unwrap_or_default(),
        description: section(comment, "Description").unwrap_or_default(),
        threshold: section(comment, "Threshold").unwrap_or_default(),
        duration: section(comment, "Duration").unwrap_or_default(),
        notification: section(comment, "Notification").unwrap_or_default(),
        runbook_link: runbook,
    })
}

/// Parse one dashboard comment. Name and type are required; priority falls
/// back to "medium".
pub fn parse_dashboard_comment(comment: &str) -> Option<DashboardSuggestion> {
    let name = heading_value(comment, DASHBOARD_HEADING)?;
    let Some(kind) = bold_field(comment, "Type").filter(|t| !t.is_empty()) else {
        debug!(dashboard = %name, "dashboard comment has no type");
        return None;
    };

    Some(DashboardSuggestion {
        name,
        kind,
        priority: bold_field(comment, "Priority")
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "medium".to_string()),
        queries: fenced_section(comment, "Queries").unwrap_or_default(),
        panels: fenced_section(comment, "Panels").unwrap_or_default(),
        alerts: fenced_section(comment, "Alerts").unwrap_or_default(),
    })
}

/// Parse every alert comment found in `text`, in order.
pub fn extract_alert_suggestions_from_comments(text: &str) -> Vec<AlertSuggestion> {
    if contains_no_changes_marker(text) {
        return Vec::new();
    }
    split_comment_blocks(text, CommentKind::Alert)
        .into_iter()
        .filter_map(parse_alert_comment)
        .collect()
}

/// Parse every dashboard comment found in `text`, in order.
pub fn extract_dashboard_suggestions_from_comments(text: &str) -> Vec<DashboardSuggestion> {
    if contains_no_changes_marker(text) {
        return Vec::new();
    }
    split_comment_blocks(text, CommentKind::Dashboard)
        .into_iter()
        .filter_map(parse_dashboard_comment)
        .collect()
}

/// Split concatenated comments at each heading of `kind` that opens a line.
pub fn split_comment_blocks(text: &str, kind: CommentKind) -> Vec<&str> {
    let heading = kind.heading();
    let starts: Vec<usize> = text
        .match_indices(heading)
        .map(|(idx, _)| idx)
        .filter(|&idx| idx == 0 || text[..idx].ends_with('\n'))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(text.len());
            &text[start..end]
        })
        .collect()
}

/// Find the alert with exactly this name among posted comments.
pub fn find_alert_by_name<'a, I>(comments: I, name: &str) -> Option<AlertSuggestion>
where
    I: IntoIterator<Item = &'a str>,
{
    comments
        .into_iter()
        .flat_map(extract_alert_suggestions_from_comments)
        .find(|alert| alert.name == name)
}

/// Find the dashboard with exactly this name among posted comments.
pub fn find_dashboard_by_name<'a, I>(comments: I, name: &str) -> Option<DashboardSuggestion>
where
    I: IntoIterator<Item = &'a str>,
{
    comments
        .into_iter()
        .flat_map(extract_dashboard_suggestions_from_comments)
        .find(|dashboard| dashboard.name == name)
}

/// Every create marker in `text`, in order.
pub fn parse_create_markers(text: &str) -> Vec<CreateMarker> {
    let Some(re) = CREATE_MARKER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .map(|caps| CreateMarker {
            kind: if &caps[1] == "ALERT" {
                CommentKind::Alert
            } else {
                CommentKind::Dashboard
            },
            suggestion_type: caps[2].to_string(),
            name: caps[3].to_string(),
        })
        .collect()
}

fn heading_value(comment: &str, heading: &str) -> Option<String> {
    let line = comment.lines().find_map(|line| line.strip_prefix(heading))?;
    let name = line.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn bold_field(comment: &str, label: &str) -> Option<String> {
    let prefix = format!("**{}:**", label);
    comment
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(|value| value.trim().to_string())
}

/// Byte offset just past the `### <title>` line.
fn section_start(comment: &str, title: &str) -> Option<usize> {
    let header = format!("### {}\n", title);
    comment
        .match_indices(header.as_str())
        .map(|(idx, _)| idx)
        .find(|&idx| idx == 0 || comment[..idx].ends_with('\n'))
        .map(|idx| idx + header.len())
}

/// Plain section body up to the next section, the details block, or the end.
fn section(comment: &str, title: &str) -> Option<String> {
    let start = section_start(comment, title)?;
    let rest = &comment[start..];
    let end = ["\n\n### ", "\n\n<details>"]
        .iter()
        .filter_map(|stop| rest.find(stop))
        .min()
        .unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

/// Fenced section body with the single newline the renderer adds removed.
fn fenced_section(comment: &str, title: &str) -> Option<String> {
    let start = section_start(comment, title)?;
    let block = fenced_block_at(comment, start)?;
    let body = block.body.strip_suffix('\n').unwrap_or(block.body);
    Some(body.to_string())
}

fn unwrap_link(value: String) -> String {
    LINK.as_ref()
        .and_then(|re| re.captures(&value))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or(value)
}
