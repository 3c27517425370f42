//! Block grammar of a fresh LLM response
//!
//! ~~~text
//! FILE: <name>              ALERT: <name>             DASHBOARD: <name>
//! LINE: <n>                 TYPE: <type>              TYPE: <type>
//! SUGGESTION:               PRIORITY: <p>             PRIORITY: <p>
//! ```diff                   QUERY:                    QUERIES:
//! <diff>                    ```                       ```json ... ```
//! ```                       <query>                   PANELS:
//!                           ```                       ```json ... ```
//!                           DESCRIPTION: ...          ALERTS:
//!                           THRESHOLD: ...            ```json ... ```
//!                           ...
//! SUMMARY: <free text>
//! ~~~
//!
//! Malformed blocks are skipped. A response carrying the `LGTM` marker yields
//! no suggestions of any kind.

use super::{AlertSuggestion, DashboardSuggestion, FileSuggestion, SuggestionBatch};
use crate::text::{
    compile, contains_no_changes_marker, extract_actual_content, fenced_block_at, FencedBlock,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static FILE_BLOCK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"FILE: (.+?)\nLINE: (\d+)\nSUGGESTION:\n```diff\n((?s:.*?))```")
});

static ALERT_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"ALERT: (.+?)\nTYPE: (.+?)\nPRIORITY: (.+?)\nQUERY:\n")
});

static DASHBOARD_HEADER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"DASHBOARD: (.+?)\nTYPE: (.+?)\nPRIORITY: (.+?)\nQUERIES:\n")
});

static SUMMARY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?s)SUMMARY:\s*(.*?)(?:\n\n#|\n\n(?:FILE|ALERT|DASHBOARD):|\z)")
});

/// Extract `FILE/LINE/SUGGESTION` blocks in order of appearance.
pub fn extract_file_suggestions(text: &str) -> Vec<FileSuggestion> {
    if contains_no_changes_marker(text) {
        return Vec::new();
    }
    let Some(re) = FILE_BLOCK.as_ref() else {
        return Vec::new();
    };

    re.captures_iter(text)
        .map(|caps| FileSuggestion {
            file_name: caps[1].trim().to_string(),
            line_number: caps[2].to_string(),
            content: extract_actual_content(&caps[3]),
        })
        .collect()
}

/// Extract `ALERT:` blocks in order of appearance.
///
/// Name, type, priority and a fenced query are required. The remaining fields
/// are read from labeled lines between the query and the next alert header and
/// default to empty strings.
pub fn extract_alert_suggestions(text: &str) -> Vec<AlertSuggestion> {
    if contains_no_changes_marker(text) {
        return Vec::new();
    }
    let Some(re) = ALERT_HEADER.as_ref() else {
        return Vec::new();
    };

    let headers: Vec<_> = re.captures_iter(text).collect();
    let mut alerts = Vec::new();
    let mut consumed = 0;

    for (i, caps) in headers.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < consumed {
            continue;
        }
        let name = caps[1].trim();
        if name.is_empty() {
            debug!("skipping alert block without a name");
            continue;
        }
        let Some(query) = fenced_block_at(text, whole.end()) else {
            debug!(alert = name, "skipping alert block without a fenced query");
            continue;
        };

        // Fields belong to this alert until the next header that starts after the query
        let segment_end = headers[i + 1..]
            .iter()
            .filter_map(|next| next.get(0))
            .map(|m| m.start())
            .find(|&start| start >= query.end)
            .unwrap_or(text.len());
        let fields = &text[query.end..segment_end];
        consumed = query.end;

        // Older prompts used a bare RUNBOOK label
        let runbook = labeled_line(fields, "RUNBOOK_LINK")
            .or_else(|| labeled_line(fields, "RUNBOOK"))
            .unwrap_or_default();

        alerts.push(AlertSuggestion {
            name: name.to_string(),
            kind: caps[2].trim().to_string(),
            priority: caps[3].trim().to_string(),
            query: query.body.trim().to_string(),
            description: labeled_line(fields, "DESCRIPTION").unwrap_or_default(),
            threshold: labeled_line(fields, "THRESHOLD").unwrap_or_default(),
            duration: labeled_line(fields, "DURATION").unwrap_or_default(),
            notification: labeled_line(fields, "NOTIFICATION").unwrap_or_default(),
            runbook_link: runbook,
        });
    }

    alerts
}

/// Value of the first line in `fields` that starts with `LABEL:`.
fn labeled_line(fields: &str, label: &str) -> Option<String> {
    fields.lines().find_map(|line| {
        line.strip_prefix(label)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|value| value.trim().to_string())
    })
}

/// Extract `DASHBOARD:` blocks in order of appearance.
///
/// The `QUERIES`, `PANELS` and `ALERTS` sections must follow the header
/// contiguously, each as a ```` ```json ```` fence. Their bodies are sliced out
/// byte for byte. A block missing any of them produces nothing.
pub fn extract_dashboard_suggestions(text: &str) -> Vec<DashboardSuggestion> {
    if contains_no_changes_marker(text) {
        return Vec::new();
    }
    let Some(re) = DASHBOARD_HEADER.as_ref() else {
        return Vec::new();
    };

    let mut dashboards = Vec::new();
    let mut consumed = 0;

    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() < consumed {
            continue;
        }
        let name = caps[1].trim();
        let Some((sections, end)) = json_sections(text, whole.end()) else {
            debug!(dashboard = name, "skipping dashboard block with missing sections");
            continue;
        };
        consumed = end;

        let [queries, panels, alerts] = sections;
        dashboards.push(DashboardSuggestion {
            name: name.to_string(),
            kind: caps[2].trim().to_string(),
            priority: caps[3].trim().to_string(),
            queries: queries.to_string(),
            panels: panels.to_string(),
            alerts: alerts.to_string(),
        });
    }

    dashboards
}

/// Read the three contiguous json fences of a dashboard block.
fn json_sections(text: &str, start: usize) -> Option<([&str; 3], usize)> {
    let queries = json_fence(text, start)?;
    let panels_at = after_label(text, queries.end, "\nPANELS:\n")?;
    let panels = json_fence(text, panels_at)?;
    let alerts_at = after_label(text, panels.end, "\nALERTS:\n")?;
    let alerts = json_fence(text, alerts_at)?;
    Some(([queries.body, panels.body, alerts.body], alerts.end))
}

fn json_fence(text: &str, pos: usize) -> Option<FencedBlock<'_>> {
    fenced_block_at(text, pos).filter(|block| block.tag == "json")
}

fn after_label(text: &str, pos: usize, label: &str) -> Option<usize> {
    text.get(pos..)?.starts_with(label).then_some(pos + label.len())
}

/// Text after `SUMMARY:` up to the next heading, block label or the end.
///
/// Returns an empty string when there is no summary. The `LGTM` marker does not
/// suppress the summary.
pub fn extract_summary(text: &str) -> String {
    SUMMARY
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Run every extractor over one response.
pub fn extract_batch(text: &str) -> SuggestionBatch {
    SuggestionBatch {
        files: extract_file_suggestions(text),
        alerts: extract_alert_suggestions(text),
        dashboards: extract_dashboard_suggestions(text),
        summary: extract_summary(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_RESPONSE: &str = "## Observability Review\n\n\
FILE: services/payment.py\n\
LINE: 42\n\
SUGGESTION:\n\
```diff\n\
+ logger.info(\"payment started\", extra={\"order_id\": order_id})\n\
+ span.set_attribute(\"order.id\", order_id)\n\
```\n\n\
FILE: routes/refund_routes.py\n\
LINE: 7\n\
SUGGESTION:\n\
```diff\n\
--- a/routes/refund_routes.py\n\
+++ b/routes/refund_routes.py\n\
 def refund():\n\
+    metrics.increment(\"refund.requested\")\n\
```\n\n\
SUMMARY: Added structured logging to payments\nand a refund counter.\n";

    const ALERT_RESPONSE: &str = "## Alert Suggestions\n\n\
ALERT: High Error Rate\n\
TYPE: metric\n\
PRIORITY: P1\n\
QUERY:\n\
```\n\
sum(rate(span_count{status_code=\"ERROR\"}[5m])) / sum(rate(span_count[5m])) > 0.05\n\
```\n\
DESCRIPTION: Error ratio above five percent\n\
THRESHOLD: > 0.05\n\
DURATION: 5m\n\
NOTIFICATION: slack-sre-channel\n\
RUNBOOK_LINK: https://runbooks.example.com/errors\n\n\
ALERT: Refund Failures\n\
TYPE: log\n\
PRIORITY: P2\n\
QUERY:\n\
```splunk\n\
index=* \"refund\" \"failed\" NOT \"test\"\n\
```\n\
THRESHOLD: any\n\n\
SUMMARY:\nTwo alerts covering error ratio and refunds.";

    fn dashboard_block(name: &str) -> String {
        format!(
            "DASHBOARD: {name}\n\
TYPE: grafana\n\
PRIORITY: High\n\
QUERIES:\n\
```json\n\
[\n  {{\"refId\": \"A\", \"expr\": \"sum(rate(http_requests_total[5m]))\"}}\n]\n\
```\n\
PANELS:\n\
```json\n\
[{{\"title\": \"Request Rate\", \"gridPos\": {{\"h\": 8, \"w\": 12, \"x\": 0, \"y\": 0}}, \"targets\": [\"A\"]}}]\n\
```\n\
ALERTS:\n\
```json\n\
[]\n\
```\n"
        )
    }

    #[test]
    fn test_file_suggestions_in_order() {
        let files = extract_file_suggestions(FILE_RESPONSE);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "services/payment.py");
        assert_eq!(files[0].line_number, "42");
        assert_eq!(
            files[0].content,
            "logger.info(\"payment started\", extra={\"order_id\": order_id})\nspan.set_attribute(\"order.id\", order_id)"
        );
        assert_eq!(files[1].file_name, "routes/refund_routes.py");
        assert_eq!(files[1].content, "metrics.increment(\"refund.requested\")");
    }

    #[test]
    fn test_file_content_never_starts_with_plus() {
        for file in extract_file_suggestions(FILE_RESPONSE) {
            assert!(file.content.lines().all(|line| !line.starts_with('+')));

            let rewrapped = format!(
                "FILE: {}\nLINE: {}\nSUGGESTION:\n```diff\n{}\n```",
                file.file_name,
                file.line_number,
                file.content
                    .lines()
                    .map(|line| format!("+{}", line))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            let again = extract_file_suggestions(&rewrapped);
            assert_eq!(again[0].content, file.content);
        }
    }

    #[test]
    fn test_file_block_with_empty_diff() {
        let text = "FILE: a.rs\nLINE: 1\nSUGGESTION:\n```diff\n```";
        let files = extract_file_suggestions(text);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, "");
    }

    #[test]
    fn test_malformed_file_blocks_are_skipped() {
        let text = "LINE: 3\nFILE: wrong_order.py\nSUGGESTION:\n```diff\n+x\n```\n\
FILE: no_fence.py\nLINE: 4\nSUGGESTION:\n+y\n\
file: lower.py\nLINE: 5\nSUGGESTION:\n```diff\n+z\n```";
        assert!(extract_file_suggestions(text).is_empty());
    }

    #[test]
    fn test_lgtm_suppresses_everything() {
        let text = format!("{}\n{}\n{}\nLGTM", FILE_RESPONSE, ALERT_RESPONSE, dashboard_block("d"));
        assert!(extract_file_suggestions(&text).is_empty());
        assert!(extract_alert_suggestions(&text).is_empty());
        assert!(extract_dashboard_suggestions(&text).is_empty());

        let inside = FILE_RESPONSE.replace("payment started", "LGTM otherwise");
        assert!(extract_file_suggestions(&inside).is_empty());
    }

    #[test]
    fn test_alert_blocks_with_fields() {
        let alerts = extract_alert_suggestions(ALERT_RESPONSE);
        assert_eq!(alerts.len(), 2);

        let first = &alerts[0];
        assert_eq!(first.name, "High Error Rate");
        assert_eq!(first.kind, "metric");
        assert_eq!(first.priority, "P1");
        assert_eq!(
            first.query,
            "sum(rate(span_count{status_code=\"ERROR\"}[5m])) / sum(rate(span_count[5m])) > 0.05"
        );
        assert_eq!(first.description, "Error ratio above five percent");
        assert_eq!(first.threshold, "> 0.05");
        assert_eq!(first.duration, "5m");
        assert_eq!(first.notification, "slack-sre-channel");
        assert_eq!(first.runbook_link, "https://runbooks.example.com/errors");

        let second = &alerts[1];
        assert_eq!(second.name, "Refund Failures");
        assert_eq!(second.query, "index=* \"refund\" \"failed\" NOT \"test\"");
        assert_eq!(second.threshold, "any");
        // Missing fields default to empty, and never leak from the previous alert
        assert_eq!(second.description, "");
        assert_eq!(second.runbook_link, "");
    }

    #[test]
    fn test_alert_without_query_fence_is_dropped() {
        let text = "ALERT: Broken\nTYPE: log\nPRIORITY: P2\nQUERY:\nindex=* \"x\"\n\
DESCRIPTION: no fence\n\n\
ALERT: Fine\nTYPE: log\nPRIORITY: P3\nQUERY:\n```\nindex=* \"y\"\n```\n";
        let alerts = extract_alert_suggestions(text);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Fine");
    }

    #[test]
    fn test_alert_labels_are_case_sensitive() {
        let text = "alert: Quiet\nTYPE: log\nPRIORITY: P3\nQUERY:\n```\nx\n```\n";
        assert!(extract_alert_suggestions(text).is_empty());
    }

    #[test]
    fn test_alert_runbook_short_label() {
        let text = "ALERT: Disk\nTYPE: metric\nPRIORITY: low\nQUERY:\n```\nnode_disk_free < 10\n```\nRUNBOOK: https://wiki/disk\n";
        let alerts = extract_alert_suggestions(text);
        assert_eq!(alerts[0].runbook_link, "https://wiki/disk");
    }

    #[test]
    fn test_dashboard_sections_are_sliced_exactly() {
        let text = format!("Intro\n\n{}\n{}", dashboard_block("API Overview"), dashboard_block("Refunds"));
        let dashboards = extract_dashboard_suggestions(&text);
        assert_eq!(dashboards.len(), 2);
        assert_eq!(dashboards[0].name, "API Overview");
        assert_eq!(dashboards[0].kind, "grafana");
        assert_eq!(dashboards[0].priority, "High");
        assert_eq!(
            dashboards[0].queries,
            "[\n  {\"refId\": \"A\", \"expr\": \"sum(rate(http_requests_total[5m]))\"}\n]\n"
        );
        assert_eq!(dashboards[0].alerts, "[]\n");
        assert_eq!(dashboards[1].name, "Refunds");
    }

    #[test]
    fn test_dashboard_missing_section_produces_nothing() {
        let block = dashboard_block("Partial");
        let cut = block.find("ALERTS:").unwrap();
        let partial = &block[..cut];
        assert!(extract_dashboard_suggestions(partial).is_empty());

        // A broken block must not swallow the valid one after it
        let text = format!("{}\n{}", partial, dashboard_block("Whole"));
        let dashboards = extract_dashboard_suggestions(&text);
        assert_eq!(dashboards.len(), 1);
        assert_eq!(dashboards[0].name, "Whole");
    }

    #[test]
    fn test_summary_stops_at_section_boundary() {
        assert_eq!(
            extract_summary(FILE_RESPONSE),
            "Added structured logging to payments\nand a refund counter."
        );
        let text = "SUMMARY: First pass.\n\n## Details\nmore";
        assert_eq!(extract_summary(text), "First pass.");
        let text = "SUMMARY: Before files.\n\nFILE: a.py\nLINE: 1";
        assert_eq!(extract_summary(text), "Before files.");
    }

    #[test]
    fn test_summary_absent_is_empty() {
        assert_eq!(extract_summary("nothing to see"), "");
        assert_eq!(extract_summary("LGTM\nSUMMARY: all good"), "all good");
    }

    #[test]
    fn test_batch_collects_everything() {
        let text = format!("{}\n\n{}", dashboard_block("Ops"), ALERT_RESPONSE);
        let batch = extract_batch(&text);
        assert_eq!(batch.dashboards.len(), 1);
        assert_eq!(batch.alerts.len(), 2);
        assert!(batch.files.is_empty());
        assert_eq!(batch.summary, "Two alerts covering error ratio and refunds.");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        assert_eq!(extract_batch(ALERT_RESPONSE), extract_batch(ALERT_RESPONSE));
    }
}
