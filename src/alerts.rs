//! Alert payloads for the supported alerting backends
//!
//! Nothing here talks to a network. Each builder turns an `AlertSuggestion`
//! into the document a backend accepts; submitting it is the caller's job.

use crate::error::{PrismError, PrismResult};
use crate::suggest::AlertSuggestion;
use crate::translate::{threshold_or_default, QueryTranslator, SourceDialect, TargetDialect};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Backend an alert is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertTarget {
    Prometheus,
    Datadog,
}

impl AlertTarget {
    /// Route by the suggestion's free-form type.
    pub fn for_type(kind: &str) -> PrismResult<Self> {
        match kind.trim().to_lowercase().as_str() {
            "prometheus" | "metric" => Ok(AlertTarget::Prometheus),
            "datadog" | "log" => Ok(AlertTarget::Datadog),
            _ => Err(PrismError::UnsupportedTarget {
                kind: kind.to_string(),
            }),
        }
    }
}

/// Priority scale used by Datadog monitors (1 highest, 5 lowest)
pub fn monitor_priority(label: &str) -> i64 {
    match label.trim().to_lowercase().as_str() {
        "p1" | "critical" | "high" => 1,
        "p2" | "warning" | "medium" => 3,
        "p3" | "low" => 5,
        _ => 3,
    }
}

/// Prometheus alerting rule file containing this single alert.
pub fn build_prometheus_rule(alert: &AlertSuggestion) -> String {
    format!(
        "groups:\n\
         - name: {group}\n\
         \x20 rules:\n\
         \x20 - alert: {name}\n\
         \x20   expr: {expr}\n\
         \x20   for: {duration}\n\
         \x20   labels:\n\
         \x20     severity: {severity}\n\
         \x20     type: {group}\n\
         \x20   annotations:\n\
         \x20     summary: \"{summary}\"\n\
         \x20     description: \"{description}\"\n\
         \x20     runbook_url: \"{runbook}\"\n",
        group = alert.kind,
        name = alert.name,
        expr = alert.query,
        duration = alert.duration,
        severity = alert.priority.to_lowercase(),
        summary = yaml_quoted(&alert.name),
        description = yaml_quoted(&alert.description),
        runbook = yaml_quoted(&alert.runbook_link),
    )
}

/// Escape for a YAML double-quoted scalar.
fn yaml_quoted(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Notification body shared by monitors.
pub fn format_monitor_message(alert: &AlertSuggestion) -> String {
    let mut message = format!(
        "{{{{#is_alert}}}}\n{}\n{{{{/is_alert}}}}\n\nPriority: {}\n",
        alert.description, alert.priority
    );
    if !alert.notification.is_empty() {
        message.push_str(&format!("\nNotifications: {}\n", alert.notification));
    }
    if !alert.runbook_link.is_empty() {
        message.push_str(&format!("\nRunbook: {}\n", alert.runbook_link));
    }
    message
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorThresholds {
    pub critical: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorOptions {
    pub notify_no_data: bool,
    pub renotify_interval: i64,
    pub evaluation_delay: i64,
    pub timeout_h: i64,
    pub escalation_message: String,
    pub thresholds: MonitorThresholds,
}

/// Body of a Datadog "create monitor" request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatadogMonitor {
    pub name: String,
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub query: String,
    pub message: String,
    pub priority: i64,
    pub options: MonitorOptions,
    pub tags: Vec<String>,
}

const LOG_MONITOR: &str = "log alert";
const METRIC_MONITOR: &str = "query alert";

/// Build a monitor, translating the query and resolving the threshold.
///
/// Queries made only of metric selectors become metric monitors; anything
/// touching a log stream or search stays a log monitor. An unreadable
/// threshold falls back to the translator's default.
pub fn build_datadog_monitor(alert: &AlertSuggestion, translator: &QueryTranslator) -> DatadogMonitor {
    let threshold = threshold_or_default(&alert.threshold, translator.defaults().threshold);
    let source = SourceDialect::detect(&alert.query);
    let monitor_type = if translator.classify(&alert.query, source).is_metric() {
        METRIC_MONITOR
    } else {
        LOG_MONITOR
    };
    let query = translator.translate(&alert.query, threshold, source, TargetDialect::Datadog);
    info!(
        alert = %alert.name,
        monitor_type,
        threshold,
        original = %alert.query,
        converted = %query,
        "built monitor"
    );

    DatadogMonitor {
        name: alert.name.clone(),
        monitor_type: monitor_type.to_string(),
        query: query.into_string(),
        message: format_monitor_message(alert),
        priority: monitor_priority(&alert.priority),
        options: MonitorOptions {
            notify_no_data: false,
            renotify_interval: 60,
            evaluation_delay: 300,
            timeout_h: 0,
            escalation_message: format!("Alert still triggered for {}", alert.name),
            thresholds: MonitorThresholds {
                critical: threshold,
            },
        },
        tags: vec![
            format!("type:{}", alert.kind),
            "source:prism".to_string(),
            "auto-generated:true".to_string(),
        ],
    }
}

/// A ready-to-submit alert document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", content = "payload", rename_all = "lowercase")]
pub enum AlertPayload {
    Prometheus(String),
    Datadog(DatadogMonitor),
}

/// Route an alert and build its payload.
pub fn build_alert_payload(
    alert: &AlertSuggestion,
    translator: &QueryTranslator,
) -> PrismResult<AlertPayload> {
    Ok(match AlertTarget::for_type(&alert.kind)? {
        AlertTarget::Prometheus => AlertPayload::Prometheus(build_prometheus_rule(alert)),
        AlertTarget::Datadog => AlertPayload::Datadog(build_datadog_monitor(alert, translator)),
    })
}
