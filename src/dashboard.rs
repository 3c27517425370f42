//! Dashboard payloads for Datadog, Grafana and Amplitude
//!
//! The JSON sections of a `DashboardSuggestion` are opaque until this point.
//! They are parsed here and reshaped into each vendor's create-dashboard body.

use crate::error::{PrismError, PrismResult};
use crate::suggest::DashboardSuggestion;
use crate::text::{extract_json_from_text, strip_markdown_fences};
use crate::translate::layout::{panels_from_values, queries_from_values};
use crate::translate::{reconcile_dashboard_layout, QueryTranslator};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

/// Dashboard backend selected by the suggestion type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardTarget {
    Datadog,
    Grafana,
    Amplitude,
}

impl DashboardTarget {
    pub fn for_type(kind: &str) -> PrismResult<Self> {
        match kind.trim().to_lowercase().as_str() {
            "datadog" => Ok(DashboardTarget::Datadog),
            "grafana" => Ok(DashboardTarget::Grafana),
            "amplitude" => Ok(DashboardTarget::Amplitude),
            _ => Err(PrismError::UnsupportedDashboard {
                kind: kind.to_string(),
            }),
        }
    }
}

/// Parsed JSON sections of a dashboard suggestion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardSections {
    pub queries: Vec<Value>,
    pub panels: Vec<Value>,
    pub alerts: Vec<Value>,
}

impl DashboardSections {
    /// Parse all three sections; any invalid one is an error naming it.
    pub fn parse(dashboard: &DashboardSuggestion) -> PrismResult<Self> {
        Ok(Self {
            queries: parse_section("queries", &dashboard.queries)?,
            panels: parse_section("panels", &dashboard.panels)?,
            alerts: parse_section("alerts", &dashboard.alerts)?,
        })
    }
}

/// Sections may still carry their fence or a line of prose around the array.
fn parse_section(field: &'static str, raw: &str) -> PrismResult<Vec<Value>> {
    let body = strip_markdown_fences(raw);
    let body = extract_json_from_text(body).unwrap_or(body);
    serde_json::from_str(body).map_err(|source| PrismError::InvalidJson { field, source })
}

/// Build the create-dashboard body for the suggestion's backend.
pub fn build_dashboard_payload(
    dashboard: &DashboardSuggestion,
    translator: &QueryTranslator,
) -> PrismResult<Value> {
    let target = DashboardTarget::for_type(&dashboard.kind)?;
    let sections = DashboardSections::parse(dashboard)?;
    info!(
        dashboard = %dashboard.name,
        panels = sections.panels.len(),
        queries = sections.queries.len(),
        "building dashboard payload"
    );

    Ok(match target {
        DashboardTarget::Datadog => datadog_dashboard(&dashboard.name, &sections, translator),
        DashboardTarget::Grafana => grafana_dashboard(&dashboard.name, sections),
        DashboardTarget::Amplitude => amplitude_dashboard(&dashboard.name, &sections),
    })
}

/// Ordered Datadog dashboard of timeseries widgets placed by the layout engine.
pub fn datadog_dashboard(name: &str, sections: &DashboardSections, translator: &QueryTranslator) -> Value {
    let panels = panels_from_values(&sections.panels);
    let queries = queries_from_values(&sections.queries);
    let widgets: Vec<Value> = reconcile_dashboard_layout(&panels, &queries, translator.defaults())
        .into_iter()
        .map(|widget| {
            let requests: Vec<Value> = widget
                .queries
                .iter()
                .map(|expr| {
                    json!({
                        "q": translator.translate_series(expr),
                        "display_type": "line",
                        "style": {
                            "palette": "black_on_light_green",
                            "line_type": "solid",
                            "line_width": "normal"
                        }
                    })
                })
                .collect();
            json!({
                "definition": {
                    "type": "timeseries",
                    "title": widget.title,
                    "legend_size": "small",
                    "requests": requests
                },
                "layout": {
                    "x": widget.x,
                    "y": widget.y,
                    "width": widget.width,
                    "height": widget.height
                }
            })
        })
        .collect();

    json!({
        "title": name,
        "description": "Created by PRism",
        "layout_type": "ordered",
        "widgets": widgets,
        "template_variables": [
            {"name": "env", "prefix": "env", "default": "*"}
        ],
        "notify_list": []
    })
}

/// Grafana `POST /api/dashboards/db` body with string targets replaced by
/// their query objects.
pub fn grafana_dashboard(name: &str, sections: DashboardSections) -> Value {
    let by_ref: Map<String, Value> = sections
        .queries
        .iter()
        .filter_map(|query| {
            let ref_id = query.get("refId")?.as_str()?;
            Some((ref_id.to_string(), query.clone()))
        })
        .collect();

    let panels: Vec<Value> = sections
        .panels
        .into_iter()
        .map(|mut panel| {
            if let Some(targets) = panel.get_mut("targets").and_then(Value::as_array_mut) {
                for target in targets.iter_mut() {
                    let resolved = target.as_str().and_then(|id| by_ref.get(id)).cloned();
                    match resolved {
                        Some(query) => *target = query,
                        None => debug!(reference = %target, "grafana target left unresolved"),
                    }
                }
            }
            panel
        })
        .collect();

    json!({
        "dashboard": {
            "id": null,
            "title": name,
            "tags": ["auto-generated", "observability"],
            "timezone": "browser",
            "schemaVersion": 16,
            "version": 1,
            "refresh": "5s",
            "panels": panels
        },
        "folderId": 0,
        "overwrite": true
    })
}

/// Amplitude dashboard with one chart per panel.
pub fn amplitude_dashboard(name: &str, sections: &DashboardSections) -> Value {
    let queries = queries_from_values(&sections.queries);
    let charts: Vec<Value> = panels_from_values(&sections.panels)
        .into_iter()
        .map(|panel| {
            let chart_queries: Vec<Value> = panel
                .targets
                .iter()
                .filter_map(|target| queries.iter().find(|q| &q.ref_id == target))
                .map(|q| json!({"event_type": q.expr, "ref_id": q.ref_id}))
                .collect();
            json!({
                "name": panel.title,
                "type": amplitude_chart_type(&panel.kind),
                "queries": chart_queries
            })
        })
        .collect();

    json!({
        "name": name,
        "description": "Auto-generated from observability analysis",
        "charts": charts
    })
}

/// Map a Grafana panel type onto the closest Amplitude chart type.
pub fn amplitude_chart_type(panel_type: &str) -> &'static str {
    match panel_type.to_lowercase().as_str() {
        "stat" | "singlestat" | "gauge" => "number",
        "table" => "table",
        "bar" | "bargauge" | "barchart" => "bar",
        "piechart" | "pie" => "pie",
        _ => "line",
    }
}
