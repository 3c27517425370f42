//! Dashboard grid reconciliation
//!
//! Panels arrive with Grafana-style `gridPos` hints that may overlap, overflow
//! the grid or be missing entirely. Widgets leave packed into rows on a fixed
//! column grid.

use crate::defaults::Defaults;
use serde::Serialize;
use serde_json::Value;

/// Declared position of a panel; every field is optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GridDecl {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

/// A panel as the model described it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PanelSpec {
    pub title: String,
    /// Panel type ("timeseries", "stat", ...)
    pub kind: String,
    pub grid: GridDecl,
    /// Query reference ids, in order
    pub targets: Vec<String>,
}

impl PanelSpec {
    /// Read a panel from JSON. Non-objects are rejected; bad fields fall back.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let grid = obj
            .get("gridPos")
            .and_then(Value::as_object)
            .map(|pos| GridDecl {
                x: pos.get("x").and_then(grid_number),
                y: pos.get("y").and_then(grid_number),
                w: pos.get("w").and_then(grid_number),
                h: pos.get("h").and_then(grid_number),
            })
            .unwrap_or_default();

        let targets = obj
            .get("targets")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(target_ref).collect())
            .unwrap_or_default();

        Some(Self {
            title: string_field(value, "title"),
            kind: string_field(value, "type"),
            grid,
            targets,
        })
    }
}

/// A query a panel can reference by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRef {
    pub ref_id: String,
    pub expr: String,
}

impl QueryRef {
    /// Needs both `refId` and `expr` as strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            ref_id: value.get("refId")?.as_str()?.to_string(),
            expr: value.get("expr")?.as_str()?.to_string(),
        })
    }
}

/// A widget with its final grid placement and resolved queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionedWidget {
    pub title: String,
    pub kind: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Never empty
    pub queries: Vec<String>,
}

/// Parse a JSON array of panels, dropping entries that are not objects.
pub fn panels_from_values(values: &[Value]) -> Vec<PanelSpec> {
    values.iter().filter_map(PanelSpec::from_value).collect()
}

/// Parse a JSON array of queries, dropping entries without `refId`/`expr`.
pub fn queries_from_values(values: &[Value]) -> Vec<QueryRef> {
    values.iter().filter_map(QueryRef::from_value).collect()
}

/// Place panels on the grid.
///
/// The first panel sits at the origin. A later panel whose declared `y` lies
/// below the current row opens a new row. Otherwise it continues the row to
/// the right of the previous widget, unless it declares `x = 0` or would run
/// past the last column, which also opens a new row. A new row starts below the
/// tallest widget of the previous one. Widths are clamped to the grid and row
/// offsets saturate at `u32::MAX`.
///
/// The result always has at least one widget.
pub fn reconcile_dashboard_layout(
    panels: &[PanelSpec],
    queries: &[QueryRef],
    defaults: &Defaults,
) -> Vec<PositionedWidget> {
    let columns = defaults.grid_columns.max(1);
    let mut widgets: Vec<PositionedWidget> = Vec::with_capacity(panels.len());
    let mut row_y = 0;
    let mut row_height = 0;

    for panel in panels {
        let width = panel.grid.w.unwrap_or(defaults.widget_width).clamp(1, columns);
        let height = panel.grid.h.unwrap_or(defaults.widget_height).max(1);

        let x = match widgets.last() {
            None => {
                row_height = height;
                0
            }
            Some(prev) => {
                let declared_y = panel.grid.y.unwrap_or(row_y);
                let next_x = prev.x.saturating_add(prev.width);
                let new_row = declared_y > row_y
                    || panel.grid.x == Some(0)
                    || next_x.saturating_add(width) > columns;
                if new_row {
                    row_y = row_y.saturating_add(row_height);
                    row_height = height;
                    0
                } else {
                    row_height = row_height.max(height);
                    next_x
                }
            }
        };

        widgets.push(PositionedWidget {
            title: panel.title.clone(),
            kind: panel.kind.clone(),
            x,
            y: row_y,
            width,
            height,
            queries: resolve_queries(&panel.targets, queries, defaults),
        });
    }

    if widgets.is_empty() {
        widgets.push(placeholder_widget(defaults));
    }
    widgets
}

fn resolve_queries(targets: &[String], queries: &[QueryRef], defaults: &Defaults) -> Vec<String> {
    let resolved: Vec<String> = targets
        .iter()
        .filter_map(|target| queries.iter().find(|q| &q.ref_id == target))
        .map(|q| q.expr.clone())
        .collect();
    if resolved.is_empty() {
        vec![defaults.placeholder_widget_query()]
    } else {
        resolved
    }
}

fn placeholder_widget(defaults: &Defaults) -> PositionedWidget {
    PositionedWidget {
        title: "Log Volume".to_string(),
        kind: "timeseries".to_string(),
        x: 0,
        y: 0,
        width: defaults.widget_width.clamp(1, defaults.grid_columns.max(1)),
        height: defaults.widget_height.max(1),
        queries: vec![defaults.placeholder_widget_query()],
    }
}

fn grid_number(value: &Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX))
        .map(|f| f as u32)
}

/// Targets are either bare ref ids or query objects carrying `refId`.
fn target_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(obj) => obj.get("refId")?.as_str().map(str::to_string),
        _ => None,
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn panel(x: Option<u32>, y: Option<u32>, w: Option<u32>, h: Option<u32>) -> PanelSpec {
        PanelSpec {
            title: "p".to_string(),
            kind: "timeseries".to_string(),
            grid: GridDecl { x, y, w, h },
            targets: vec!["A".to_string()],
        }
    }

    fn queries() -> Vec<QueryRef> {
        vec![QueryRef {
            ref_id: "A".to_string(),
            expr: "rate(x[5m])".to_string(),
        }]
    }

    fn layout(panels: &[PanelSpec]) -> Vec<(u32, u32, u32, u32)> {
        reconcile_dashboard_layout(panels, &queries(), &Defaults::default())
            .iter()
            .map(|w| (w.x, w.y, w.width, w.height))
            .collect()
    }

    #[test]
    fn test_empty_layout_gets_placeholder() {
        let widgets = reconcile_dashboard_layout(&[], &[], &Defaults::default());
        assert_eq!(widgets.len(), 1);
        let only = &widgets[0];
        assert_eq!((only.x, only.y, only.width, only.height), (0, 0, 12, 8));
        assert_eq!(
            only.queries,
            vec![r#"logs("*").index("*").rollup("count").last("15m")"#.to_string()]
        );
    }

    #[test]
    fn test_same_row_no_overlap() {
        let placed = layout(&[
            panel(Some(0), Some(0), Some(6), Some(8)),
            panel(Some(6), Some(0), Some(6), Some(4)),
        ]);
        assert_eq!(placed, vec![(0, 0, 6, 8), (6, 0, 6, 4)]);
    }

    #[test]
    fn test_overflow_wraps_below_tallest() {
        let placed = layout(&[
            panel(Some(0), Some(0), Some(6), Some(5)),
            panel(Some(6), Some(0), Some(4), Some(9)),
            panel(Some(10), Some(0), Some(6), Some(3)),
        ]);
        assert_eq!(placed, vec![(0, 0, 6, 5), (6, 0, 4, 9), (0, 9, 6, 3)]);
    }

    #[test]
    fn test_declared_lower_row() {
        let placed = layout(&[
            panel(Some(0), Some(0), Some(12), Some(8)),
            panel(Some(0), Some(8), Some(12), Some(6)),
            panel(Some(0), Some(14), Some(12), Some(8)),
        ]);
        assert_eq!(placed, vec![(0, 0, 12, 8), (0, 8, 12, 6), (0, 14, 12, 8)]);
    }

    #[test]
    fn test_width_clamped_and_defaults_applied() {
        let placed = layout(&[panel(None, None, Some(40), None), panel(None, None, Some(0), None)]);
        assert_eq!(placed, vec![(0, 0, 12, 8), (0, 8, 1, 8)]);
    }

    #[test]
    fn test_huge_heights_saturate_row_offset() {
        let placed = layout(&[
            panel(Some(0), Some(0), Some(12), Some(u32::MAX)),
            panel(Some(0), Some(1), Some(12), Some(u32::MAX)),
            panel(Some(0), Some(2), Some(12), Some(u32::MAX)),
        ]);
        assert_eq!(
            placed,
            vec![
                (0, 0, 12, u32::MAX),
                (0, u32::MAX, 12, u32::MAX),
                (0, u32::MAX, 12, u32::MAX),
            ]
        );
    }

    #[test]
    fn test_x_zero_in_same_row_starts_new_row() {
        let placed = layout(&[
            panel(Some(0), Some(0), Some(4), Some(8)),
            panel(Some(0), Some(0), Some(4), Some(8)),
        ]);
        assert_eq!(placed, vec![(0, 0, 4, 8), (0, 8, 4, 8)]);
    }

    #[test]
    fn test_query_resolution_and_fallback() {
        let mut unresolved = panel(None, None, Some(6), None);
        unresolved.targets = vec!["Z".to_string()];
        let widgets =
            reconcile_dashboard_layout(&[panel(None, None, Some(6), None), unresolved], &queries(), &Defaults::default());
        assert_eq!(widgets[0].queries, vec!["rate(x[5m])".to_string()]);
        assert_eq!(
            widgets[1].queries,
            vec![Defaults::default().placeholder_widget_query()]
        );
    }

    #[test]
    fn test_lenient_panel_parsing() {
        let values = vec![
            json!({"title": "Errors", "type": "stat", "gridPos": {"x": 2.0, "y": "zero", "w": 6}, "targets": ["A", {"refId": "B"}, 7]}),
            json!("not a panel"),
            json!({"gridPos": null}),
        ];
        let panels = panels_from_values(&values);
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].title, "Errors");
        assert_eq!(panels[0].grid, GridDecl { x: Some(2), y: None, w: Some(6), h: None });
        assert_eq!(panels[0].targets, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(panels[1].grid, GridDecl::default());
    }

    #[test]
    fn test_query_refs_need_id_and_expr() {
        let values = vec![
            json!({"refId": "A", "expr": "up"}),
            json!({"refId": "B"}),
            json!({"expr": "down"}),
        ];
        assert_eq!(queries_from_values(&values).len(), 1);
    }

    #[test]
    fn test_all_malformed_panels_yield_placeholder() {
        let panels = panels_from_values(&[json!(1), json!([]), json!(null)]);
        let widgets = reconcile_dashboard_layout(&panels, &[], &Defaults::default());
        assert_eq!(widgets.len(), 1);
        assert_eq!(widgets[0].title, "Log Volume");
    }
}
