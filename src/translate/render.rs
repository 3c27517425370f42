//! Target-dialect rendering of recognized shapes
//!
//! Log streams become `logs("<search>").index("*").rollup("count").last("<w>")`,
//! metrics become `sum(last_<w>):sum:<metric>{tags}.as_count()`.

use super::shape::{BoolOp, Fragment, LabelMatcher, MatchOp, QueryShape, StreamSelector};
use crate::defaults::Defaults;

/// Label keys that identify the emitting service
const SERVICE_KEYS: &[&str] = &["app", "service", "service_name", "job"];

/// Fields whose regex filter applies to the raw log line
const LINE_FIELDS: &[&str] = &["message", "msg", "log", "line"];

/// Render a shape with its comparison. Never returns an empty string.
pub fn render_shape(shape: &QueryShape, threshold: f64, defaults: &Defaults) -> String {
    match shape {
        QueryShape::Search { terms, negated } => format!(
            "{} > {}",
            log_rollup(&search_expression(terms, negated), &defaults.search_window),
            threshold
        ),
        QueryShape::Rate { selector, window } => {
            format!("{} > {}", stream_rollup(selector, window), threshold)
        }
        QueryShape::Absence { selector } => {
            format!("{} <= 0", stream_rollup(selector, &defaults.absence_window))
        }
        QueryShape::Count { field, pattern } => format!(
            "{} > {}",
            log_rollup(&count_term(field, pattern), &defaults.count_window),
            threshold
        ),
        QueryShape::Ratio {
            numerator,
            denominator,
            comparison,
        } => {
            let (op, value) = match comparison {
                Some(cmp) => (cmp.op.as_str(), cmp.value),
                None => (">", defaults.ratio_threshold),
            };
            format!(
                "({} / {}) {} {:.2}",
                render_fragment(numerator, defaults),
                render_fragment(denominator, defaults),
                op,
                value
            )
        }
        QueryShape::Composite {
            operands,
            operators,
        } => {
            let mut out = String::new();
            for (i, operand) in operands.iter().enumerate() {
                if i > 0 {
                    let word = match operators.get(i - 1) {
                        Some(BoolOp::Or) => "or",
                        _ => "and",
                    };
                    out.push(' ');
                    out.push_str(word);
                    out.push(' ');
                }
                out.push_str(&render_fragment(operand, defaults));
            }
            format!("{} > {:.2}", out, threshold)
        }
        QueryShape::Unrecognized => defaults.fallback_query(threshold),
    }
}

/// Render a sub-expression as a bare rollup.
pub fn render_fragment(fragment: &Fragment, defaults: &Defaults) -> String {
    match fragment {
        Fragment::Rate { selector, window } => stream_rollup(selector, window),
        Fragment::Absence { selector } => stream_rollup(selector, &defaults.absence_window),
        Fragment::Count { field, pattern } => {
            log_rollup(&count_term(field, pattern), &defaults.count_window)
        }
    }
}

fn log_rollup(search: &str, window: &str) -> String {
    format!(
        "logs(\"{}\").index(\"*\").rollup(\"count\").last(\"{}\")",
        search, window
    )
}

fn stream_rollup(selector: &StreamSelector, window: &str) -> String {
    match (&selector.metric, selector.is_log_stream()) {
        (Some(metric), false) => format!(
            "sum(last_{}):sum:{}{{{}}}.as_count()",
            window,
            metric,
            metric_tags(&selector.labels)
        ),
        _ => log_rollup(&stream_search(selector), window),
    }
}

fn search_expression(terms: &[String], negated: &[String]) -> String {
    let parts: Vec<String> = terms
        .iter()
        .map(|term| escape(term))
        .chain(negated.iter().map(|term| format!("-\\\"{}\\\"", escape(term))))
        .collect();
    non_empty_search(parts)
}

fn stream_search(selector: &StreamSelector) -> String {
    let mut parts: Vec<String> = selector.labels.iter().map(log_facet).collect();
    if let Some(text) = &selector.contains {
        parts.push(phrase(text));
    }
    non_empty_search(parts)
}

fn count_term(field: &str, pattern: &str) -> String {
    let term = regex_to_wildcard(pattern);
    if LINE_FIELDS.contains(&field) {
        term
    } else {
        format!("@{}:{}", field, term)
    }
}

fn non_empty_search(parts: Vec<String>) -> String {
    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(" ")
    }
}

fn facet_key(key: &str) -> &str {
    if SERVICE_KEYS.contains(&key) {
        "service"
    } else {
        key
    }
}

fn log_facet(matcher: &LabelMatcher) -> String {
    let key = facet_key(&matcher.key);
    match matcher.op {
        MatchOp::Equal => format!("{}:{}", key, escape(&matcher.value)),
        MatchOp::NotEqual => format!("-{}:{}", key, escape(&matcher.value)),
        MatchOp::Regex => format!("{}:{}", key, regex_to_wildcard(&matcher.value)),
        MatchOp::NotRegex => format!("-{}:{}", key, regex_to_wildcard(&matcher.value)),
    }
}

fn metric_tags(labels: &[LabelMatcher]) -> String {
    if labels.is_empty() {
        return "*".to_string();
    }
    labels
        .iter()
        .map(|matcher| {
            let key = facet_key(&matcher.key);
            match matcher.op {
                MatchOp::Equal => format!("{}:{}", key, matcher.value),
                MatchOp::NotEqual => format!("!{}:{}", key, matcher.value),
                MatchOp::Regex => format!("{}:{}", key, regex_to_wildcard(&matcher.value)),
                MatchOp::NotRegex => format!("!{}:{}", key, regex_to_wildcard(&matcher.value)),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote a filter phrase when it is more than one bare word.
fn phrase(text: &str) -> String {
    let bare = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/'));
    if bare {
        text.to_string()
    } else {
        format!("\\\"{}\\\"", escape(text))
    }
}

/// Regex filter to vendor wildcard: `.*` and `.+` become `*`, anchors drop.
fn regex_to_wildcard(pattern: &str) -> String {
    let trimmed = pattern.trim_start_matches('^').trim_end_matches('$');
    let converted = escape(&trimmed.replace(".*", "*").replace(".+", "*"));
    if converted.is_empty() {
        "*".to_string()
    } else {
        converted
    }
}

/// Escape for embedding inside a double-quoted target string.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::shape::{classify, InlineComparison};
    use crate::translate::SourceDialect;

    fn render(query: &str, threshold: f64) -> String {
        let defaults = Defaults::default();
        let dialect = SourceDialect::detect(query);
        render_shape(&classify(query, dialect), threshold, &defaults)
    }

    #[test]
    fn test_search_with_negation() {
        let out = render(r#"index=* "error" "payment" NOT "timeout""#, 5.0);
        assert_eq!(
            out,
            r#"logs("error payment -\"timeout\"").index("*").rollup("count").last("15m") > 5"#
        );
    }

    #[test]
    fn test_search_without_terms_is_wildcard() {
        let out = render("index=* | stats count", 2.5);
        assert_eq!(out, r#"logs("*").index("*").rollup("count").last("15m") > 2.5"#);
    }

    #[test]
    fn test_rate_over_log_stream() {
        let out = render(r#"rate(({app="checkout"} |= "timeout")[5m])"#, 3.0);
        assert_eq!(
            out,
            r#"logs("service:checkout timeout").index("*").rollup("count").last("5m") > 3"#
        );
    }

    #[test]
    fn test_rate_filter_phrase_is_quoted() {
        let out = render(r#"rate(({service_name="api", env!="dev"} |= "connection refused")[1m])"#, 1.0);
        assert_eq!(
            out,
            r#"logs("service:api -env:dev \"connection refused\"").index("*").rollup("count").last("1m") > 1"#
        );
    }

    #[test]
    fn test_rate_over_metric() {
        let out = render(r#"sum(rate(http_errors_total{job="api"}[10m]))"#, 4.0);
        assert_eq!(out, "sum(last_10m):sum:http_errors_total{service:api}.as_count() > 4");
    }

    #[test]
    fn test_absence_uses_long_window_and_lte_zero() {
        let out = render(r#"absent(({job="billing"} |= "heartbeat"))"#, 7.0);
        assert_eq!(
            out,
            r#"logs("service:billing heartbeat").index("*").rollup("count").last("24h") <= 0"#
        );
        assert!(!out.contains('>'));
    }

    #[test]
    fn test_ratio_uses_inline_comparison() {
        let out = render(
            r#"sum(rate(span_count{status_code="ERROR"}[5m])) / sum(rate(span_count[5m])) > 0.05"#,
            9.0,
        );
        assert_eq!(
            out,
            "(sum(last_5m):sum:span_count{status_code:ERROR}.as_count() / sum(last_5m):sum:span_count{*}.as_count()) > 0.05"
        );
    }

    #[test]
    fn test_ratio_default_threshold_has_two_decimals() {
        let out = render(
            r#"sum(rate(({app="api"} |= "error")[5m])) / sum(rate(({app="api"})[5m]))"#,
            9.0,
        );
        assert!(out.starts_with("(logs(\"service:api error\")"));
        assert!(out.ends_with(") > 0.20"));
    }

    #[test]
    fn test_composite_lowercases_operators() {
        let out = render(
            r#"rate(({app="api"} |= "error")[5m]) AND rate(({app="web"} |= "error")[5m]) OR absent(({app="db"}))"#,
            2.0,
        );
        assert_eq!(
            out,
            concat!(
                r#"logs("service:api error").index("*").rollup("count").last("5m") and "#,
                r#"logs("service:web error").index("*").rollup("count").last("5m") or "#,
                r#"logs("service:db").index("*").rollup("count").last("24h") > 2.00"#
            )
        );
    }

    #[test]
    fn test_count_with_regex_wildcards() {
        let out = render(r#"count(message=~".*timeout.*") > 10"#, 10.0);
        assert_eq!(out, r#"logs("*timeout*").index("*").rollup("count").last("5m") > 10"#);

        let out = render(r#"count(level=~"^err.+$")"#, 1.0);
        assert_eq!(out, r#"logs("@level:err*").index("*").rollup("count").last("5m") > 1"#);
    }

    #[test]
    fn test_unrecognized_falls_back() {
        let out = render("histogram_quantile(0.99, latency)", 1.0);
        assert_eq!(out, r#"logs("*").index("*").rollup("count").last("15m") > 1"#);
    }

    #[test]
    fn test_ratio_respects_explicit_comparison_operator() {
        let shape = QueryShape::Ratio {
            numerator: Fragment::Count {
                field: "msg".to_string(),
                pattern: "fail".to_string(),
            },
            denominator: Fragment::Count {
                field: "msg".to_string(),
                pattern: ".*".to_string(),
            },
            comparison: Some(InlineComparison {
                op: "<".to_string(),
                value: 0.5,
            }),
        };
        let out = render_shape(&shape, 1.0, &Defaults::default());
        assert!(out.ends_with(" < 0.50"));
    }
}
