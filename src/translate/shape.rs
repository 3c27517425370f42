//! Recognizing source query shapes
//!
//! Each matcher turns a source query into a structured `QueryShape` or passes.
//! They run in a fixed order and the first hit wins; rendering lives in
//! `render.rs`.

use super::SourceDialect;
use crate::text::compile;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static SEARCH_INDEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?:^|\s)index\s*=\s*[^=~\s]"));
static SEARCH_WILDCARD_INDEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r#"index\s*=\s*"?\*"?"#));
static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r#""([^"]+)""#));
static NOT_TERM: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r#"NOT\s+"([^"]+)""#));

/// Stream selector with an optional line filter: `name{labels} |= "text"`
const SELECTOR: &str = r#"([A-Za-z_:][A-Za-z0-9_:]*)?\s*(?:\{([^}]*)\})?\s*(?:\|=\s*"((?:[^"\\]|\\.)*)")?"#;

static RATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(&format!(
        r"^rate\(\s*\(?\s*{SELECTOR}\s*\)?\s*\[\s*(\d+[smhdw])\s*\]\s*\)$"
    ))
});
static ABSENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(&format!(r"^absent\(\s*\(?\s*{SELECTOR}\s*\)?\s*\)$"))
});
static COUNT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r#"^count\(\s*([A-Za-z_][A-Za-z0-9_.]*)\s*=~\s*"((?:[^"\\]|\\.)*)"\s*\)$"#)
});
static MATCHER: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r#"([A-Za-z_][A-Za-z0-9_]*)\s*(=~|!~|!=|=)\s*"((?:[^"\\]|\\.)*)""#));
static SUM_WRAPPER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"^sum\s*(?:(?:by|without)\s*\([^)]*\)\s*)?\((.*)\)(?:\s*(?:by|without)\s*\([^)]*\))?$")
});
static TRAILING_COMPARISON: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"^(.*?)\s*(>=|<=|==|!=|>|<)\s*(\d+(?:\.\d+)?)$"));

/// How a label matcher compares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regex,
    NotRegex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelMatcher {
    pub key: String,
    pub op: MatchOp,
    pub value: String,
}

/// A metric name or log stream with label matchers and a line filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSelector {
    pub metric: Option<String>,
    pub labels: Vec<LabelMatcher>,
    pub contains: Option<String>,
}

impl StreamSelector {
    /// A log stream selected by labels and filtered by text, as opposed to a metric.
    pub fn is_log_stream(&self) -> bool {
        self.metric.is_none() || self.contains.is_some()
    }
}

/// A sub-expression that renders to a target rollup without a comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Fragment {
    Rate {
        selector: StreamSelector,
        window: String,
    },
    Absence {
        selector: StreamSelector,
    },
    Count {
        field: String,
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BoolOp {
    And,
    Or,
}

/// A comparison written into the source expression itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineComparison {
    pub op: String,
    pub value: f64,
}

/// Recognized structure of a source query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryShape {
    /// Quoted search terms, some negated with `NOT`
    Search {
        terms: Vec<String>,
        negated: Vec<String>,
    },
    Rate {
        selector: StreamSelector,
        window: String,
    },
    Absence {
        selector: StreamSelector,
    },
    Ratio {
        numerator: Fragment,
        denominator: Fragment,
        comparison: Option<InlineComparison>,
    },
    Composite {
        operands: Vec<Fragment>,
        operators: Vec<BoolOp>,
    },
    Count {
        field: String,
        pattern: String,
    },
    Unrecognized,
}

impl QueryShape {
    pub fn name(&self) -> &'static str {
        match self {
            QueryShape::Search { .. } => "search",
            QueryShape::Rate { .. } => "rate",
            QueryShape::Absence { .. } => "absence",
            QueryShape::Ratio { .. } => "ratio",
            QueryShape::Composite { .. } => "composite",
            QueryShape::Count { .. } => "count",
            QueryShape::Unrecognized => "unrecognized",
        }
    }

    /// True when every stream in the shape is a metric, so the rendered query
    /// is a metric query. Search, count and fallback queries are log rollups.
    pub fn is_metric(&self) -> bool {
        match self {
            QueryShape::Rate { selector, .. } | QueryShape::Absence { selector } => {
                !selector.is_log_stream()
            }
            QueryShape::Ratio {
                numerator,
                denominator,
                ..
            } => numerator.is_metric() && denominator.is_metric(),
            QueryShape::Composite { operands, .. } => operands.iter().all(Fragment::is_metric),
            QueryShape::Search { .. } | QueryShape::Count { .. } | QueryShape::Unrecognized => false,
        }
    }
}

/// True when the query names a search index (`index=...`, spacing allowed).
pub fn looks_like_search(query: &str) -> bool {
    SEARCH_INDEX
        .as_ref()
        .is_some_and(|re| re.is_match(query))
}

/// Classify `query` for `dialect`.
///
/// Search queries are only recognized behind a wildcard `index=*`. Time-series
/// shapes are tried as composite, ratio, absence, rate and count, in that order.
pub fn classify(query: &str, dialect: SourceDialect) -> QueryShape {
    let query = query.trim();
    let shape = match dialect {
        SourceDialect::Search => match_search(query),
        SourceDialect::TimeSeries => match_composite(query)
            .or_else(|| match_ratio(query))
            .or_else(|| {
                let body = strip_comparison(query).0;
                match_fragment(body).map(Fragment::into_shape)
            }),
    };
    shape.unwrap_or(QueryShape::Unrecognized)
}

fn match_search(query: &str) -> Option<QueryShape> {
    if !SEARCH_WILDCARD_INDEX.as_ref()?.is_match(query) {
        return None;
    }
    let negated: Vec<String> = NOT_TERM
        .as_ref()?
        .captures_iter(query)
        .map(|caps| caps[1].to_string())
        .collect();

    let mut terms: Vec<String> = QUOTED
        .as_ref()?
        .captures_iter(query)
        .map(|caps| caps[1].to_string())
        .collect();
    for term in &negated {
        if let Some(pos) = terms.iter().position(|t| t == term) {
            terms.remove(pos);
        }
    }

    Some(QueryShape::Search { terms, negated })
}

fn match_composite(query: &str) -> Option<QueryShape> {
    let (pieces, operators) = split_boolean(query);
    if operators.is_empty() {
        return None;
    }
    let operands = pieces
        .into_iter()
        .map(|piece| match_fragment(strip_comparison(piece).0))
        .collect::<Option<Vec<_>>>()?;
    Some(QueryShape::Composite {
        operands,
        operators,
    })
}

fn match_ratio(query: &str) -> Option<QueryShape> {
    let (body, comparison) = strip_comparison(query);
    let slash = top_level_positions(body, |rest| rest.starts_with('/').then_some(1))
        .into_iter()
        .next()?;
    let numerator = match_fragment(body[..slash.0].trim())?;
    let denominator = match_fragment(body[slash.0 + slash.1..].trim())?;
    Some(QueryShape::Ratio {
        numerator,
        denominator,
        comparison,
    })
}

/// Match a single rate, absence or count expression, unwrapping `sum(...)`.
pub fn match_fragment(expr: &str) -> Option<Fragment> {
    let expr = unwrap_sum(expr.trim());
    let expr = strip_outer_parens(expr);

    if let Some(caps) = ABSENT.as_ref().and_then(|re| re.captures(expr)) {
        let selector = selector_from(&caps, 1)?;
        return Some(Fragment::Absence { selector });
    }
    if let Some(caps) = RATE.as_ref().and_then(|re| re.captures(expr)) {
        let selector = selector_from(&caps, 1)?;
        return Some(Fragment::Rate {
            selector,
            window: caps[4].to_string(),
        });
    }
    if let Some(caps) = COUNT.as_ref().and_then(|re| re.captures(expr)) {
        return Some(Fragment::Count {
            field: caps[1].to_string(),
            pattern: caps[2].to_string(),
        });
    }
    None
}

impl Fragment {
    /// True when this renders to a metric query rather than a log rollup.
    pub fn is_metric(&self) -> bool {
        match self {
            Fragment::Rate { selector, .. } | Fragment::Absence { selector } => {
                !selector.is_log_stream()
            }
            Fragment::Count { .. } => false,
        }
    }

    fn into_shape(self) -> QueryShape {
        match self {
            Fragment::Rate { selector, window } => QueryShape::Rate { selector, window },
            Fragment::Absence { selector } => QueryShape::Absence { selector },
            Fragment::Count { field, pattern } => QueryShape::Count { field, pattern },
        }
    }
}

/// Build a selector from three consecutive capture groups (metric, labels, filter).
fn selector_from(caps: &regex::Captures<'_>, first: usize) -> Option<StreamSelector> {
    let metric = caps.get(first).map(|m| m.as_str().to_string());
    let labels = caps
        .get(first + 1)
        .map(|m| parse_matchers(m.as_str()))
        .unwrap_or_default();
    let contains = caps.get(first + 2).map(|m| m.as_str().replace("\\\"", "\""));

    // An empty selector is not a stream
    if metric.is_none() && labels.is_empty() && contains.is_none() {
        return None;
    }
    Some(StreamSelector {
        metric,
        labels,
        contains,
    })
}

fn parse_matchers(body: &str) -> Vec<LabelMatcher> {
    let Some(re) = MATCHER.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(body)
        .map(|caps| LabelMatcher {
            key: caps[1].to_string(),
            op: match &caps[2] {
                "!=" => MatchOp::NotEqual,
                "=~" => MatchOp::Regex,
                "!~" => MatchOp::NotRegex,
                _ => MatchOp::Equal,
            },
            value: caps[3].to_string(),
        })
        .collect()
}

fn unwrap_sum(expr: &str) -> &str {
    SUM_WRAPPER
        .as_ref()
        .and_then(|re| re.captures(expr))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|inner| balanced(inner))
        .unwrap_or(expr)
}

fn strip_outer_parens(mut expr: &str) -> &str {
    while let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        if !balanced(inner) {
            break;
        }
        expr = inner.trim();
    }
    expr
}

/// Split off a trailing `> n` style comparison.
pub fn strip_comparison(expr: &str) -> (&str, Option<InlineComparison>) {
    let expr = expr.trim();
    let Some(caps) = TRAILING_COMPARISON.as_ref().and_then(|re| re.captures(expr)) else {
        return (expr, None);
    };
    let (Some(body), Ok(value)) = (caps.get(1), caps[3].parse::<f64>()) else {
        return (expr, None);
    };
    if !balanced(body.as_str()) {
        return (expr, None);
    }
    let comparison = InlineComparison {
        op: caps[2].to_string(),
        value,
    };
    (body.as_str().trim(), Some(comparison))
}

/// Split on `AND`/`OR` (any case, any surrounding whitespace) outside
/// brackets and quotes.
fn split_boolean(query: &str) -> (Vec<&str>, Vec<BoolOp>) {
    let positions = top_level_positions(query, boolean_operator_len);

    let mut pieces = Vec::new();
    let mut operators = Vec::new();
    let mut cursor = 0;
    for (pos, len) in positions {
        pieces.push(query[cursor..pos].trim());
        let word = query[pos..pos + len].trim();
        operators.push(if word.eq_ignore_ascii_case("and") {
            BoolOp::And
        } else {
            BoolOp::Or
        });
        cursor = pos + len;
    }
    pieces.push(query[cursor..].trim());
    (pieces, operators)
}

/// Byte length of a whitespace-delimited `AND`/`OR` at the start of `rest`.
fn boolean_operator_len(rest: &str) -> Option<usize> {
    let word_start = rest.trim_start();
    let leading = rest.len() - word_start.len();
    if leading == 0 {
        return None;
    }
    let word = ["and", "or"].into_iter().find(|w| {
        word_start
            .get(..w.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(w))
    })?;
    let after = &word_start[word.len()..];
    let trailing = after.len() - after.trim_start().len();
    (trailing > 0).then_some(leading + word.len() + trailing)
}

/// Offsets (and lengths) where `matcher` matches at bracket depth zero, outside quotes.
fn top_level_positions<F>(text: &str, matcher: F) -> Vec<(usize, usize)>
where
    F: Fn(&str) -> Option<usize>,
{
    let mut found = Vec::new();
    let mut depth: i32 = 0;
    let mut in_quote = false;
    let mut escaped = false;
    let mut skip_until = 0;

    for (idx, c) in text.char_indices() {
        if idx < skip_until {
            continue;
        }
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            _ if depth == 0 => {
                if let Some(len) = matcher(&text[idx..]) {
                    found.push((idx, len));
                    skip_until = idx + len;
                }
            }
            _ => {}
        }
    }
    found
}

fn balanced(text: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_quote = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quote = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_quote = true,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_quote
}
