//! Text primitives shared by the extractors and translators
//!
//! Everything here is a pure function over `&str`.

use regex::Regex;
use tracing::warn;

/// Literal marker an LLM emits when a pull request needs no changes.
pub const NO_CHANGES_MARKER: &str = "LGTM";

const FENCE: &str = "```";

/// True when the response carries the "no changes requested" marker anywhere.
///
/// The check is a plain, case-sensitive substring test, so the marker wins even
/// when it appears inside an otherwise well-formed block.
pub fn contains_no_changes_marker(text: &str) -> bool {
    text.contains(NO_CHANGES_MARKER)
}

/// Compile a literal pattern for a `LazyLock` static.
///
/// A pattern that fails to compile is logged and treated as matching nothing.
pub(crate) fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            warn!(pattern, error = %err, "invalid built-in pattern");
            None
        }
    }
}

/// Reduce a diff body to the lines it adds.
///
/// Keeps lines starting with a single `+` (never `++`), strips exactly one
/// leading `+ ` or `+`, joins with `\n` and trims the result.
pub fn extract_actual_content(diff: &str) -> String {
    diff.lines()
        .filter(|line| line.starts_with('+') && !line.starts_with("++"))
        .map(|line| {
            line.strip_prefix("+ ")
                .or_else(|| line.strip_prefix('+'))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Strip a single leading fence (with any language tag) and a trailing fence.
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = match trimmed.strip_prefix(FENCE) {
        // Drop the language tag up to the end of the opening line
        Some(rest) => match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
        },
        None => trimmed,
    };
    let clean = clean.strip_suffix(FENCE).unwrap_or(clean);
    clean.trim()
}

/// Find a JSON payload inside free text.
///
/// Prefers the body of the first ```` ```json ```` fence. Falls back to the
/// first balanced `{...}` object or `[...]` array, whichever opens first,
/// ignoring delimiters inside string literals.
pub fn extract_json_from_text(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body_start = start + "```json".len();
        if let Some(len) = text[body_start..].find(FENCE) {
            return Some(text[body_start..body_start + len].trim());
        }
    }
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    balanced_fragment(text, start, close)
}

fn balanced_fragment(text: &str, start: usize, close: char) -> Option<&str> {
    let open = text[start..].chars().next()?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..=start + offset]);
            }
        }
    }
    None
}

/// A fenced block sliced out of a larger text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Language tag on the opening fence, empty when absent
    pub tag: &'a str,
    /// Exact bytes between the opening line and the closing fence
    pub body: &'a str,
    /// Byte offset just past the closing fence
    pub end: usize,
}

/// Read a fenced block that starts exactly at `pos`.
///
/// The opening fence must be at `pos`, its tag runs to the end of that line and
/// the body stops at the first following fence. Returns `None` when either
/// fence is missing.
pub fn fenced_block_at(text: &str, pos: usize) -> Option<FencedBlock<'_>> {
    let rest = text.get(pos..)?.strip_prefix(FENCE)?;
    let line_end = rest.find('\n')?;
    let tag = rest[..line_end].trim();
    if tag.contains(char::is_whitespace) || tag.contains('`') {
        return None;
    }
    let body_start = pos + FENCE.len() + line_end + 1;
    let body_len = text[body_start..].find(FENCE)?;
    Some(FencedBlock {
        tag,
        body: &text[body_start..body_start + body_len],
        end: body_start + body_len + FENCE.len(),
    })
}
