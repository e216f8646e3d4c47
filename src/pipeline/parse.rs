//! Reply parsing: free-text model reply → one value per schema field.
//!
//! The model is asked for `Field: value` lines but does not always comply:
//! it adds commentary, echoes the prompt's bullet list, bolds keys, wraps the
//! answer in a code fence, or spreads one handwritten answer over several
//! lines. The parser tolerates all of that while still returning a result
//! whose key set is exactly the schema.
//!
//! ## Algorithm
//!
//! 1. Start from an all-`N/A` result.
//! 2. Normalise the reply: line endings, an outer code fence, and bullets or
//!    bold markers decorating a header at line start. Value text is kept
//!    verbatim, including its own bullets and asterisks.
//! 3. Find every occurrence of `<field>:` where `<field>` is a schema name
//!    matched as a literal string. Brackets, dots, `?` and friends in names
//!    carry no special meaning. When names overlap at one offset the longest
//!    wins.
//! 4. Walk the occurrences left to right. A value runs from after the colon
//!    up to the next `\n<field>:` or the end of the text, so multi-line
//!    answers stay attached to their header. Occurrences inside a consumed
//!    value are skipped.
//! 5. Collapse whitespace runs to single spaces and trim. An empty value
//!    leaves the field unresolved.
//! 6. Later occurrences of a field overwrite earlier ones.

use crate::output::{ExtractionResult, NOT_AVAILABLE};
use crate::schema::FieldSchema;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Reverse;

/// Parse `reply` into an [`ExtractionResult`] over `schema`.
///
/// Pure: the same `(reply, schema)` always gives the same result.
pub fn parse_reply(reply: &str, schema: &FieldSchema) -> ExtractionResult {
    let mut result = ExtractionResult::unresolved(schema);
    let matcher = HeaderMatcher::new(schema);
    let text = normalise_reply(reply, &matcher.longest_first());

    for (field, value) in matcher.scan(&text) {
        result.set(field, value);
    }
    result
}

// ── Normalisation ────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\n(.*?)\n?```$").unwrap());

/// Optional indentation, list bullet and opening bold marker at line start.
static RE_HEADER_DECORATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ \t]*(?:[-*•+][ \t]+)?(?:\*\*)?").unwrap());

/// Undo the formatting habits of chat models that get in the way of header
/// detection: line endings, an outer code fence, and bullets or bold markers
/// wrapped around a `<field>:` header at the start of a line. Lines that do
/// not open with a schema header are left exactly as written, so a bulleted
/// list or a literal `**` inside an answer survives.
fn normalise_reply(input: &str, fields: &[&str]) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let s = match RE_OUTER_FENCE.captures(s.trim()) {
        Some(caps) => caps[1].to_string(),
        None => s,
    };
    s.split('\n')
        .map(|line| undecorate_header(line, fields).unwrap_or_else(|| line.to_string()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite `- **<field>:** rest` (and its bullet-only or bold-only variants)
/// to `<field>: rest`. `fields` must be sorted longest first.
fn undecorate_header(line: &str, fields: &[&str]) -> Option<String> {
    let prefix = RE_HEADER_DECORATION.find(line)?.as_str();
    if prefix.trim().is_empty() {
        return None;
    }
    let bold = prefix.ends_with("**");
    let body = &line[prefix.len()..];

    fields.iter().find_map(|field| {
        let after = body.strip_prefix(*field)?;
        let rest = if bold {
            after
                .strip_prefix(":**")
                .or_else(|| after.strip_prefix("**:"))?
        } else {
            after.strip_prefix(':')?
        };
        Some(format!("{field}:{rest}"))
    })
}

/// Collapse internal whitespace and trim; `None` when nothing is left.
fn normalise_value(raw: &str) -> Option<String> {
    let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() || value == NOT_AVAILABLE {
        None
    } else {
        Some(value)
    }
}

// ── Header matching ──────────────────────────────────────────────────────────

/// One `<field>:` occurrence in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    /// Byte offset of the first character of the field name.
    start: usize,
    /// Byte offset just past the colon.
    end: usize,
    field: usize,
}

/// Literal matcher over the schema's `<field>:` tokens.
struct HeaderMatcher<'a> {
    fields: &'a [String],
    tokens: Vec<String>,
}

impl<'a> HeaderMatcher<'a> {
    fn new(schema: &'a FieldSchema) -> Self {
        Self {
            fields: schema.fields(),
            tokens: schema.iter().map(|f| format!("{f}:")).collect(),
        }
    }

    /// Field names, longest first.
    fn longest_first(&self) -> Vec<&'a str> {
        let mut names: Vec<&'a str> = self.fields.iter().map(String::as_str).collect();
        names.sort_by_key(|name| Reverse(name.len()));
        names
    }

    /// All header occurrences sorted by offset, longest token first on ties,
    /// with only the longest kept per offset.
    fn find_all(&self, text: &str) -> Vec<Header> {
        let mut headers: Vec<Header> = self
            .tokens
            .iter()
            .enumerate()
            .flat_map(|(field, token)| {
                text.match_indices(token.as_str()).map(move |(start, _)| Header {
                    start,
                    end: start + token.len(),
                    field,
                })
            })
            .collect();
        headers.sort_by_key(|h| (h.start, Reverse(h.end)));
        headers.dedup_by_key(|h| h.start);
        headers
    }

    /// Yield `(field, value)` pairs in text order.
    fn scan(&self, text: &str) -> Vec<(&'a str, String)> {
        let headers = self.find_all(text);
        let bytes = text.as_bytes();
        let mut found = Vec::new();
        let mut cursor = 0;

        for (i, header) in headers.iter().enumerate() {
            if header.start < cursor {
                continue;
            }
            let value_end = headers[i + 1..]
                .iter()
                .find(|next| next.start > header.end && bytes[next.start - 1] == b'\n')
                .map(|next| next.start - 1)
                .unwrap_or(text.len());

            let value = normalise_value(&text[header.end..value_end])
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            found.push((self.fields[header.field].as_str(), value));
            cursor = value_end;
        }
        found
    }
}
