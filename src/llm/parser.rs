//! Model response parsing.
//!
//! Models are asked for a JSON object but often wrap it in prose or a
//! markdown code fence. The parser tries the whole text first, then the
//! fenced blocks, then every top-level brace-balanced object in order.
//! Individual entries missing a required field are dropped without
//! failing the whole response.

use crate::error::ParseFailure;
use crate::models::{Location, Severity, SmellRecord};
use crate::taxonomy::{Category, SmellType};
use serde_json::{Map, Value};
use tracing::debug;

/// Smells extracted from one response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSmells {
    pub smells: Vec<SmellRecord>,
    /// Entries rejected for missing or empty required fields.
    pub dropped: usize,
    /// `file_analyzed` as echoed by the model.
    pub file_analyzed: Option<String>,
    /// `total_smells_found` as claimed by the model.
    pub reported_total: Option<u64>,
}

/// Parse a raw model response into smell records.
pub fn parse(raw: &str) -> Result<ParsedSmells, ParseFailure> {
    let failure = |reason: &str| ParseFailure {
        reason: reason.to_string(),
        raw: raw.to_string(),
    };

    let value = decode_json(raw).ok_or_else(|| failure("no JSON object found in response"))?;

    let (entries, file_analyzed, reported_total) = match &value {
        Value::Array(items) => (items, None, None),
        Value::Object(map) => match map.get("smells") {
            Some(Value::Array(items)) => (
                items,
                map.get("file_analyzed")
                    .and_then(Value::as_str)
                    .map(String::from),
                map.get("total_smells_found").and_then(Value::as_u64),
            ),
            Some(_) => return Err(failure("`smells` is not an array")),
            None => return Err(failure("missing `smells` array")),
        },
        _ => return Err(failure("top-level JSON is neither an object nor an array")),
    };

    let mut smells = Vec::with_capacity(entries.len());
    let mut dropped = 0;
    for entry in entries {
        match to_record(entry) {
            Some(record) => smells.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!("Dropped {} malformed smell entries", dropped);
    }

    Ok(ParsedSmells {
        smells,
        dropped,
        file_analyzed,
        reported_total,
    })
}

/// Find the first decodable JSON payload in `raw`.
fn decode_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for block in fenced_blocks(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            return Some(value);
        }
    }

    balanced_objects(trimmed)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
}

/// Bodies of markdown code fences, language tag stripped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        // Skip the language tag line
        let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
        let body = &after_open[body_start..];
        match body.find("```") {
            Some(close) => {
                blocks.push(&body[..close]);
                rest = &body[close + 3..];
            }
            None => {
                // Unterminated fence, e.g. truncated by the token budget
                blocks.push(body);
                break;
            }
        }
    }

    blocks
}

/// Top-level `{...}` spans, skipping braces inside string literals.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, b) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    spans
}

fn to_record(entry: &Value) -> Option<SmellRecord> {
    let obj = entry.as_object()?;

    let smell_type = required_str(obj, "smell_type")?;
    let category = required_str(obj, "category")?;
    let severity = required_str(obj, "severity")?;

    let refactored_example = text_field(obj, "refactored_example");

    Some(SmellRecord {
        smell_type: SmellType::parse(smell_type),
        category: Category::parse(category),
        location: parse_location(obj.get("location")),
        evidence: text_field(obj, "evidence"),
        severity: Severity::from(severity),
        justification: text_field(obj, "justification"),
        refactoring_suggestion: text_field(obj, "refactoring_suggestion"),
        refactored_example: (!refactored_example.is_empty()).then_some(refactored_example),
    })
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Optional text; non-string values are kept in their JSON form.
fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

fn parse_location(value: Option<&Value>) -> Location {
    match value {
        None | Some(Value::Null) => Location::default(),
        Some(Value::String(s)) => Location::text(s.trim()),
        Some(Value::Object(obj)) => {
            let function = identifier(obj.get("function").or_else(|| obj.get("method")));
            let class = identifier(obj.get("class"));
            let line_start = line_number(obj.get("line_start").or_else(|| obj.get("line")));
            let line_end = line_number(obj.get("line_end"));
            let file = obj.get("file").and_then(Value::as_str).unwrap_or("");

            let text = render_location(
                function.as_deref(),
                class.as_deref(),
                line_start,
                line_end,
                file,
            );

            Location {
                text,
                function,
                class,
                line_start,
                line_end,
            }
        }
        Some(other) => Location::text(other.to_string()),
    }
}

/// A name, or the first of a list of names.
fn identifier(value: Option<&Value>) -> Option<String> {
    let name = match value? {
        Value::String(s) => s.trim(),
        Value::Array(items) => items.iter().find_map(Value::as_str)?.trim(),
        _ => return None,
    };
    (!name.is_empty() && name != "null" && name != "None").then(|| name.to_string())
}

fn line_number(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn render_location(
    function: Option<&str>,
    class: Option<&str>,
    line_start: Option<u32>,
    line_end: Option<u32>,
    file: &str,
) -> String {
    let name = match (class, function) {
        (Some(c), Some(f)) => format!("{c}.{f}()"),
        (None, Some(f)) => format!("{f}()"),
        (Some(c), None) => c.to_string(),
        (None, None) => String::new(),
    };

    let lines = match (line_start, line_end) {
        (Some(s), Some(e)) if e != s => format!("lines {s}-{e}"),
        (Some(s), _) => format!("line {s}"),
        (None, Some(e)) => format!("line {e}"),
        (None, None) => String::new(),
    };

    match (name.is_empty(), lines.is_empty()) {
        (false, false) => format!("{name} ({lines})"),
        (false, true) => name,
        (true, false) => lines,
        (true, true) => file.to_string(),
    }
}
