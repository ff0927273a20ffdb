//! Turns the header oracle's advisory answer into a validated [`HeaderSpec`].

use crate::error::{AnalysisError, Result};
use crate::models::HeaderSpec;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Keys that name the header row list, prompt wording first.
pub const HEADER_ROWS_KEYS: [&str; 2] = ["header rows list", "header_rows"];
/// Keys that name the subject row, prompt wording first.
pub const SUBJECT_ROW_KEYS: [&str; 2] = ["subject header row", "subject_row"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionPath {
    /// Both values came from the named keys.
    Named,
    /// At least one value was recovered from the answer's key order.
    Positional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub spec: HeaderSpec,
    pub path: ResolutionPath,
}

/// Extracts the JSON object embedded in free-form oracle text (everything
/// between the first `{` and the last `}`).
pub fn parse_answer(text: &str) -> Result<Value> {
    let malformed = || AnalysisError::OracleResponseMalformed {
        raw: text.to_string(),
    };
    let start = text.find('{').ok_or_else(malformed)?;
    let end = text.rfind('}').ok_or_else(malformed)?;
    if end < start {
        return Err(malformed());
    }
    serde_json::from_str(text[start..=end].trim()).map_err(|_| malformed())
}

/// Resolves `{header rows list, subject header row}` from the answer.
///
/// Named keys are tried first. When a named value is missing or falsy the
/// answer is treated as schema-drifted: the first key/value pair stands in
/// for the header rows and the second for the subject row. The returned
/// [`ResolutionPath`] records which route was taken.
pub fn resolve(answer: &Value) -> Result<Resolution> {
    let object = answer
        .as_object()
        .ok_or_else(|| AnalysisError::header("oracle answer is not an object", answer))?;

    let mut path = ResolutionPath::Named;

    let header_candidate = match named(object, &HEADER_ROWS_KEYS) {
        Some(value) => value,
        None => {
            path = ResolutionPath::Positional;
            positional(object, 0)
                .ok_or_else(|| AnalysisError::header("no header rows in oracle answer", answer))?
        }
    };

    let subject_candidate = match named(object, &SUBJECT_ROW_KEYS) {
        Some(value) => value,
        None => {
            path = ResolutionPath::Positional;
            positional(object, 1)
                .ok_or_else(|| AnalysisError::header("no subject row in oracle answer", answer))?
        }
    };

    let header_rows = coerce_rows(header_candidate).ok_or_else(|| {
        AnalysisError::header("header rows are not a list of positive integers", header_candidate)
    })?;
    let subject_row = coerce_row(subject_candidate).ok_or_else(|| {
        AnalysisError::header("subject row is not a positive integer", subject_candidate)
    })?;

    let spec = HeaderSpec {
        header_rows,
        subject_row,
    };

    if path == ResolutionPath::Positional {
        warn!(
            header_rows = ?spec.header_rows,
            subject_row = spec.subject_row,
            "oracle answer lacked named keys, recovered header layout by position"
        );
    } else {
        debug!(header_rows = ?spec.header_rows, subject_row = spec.subject_row, "resolved header layout");
    }
    if !spec.subject_above_headers() {
        warn!(
            subject_row = spec.subject_row,
            first_header_row = ?spec.header_rows.first(),
            "subject row is not above the header block"
        );
    }

    Ok(Resolution { spec, path })
}

fn named<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !is_falsy(value))
}

fn positional(object: &serde_json::Map<String, Value>, index: usize) -> Option<&Value> {
    object.values().nth(index).filter(|value| !is_falsy(value))
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// A non-empty list of positive row numbers, sorted and de-duplicated.
/// Accepts arrays, a single number, or free text such as "5, 6 and 7" or
/// "rows 5-7".
fn coerce_rows(value: &Value) -> Option<Vec<usize>> {
    let mut rows: Vec<usize> = match value {
        Value::Array(items) => items.iter().map(coerce_row).collect::<Option<_>>()?,
        Value::String(s) => {
            // "5-7" spans 5, 6 and 7
            let numbers = Regex::new(r"(\d+)(?:\s*-\s*(\d+))?").ok()?;
            let mut rows = Vec::new();
            for caps in numbers.captures_iter(s) {
                let start = caps[1].parse::<usize>().ok().filter(|n| *n > 0)?;
                let end = match caps.get(2) {
                    Some(end) => end.as_str().parse::<usize>().ok()?,
                    None => start,
                };
                if end < start {
                    return None;
                }
                rows.extend(start..=end);
            }
            rows
        }
        other => vec![coerce_row(other)?],
    };
    if rows.is_empty() {
        return None;
    }
    rows.sort_unstable();
    rows.dedup();
    Some(rows)
}

fn coerce_row(value: &Value) -> Option<usize> {
    let row = match value {
        Value::Number(n) => match n.as_u64() {
            Some(u) => u as usize,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 1.0 {
                    return None;
                }
                f as usize
            }
        },
        Value::String(s) => s.trim().parse::<usize>().ok()?,
        Value::Array(items) if items.len() == 1 => coerce_row(&items[0])?,
        _ => return None,
    };
    (row > 0).then_some(row)
}
