//! Multi-row header handling: building one header tuple per column from the
//! rows named in a [`HeaderSpec`] and flattening each tuple into a label.

use crate::error::{AnalysisError, Result};
use crate::models::{is_placeholder_label, CellValue, HeaderSpec, RawSheet};
use std::fmt;

pub const HEADER_SEPARATOR: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCell {
    Label(String),
    /// An empty header cell that nothing could be inherited into.
    Placeholder { column: usize, level: usize },
}

impl HeaderCell {
    pub fn is_placeholder(&self) -> bool {
        match self {
            HeaderCell::Placeholder { .. } => true,
            HeaderCell::Label(label) => is_placeholder_label(label),
        }
    }
}

impl fmt::Display for HeaderCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderCell::Label(label) => write!(f, "{}", label),
            HeaderCell::Placeholder { column, level } => {
                write!(f, "Unnamed: {}_level_{}", column, level)
            }
        }
    }
}

/// One label per column: the non-placeholder parts joined with `-`. A
/// column made only of placeholders is rendered as the whole tuple so it
/// still gets a name.
pub fn flatten(tuple: &[HeaderCell]) -> String {
    let parts: Vec<String> = tuple
        .iter()
        .filter(|cell| !cell.is_placeholder())
        .map(|cell| cell.to_string())
        .collect();
    if !parts.is_empty() {
        return parts.join(HEADER_SEPARATOR);
    }

    match tuple {
        [single] => single.to_string(),
        cells => format!(
            "({})",
            cells.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// Header tuples for every column of `sheet`, read from `spec.header_rows`.
///
/// Every level but the last is forward-filled to emulate merged cells: an
/// empty cell takes the label to its left while the levels above it were
/// themselves filled at that position.
pub fn header_tuples(sheet: &RawSheet, spec: &HeaderSpec) -> Result<Vec<Vec<HeaderCell>>> {
    let width = sheet.width();
    let mut levels: Vec<Vec<Option<String>>> = Vec::with_capacity(spec.header_rows.len());

    for &row_number in &spec.header_rows {
        let row = sheet.row(row_number).ok_or_else(|| {
            AnalysisError::header(
                format!("header row is outside the sheet ({} rows)", sheet.rows.len()),
                row_number,
            )
        })?;
        let mut level: Vec<Option<String>> = row
            .iter()
            .map(|cell| match cell {
                CellValue::Empty => None,
                other if other.is_empty() => None,
                other => Some(other.to_string().trim().to_string()),
            })
            .collect();
        level.resize(width, None);
        levels.push(level);
    }

    let mut control = vec![true; width];
    let fill_levels = levels.len().saturating_sub(1);
    for level in levels.iter_mut().take(fill_levels) {
        forward_fill(level, &mut control);
    }

    let tuples = (0..width)
        .map(|column| {
            levels
                .iter()
                .enumerate()
                .map(|(level_idx, level)| match &level[column] {
                    Some(label) => HeaderCell::Label(label.clone()),
                    None => HeaderCell::Placeholder { column, level: level_idx },
                })
                .collect()
        })
        .collect();
    Ok(tuples)
}

fn forward_fill(level: &mut [Option<String>], control: &mut [bool]) {
    let mut last = level.first().cloned().flatten();
    for i in 1..level.len() {
        if !control[i] {
            last = level[i].clone();
        }
        if let Some(label) = level[i].clone() {
            control[i] = false;
            last = Some(label);
        } else {
            level[i] = last.clone();
        }
    }
}
