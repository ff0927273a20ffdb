use crate::error::{AnalysisError, Result};
use crate::models::CellValue;
use crate::normalize::round2;
use crate::table::{Column, ColumnRole, NormalizedTable, Scale};
use std::collections::HashMap;
use tracing::{info, warn};

/// Label of the synthetic per-student average column.
pub const OVERALL_COLUMN: &str = "OVERALL%";

/// Appends `OVERALL%`: the unweighted mean of each student's percentage
/// columns, rounded to 2 decimals. Every subject counts the same no matter
/// how many classes it held.
///
/// Returns the table unchanged and `None` when it has no percentage columns.
pub fn aggregate(table: &NormalizedTable) -> Result<(NormalizedTable, Option<String>)> {
    aggregate_with(table, |_| Some(1.0))
}

/// Weighted variant of [`aggregate`]. `weights` is keyed by sanitized
/// column key; columns without an entry weigh 1.0 and columns with a
/// non-positive weight are left out.
pub fn aggregate_weighted(
    table: &NormalizedTable,
    weights: &HashMap<String, f64>,
) -> Result<(NormalizedTable, Option<String>)> {
    aggregate_with(table, |column| {
        let weight = weights.get(&column.key()).copied().unwrap_or(1.0);
        (weight > 0.0).then_some(weight)
    })
}

fn aggregate_with(
    table: &NormalizedTable,
    weight_of: impl Fn(&Column) -> Option<f64>,
) -> Result<(NormalizedTable, Option<String>)> {
    if table.is_empty() {
        return Err(AnalysisError::EmptyInput("aggregate"));
    }

    // A previous overall column is replaced, never averaged into the new one.
    let base = NormalizedTable::from_columns(
        table
            .columns()
            .iter()
            .filter(|c| c.label != OVERALL_COLUMN)
            .cloned()
            .collect(),
    );

    let mut sources: Vec<(Vec<f64>, f64)> = Vec::new();
    let mut all_percent = true;
    for column in base.percentage_columns() {
        let Some(values) = column.numbers() else {
            warn!(column = %column.label, "percentage column is not numeric, left out of the overall average");
            continue;
        };
        match weight_of(column) {
            Some(weight) => {
                all_percent &= column.scale == Scale::Percent;
                sources.push((values, weight));
            }
            None => warn!(column = %column.label, "non-positive weight, left out of the overall average"),
        }
    }

    if sources.is_empty() {
        warn!("no percentage columns to average");
        return Ok((table.clone(), None));
    }

    let total_weight: f64 = sources.iter().map(|(_, w)| w).sum();
    let overall = (0..base.row_count())
        .map(|row| {
            let sum: f64 = sources.iter().map(|(values, w)| values[row] * w).sum();
            CellValue::Number(round2(sum / total_weight))
        })
        .collect();

    info!(columns = sources.len(), rows = base.row_count(), "added overall percentage");
    let column = Column {
        label: OVERALL_COLUMN.to_string(),
        role: ColumnRole::Percentage,
        // a mean of unscaled columns may itself still be a fraction
        scale: if all_percent { Scale::Percent } else { Scale::Unknown },
        values: overall,
    };
    Ok((base.with_column(column), Some(OVERALL_COLUMN.to_string())))
}
