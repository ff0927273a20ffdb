use crate::table::{Column, ColumnRole, NormalizedTable, Scale};
use crate::models::CellValue;
use tracing::{debug, warn};

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Puts every numeric column on the 0-100 scale and rounds to 2 decimals.
///
/// A column whose minimum and maximum are both below 1 is read as a
/// fraction and multiplied by 100, then marked [`Scale::Percent`] so a later
/// pass never rescales it again. Columns left at their magnitude keep an
/// unknown scale: once summary rows are dropped, the remaining values may
/// still turn out to be fractions. Non-numeric columns and the student-name
/// column pass through.
pub fn normalize(table: &NormalizedTable) -> NormalizedTable {
    let columns = table.columns().iter().map(normalize_column).collect();
    table.with_columns(columns)
}

fn normalize_column(column: &Column) -> Column {
    if column.role == ColumnRole::StudentName {
        return column.clone();
    }
    let values = match column.numbers() {
        Some(values) if !values.is_empty() => values,
        _ => return column.clone(),
    };

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let fraction = column.scale == Scale::Unknown && min < 1.0 && max < 1.0;
    if fraction {
        debug!(column = %column.label, min, max, "rescaling fractional column");
    }

    let mut clamped = 0usize;
    let values = values
        .into_iter()
        .map(|v| {
            let v = round2(if fraction { v * 100.0 } else { v });
            if column.role == ColumnRole::Percentage && !(0.0..=100.0).contains(&v) {
                clamped += 1;
                CellValue::Number(v.clamp(0.0, 100.0))
            } else {
                CellValue::Number(v)
            }
        })
        .collect();
    if clamped > 0 {
        warn!(column = %column.label, clamped, "percentages outside 0-100 were clamped");
    }

    Column {
        label: column.label.clone(),
        role: column.role,
        scale: if fraction { Scale::Percent } else { column.scale },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn nums(values: &[f64]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::Number(*v)).collect()
    }

    fn table(columns: Vec<(&str, Vec<CellValue>)>) -> NormalizedTable {
        NormalizedTable::from_labeled(
            columns
                .into_iter()
                .map(|(label, values)| (label.to_string(), values))
                .collect(),
        )
    }

    #[test]
    fn fractional_column_is_rescaled() {
        let input = table(vec![
            ("Name", vec![text("A"), text("B"), text("C")]),
            ("Chem_", nums(&[0.749, 0.801, 0.70])),
        ]);
        let output = normalize(&input);
        assert_eq!(output.column("Chem_").unwrap().values, nums(&[74.9, 80.1, 70.0]));
        // input stays as it was
        assert_eq!(input.column("Chem_").unwrap().values, nums(&[0.749, 0.801, 0.70]));
    }

    #[test]
    fn percentage_scaled_column_is_only_rounded() {
        let input = table(vec![
            ("Name", vec![text("A"), text("B")]),
            ("Math%", nums(&[90.456, 0.5])),
        ]);
        let output = normalize(&input);
        assert_eq!(output.column("Math%").unwrap().values, nums(&[90.46, 0.5]));
    }

    #[test]
    fn normalization_is_idempotent() {
        let input = table(vec![
            ("Name", vec![text("A"), text("B"), text("C")]),
            ("Tiny%", nums(&[0.001, 0.004, 0.0])),
            ("Lab %", nums(&[0.5, 0.25, 0.999])),
            ("Theory %", nums(&[72.123, 100.0, 35.5])),
            ("Remarks", vec![text("ok"), CellValue::Number(1.0), text("late")]),
        ]);
        let once = normalize(&input);
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert_eq!(once.column("Remarks"), input.column("Remarks"));
    }

    #[test]
    fn dropping_a_total_row_exposes_fractions() {
        let input = table(vec![
            ("Name", vec![text("Asha"), text("Ravi"), text("Total")]),
            ("PHYSICS-%", nums(&[0.75, 0.7, 1.0])),
        ]);
        let first = normalize(&input);
        assert_eq!(first.column("PHYSICS-%").unwrap().values, nums(&[0.75, 0.7, 1.0]));

        let students = first.retain_rows(|row| row < 2);
        let second = normalize(&students);
        let column = second.column("PHYSICS-%").unwrap();
        assert_eq!(column.values, nums(&[75.0, 70.0]));
        assert_eq!(column.scale, Scale::Percent);
    }

    #[test]
    fn percentages_stay_within_bounds() {
        let input = table(vec![
            ("Name", vec![text("A"), text("B"), text("C")]),
            ("Math%", nums(&[104.0, -3.0, 50.0])),
            ("Classes held", nums(&[140.0, 140.0, 140.0])),
        ]);
        let output = normalize(&input);
        for column in output.percentage_columns() {
            for value in column.numbers().unwrap() {
                assert!((0.0..=100.0).contains(&value), "{value} out of range");
            }
        }
        assert_eq!(output.column("Classes held").unwrap().values, nums(&[140.0, 140.0, 140.0]));
    }
}
