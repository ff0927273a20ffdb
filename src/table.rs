use crate::models::{sanitize_key, CellValue};
use serde::Serialize;

/// Marker that tags a flattened label as a percentage column.
pub const PERCENT_MARKER: char = '%';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnRole {
    StudentName,
    Percentage,
    Other,
}

impl ColumnRole {
    fn for_label(label: &str) -> Self {
        if label.contains(PERCENT_MARKER) {
            ColumnRole::Percentage
        } else {
            ColumnRole::Other
        }
    }
}

/// Whether a numeric column is already known to be on the 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scale {
    Unknown,
    Percent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    pub role: ColumnRole,
    pub scale: Scale,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(label: impl Into<String>, role: ColumnRole, values: Vec<CellValue>) -> Self {
        Self {
            label: label.into(),
            role,
            scale: Scale::Unknown,
            values,
        }
    }

    pub fn numbers(&self) -> Option<Vec<f64>> {
        self.values.iter().map(CellValue::as_number).collect()
    }

    pub fn is_numeric(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.as_number().is_some())
    }

    pub fn key(&self) -> String {
        sanitize_key(&self.label)
    }
}

/// Column-oriented student table. Every stage takes `&NormalizedTable` and
/// hands back a new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    columns: Vec<Column>,
    row_count: usize,
}

impl NormalizedTable {
    /// Builds a table from flattened labels and per-column values, tagging
    /// roles: the first label mentioning "name" (else column 0) holds the
    /// students, labels with `%` are percentages.
    pub fn from_labeled(columns: Vec<(String, Vec<CellValue>)>) -> Self {
        let name_idx = columns
            .iter()
            .position(|(label, _)| label.to_lowercase().contains("name"))
            .unwrap_or(0);

        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(idx, (label, values))| {
                let role = if idx == name_idx {
                    ColumnRole::StudentName
                } else {
                    ColumnRole::for_label(&label)
                };
                Column::new(label, role, values)
            })
            .collect();
        Self::from_columns(columns)
    }

    /// Short columns are padded with `Empty` to the longest one.
    pub fn from_columns(mut columns: Vec<Column>) -> Self {
        let row_count = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
        for column in &mut columns {
            column.values.resize(row_count, CellValue::Empty);
        }
        Self { columns, row_count }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0 || self.columns.is_empty()
    }

    pub fn column(&self, label: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.label == label)
    }

    pub fn student_column(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.role == ColumnRole::StudentName)
            .or_else(|| self.columns.first())
    }

    pub fn percentage_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.role == ColumnRole::Percentage)
    }

    pub fn student_names(&self) -> Vec<String> {
        match self.student_column() {
            Some(column) => column.values.iter().map(|v| v.to_string()).collect(),
            None => vec![String::new(); self.row_count],
        }
    }

    pub fn with_columns(&self, columns: Vec<Column>) -> Self {
        Self::from_columns(columns)
    }

    pub fn with_column(&self, column: Column) -> Self {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::from_columns(columns)
    }

    pub fn retain_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.row_count).filter(|&i| keep(i)).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                values: kept.iter().map(|&i| c.values[i].clone()).collect(),
                ..c.clone()
            })
            .collect::<Vec<_>>();
        Self {
            columns,
            row_count: kept.len(),
        }
    }

    /// Fills empty cells outside the student-name column with `default`.
    pub fn fill_missing(&self, default: f64) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.role == ColumnRole::StudentName {
                    return c.clone();
                }
                Column {
                    values: c
                        .values
                        .iter()
                        .map(|v| match v {
                            CellValue::Empty => CellValue::Number(default),
                            other => other.clone(),
                        })
                        .collect(),
                    ..c.clone()
                }
            })
            .collect();
        Self {
            columns,
            row_count: self.row_count,
        }
    }

    /// Only the student-name column (first) and the percentage columns.
    pub fn report_projection(&self) -> Self {
        let mut columns: Vec<Column> = self
            .columns
            .iter()
            .filter(|c| c.role == ColumnRole::StudentName)
            .cloned()
            .collect();
        columns.extend(self.percentage_columns().cloned());
        Self {
            columns,
            row_count: self.row_count,
        }
    }

    pub fn write_csv<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.write_record(self.columns.iter().map(|c| c.label.as_str()))?;
        for row in 0..self.row_count {
            writer.write_record(self.columns.iter().map(|c| c.values[row].to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn sample() -> NormalizedTable {
        NormalizedTable::from_labeled(vec![
            ("Roll No".to_string(), vec![CellValue::Number(1.0), CellValue::Number(2.0)]),
            ("Student Name".to_string(), vec![text("Asha"), text("Ravi")]),
            ("MATH-Attended".to_string(), vec![CellValue::Number(30.0), CellValue::Number(20.0)]),
            ("MATH-%".to_string(), vec![CellValue::Number(90.0), CellValue::Number(60.0)]),
        ])
    }

    #[test]
    fn roles_follow_labels() {
        let table = sample();
        let roles: Vec<ColumnRole> = table.columns().iter().map(|c| c.role).collect();
        assert_eq!(
            roles,
            vec![ColumnRole::Other, ColumnRole::StudentName, ColumnRole::Other, ColumnRole::Percentage]
        );
        assert_eq!(table.student_names(), vec!["Asha", "Ravi"]);
    }

    #[test]
    fn first_column_is_the_student_column_without_a_name_label() {
        let table = NormalizedTable::from_labeled(vec![
            ("Student".to_string(), vec![text("Asha")]),
            ("Math%".to_string(), vec![CellValue::Number(90.0)]),
        ]);
        assert_eq!(table.columns()[0].role, ColumnRole::StudentName);
    }

    #[test]
    fn projection_keeps_name_then_percentages() {
        let projected = sample().report_projection();
        let labels: Vec<&str> = projected.columns().iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["Student Name", "MATH-%"]);
        assert_eq!(projected.row_count(), 2);
    }

    #[test]
    fn retain_rows_does_not_touch_the_source() {
        let table = sample();
        let filtered = table.retain_rows(|i| i == 1);
        assert_eq!(filtered.student_names(), vec!["Ravi"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn missing_cells_get_the_neutral_default() {
        let table = NormalizedTable::from_labeled(vec![
            ("Name".to_string(), vec![text("Asha"), CellValue::Empty]),
            ("Math%".to_string(), vec![CellValue::Empty, CellValue::Number(50.0)]),
        ])
        .fill_missing(0.0);
        assert_eq!(table.columns()[0].values[1], CellValue::Empty);
        assert_eq!(table.columns()[1].values, vec![CellValue::Number(0.0), CellValue::Number(50.0)]);
    }

    #[test]
    fn short_columns_are_padded() {
        let table = NormalizedTable::from_columns(vec![
            Column::new("Name", ColumnRole::StudentName, vec![text("Asha"), text("Ravi")]),
            Column::new("Math%", ColumnRole::Percentage, vec![CellValue::Number(1.0)]),
        ]);
        assert_eq!(table.columns()[1].values[1], CellValue::Empty);
        assert!(!table.columns()[1].is_numeric());
    }
}
