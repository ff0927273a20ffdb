use crate::error::{AnalysisError, Result};
use crate::normalize::normalize;
use crate::table::NormalizedTable;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Success,
    EmptyDataframe,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionStatus::Success => "success",
            ExtractionStatus::EmptyDataframe => "Empty Dataframe",
            ExtractionStatus::Failed => "Failed to find low attendance students",
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ExtractionStatus::Success
    }
}

impl Serialize for ExtractionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentPercentage {
    pub student: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectShortfall {
    pub key: String,
    pub students: Vec<StudentPercentage>,
}

impl SubjectShortfall {
    pub fn get(&self, student: &str) -> Option<f64> {
        self.students
            .iter()
            .find(|s| s.student == student)
            .map(|s| s.percentage)
    }
}

/// Students under the threshold, per sanitized subject key, in column order.
/// Serializes as `{key: {student: percentage}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LowAttendanceReport {
    subjects: Vec<SubjectShortfall>,
}

impl LowAttendanceReport {
    pub fn subjects(&self) -> &[SubjectShortfall] {
        &self.subjects
    }

    pub fn get(&self, key: &str) -> Option<&SubjectShortfall> {
        self.subjects.iter().find(|s| s.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.subjects.iter().map(|s| s.key.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// A key seen again (two labels sanitizing alike) keeps its position and
    /// takes the newer students.
    fn insert(&mut self, shortfall: SubjectShortfall) {
        match self.subjects.iter_mut().find(|s| s.key == shortfall.key) {
            Some(existing) => *existing = shortfall,
            None => self.subjects.push(shortfall),
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

struct StudentMap<'a>(&'a [StudentPercentage]);

impl Serialize for StudentMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.student, &entry.percentage)?;
        }
        map.end()
    }
}

impl Serialize for LowAttendanceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.subjects.len()))?;
        for subject in &self.subjects {
            map.serialize_entry(&subject.key, &StudentMap(&subject.students))?;
        }
        map.end()
    }
}

/// Outcome of a low-attendance pass. Callers branch on `status`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Extraction {
    pub report: LowAttendanceReport,
    pub subjects: Vec<String>,
    pub status: ExtractionStatus,
    /// Percentage columns skipped because they held non-numeric data.
    pub skipped_columns: Vec<String>,
}

impl Extraction {
    fn with_status(status: ExtractionStatus) -> Self {
        Self {
            report: LowAttendanceReport::default(),
            subjects: Vec::new(),
            status,
            skipped_columns: Vec::new(),
        }
    }
}

pub struct AttendanceAnalyzer {
    pub min_percentage: f64,
}

impl AttendanceAnalyzer {
    pub fn new(min_percentage: f64) -> Self {
        Self { min_percentage }
    }

    /// Lists students strictly below `min_percentage` in every percentage
    /// column, the overall column included.
    ///
    /// Never fails: an empty table yields `EmptyDataframe`, any other problem
    /// `Failed`, both with an empty report.
    pub fn extract(&self, table: &NormalizedTable) -> Extraction {
        if table.is_empty() {
            warn!("no rows to extract low attendance from");
            return Extraction::with_status(ExtractionStatus::EmptyDataframe);
        }
        match self.try_extract(table) {
            Ok(extraction) => extraction,
            Err(e) => {
                error!(error = %e, kind = e.kind(), "error in finding low attendance students");
                Extraction::with_status(ExtractionStatus::Failed)
            }
        }
    }

    fn try_extract(&self, table: &NormalizedTable) -> Result<Extraction> {
        if !self.min_percentage.is_finite() {
            return Err(AnalysisError::InvalidThreshold(self.min_percentage));
        }

        // Summary rows such as "Total classes" are not students.
        let names = table.student_names();
        let students_only = table.retain_rows(|row| !names[row].to_lowercase().contains("total"));
        let table = normalize(&students_only);
        let names = table.student_names();

        let mut extraction = Extraction::with_status(ExtractionStatus::Success);
        // Roles keep the student-name column out of this set.
        for column in table.percentage_columns() {
            let Some(values) = column.numbers() else {
                let mismatch = AnalysisError::ColumnTypeMismatch(column.label.clone());
                warn!(column = %column.label, kind = mismatch.kind(), "{}, skipping", mismatch);
                extraction.skipped_columns.push(column.label.clone());
                continue;
            };

            let mut students: Vec<StudentPercentage> = Vec::new();
            for (name, value) in names.iter().zip(values) {
                if value >= self.min_percentage {
                    continue;
                }
                match students.iter_mut().find(|s| &s.student == name) {
                    Some(existing) => existing.percentage = value,
                    None => students.push(StudentPercentage {
                        student: name.clone(),
                        percentage: value,
                    }),
                }
            }

            let key = column.key();
            if !extraction.subjects.contains(&key) {
                extraction.subjects.push(key.clone());
            }
            extraction.report.insert(SubjectShortfall { key, students });
        }

        info!(
            subjects = extraction.subjects.len(),
            skipped = extraction.skipped_columns.len(),
            threshold = self.min_percentage,
            "extracted low attendance students"
        );
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

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
    fn reports_students_strictly_below_threshold() {
        let input = table(vec![
            ("Name", vec![text("Asha"), text("Ravi"), text("Meera")]),
            ("Math%", nums(&[90.5, 72.0, 85.1])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        assert_eq!(extraction.status, ExtractionStatus::Success);
        assert_eq!(extraction.subjects, vec!["Math"]);
        let math = extraction.report.get("Math").unwrap();
        assert_eq!(math.students.len(), 1);
        assert_eq!(math.get("Ravi"), Some(72.0));

        let json = serde_json::to_value(&extraction.report).unwrap();
        assert_eq!(json, serde_json::json!({"Math": {"Ravi": 72.0}}));
    }

    #[test]
    fn value_at_threshold_is_not_reported() {
        let input = table(vec![
            ("Name", vec![text("Asha")]),
            ("Math%", nums(&[75.0])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        assert!(extraction.report.get("Math").unwrap().students.is_empty());
    }

    #[test]
    fn fractional_columns_are_scaled_before_filtering() {
        let input = table(vec![
            ("Name", vec![text("Asha"), text("Ravi"), text("Meera")]),
            ("Chem %", nums(&[0.749, 0.801, 0.70])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        let chem = extraction.report.get("Chem").unwrap();
        assert_eq!(chem.get("Asha"), Some(74.9));
        assert_eq!(chem.get("Meera"), Some(70.0));
        assert_eq!(chem.get("Ravi"), None);
    }

    #[test]
    fn total_rows_never_appear() {
        let input = table(vec![
            ("Name", vec![text("Asha"), text("TOTAL classes"), text("Grand total")]),
            ("Math%", nums(&[10.0, 20.0, 30.0])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        let math = extraction.report.get("Math").unwrap();
        assert_eq!(math.students.len(), 1);
        assert_eq!(math.get("Asha"), Some(10.0));
    }

    #[test]
    fn empty_table_reports_empty_dataframe() {
        let extraction = AttendanceAnalyzer::new(75.0).extract(&NormalizedTable::default());
        assert_eq!(extraction.status.as_str(), "Empty Dataframe");
        assert!(extraction.report.is_empty());
        assert!(extraction.subjects.is_empty());
    }

    #[test]
    fn non_numeric_percentage_column_is_skipped() {
        let input = table(vec![
            ("Name", vec![text("Asha"), text("Ravi")]),
            ("Remarks %", vec![text("absent"), CellValue::Number(40.0)]),
            ("Math%", nums(&[50.0, 80.0])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        assert!(extraction.status.is_success());
        assert_eq!(extraction.skipped_columns, vec!["Remarks %"]);
        assert_eq!(extraction.report.keys(), vec!["Math"]);
    }

    #[test]
    fn colliding_keys_keep_one_entry() {
        let input = table(vec![
            ("Name", vec![text("Asha")]),
            ("A-B%", nums(&[10.0])),
            ("AB %", nums(&[20.0])),
        ]);
        let extraction = AttendanceAnalyzer::new(75.0).extract(&input);
        assert_eq!(extraction.subjects, vec!["AB"]);
        assert_eq!(extraction.report.get("AB").unwrap().get("Asha"), Some(20.0));
    }

    #[test]
    fn raising_the_threshold_never_drops_a_student() {
        let input = table(vec![
            ("Name", vec![text("A"), text("B"), text("C"), text("D")]),
            ("Math%", nums(&[55.0, 74.99, 75.0, 92.0])),
            ("Lab %", nums(&[0.8, 0.6, 0.95, 0.74])),
        ]);
        let thresholds = [0.0, 50.0, 60.0, 75.0, 80.0, 100.0];
        for pair in thresholds.windows(2) {
            let low = AttendanceAnalyzer::new(pair[0]).extract(&input);
            let high = AttendanceAnalyzer::new(pair[1]).extract(&input);
            for subject in low.report.subjects() {
                let wider = high.report.get(&subject.key).unwrap();
                for student in &subject.students {
                    assert!(wider.get(&student.student).is_some());
                }
            }
        }
    }

    #[test]
    fn non_finite_threshold_fails_softly() {
        let input = table(vec![("Name", vec![text("A")]), ("Math%", nums(&[50.0]))]);
        let extraction = AttendanceAnalyzer::new(f64::NAN).extract(&input);
        assert_eq!(extraction.status, ExtractionStatus::Failed);
        assert!(extraction.report.is_empty());
    }
}
