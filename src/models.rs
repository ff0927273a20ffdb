use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label appended to every subject catalog and used for the combined bucket.
pub const OVERALL_SUBJECT: &str = "OVERALL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub min_percentage: f64,
    pub output_directory: Option<String>,
    #[serde(default)]
    pub overall_strategy: OverallStrategy,
    /// Per-subject weights keyed by sanitized column key, only read by the
    /// weighted strategy.
    pub subject_weights: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStrategy {
    #[default]
    #[serde(rename = "unweighted")]
    Unweighted,
    #[serde(rename = "weighted")]
    Weighted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub api_key_env: String,
    pub endpoint: String,
    pub model: String,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.0-flash".to_string(),
            max_retries: 3,
            retry_delay_secs: 5,
            timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_percentage: 75.0,
            output_directory: Some("output".to_string()),
            overall_strategy: OverallStrategy::Unweighted,
            subject_weights: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

/// One cell as delivered by the sheet reader.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Reads a textual cell, promoting anything that parses as a number.
    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

/// The sheet exactly as read, one entry per physical row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    /// Physical row `number` (1-based).
    pub fn row(&self, number: usize) -> Option<&[CellValue]> {
        number
            .checked_sub(1)
            .and_then(|idx| self.rows.get(idx))
            .map(|r| r.as_slice())
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(CellValue::is_empty))
    }

    /// Renders the sheet as CSV text, the form the header oracle reads.
    pub fn to_csv(&self) -> Result<String> {
        let width = self.width();
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
        for row in &self.rows {
            let mut record: Vec<String> = row.iter().map(|c| c.to_string()).collect();
            record.resize(width, String::new());
            writer.write_record(&record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AnalysisError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Which physical rows form the column headers and which row names subjects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderSpec {
    pub header_rows: Vec<usize>,
    pub subject_row: usize,
}

impl HeaderSpec {
    pub fn last_header_row(&self) -> usize {
        self.header_rows.last().copied().unwrap_or(0)
    }

    pub fn subject_above_headers(&self) -> bool {
        self.header_rows
            .first()
            .map(|first| self.subject_row < *first)
            .unwrap_or(false)
    }
}

/// Upper-cased subject labels taken from the subject row, ending in `OVERALL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectCatalog {
    pub subjects: Vec<String>,
}

impl SubjectCatalog {
    pub fn from_sheet(sheet: &RawSheet, subject_row: usize) -> Result<Self> {
        let row = sheet.row(subject_row).ok_or_else(|| {
            AnalysisError::SubjectExtractionFailed(format!(
                "subject row {} is outside the sheet ({} rows)",
                subject_row,
                sheet.rows.len()
            ))
        })?;

        let mut subjects: Vec<String> = Vec::new();
        for cell in row {
            if cell.is_empty() {
                continue;
            }
            let label = cell.to_string().trim().to_uppercase();
            if label.is_empty() || is_placeholder_label(&label) {
                continue;
            }
            if !subjects.contains(&label) {
                subjects.push(label);
            }
        }

        if subjects.is_empty() {
            return Err(AnalysisError::SubjectExtractionFailed(format!(
                "row {} holds no subject labels",
                subject_row
            )));
        }

        subjects.push(OVERALL_SUBJECT.to_string());
        Ok(Self { subjects })
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }
}

/// Header text that stands in for an empty or merged cell.
pub fn is_placeholder_label(label: &str) -> bool {
    label.to_uppercase().contains("UNNAMED")
}

/// Keep only ASCII letters and digits, making a label safe as a report key.
pub fn sanitize_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
}
