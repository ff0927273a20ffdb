use crate::aggregate::{aggregate, aggregate_weighted};
use crate::analyzer::{AttendanceAnalyzer, Extraction};
use crate::error::{AnalysisError, Result};
use crate::models::{Config, OverallStrategy, RawSheet, SubjectCatalog};
use crate::normalize::normalize;
use crate::oracle::HeaderOracle;
use crate::reader::read_with_header;
use crate::resolver::{resolve, Resolution};
use crate::table::NormalizedTable;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub min_percentage: f64,
    pub strategy: OverallStrategy,
    pub weights: HashMap<String, f64>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AnalysisOptions {
    fn from(config: &Config) -> Self {
        Self {
            min_percentage: config.min_percentage,
            strategy: config.overall_strategy,
            weights: config.subject_weights.clone().unwrap_or_default(),
        }
    }
}

/// Everything produced for one uploaded sheet. Each stage's output is kept
/// so earlier artifacts can still be inspected after later stages ran.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    pub raw: RawSheet,
    pub resolution: Resolution,
    pub catalog: SubjectCatalog,
    /// Header-aware parse with every column.
    pub table: NormalizedTable,
    /// Student-name and percentage columns, normalized.
    pub normalized: NormalizedTable,
    /// `normalized` plus the overall column.
    pub aggregated: NormalizedTable,
    pub overall_column: Option<String>,
    pub extraction: Extraction,
}

impl AnalysisSession {
    /// Asks `oracle` for the header layout, then runs every stage.
    pub async fn run<O: HeaderOracle>(
        oracle: &O,
        raw: RawSheet,
        options: &AnalysisOptions,
    ) -> Result<Self> {
        if raw.is_empty() {
            return Err(AnalysisError::EmptyInput("read"));
        }
        let answer = oracle.propose(&raw).await?;
        Self::from_answer(raw, &answer, options)
    }

    /// Runs every stage from an oracle answer already in hand.
    pub fn from_answer(raw: RawSheet, answer: &Value, options: &AnalysisOptions) -> Result<Self> {
        if raw.is_empty() {
            return Err(AnalysisError::EmptyInput("read"));
        }

        // Layout first: nothing below works without it
        let resolution = resolve(answer)?;
        let table = read_with_header(&raw, &resolution.spec)?;
        let catalog = SubjectCatalog::from_sheet(&raw, resolution.spec.subject_row)?;
        info!(subjects = ?catalog.subjects, "subject catalog");

        // Names and percentages only, on one scale
        let normalized = normalize(&table.report_projection());
        let (aggregated, overall_column) = match options.strategy {
            OverallStrategy::Unweighted => aggregate(&normalized)?,
            OverallStrategy::Weighted => aggregate_weighted(&normalized, &options.weights)?,
        };

        // Soft failure: the status says what went wrong
        let extraction = AttendanceAnalyzer::new(options.min_percentage).extract(&aggregated);
        info!(status = extraction.status.as_str(), "analysis finished");

        Ok(Self {
            raw,
            resolution,
            catalog,
            table,
            normalized,
            aggregated,
            overall_column,
            extraction,
        })
    }

    /// Students listed for one report key, one `'name': pct` line each.
    pub fn select(&self, subject: &str) -> String {
        match self.extraction.report.get(subject) {
            None => "No information available for this subject.".to_string(),
            Some(shortfall) if shortfall.students.is_empty() => {
                "No information available".to_string()
            }
            Some(shortfall) => shortfall
                .students
                .iter()
                .map(|s| format!("'{}': {}\n", s.student, s.percentage))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HeaderSpec;
    use crate::oracle::StaticOracle;
    use crate::reader::SheetReader;
    use crate::resolver::ResolutionPath;
    use serde_json::json;

    const SHEET: &str = "\
Semester 3 attendance,,,,
,,MATHS,,PHYSICS
Roll,Name,Attended,%,%
1,Asha,36,0.9,0.5
2,Ravi,20,0.5,0.95
3,Meera,39,0.975,0.8
,Total classes,40,,
";

    fn raw() -> RawSheet {
        SheetReader::new().parse_csv(SHEET).unwrap()
    }

    #[tokio::test]
    async fn runs_every_stage() {
        let oracle = StaticOracle::from_rows(&[2, 3], 2);
        let session = AnalysisSession::run(&oracle, raw(), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(session.resolution.spec, HeaderSpec { header_rows: vec![2, 3], subject_row: 2 });
        assert_eq!(session.catalog.subjects, vec!["MATHS", "PHYSICS", "OVERALL"]);
        assert_eq!(session.overall_column.as_deref(), Some("OVERALL%"));
        assert!(session.extraction.status.is_success());
        assert_eq!(session.extraction.subjects, vec!["MATHS", "PHYSICS", "OVERALL"]);

        let report = serde_json::to_value(&session.extraction.report).unwrap();
        assert_eq!(
            report,
            json!({
                "MATHS": {"Ravi": 50.0},
                "PHYSICS": {"Asha": 50.0},
                "OVERALL": {"Asha": 70.0, "Ravi": 72.5}
            })
        );
        // earlier artifacts are untouched by later stages
        assert!(session.normalized.column("OVERALL%").is_none());
        assert_eq!(session.table.row_count(), 4);
    }

    #[test]
    fn drifted_answer_still_runs() {
        let answer = json!({"rows": [3, 2], "subjects": 2});
        let session = AnalysisSession::from_answer(raw(), &answer, &AnalysisOptions::default()).unwrap();
        assert_eq!(session.resolution.path, ResolutionPath::Positional);
        assert!(session.extraction.status.is_success());
    }

    #[test]
    fn structural_failures_stop_the_pipeline() {
        let bad_subject = json!({"header rows list": [2, 3], "subject header row": 40});
        let err = AnalysisSession::from_answer(raw(), &bad_subject, &AnalysisOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), "subject_extraction_failed");
        assert!(err.is_retryable());

        let err = AnalysisSession::from_answer(RawSheet::default(), &bad_subject, &AnalysisOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::EmptyInput(_)));
    }

    #[test]
    fn fraction_column_with_a_full_total_row_is_rescaled() {
        let sheet = "\
,MATHS,PHYSICS
Name,%,%
Asha,80,0.75
Ravi,65,0.7
Total classes,100,1
";
        let raw = SheetReader::new().parse_csv(sheet).unwrap();
        let answer = json!({"header rows list": [1, 2], "subject header row": 1});
        let options = AnalysisOptions {
            min_percentage: 50.0,
            ..AnalysisOptions::default()
        };
        let session = AnalysisSession::from_answer(raw, &answer, &options).unwrap();

        let report = serde_json::to_value(&session.extraction.report).unwrap();
        assert_eq!(report["MATHS"], json!({}));
        assert_eq!(report["PHYSICS"], json!({}));
        assert_eq!(session.select("PHYSICS"), "No information available");
    }

    #[test]
    fn select_renders_one_subject() {
        let answer = json!({"header rows list": [2, 3], "subject header row": 2});
        let session = AnalysisSession::from_answer(raw(), &answer, &AnalysisOptions::default()).unwrap();
        assert_eq!(session.select("MATHS"), "'Ravi': 50\n");
        assert_eq!(session.select("CHEMISTRY"), "No information available for this subject.");

        let strict = AnalysisOptions {
            min_percentage: 10.0,
            ..AnalysisOptions::default()
        };
        let session = AnalysisSession::from_answer(raw(), &answer, &strict).unwrap();
        assert_eq!(session.select("MATHS"), "No information available");
    }
}
