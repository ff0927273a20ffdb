use thiserror::Error;

/// Errors raised while turning an attendance sheet into a report.
///
/// Structural problems (no usable header layout, no subjects, empty input)
/// stop the pipeline. `ColumnTypeMismatch` is only ever recorded as a
/// diagnostic for a skipped column.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("header oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("header oracle returned a malformed answer: {raw}")]
    OracleResponseMalformed { raw: String },

    #[error("could not resolve header rows: {reason} (raw value: {raw})")]
    HeaderResolutionFailed { reason: String, raw: String },

    #[error("could not extract subject names: {0}")]
    SubjectExtractionFailed(String),

    #[error("empty input at stage '{0}'")]
    EmptyInput(&'static str),

    #[error("column '{0}' is not numeric")]
    ColumnTypeMismatch(String),

    #[error("attendance threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("unsupported sheet format: {0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Workbook(#[from] calamine::Error),
}

impl AnalysisError {
    /// Stable label for callers that branch on the failure without parsing
    /// the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::OracleUnavailable(_) => "oracle_unavailable",
            AnalysisError::OracleResponseMalformed { .. } => "oracle_response_malformed",
            AnalysisError::HeaderResolutionFailed { .. } => "header_resolution_failed",
            AnalysisError::SubjectExtractionFailed(_) => "subject_extraction_failed",
            AnalysisError::EmptyInput(_) => "empty_input",
            AnalysisError::ColumnTypeMismatch(_) => "column_type_mismatch",
            AnalysisError::InvalidThreshold(_) => "invalid_threshold",
            AnalysisError::UnsupportedFormat(_) => "unsupported_format",
            AnalysisError::Io(_) => "io",
            AnalysisError::Csv(_) => "csv",
            AnalysisError::Workbook(_) => "workbook",
        }
    }

    /// Whether running the same upload again can succeed. The oracle is
    /// probabilistic, so everything derived from its answer is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::OracleUnavailable(_)
                | AnalysisError::OracleResponseMalformed { .. }
                | AnalysisError::HeaderResolutionFailed { .. }
                | AnalysisError::SubjectExtractionFailed(_)
        )
    }

    pub(crate) fn header(reason: impl Into<String>, raw: impl ToString) -> Self {
        AnalysisError::HeaderResolutionFailed {
            reason: reason.into(),
            raw: raw.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
