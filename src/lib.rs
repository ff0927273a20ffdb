//! Finds students below an attendance threshold in spreadsheets whose header
//! layout has to be worked out first: multi-row headers, merged subject
//! cells and a mix of fraction and percentage encodings.
//!
//! Stages, in pipeline order: [`reader`] → [`resolver`] (with an
//! [`oracle`] answer) → [`header`] flattening → [`normalize`] →
//! [`aggregate`] → [`analyzer`]. [`session::AnalysisSession`] runs them for
//! one upload.

pub mod aggregate;
pub mod analyzer;
pub mod error;
pub mod header;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod reader;
pub mod resolver;
pub mod session;
pub mod table;

pub use analyzer::{AttendanceAnalyzer, Extraction, ExtractionStatus, LowAttendanceReport};
pub use error::AnalysisError;
pub use models::{CellValue, Config, HeaderSpec, RawSheet, SubjectCatalog};
pub use session::{AnalysisOptions, AnalysisSession};
pub use table::NormalizedTable;
