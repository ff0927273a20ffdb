use crate::error::{AnalysisError, Result};
use crate::header::{flatten, header_tuples};
use crate::models::{CellValue, HeaderSpec, RawSheet};
use crate::table::NormalizedTable;
use calamine::{open_workbook_auto, Data, Reader};
use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Value given to missing data cells before any arithmetic.
pub const MISSING_VALUE: f64 = 0.0;

pub struct SheetReader;

impl SheetReader {
    pub fn new() -> Self {
        Self
    }

    /// Reads the first sheet of a CSV, workbook or HTML-table export,
    /// keeping every physical row.
    pub fn read_file(&self, path: &Path) -> Result<RawSheet> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        let sheet = match extension.as_str() {
            "csv" => self.parse_csv(&fs::read_to_string(path)?)?,
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => self.read_workbook(path)?,
            "html" | "htm" => self.parse_html(&fs::read_to_string(path)?)?,
            other => return Err(AnalysisError::UnsupportedFormat(other.to_string())),
        };

        info!(path = %path.display(), rows = sheet.rows.len(), width = sheet.width(), "sheet read");
        if sheet.is_empty() {
            return Err(AnalysisError::EmptyInput("read"));
        }
        Ok(sheet)
    }

    pub fn parse_csv(&self, content: &str) -> Result<RawSheet> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(CellValue::from_text).collect());
        }
        Ok(RawSheet::new(rows))
    }

    fn read_workbook(&self, path: &Path) -> Result<RawSheet> {
        let mut workbook = open_workbook_auto(path)?;
        let range = match workbook.worksheet_range_at(0) {
            Some(range) => range?,
            None => return Err(AnalysisError::EmptyInput("read")),
        };

        // The range starts at its first used cell; pad back to A1 so row
        // numbers stay physical.
        let (row_offset, col_offset) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; col_offset];
            cells.extend(row.iter().map(cell_from_data));
            rows.push(cells);
        }
        Ok(RawSheet::new(rows))
    }

    /// First `<table>` of an HTML export. `colspan` cells are followed by
    /// empty cells, the way merged cells read from a workbook.
    pub fn parse_html(&self, content: &str) -> Result<RawSheet> {
        let document = Html::parse_document(content);
        let table_selector = selector("table")?;
        let row_selector = selector("tr")?;
        let cell_selector = selector("th, td")?;

        let Some(table) = document.select(&table_selector).next() else {
            warn!("no <table> element in HTML sheet");
            return Ok(RawSheet::default());
        };

        let mut rows = Vec::new();
        for row in table.select(&row_selector) {
            let mut cells = Vec::new();
            for cell in row.select(&cell_selector) {
                cells.push(CellValue::from_text(&cell_text(&cell)));
                let span = cell
                    .value()
                    .attr("colspan")
                    .and_then(|s| s.trim().parse::<usize>().ok())
                    .unwrap_or(1);
                cells.extend(std::iter::repeat(CellValue::Empty).take(span.saturating_sub(1)));
            }
            rows.push(cells);
        }
        Ok(RawSheet::new(rows))
    }
}

impl Default for SheetReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-reads `sheet` under a resolved header layout: one flattened label per
/// column, data from the rows after the last header row, fully blank rows
/// dropped, missing cells filled with [`MISSING_VALUE`].
pub fn read_with_header(sheet: &RawSheet, spec: &HeaderSpec) -> Result<NormalizedTable> {
    let labels: Vec<String> = header_tuples(sheet, spec)?
        .iter()
        .map(|tuple| flatten(tuple))
        .collect();

    let data_rows: Vec<&Vec<CellValue>> = sheet
        .rows
        .iter()
        .skip(spec.last_header_row())
        .filter(|row| !row.iter().all(CellValue::is_empty))
        .collect();
    if data_rows.is_empty() {
        warn!(last_header_row = spec.last_header_row(), "no data rows below the header block");
    }

    // Transpose rows into labeled columns; short rows read as empty
    let columns = labels
        .into_iter()
        .enumerate()
        .map(|(idx, label)| {
            let values = data_rows
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or(CellValue::Empty))
                .collect();
            (label, values)
        })
        .collect();

    let table = NormalizedTable::from_labeled(columns).fill_missing(MISSING_VALUE);
    debug!(
        columns = table.columns().len(),
        rows = table.row_count(),
        "header-aware parse done"
    );
    Ok(table)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AnalysisError::UnsupportedFormat(format!("bad selector {css}: {e:?}")))
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.trim().to_string()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}
