use crate::loader::{RawTable, TabularSource};
use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Extensions read as workbooks; everything else is treated as CSV.
const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

const SPREADSHEET_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl RawTable {
    /// Read a headed CSV stream. Cells are trimmed, empty cells become nulls
    /// and short rows are padded with nulls.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.context("Failed to read CSV record")?;
            let cells: Vec<Option<String>> = (0..headers.len())
                .map(|idx| {
                    record
                        .get(idx)
                        .map(str::trim)
                        .filter(|cell| !cell.is_empty())
                        .map(str::to_string)
                })
                .collect();
            rows.push(cells);
        }

        Ok(RawTable::new(headers, rows))
    }

    /// Read the first worksheet of a workbook. The first row holds the
    /// headers; string cells are trimmed like CSV cells.
    pub fn from_spreadsheet_path(path: &Path) -> Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open workbook: {}", path.display()))?;

        let range = workbook
            .worksheet_range_at(0)
            .with_context(|| format!("Workbook has no worksheets: {}", path.display()))?
            .with_context(|| format!("Failed to read first worksheet: {}", path.display()))?;

        let mut rows = range.rows();
        let headers: Vec<String> = rows
            .next()
            .map(|header_row| {
                header_row
                    .iter()
                    .map(|cell| spreadsheet_cell(cell).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows
            .map(|row| {
                (0..headers.len())
                    .map(|idx| row.get(idx).and_then(spreadsheet_cell))
                    .collect()
            })
            .collect();

        Ok(RawTable::new(headers, rows))
    }
}

/// Render a workbook cell the way the same value would appear in a CSV export.
///
/// Whole floats lose their `.0`, date cells become `YYYY-MM-DD HH:MM:SS` and
/// error cells are treated as empty.
pub fn spreadsheet_cell(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(value) => value.trim().to_string(),
        Data::Int(value) => value.to_string(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        Data::Float(value) => value.to_string(),
        Data::Bool(value) => value.to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(timestamp) => timestamp.format(SPREADSHEET_DATETIME_FORMAT).to_string(),
            None => value.as_f64().to_string(),
        },
        Data::DateTimeIso(value) | Data::DurationIso(value) => value.trim().to_string(),
    };

    (!text.is_empty()).then_some(text)
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SPREADSHEET_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Pulls the loan export from disk or over HTTP.
pub struct LoanDataFetcher {
    client: reqwest::Client,
}

impl Default for LoanDataFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LoanDataFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Read a local export, picking the workbook or CSV reader by extension.
    pub fn read_file(&self, file_path: &str) -> Result<RawTable> {
        let path = Path::new(file_path);
        if is_spreadsheet(path) {
            let table = RawTable::from_spreadsheet_path(path)?;
            warn_if_empty(&table, file_path);
            return Ok(table);
        }

        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to read file: {}", file_path))?;

        self.parse_csv_content(&content, file_path)
    }

    pub async fn fetch_url(&self, url: &str) -> Result<RawTable> {
        println!("🌐 Fetching data from: {}", url);

        let response = self.client
            .get(url)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Failed to fetch URL: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("HTTP request failed with status: {}", response.status()));
        }

        let content = response.text().await
            .with_context(|| format!("Failed to read response body from: {}", url))?;

        self.parse_csv_content(&content, url)
    }

    fn parse_csv_content(&self, content: &str, source: &str) -> Result<RawTable> {
        let table = RawTable::from_csv_reader(content.as_bytes())
            .with_context(|| format!("Failed to parse CSV from: {}", source))?;

        warn_if_empty(&table, source);
        Ok(table)
    }
}

fn warn_if_empty(table: &RawTable, source: &str) {
    if table.row_count() == 0 {
        log::warn!("{} contains a header but no rows", source);
    }
}
