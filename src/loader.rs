use crate::error::{PipelineError, PipelineResult};
use crate::models::{LoanEvent, UserId};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Columns every input must carry, in the order they are checked.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    "user_id",
    "created_at",
    "loan_rank",
    "credit_score",
    "amount_disbursed",
    "loan_status",
];

pub const LOAN_TENURE_COLUMN: &str = "loan_tenure";

// Older exports name the rank column after the user, e.g. USER_LOAN_RANK
const COLUMN_ALIASES: [(&str, &str); 1] = [("user_loan_rank", "loan_rank")];

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// A table of named columns whose cells are optional strings.
///
/// This is the only thing the loader knows about its input, so a CSV file, an
/// HTTP download or a hand-built fixture all look the same to it.
pub trait TabularSource {
    fn headers(&self) -> &[String];
    fn row_count(&self) -> usize;
    /// `None` for an empty cell or a cell past the end of a short row.
    fn cell(&self, row: usize, column: usize) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { headers, rows }
    }

    /// Convenience constructor for fixtures: empty strings become nulls,
    /// everything else is kept as written.
    pub fn from_strings(headers: &[&str], rows: &[Vec<&str>]) -> Self {
        let headers = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect()
            })
            .collect();
        Self { headers, rows }
    }
}

impl TabularSource for RawTable {
    fn headers(&self) -> &[String] {
        &self.headers
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }
}

/// Normalize a header to snake_case so `CREATED_AT`, `Created At` and
/// `created_at` all name the same column.
pub fn normalize_header(header: &str) -> String {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"));

    let lowered = header.trim().to_lowercase();
    let normalized = separators.replace_all(&lowered, "_");
    let normalized = normalized.trim_matches('_');

    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| normalized.to_string())
}

/// Parse a `created_at` cell. Offsets are folded into UTC and dropped.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Some(with_offset.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(timestamp);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Positions of the columns the loader reads.
struct ColumnMap {
    user_id: usize,
    created_at: usize,
    loan_rank: usize,
    credit_score: usize,
    amount_disbursed: usize,
    loan_status: usize,
    loan_tenure: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &[String]) -> PipelineResult<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let position = |name: &str| normalized.iter().position(|h| h == name);

        let mut required = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, column) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = position(column).ok_or_else(|| PipelineError::Schema {
                column: column.to_string(),
            })?;
        }

        let loan_tenure = position(LOAN_TENURE_COLUMN);
        if loan_tenure.is_none() {
            log::debug!("no {LOAN_TENURE_COLUMN} column, every event gets a null tenure");
        }

        Ok(Self {
            user_id: required[0],
            created_at: required[1],
            loan_rank: required[2],
            credit_score: required[3],
            amount_disbursed: required[4],
            loan_status: required[5],
            loan_tenure,
        })
    }

    // Identity and status cells are taken verbatim; cleaning them is up to
    // the adapter that produced the table.
    fn read_event<S: TabularSource + ?Sized>(
        &self,
        source: &S,
        row: usize,
    ) -> PipelineResult<LoanEvent> {
        // Errors name the 1-based data row, header excluded
        let row_number = row + 1;

        let user_id = match source.cell(row, self.user_id) {
            Some(raw) => UserId::new(raw),
            None => {
                return Err(PipelineError::Parse {
                    row: row_number,
                    column: "user_id".to_string(),
                    value: String::new(),
                })
            }
        };

        let raw_created_at = source.cell(row, self.created_at).unwrap_or("");
        let created_at = parse_timestamp(raw_created_at).ok_or_else(|| PipelineError::Parse {
            row: row_number,
            column: "created_at".to_string(),
            value: raw_created_at.to_string(),
        })?;

        let loan_status = source.cell(row, self.loan_status).map(str::to_string);
        let number =
            |column: usize, name: &str| parse_number(source.cell(row, column), name, row_number);

        Ok(LoanEvent {
            user_id,
            created_at,
            loan_rank: parse_rank(source.cell(row, self.loan_rank), row_number),
            credit_score: number(self.credit_score, "credit_score"),
            amount_disbursed: number(self.amount_disbursed, "amount_disbursed"),
            loan_status,
            loan_tenure: self
                .loan_tenure
                .and_then(|column| number(column, LOAN_TENURE_COLUMN)),
        })
    }
}

fn parse_number(raw: Option<&str>, column: &str, row_number: usize) -> Option<f64> {
    let raw = raw?.trim();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            log::debug!("row {row_number}: {column} value '{raw}' is not numeric, treated as null");
            None
        }
    }
}

fn parse_rank(raw: Option<&str>, row_number: usize) -> Option<i64> {
    let raw = raw?.trim();
    if let Ok(rank) = raw.parse::<i64>() {
        return Some(rank);
    }
    // Spreadsheet exports often write integer columns as 3.0
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && fits_i64(value) => Some(value as i64),
        _ => {
            log::debug!(
                "row {row_number}: loan_rank value '{raw}' is not a representable integer, \
                 treated as null"
            );
            None
        }
    }
}

// `as` saturates, so anything outside [-2^63, 2^63) must be rejected first
fn fits_i64(value: f64) -> bool {
    value >= i64::MIN as f64 && value < i64::MAX as f64
}

/// Validate the schema of `source` and read every row into a `LoanEvent`.
///
/// The schema is checked before any row is touched. The first row that fails
/// aborts the whole load, so callers never see a partial event list.
pub fn load<S: TabularSource + ?Sized>(source: &S) -> PipelineResult<Vec<LoanEvent>> {
    let columns = ColumnMap::resolve(source.headers())?;

    let mut events = Vec::with_capacity(source.row_count());
    for row in 0..source.row_count() {
        events.push(columns.read_event(source, row)?);
    }

    log::info!("loaded {} loan events", events.len());
    Ok(events)
}
