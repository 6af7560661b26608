use crate::analyzer::TieBreak;
use crate::buckets::{BucketSchemeKind, CustomBucketScheme};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The only status that puts a borrower into the defaulted cohort.
pub const DEFAULTED_STATUS: &str = "defaulted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Data source configuration
    pub data_source_mode: DataSourceMode,
    pub input_path: Option<String>,
    pub input_url: Option<String>,
    pub output_directory: Option<String>,
    // Pipeline configuration
    pub tie_break: TieBreak,
    pub credit_score_schemes: Vec<BucketSchemeKind>,
    #[serde(default)]
    pub custom_credit_score_schemes: Vec<CustomBucketScheme>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceMode {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "internet")]
    Internet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_mode: DataSourceMode::Local,
            input_path: Some("data-source/loans.csv".to_string()),
            input_url: Some("https://example.com/exports/loans.csv".to_string()),
            output_directory: Some("output".to_string()),
            tie_break: TieBreak::InputOrder,
            // Both scales are exported until the score unit is settled
            credit_score_schemes: vec![
                BucketSchemeKind::Absolute,
                BucketSchemeKind::NormalizedPercent,
            ],
            custom_credit_score_schemes: Vec::new(),
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

/// Borrower identifier as it appears in the source.
///
/// Integer-looking ids order numerically and come before any other id, the
/// rest order lexicographically. Ties on the numeric value fall back to the
/// raw text so the order stays total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<i128> {
        self.0.parse::<i128>().ok()
    }
}

impl Ord for UserId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for UserId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEvent {
    pub user_id: UserId,
    pub created_at: NaiveDateTime,
    pub loan_rank: Option<i64>,
    pub credit_score: Option<f64>,
    pub amount_disbursed: Option<f64>,
    pub loan_status: Option<String>,
    pub loan_tenure: Option<f64>,
}

/// The latest event of a borrower. Always one of the loaded rows, unchanged.
pub type CurrentLoanState = LoanEvent;

/// Numeric columns an aggregate can summarise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueField {
    LoanRank,
    CreditScore,
    AmountDisbursed,
    LoanTenure,
}

impl ValueField {
    pub fn column_name(&self) -> &'static str {
        match self {
            ValueField::LoanRank => "loan_rank",
            ValueField::CreditScore => "credit_score",
            ValueField::AmountDisbursed => "amount_disbursed",
            ValueField::LoanTenure => "loan_tenure",
        }
    }
}

impl LoanEvent {
    pub fn is_defaulted(&self) -> bool {
        self.loan_status.as_deref() == Some(DEFAULTED_STATUS)
    }

    pub fn value(&self, field: ValueField) -> Option<f64> {
        match field {
            ValueField::LoanRank => self.loan_rank.map(|rank| rank as f64),
            ValueField::CreditScore => self.credit_score,
            ValueField::AmountDisbursed => self.amount_disbursed,
            ValueField::LoanTenure => self.loan_tenure,
        }
    }
}
