use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CREDIT_SCORE_LABELS: [&str; 4] = ["Very Poor", "Poor", "Good", "Excellent"];

/// Bureau-style absolute scores.
pub const ABSOLUTE_BOUNDARIES: [f64; 5] = [0.0, 300.0, 600.0, 750.0, 850.0];

/// Scores stored as a 0-1 fraction, bucketed after scaling to percent.
pub const NORMALIZED_PERCENT_BOUNDARIES: [f64; 5] = [0.0, 40.0, 60.0, 80.0, 100.0];

// NOTE: the two scales disagree on what a credit score is. Keep them apart
// until the unit of CREDIT_SCORE is confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketSchemeKind {
    #[serde(rename = "absolute")]
    Absolute,
    #[serde(rename = "normalized_percent")]
    NormalizedPercent,
}

impl BucketSchemeKind {
    pub fn scheme(&self) -> BucketScheme {
        match self {
            BucketSchemeKind::Absolute => BucketScheme::absolute_credit_score(),
            BucketSchemeKind::NormalizedPercent => {
                BucketScheme::normalized_credit_score_percent()
            }
        }
    }
}

/// A scheme spelled out in the config file rather than picked by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBucketScheme {
    pub name: String,
    pub boundaries: Vec<f64>,
    pub labels: Vec<String>,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

impl CustomBucketScheme {
    pub fn build(&self) -> Result<BucketScheme, BucketSchemeError> {
        BucketScheme::new(
            &self.name,
            self.boundaries.clone(),
            self.labels.clone(),
            self.scale,
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BucketSchemeError {
    #[error("{boundaries} boundaries need {expected} labels, got {labels}")]
    LabelCount {
        boundaries: usize,
        expected: usize,
        labels: usize,
    },

    #[error("Boundaries must be finite and strictly increasing (position {position})")]
    NotIncreasing { position: usize },

    #[error("Scale must be finite and positive, got {scale}")]
    Scale { scale: f64 },

    #[error("Bucket scheme '{name}' is configured more than once")]
    DuplicateName { name: String },
}

/// Named set of `(lower, upper]` intervals with a label each.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketScheme {
    name: String,
    boundaries: Vec<f64>,
    labels: Vec<String>,
    scale: f64,
}

impl BucketScheme {
    pub fn new(
        name: &str,
        boundaries: Vec<f64>,
        labels: Vec<String>,
        scale: f64,
    ) -> Result<Self, BucketSchemeError> {
        if boundaries.len() < 2 || labels.len() + 1 != boundaries.len() {
            return Err(BucketSchemeError::LabelCount {
                boundaries: boundaries.len(),
                expected: boundaries.len().saturating_sub(1),
                labels: labels.len(),
            });
        }

        if let Some(position) = boundaries
            .iter()
            .position(|b| !b.is_finite())
            .or_else(|| boundaries.windows(2).position(|w| w[0] >= w[1]).map(|i| i + 1))
        {
            return Err(BucketSchemeError::NotIncreasing { position });
        }

        if !(scale.is_finite() && scale > 0.0) {
            return Err(BucketSchemeError::Scale { scale });
        }

        Ok(Self {
            name: name.to_string(),
            boundaries,
            labels,
            scale,
        })
    }

    pub fn absolute_credit_score() -> Self {
        Self::fixed("absolute", &ABSOLUTE_BOUNDARIES, 1.0)
    }

    pub fn normalized_credit_score_percent() -> Self {
        Self::fixed("normalized_percent", &NORMALIZED_PERCENT_BOUNDARIES, 100.0)
    }

    fn fixed(name: &str, boundaries: &[f64], scale: f64) -> Self {
        Self {
            name: name.to_string(),
            boundaries: boundaries.to_vec(),
            labels: CREDIT_SCORE_LABELS.iter().map(|l| l.to_string()).collect(),
            scale,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Interval index for a raw (unscaled) value.
    pub fn bucket_index(&self, value: f64) -> Option<usize> {
        locate(value * self.scale, &self.boundaries).filter(|&idx| idx < self.labels.len())
    }

    pub fn label(&self, value: f64) -> Option<&str> {
        self.bucket_index(value).map(|idx| self.labels[idx].as_str())
    }
}

fn locate(value: f64, boundaries: &[f64]) -> Option<usize> {
    // NaN fails both comparisons and stays unlabeled
    boundaries
        .windows(2)
        .position(|interval| value > interval[0] && value <= interval[1])
}

/// Label every value with the first `(lower, upper]` interval containing it.
///
/// Values on or below the first boundary, above the last one, or NaN get no
/// label.
pub fn bucketize<'a, S: AsRef<str>>(
    values: &[f64],
    boundaries: &[f64],
    labels: &'a [S],
) -> Vec<Option<&'a str>> {
    values
        .iter()
        .map(|&value| {
            locate(value, boundaries)
                .and_then(|idx| labels.get(idx))
                .map(|label| label.as_ref())
        })
        .collect()
}
