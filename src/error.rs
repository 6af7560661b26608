use thiserror::Error;

/// Failures raised while loading loan events. Every later stage is total.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Missing required column: {column}")]
    Schema { column: String },

    #[error("Row {row}: cannot parse {column} value '{value}'")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
