use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntelError {
    #[error("Schema mismatch in {context}: missing column(s) {missing:?}")]
    SchemaMismatch {
        context: String,
        missing: Vec<String>,
    },

    #[error("Empty group: no records contribute to ({row}, {column})")]
    EmptyGroup { row: String, column: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Snapshot {incoming} is older than current snapshot {current}")]
    StaleSnapshot { current: String, incoming: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl IntelError {
    pub fn schema_mismatch(context: impl Into<String>, missing: Vec<String>) -> Self {
        IntelError::SchemaMismatch {
            context: context.into(),
            missing,
        }
    }
}

impl From<polars::error::PolarsError> for IntelError {
    fn from(err: polars::error::PolarsError) -> Self {
        IntelError::Polars(err.to_string())
    }
}

impl From<csv::Error> for IntelError {
    fn from(err: csv::Error) -> Self {
        IntelError::Csv(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IntelError>;
