use thiserror::Error;

/// A raw event row that failed basic shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed event at row {row}: {reason}")]
pub struct MalformedEventError {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedEvent(#[from] MalformedEventError),

    #[error(
        "contributor {contributor:?} touched {repo_count} repositories, above the fanout ceiling of {ceiling}"
    )]
    FanoutCeilingExceeded {
        contributor: String,
        repo_count: usize,
        ceiling: usize,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown column {column:?} for dataset {dataset}")]
    UnknownColumn { dataset: String, column: String },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
