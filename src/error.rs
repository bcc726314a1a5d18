use thiserror::Error;

/// Errors surfaced by the query adapters.
///
/// Backend failures are carried as-is: nothing here retries or rewraps what the
/// model or tokenizer reported.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    #[error("Generation log write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Target text '{text}' must encode to exactly two token ids, got {ids:?}")]
    TargetTokens { text: &'static str, ids: Vec<u32> },

    #[error("Backend reports max_batch_size = 0")]
    InvalidBatchSize,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, QueryError>;
