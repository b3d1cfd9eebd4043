use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`keyspace` cannot be empty")]
    EmptyKeyspace,
    #[error("`catchup_retry_ms` cannot be zero")]
    CatchupRetryZero,
    #[error("`batch.max_rows` cannot be zero")]
    BatchMaxRowsZero,
    #[error("`batch.max_bytes` cannot be zero")]
    BatchMaxBytesZero,
}
