use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Statement rejected: {0}")]
    Rejected(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("Session is closed")]
    Closed,
}
