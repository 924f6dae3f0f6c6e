use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not signed in: {0}")]
    NotAuthenticated(String),
    #[error("Backend request failed: {0}")]
    Http(String),
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
    #[error("Document store error: {0}")]
    Store(String),
}
