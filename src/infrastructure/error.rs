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
    Validation(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Auth error: {0}")]
    Auth(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("login required")]
    SessionRequired,
}
