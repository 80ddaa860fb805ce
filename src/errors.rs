use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache document decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid cache data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;
