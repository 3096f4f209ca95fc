use thiserror::Error;

#[derive(Error, Debug)]
pub enum RankError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unrecognized CSV dialect (header: {header})")]
    UnknownDialect { header: String },

    #[error("CSV input contains no records")]
    EmptyInput,

    #[error("Store '{store_id}' not found")]
    StoreNotFound { store_id: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RankResult<T> = Result<T, RankError>;
