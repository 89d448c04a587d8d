use thiserror::Error;

#[derive(Debug, Error)]
pub enum CinemaError {
    #[error("city not found: {0}")]
    CityNotFound(String),
    #[error("provider {provider} failed: {source}")]
    ProviderFailure {
        provider: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("malformed source data: {0}")]
    MalformedSourceData(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CinemaError>;
