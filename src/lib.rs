use thiserror::Error;

pub use extract::ExtractionError;

pub type Result<T> = std::result::Result<T, RiskError>;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller supplied input that can never succeed, e.g. an empty report
    #[error("Validation error: {0}")]
    Validation(String),

    /// The embedding or question-answering service failed or was unreachable
    #[error("Provider error: {0}")]
    Provider(String),

    /// The vector index or the document store failed or was unreachable
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    /// Short machine-readable name of the error category
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Provider(_) => "provider",
            Self::Storage(_) => "storage",
            Self::Extraction(_) => "extraction",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }

    /// HTTP-equivalent status code for surfacing the error to callers
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Extraction(ExtractionError::UnsupportedFormat(_)) => 415,
            Self::Extraction(ExtractionError::ExtractionFailed(_)) => 422,
            Self::Storage(_) => 503,
            Self::Config(_) | Self::Provider(_) | Self::Io(_) | Self::Other(_) => 500,
        }
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extract;
pub mod indexer;
pub mod mcp;
pub mod metadata;
pub mod pipeline;
pub mod qa;

#[cfg(test)]
pub(crate) mod testing;
