// Text extraction collaborator
// Turns an uploaded report file into a single string of report text


use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to extract text: {0}")]
    ExtractionFailed(String),
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// Reads UTF-8 plain-text and markdown reports
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub const SUPPORTED_EXTENSIONS: [&'static str; 3] = ["txt", "text", "md"];

    #[inline]
    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                Self::SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(ext))
            })
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<String, ExtractionError> {
        if !Self::supports(path) {
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_else(|| "none".to_string());
            return Err(ExtractionError::UnsupportedFormat(extension));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ExtractionError::ExtractionFailed(format!("{}: {}", path.display(), e))
        })?;

        let text = String::from_utf8(bytes).map_err(|_| {
            ExtractionError::ExtractionFailed(format!("{} is not valid UTF-8", path.display()))
        })?;

        if text.trim().is_empty() {
            return Err(ExtractionError::ExtractionFailed(format!(
                "{} contains no text",
                path.display()
            )));
        }

        debug!(
            "Extracted {} characters from {}",
            text.chars().count(),
            path.display()
        );
        Ok(text)
    }
}
