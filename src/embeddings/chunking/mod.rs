
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// How report text is split into retrievable units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingPolicy {
    /// Fixed-width, non-overlapping character windows
    #[default]
    CharacterWindow,
    /// One unit per word after stripping non-word characters
    Words,
}

impl std::fmt::Display for ChunkingPolicy {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChunkingPolicy::CharacterWindow => write!(f, "character_window"),
            ChunkingPolicy::Words => write!(f, "words"),
        }
    }
}

/// Configuration for report chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub policy: ChunkingPolicy,
    /// Window length in characters, only used by the character window policy
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            policy: ChunkingPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkingConfig {
    /// Split report text into units under the active policy
    #[inline]
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let chunks = match self.policy {
            ChunkingPolicy::CharacterWindow => chunk_text(text, self.chunk_size),
            ChunkingPolicy::Words => tokenize_words(text),
        };

        debug!(
            "Chunked {} characters into {} units using {} policy",
            text.chars().count(),
            chunks.len(),
            self.policy
        );

        chunks
    }

    /// Normalize query text the same way chunk text is normalized, so a query is
    /// embedded at the granularity the index was built with
    #[inline]
    pub fn prepare_query(&self, query: &str) -> String {
        match self.policy {
            ChunkingPolicy::CharacterWindow => query.trim().to_string(),
            ChunkingPolicy::Words => tokenize_words(query).join(" "),
        }
    }
}

/// Split text into non-overlapping windows of `chunk_size` characters.
///
/// The text is trimmed first. Concatenating the result gives back the trimmed text,
/// and every window except possibly the last holds exactly `chunk_size` characters.
/// A `chunk_size` of zero is treated as one.
#[inline]
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();

    chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect())
        .collect()
}

/// Strip non-word characters and split the remainder on whitespace
#[inline]
pub fn tokenize_words(text: &str) -> Vec<String> {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
