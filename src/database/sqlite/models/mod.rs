
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// A submitted report and its indexing lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: String,
    pub raw_text: String,
    pub status: ReportStatus,
    pub stored_chunks: i64,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Indexed,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ReportStatus::Pending => write!(f, "Pending"),
            ReportStatus::Indexed => write!(f, "Indexed"),
            ReportStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ReportStatus::Pending),
            "indexed" => Ok(ReportStatus::Indexed),
            "failed" => Ok(ReportStatus::Failed),
            other => Err(format!(
                "unknown report status '{}' (expected pending, indexed or failed)",
                other
            )),
        }
    }
}

/// Status change recorded after the index stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub status: ReportStatus,
    pub stored_chunks: Option<i64>,
    pub error_message: Option<String>,
}

impl ReportUpdate {
    #[inline]
    pub fn indexed(stored_chunks: usize) -> Self {
        Self {
            status: ReportStatus::Indexed,
            stored_chunks: Some(i64::try_from(stored_chunks).unwrap_or(i64::MAX)),
            error_message: None,
        }
    }

    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Failed,
            stored_chunks: None,
            error_message: Some(message.into()),
        }
    }
}

impl Report {
    #[inline]
    pub fn is_indexed(&self) -> bool {
        self.status == ReportStatus::Indexed
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == ReportStatus::Failed
    }

    /// First `max_chars` characters of the report, for listings
    #[inline]
    pub fn preview(&self, max_chars: usize) -> String {
        let trimmed = self.raw_text.trim();
        let mut preview: String = trimmed.chars().take(max_chars).collect();
        if trimmed.chars().count() > max_chars {
            preview.push('…');
        }
        preview.replace(['\n', '\r'], " ")
    }
}
