// Patient metadata extraction
// Pattern-based lookup of identifying fields in a report header


use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

pub const UNKNOWN: &str = "Unknown";

// A name ends before the next header label on the same line, either a known field label
// or any word directly followed by a colon
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:patient name|name|patient)[ \t]*[:\-][ \t]*([a-z][a-z'.\-]*(?:[ \t]+(?!(?:date of birth|birth date|dob|sex|gender|phone|mobile|contact)\b)(?![a-z][a-z'.\-]*[ \t]*:)[a-z][a-z'.\-]*)*)",
    )
    .expect("valid regex")
});

static DOB_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:dob|date of birth|birth date)[ \t]*[:\-]?[ \t]*(\d{4}-\d{2}-\d{2}|\d{1,2}[\-/]\d{1,2}[\-/]\d{2,4})\b",
    )
    .expect("valid regex")
});

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:phone|mobile|contact)(?: number| no\.?)?[ \t]*[:\-]?[ \t]*(\+?\d[\d \t\-()]*\d)")
        .expect("valid regex")
});

static SEX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:sex|gender)[ \t]*[:\-]?[ \t]*(male|female|other|m|f)\b")
        .expect("valid regex")
});

/// Identifying fields found in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientMetadata {
    pub name: String,
    pub dob: Option<String>,
    pub phone_number: Option<String>,
    pub sex: String,
}

impl Default for PatientMetadata {
    #[inline]
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            dob: None,
            phone_number: None,
            sex: UNKNOWN.to_string(),
        }
    }
}

fn first_capture(regex: &Regex, text: &str) -> Option<String> {
    match regex.captures(text) {
        Ok(Some(captures)) => captures.get(1).map(|m| m.as_str().trim().to_string()),
        Ok(None) => None,
        Err(e) => {
            debug!("Metadata pattern failed to run: {}", e);
            None
        }
    }
}

fn normalize_sex(raw: &str) -> String {
    match raw.to_ascii_lowercase().as_str() {
        "m" | "male" => "Male".to_string(),
        "f" | "female" => "Female".to_string(),
        _ => "Other".to_string(),
    }
}

/// Extract patient metadata; fields that are not found keep their defaults
#[inline]
pub fn extract_patient_metadata(text: &str) -> PatientMetadata {
    let defaults = PatientMetadata::default();

    let metadata = PatientMetadata {
        name: first_capture(&NAME_REGEX, text)
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.name),
        dob: first_capture(&DOB_REGEX, text),
        phone_number: first_capture(&PHONE_REGEX, text),
        sex: first_capture(&SEX_REGEX, text)
            .map(|sex| normalize_sex(&sex))
            .unwrap_or(defaults.sex),
    };

    debug!(
        "Extracted patient metadata: name found {}, dob found {}, phone found {}",
        metadata.name != UNKNOWN,
        metadata.dob.is_some(),
        metadata.phone_number.is_some()
    );

    metadata
}
