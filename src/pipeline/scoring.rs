// Lexical mapping from answers and report text to a 0-10 risk score

use serde::{Deserialize, Serialize};

pub const HIGH_RISK_SCORE: f32 = 9.0;
pub const MEDIUM_RISK_SCORE: f32 = 6.0;
pub const LOW_RISK_SCORE: f32 = 2.0;
pub const NEUTRAL_RISK_SCORE: f32 = 5.0;

const HIGH_MARKERS: &[&str] = &["high"];
const MEDIUM_MARKERS: &[&str] = &["moderate", "intermediate"];
const LOW_MARKERS: &[&str] = &["low"];

const HIGH_RISK_TERMS: &[&str] = &[
    "malignant",
    "carcinoma",
    "metastasis",
    "cancer",
    "tumor grade 3",
    "stage iv",
    "stage 4",
];
const MEDIUM_RISK_TERMS: &[&str] = &[
    "abnormal cells",
    "atypical",
    "dysplasia",
    "suspicious",
    "tumor",
    "neoplasm",
];
const LOW_RISK_TERMS: &[&str] = &[
    "negative for malignancy",
    "no evidence of cancer",
    "benign",
    "normal",
];

/// How an answer is produced for a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Ask the QA service about the retrieved context
    #[default]
    QuestionAnswering,
    /// Scan the report for risk terms without calling any model
    Keyword,
}

impl std::fmt::Display for ScoringStrategy {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ScoringStrategy::QuestionAnswering => write!(f, "question_answering"),
            ScoringStrategy::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    High,
    Moderate,
    Low,
    Unknown,
}

impl RiskBand {
    #[inline]
    pub fn score(self) -> f32 {
        match self {
            RiskBand::High => HIGH_RISK_SCORE,
            RiskBand::Moderate => MEDIUM_RISK_SCORE,
            RiskBand::Low => LOW_RISK_SCORE,
            RiskBand::Unknown => NEUTRAL_RISK_SCORE,
        }
    }
}

impl std::fmt::Display for RiskBand {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            RiskBand::High => write!(f, "high"),
            RiskBand::Moderate => write!(f, "moderate"),
            RiskBand::Low => write!(f, "low"),
            RiskBand::Unknown => write!(f, "unknown"),
        }
    }
}

/// Band of a free-text answer. High beats moderate beats low; markers match anywhere in the
/// lower-cased answer, so "highly suspicious" is high.
#[inline]
pub fn classify_answer(answer: &str) -> RiskBand {
    let lowered = answer.to_lowercase();
    let has_any = |markers: &[&str]| markers.iter().any(|marker| lowered.contains(marker));

    if has_any(HIGH_MARKERS) {
        RiskBand::High
    } else if has_any(MEDIUM_MARKERS) {
        RiskBand::Moderate
    } else if has_any(LOW_MARKERS) {
        RiskBand::Low
    } else {
        RiskBand::Unknown
    }
}

#[inline]
pub fn score_answer(answer: &str) -> f32 {
    classify_answer(answer).score()
}

/// Result of the keyword scan over a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordAssessment {
    pub band: RiskBand,
    pub matched_terms: Vec<&'static str>,
}

impl KeywordAssessment {
    /// Answer text that scores to the same band under [`score_answer`]
    #[inline]
    pub fn answer(&self) -> String {
        match self.band {
            RiskBand::Unknown => "risk undetermined (no keyword match)".to_string(),
            band => format!(
                "{} risk (keyword match: {})",
                band,
                self.matched_terms.join(", ")
            ),
        }
    }
}

fn is_word_boundary(text: &str, index: usize) -> bool {
    let before = text[..index].chars().next_back();
    before.is_none_or(|c| !c.is_alphanumeric())
}

/// Byte ranges where `phrase` occurs as whole words in `text`
fn phrase_matches(text: &str, phrase: &str) -> Vec<(usize, usize)> {
    text.match_indices(phrase)
        .map(|(start, matched)| (start, start + matched.len()))
        .filter(|&(start, end)| {
            is_word_boundary(text, start)
                && text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric())
        })
        .collect()
}

fn contains_phrase(text: &str, phrase: &str) -> bool {
    !phrase_matches(text, phrase).is_empty()
}

fn strip_phrase(text: &str, phrase: &str) -> String {
    let mut stripped = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in phrase_matches(text, phrase) {
        stripped.push_str(&text[cursor..start]);
        stripped.push(' ');
        cursor = end;
    }
    stripped.push_str(&text[cursor..]);
    stripped
}

/// Deterministic term scan used when no QA model is involved.
///
/// Low-risk phrases match whole words ("normal" must not fire inside "abnormal") and are
/// removed before scanning. High and medium terms then match anywhere in what remains, so
/// "adenocarcinoma" counts as "carcinoma" while "negative for malignancy" is not a finding.
#[inline]
pub fn assess_keywords(text: &str) -> KeywordAssessment {
    let lowered = text.to_lowercase();

    let low_hits: Vec<&'static str> = LOW_RISK_TERMS
        .iter()
        .copied()
        .filter(|term| contains_phrase(&lowered, term))
        .collect();

    let remainder = low_hits
        .iter()
        .fold(lowered.clone(), |acc, term| strip_phrase(&acc, term));

    let hits_in = |terms: &[&'static str]| -> Vec<&'static str> {
        terms
            .iter()
            .copied()
            .filter(|term| remainder.contains(term))
            .collect()
    };
    let high_hits = hits_in(HIGH_RISK_TERMS);
    let medium_hits = hits_in(MEDIUM_RISK_TERMS);

    let (band, matched_terms) = if !high_hits.is_empty() {
        (RiskBand::High, high_hits)
    } else if !medium_hits.is_empty() && low_hits.is_empty() {
        (RiskBand::Moderate, medium_hits)
    } else if !low_hits.is_empty() {
        (RiskBand::Low, low_hits)
    } else {
        (RiskBand::Unknown, Vec::new())
    };

    KeywordAssessment {
        band,
        matched_terms,
    }
}
