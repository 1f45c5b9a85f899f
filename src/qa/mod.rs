// Question-answering collaborator
// Sends retrieved context and the risk question to an extractive QA service


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::RiskError;
use crate::config::QaConfig;

/// Answer text returned when the service responds without one
pub const NO_ANSWER: &str = "no answer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub answer: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f32,
}

/// Answers a question over a context passage
#[async_trait]
pub trait QaClient: Send + Sync {
    async fn ask(&self, context: &str, question: &str) -> Result<QaAnswer, RiskError>;
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    context: &'a str,
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a `POST {context, question} -> {answer, score}` endpoint
#[derive(Debug, Clone)]
pub struct HttpQaClient {
    endpoint: Url,
    agent: ureq::Agent,
}

impl HttpQaClient {
    #[inline]
    pub fn new(config: &QaConfig) -> Result<Self, RiskError> {
        let endpoint = config
            .endpoint()
            .map_err(|e| RiskError::Config(format!("Invalid QA endpoint: {}", e)))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build()
            .into();

        Ok(Self { endpoint, agent })
    }

    fn ask_blocking(&self, context: &str, question: &str) -> Result<QaAnswer, RiskError> {
        let body = serde_json::to_string(&AskRequest { context, question })
            .map_err(|e| RiskError::Provider(format!("Failed to serialize QA request: {}", e)))?;

        debug!(
            "Asking QA service at {} with {} characters of context",
            self.endpoint,
            context.chars().count()
        );

        let response_text = self
            .agent
            .post(self.endpoint.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    warn!("QA service returned HTTP {}", status);
                    RiskError::Provider(format!("QA service returned HTTP {}", status))
                }
                other => {
                    warn!("QA service request failed: {}", other);
                    RiskError::Provider(format!("QA service unavailable: {}", other))
                }
            })?;

        let response: AskResponse = serde_json::from_str(&response_text)
            .map_err(|e| RiskError::Provider(format!("Failed to parse QA response: {}", e)))?;

        if let Some(error) = response.error {
            return Err(RiskError::Provider(format!("QA service error: {}", error)));
        }

        Ok(QaAnswer {
            answer: response.answer.unwrap_or_else(|| NO_ANSWER.to_string()),
            confidence: response.score.unwrap_or(0.0),
        })
    }
}

#[async_trait]
impl QaClient for HttpQaClient {
    #[inline]
    async fn ask(&self, context: &str, question: &str) -> Result<QaAnswer, RiskError> {
        let client = self.clone();
        let context = context.to_string();
        let question = question.to_string();

        tokio::task::spawn_blocking(move || client.ask_blocking(&context, &question))
            .await
            .map_err(|e| RiskError::Provider(format!("QA task failed: {}", e)))?
    }
}
