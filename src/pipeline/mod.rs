// Retrieval-augmented risk scoring pipeline
// receive -> chunk -> index -> retrieve -> score, one report per call

pub mod scoring;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::RiskError;
use crate::config::{Config, PipelineConfig};
use crate::database::{Database, DocumentStore, Report, ReportUpdate, VectorStore};
use crate::embeddings::{Embedder, OllamaClient};
use crate::extract::TextExtractor;
use crate::indexer::VectorIndex;
use crate::metadata::{PatientMetadata, extract_patient_metadata};
use crate::qa::{HttpQaClient, QaClient};

use scoring::{ScoringStrategy, assess_keywords, score_answer};

/// Pipeline step that can fail. Chunking is pure and never fails, so it has no stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Receive,
    Index,
    Retrieve,
    Score,
}

impl std::fmt::Display for Stage {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Stage::Receive => write!(f, "receive"),
            Stage::Index => write!(f, "index"),
            Stage::Retrieve => write!(f, "retrieve"),
            Stage::Score => write!(f, "score"),
        }
    }
}

/// Lifecycle of one report inside [`Pipeline::analyze`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Chunked,
    Indexed,
    Retrieved,
    Scored,
    Failed,
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    /// Set once the report has been stored
    pub document_id: Option<String>,
    pub source: RiskError,
}

impl PipelineError {
    fn new(stage: Stage, document_id: Option<&str>, source: RiskError) -> Self {
        Self {
            stage,
            document_id: document_id.map(str::to_string),
            source,
        }
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.source.status_code()
    }
}

/// Risk estimate for one report. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEstimate {
    pub document_id: String,
    pub answer: String,
    /// Risk on a 0-10 scale
    pub score: f32,
    pub context_preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub strategy: ScoringStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub estimate: ScoreEstimate,
    pub stored_chunks: usize,
    pub patient: PatientMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub embedder_model: String,
    pub embedding_dimension: usize,
}

fn char_prefix(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn transition(document_id: &str, from: PipelineState, to: PipelineState) {
    debug!("Report {}: {:?} -> {:?}", document_id, from, to);
}

pub struct Pipeline {
    settings: PipelineConfig,
    documents: Arc<dyn DocumentStore>,
    index: VectorIndex,
    qa: Arc<dyn QaClient>,
}

impl Pipeline {
    #[inline]
    pub fn new(
        settings: PipelineConfig,
        documents: Arc<dyn DocumentStore>,
        index: VectorIndex,
        qa: Arc<dyn QaClient>,
    ) -> Self {
        Self {
            settings,
            documents,
            index,
            qa,
        }
    }

    /// Wire up the sqlite document store, the LanceDB index, Ollama and the HTTP QA client
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self, RiskError> {
        config
            .validate()
            .map_err(|e| RiskError::Config(e.to_string()))?;

        let database = Database::initialize_from_config_dir(config.get_base_dir(), &config.storage)
            .await
            .map_err(|e| RiskError::Storage(format!("{e:#}")))?;

        let store = VectorStore::from_config(config).await?;

        let embedder = OllamaClient::new(&config.ollama)
            .map_err(|e| RiskError::Config(format!("{e:#}")))?;

        let index = VectorIndex::new(
            Arc::new(store),
            Arc::new(embedder) as Arc<dyn Embedder>,
            config.chunking.clone(),
        )?;

        let qa = HttpQaClient::new(&config.qa)?;

        info!(
            "Pipeline ready: model {}, {} strategy, top_k {}",
            config.ollama.model, config.pipeline.strategy, config.pipeline.top_k
        );

        Ok(Self::new(
            config.pipeline.clone(),
            Arc::new(database),
            index,
            Arc::new(qa),
        ))
    }

    #[inline]
    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    /// Run one report through every stage.
    ///
    /// Empty text is rejected before anything is written. An indexing failure marks the
    /// stored report `failed`; a scoring failure leaves it `indexed`.
    #[inline]
    pub async fn analyze(&self, raw_text: &str) -> Result<AnalysisReport, PipelineError> {
        if raw_text.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Receive,
                None,
                RiskError::Validation("Report text is empty".to_string()),
            ));
        }

        let document_id = self
            .documents
            .insert(raw_text)
            .await
            .map_err(|e| PipelineError::new(Stage::Receive, None, e))?;
        let id = document_id.as_str();
        info!(
            "Received report {} ({} characters)",
            id,
            raw_text.chars().count()
        );

        let chunks = self.index.chunking().chunk(raw_text);
        transition(id, PipelineState::Received, PipelineState::Chunked);

        let stored_chunks = match self.index.upsert(id, &chunks).await {
            Ok(count) => count,
            Err(e) => {
                error!("Indexing failed for report {}: {}", id, e);
                transition(id, PipelineState::Chunked, PipelineState::Failed);
                if let Err(status_err) = self
                    .documents
                    .set_status(id, ReportUpdate::failed(e.to_string()))
                    .await
                {
                    warn!("Could not mark report {} as failed: {}", id, status_err);
                }
                return Err(PipelineError::new(Stage::Index, Some(id), e));
            }
        };

        self.documents
            .set_status(id, ReportUpdate::indexed(stored_chunks))
            .await
            .map_err(|e| PipelineError::new(Stage::Index, Some(id), e))?;
        transition(id, PipelineState::Chunked, PipelineState::Indexed);

        let context = self
            .retrieve_context(id, raw_text)
            .await
            .map_err(|e| PipelineError::new(Stage::Retrieve, Some(id), e))?;
        transition(id, PipelineState::Indexed, PipelineState::Retrieved);

        let (answer, confidence) = match self.settings.strategy {
            ScoringStrategy::QuestionAnswering => {
                let reply = self
                    .qa
                    .ask(&context, &self.settings.risk_question)
                    .await
                    .map_err(|e| {
                        transition(id, PipelineState::Retrieved, PipelineState::Failed);
                        PipelineError::new(Stage::Score, Some(id), e)
                    })?;
                (reply.answer.to_lowercase(), Some(reply.confidence))
            }
            ScoringStrategy::Keyword => (assess_keywords(raw_text).answer(), None),
        };
        let score = score_answer(&answer);
        transition(id, PipelineState::Retrieved, PipelineState::Scored);

        info!(
            "Scored report {}: {} ({} strategy, {} chunks)",
            id, score, self.settings.strategy, stored_chunks
        );

        Ok(AnalysisReport {
            estimate: ScoreEstimate {
                document_id,
                answer,
                score,
                context_preview: char_prefix(&context, self.settings.preview_char_budget),
                confidence,
                strategy: self.settings.strategy,
            },
            stored_chunks,
            patient: extract_patient_metadata(raw_text),
        })
    }

    /// Extract text from a file and analyze it
    #[inline]
    pub async fn analyze_file(
        &self,
        path: &Path,
        extractor: &dyn TextExtractor,
    ) -> Result<AnalysisReport, PipelineError> {
        let text = extractor
            .extract(path)
            .await
            .map_err(|e| PipelineError::new(Stage::Receive, None, e.into()))?;

        self.analyze(&text).await
    }

    /// Context for the QA step: the nearest chunks joined by newlines, or a prefix of the
    /// raw report when the document has no indexed chunks
    pub(crate) async fn retrieve_context(
        &self,
        document_id: &str,
        raw_text: &str,
    ) -> Result<String, RiskError> {
        let chunks = self
            .index
            .query(document_id, &self.settings.risk_question, self.settings.top_k)
            .await?;

        if chunks.is_empty() {
            debug!(
                "No chunks retrieved for report {}, falling back to raw text",
                document_id
            );
            return Ok(char_prefix(
                raw_text.trim(),
                self.settings.context_char_budget,
            ));
        }

        Ok(chunks.join("\n"))
    }

    #[inline]
    pub fn health(&self) -> HealthReport {
        let embedder = self.index.embedder();
        HealthReport {
            status: "ok".to_string(),
            service: "retriever".to_string(),
            embedder_model: embedder.model().to_string(),
            embedding_dimension: embedder.dimension(),
        }
    }

    #[inline]
    pub async fn get_report(&self, document_id: &str) -> Result<Option<Report>, RiskError> {
        self.documents.get(document_id).await
    }

    #[inline]
    pub async fn list_reports(&self, limit: u32) -> Result<Vec<Report>, RiskError> {
        self.documents.list_recent(limit).await
    }

    /// Remove a report and all of its index rows. Returns `false` for an unknown id.
    #[inline]
    pub async fn delete_report(&self, document_id: &str) -> Result<bool, RiskError> {
        self.index.delete_document(document_id).await?;
        let deleted = self.documents.delete(document_id).await?;
        if deleted {
            info!("Deleted report {}", document_id);
        }
        Ok(deleted)
    }
}
