// Deterministic collaborators shared by unit tests

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use crate::RiskError;
use crate::config::{PipelineConfig, StorageConfig};
use crate::database::{Database, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, tokenize_words};
use crate::indexer::VectorIndex;
use crate::pipeline::Pipeline;
use crate::qa::{QaAnswer, QaClient};

pub const TEST_DIMENSION: usize = 64;

/// Bag-of-words hashing embedder: texts sharing words land close together
#[derive(Debug)]
pub struct HashEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for token in tokenize_words(&text.to_lowercase()) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str {
        "hash-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RiskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}

/// Embedder whose provider is always down
#[derive(Debug)]
pub struct FailingEmbedder {
    pub dimension: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "failing-embedder"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, RiskError> {
        Err(RiskError::Provider("connection refused".to_string()))
    }
}

/// QA client returning a fixed answer and recording every request
#[derive(Debug)]
pub struct StaticQa {
    answer: String,
    confidence: f32,
    requests: Mutex<Vec<(String, String)>>,
}

impl StaticQa {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 0.87,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(context, question)` pairs received so far
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QaClient for StaticQa {
    async fn ask(&self, context: &str, question: &str) -> Result<QaAnswer, RiskError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((context.to_string(), question.to_string()));
        }
        Ok(QaAnswer {
            answer: self.answer.clone(),
            confidence: self.confidence,
        })
    }
}

#[derive(Debug)]
pub struct FailingQa;

#[async_trait]
impl QaClient for FailingQa {
    async fn ask(&self, _context: &str, _question: &str) -> Result<QaAnswer, RiskError> {
        Err(RiskError::Provider("QA service returned HTTP 503".to_string()))
    }
}

/// Pipeline over a fresh sqlite database and vector table in a temp directory.
/// Keep the returned `TempDir` alive for as long as the pipeline is used.
pub async fn pipeline_with_qa(qa: Arc<dyn QaClient>) -> (Pipeline, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path(), &StorageConfig::default())
        .await
        .expect("should create database");
    let store = VectorStore::new(
        &temp_dir.path().join("vectors"),
        TEST_DIMENSION,
        Duration::from_secs(30),
    )
    .await
    .expect("should create vector store");
    let index = VectorIndex::new(
        Arc::new(store),
        Arc::new(HashEmbedder::new(TEST_DIMENSION)),
        ChunkingConfig::default(),
    )
    .expect("should create index");

    let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(database), index, qa);
    (pipeline, temp_dir)
}
