use super::*;
use crate::config::StorageConfig;
use crate::database::ReportStatus;
use crate::embeddings::ChunkingConfig;
use crate::extract::PlainTextExtractor;
use crate::testing::{FailingEmbedder, FailingQa, HashEmbedder, StaticQa};
use scoring::{HIGH_RISK_SCORE, LOW_RISK_SCORE, NEUTRAL_RISK_SCORE};
use std::time::Duration;
use tempfile::TempDir;

const DIMENSION: usize = 256;

struct Harness {
    pipeline: Pipeline,
    database: Arc<Database>,
    store: Arc<VectorStore>,
    qa: Arc<StaticQa>,
    _temp_dir: TempDir,
}

async fn harness_with(
    settings: PipelineConfig,
    embedder: Arc<dyn Embedder>,
    qa_answer: &str,
) -> Harness {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Arc::new(
        Database::initialize_from_config_dir(temp_dir.path(), &StorageConfig::default())
            .await
            .expect("should create database"),
    );
    let store = Arc::new(
        VectorStore::new(
            &temp_dir.path().join("vectors"),
            DIMENSION,
            Duration::from_secs(30),
        )
        .await
        .expect("should create vector store"),
    );
    let index = VectorIndex::new(store.clone(), embedder, ChunkingConfig::default())
        .expect("should create index");
    let qa = Arc::new(StaticQa::new(qa_answer));

    let pipeline = Pipeline::new(settings, database.clone(), index, qa.clone());

    Harness {
        pipeline,
        database,
        store,
        qa,
        _temp_dir: temp_dir,
    }
}

async fn harness(qa_answer: &str) -> Harness {
    harness_with(
        PipelineConfig::default(),
        Arc::new(HashEmbedder::new(DIMENSION)),
        qa_answer,
    )
    .await
}

fn report_of_length(len: usize) -> String {
    "Cervical biopsy shows malignant squamous cells invading the stroma. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

#[tokio::test]
async fn fourteen_hundred_characters_store_three_chunks() {
    let h = harness("high risk of malignancy").await;
    let text = report_of_length(1400);
    assert_eq!(text.chars().count(), 1400);
    assert!(text.contains("malignant"));

    let report = h.pipeline.analyze(&text).await.expect("analysis should succeed");

    assert_eq!(report.stored_chunks, 3);
    assert_eq!(report.estimate.score, HIGH_RISK_SCORE);
    assert_eq!(report.estimate.answer, "high risk of malignancy");
    assert_eq!(report.estimate.strategy, ScoringStrategy::QuestionAnswering);
    assert!(report.estimate.confidence.is_some());

    let stored = h
        .database
        .get(&report.estimate.document_id)
        .await
        .expect("lookup")
        .expect("report should be stored");
    assert_eq!(stored.status, ReportStatus::Indexed);
    assert_eq!(stored.stored_chunks, 3);
    assert_eq!(stored.raw_text, text);
}

#[tokio::test]
async fn qa_receives_retrieved_chunks_and_risk_question() {
    let h = harness("low").await;
    let text = report_of_length(1400);

    let report = h.pipeline.analyze(&text).await.expect("analysis should succeed");

    let requests = h.qa.requests();
    assert_eq!(requests.len(), 1);
    let (context, question) = &requests[0];
    assert_eq!(question, &PipelineConfig::default().risk_question);
    assert_eq!(context.split('\n').count(), 3);
    assert_eq!(report.estimate.score, LOW_RISK_SCORE);
    assert_eq!(
        report.estimate.context_preview,
        context.chars().take(1000).collect::<String>()
    );
}

#[tokio::test]
async fn whitespace_report_is_rejected_before_any_write() {
    let h = harness("high").await;

    let error = h
        .pipeline
        .analyze("  \n\t ")
        .await
        .expect_err("empty report must fail");

    assert_eq!(error.stage, Stage::Receive);
    assert!(error.document_id.is_none());
    assert!(matches!(error.source, RiskError::Validation(_)));
    assert_eq!(error.status_code(), 400);
    assert!(h.database.list_recent(10).await.expect("list").is_empty());
    assert_eq!(h.store.count_entries().await.expect("count"), 0);
    assert!(h.qa.requests().is_empty());
}

#[tokio::test]
async fn unindexed_document_falls_back_to_raw_text_prefix() {
    let settings = PipelineConfig {
        context_char_budget: 10,
        ..PipelineConfig::default()
    };
    let h = harness_with(settings, Arc::new(HashEmbedder::new(DIMENSION)), "x").await;

    let context = h
        .pipeline
        .retrieve_context("doc_never_indexed", "  Patient Name: Jane Doe\nbenign")
        .await
        .expect("retrieval should succeed");

    assert_eq!(context, "Patient Na");
}

#[tokio::test]
async fn embedding_failure_marks_report_failed() {
    let h = harness_with(
        PipelineConfig::default(),
        Arc::new(FailingEmbedder {
            dimension: DIMENSION,
        }),
        "high",
    )
    .await;

    let error = h
        .pipeline
        .analyze("Pap smear with atypical cells.")
        .await
        .expect_err("indexing must fail");

    assert_eq!(error.stage, Stage::Index);
    assert!(matches!(error.source, RiskError::Provider(_)));
    let id = error.document_id.expect("report was stored");

    let stored = h
        .database
        .get(&id)
        .await
        .expect("lookup")
        .expect("report should exist");
    assert_eq!(stored.status, ReportStatus::Failed);
    assert!(stored.error_message.is_some());
    assert!(h.qa.requests().is_empty());
}

#[tokio::test]
async fn qa_failure_fails_analysis_but_keeps_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Arc::new(
        Database::initialize_from_config_dir(temp_dir.path(), &StorageConfig::default())
            .await
            .expect("should create database"),
    );
    let store = Arc::new(
        VectorStore::new(
            &temp_dir.path().join("vectors"),
            DIMENSION,
            Duration::from_secs(30),
        )
        .await
        .expect("should create vector store"),
    );
    let index = VectorIndex::new(
        store.clone(),
        Arc::new(HashEmbedder::new(DIMENSION)),
        ChunkingConfig::default(),
    )
    .expect("should create index");
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        database.clone(),
        index,
        Arc::new(FailingQa),
    );

    let error = pipeline
        .analyze("Colposcopy: CIN 3.")
        .await
        .expect_err("scoring must fail");

    assert_eq!(error.stage, Stage::Score);
    assert_eq!(error.status_code(), 500);
    let id = error.document_id.expect("report was stored");
    assert_eq!(store.count_for_document(&id).await.expect("count"), 1);
    let stored = database.get(&id).await.expect("lookup").expect("exists");
    assert_eq!(stored.status, ReportStatus::Indexed);
}

#[tokio::test]
async fn keyword_strategy_skips_qa() {
    let settings = PipelineConfig {
        strategy: ScoringStrategy::Keyword,
        ..PipelineConfig::default()
    };
    let h = harness_with(settings, Arc::new(HashEmbedder::new(DIMENSION)), "low").await;

    let report = h
        .pipeline
        .analyze("Histology: invasive carcinoma identified.")
        .await
        .expect("analysis should succeed");

    assert!(h.qa.requests().is_empty());
    assert_eq!(report.estimate.strategy, ScoringStrategy::Keyword);
    assert_eq!(report.estimate.score, HIGH_RISK_SCORE);
    assert!(report.estimate.answer.contains("carcinoma"));
    assert!(report.estimate.confidence.is_none());
}

#[tokio::test]
async fn qa_answer_is_lower_cased() {
    let h = harness("HIGH Risk Of Malignancy").await;

    let report = h
        .pipeline
        .analyze("Biopsy: malignant cells present.")
        .await
        .expect("analysis should succeed");

    assert_eq!(report.estimate.answer, "high risk of malignancy");
    assert_eq!(report.estimate.score, HIGH_RISK_SCORE);
}

#[tokio::test]
async fn unknown_answer_scores_neutral() {
    let h = harness("no answer").await;

    let report = h
        .pipeline
        .analyze("Specimen received.")
        .await
        .expect("analysis should succeed");

    assert_eq!(report.estimate.score, NEUTRAL_RISK_SCORE);
}

#[tokio::test]
async fn report_carries_patient_metadata() {
    let h = harness("low").await;

    let report = h
        .pipeline
        .analyze("Patient Name: Jane Doe\nSex: F\nDiagnosis: benign.")
        .await
        .expect("analysis should succeed");

    assert_eq!(report.patient.name, "Jane Doe");
    assert_eq!(report.patient.sex, "Female");
}

#[tokio::test]
async fn concurrent_reports_are_isolated() {
    let h = Arc::new(harness("moderate").await);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let h = h.clone();
            tokio::spawn(async move {
                h.pipeline
                    .analyze(&format!("Report number {i}: findings pending review."))
                    .await
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let report = task
            .await
            .expect("task should join")
            .expect("analysis should succeed");
        assert_eq!(report.stored_chunks, 1);
        ids.insert(report.estimate.document_id);
    }

    assert_eq!(ids.len(), 4);
    for id in &ids {
        assert_eq!(h.store.count_for_document(id).await.expect("count"), 1);
    }
}

#[tokio::test]
async fn delete_report_removes_rows_and_text() {
    let h = harness("low").await;
    let report = h
        .pipeline
        .analyze(&report_of_length(800))
        .await
        .expect("analysis should succeed");
    let id = report.estimate.document_id;

    assert!(h.pipeline.delete_report(&id).await.expect("delete"));

    assert!(h.pipeline.get_report(&id).await.expect("lookup").is_none());
    assert_eq!(h.store.count_for_document(&id).await.expect("count"), 0);
    assert!(!h.pipeline.delete_report(&id).await.expect("delete again"));
}

#[tokio::test]
async fn analyze_file_maps_extraction_errors() {
    let h = harness("low").await;

    let error = h
        .pipeline
        .analyze_file(Path::new("scan.png"), &PlainTextExtractor)
        .await
        .expect_err("unsupported format");

    assert_eq!(error.stage, Stage::Receive);
    assert_eq!(error.status_code(), 415);
}

#[tokio::test]
async fn health_reports_embedder() {
    let h = harness("low").await;

    let health = h.pipeline.health();

    assert_eq!(health.status, "ok");
    assert_eq!(health.service, "retriever");
    assert_eq!(health.embedder_model, "hash-embedder");
    assert_eq!(health.embedding_dimension, DIMENSION);
}

#[test]
fn analysis_report_serializes_flat() {
    let report = AnalysisReport {
        estimate: ScoreEstimate {
            document_id: "doc_1".to_string(),
            answer: "high".to_string(),
            score: 9.0,
            context_preview: "ctx".to_string(),
            confidence: None,
            strategy: ScoringStrategy::QuestionAnswering,
        },
        stored_chunks: 2,
        patient: PatientMetadata::default(),
    };

    let json = serde_json::to_value(&report).expect("should serialize");

    assert_eq!(json["document_id"], "doc_1");
    assert_eq!(json["stored_chunks"], 2);
    assert_eq!(json["strategy"], "question_answering");
    assert!(json.get("confidence").is_none());
}

#[test]
fn stages_serialize_lowercase() {
    for (stage, name) in [
        (Stage::Receive, "receive"),
        (Stage::Index, "index"),
        (Stage::Retrieve, "retrieve"),
        (Stage::Score, "score"),
    ] {
        assert_eq!(stage.to_string(), name);
        assert_eq!(serde_json::to_value(stage).expect("should serialize"), name);
    }
}
