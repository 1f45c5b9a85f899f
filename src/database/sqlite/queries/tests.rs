use super::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::migrate!("src/database/sqlite/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

#[test]
fn generated_ids_are_unique_and_prefixed() {
    let first = ReportQueries::new_id();
    let second = ReportQueries::new_id();

    assert!(first.starts_with("doc_"));
    assert_eq!(first.len(), 4 + 32);
    assert_ne!(first, second);
}

#[tokio::test]
async fn report_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = ReportQueries::create(&pool, "Pap smear: LSIL.")
        .await
        .expect("Failed to create report");

    assert_eq!(created.raw_text, "Pap smear: LSIL.");
    assert_eq!(created.status, ReportStatus::Pending);
    assert_eq!(created.stored_chunks, 0);

    let retrieved = ReportQueries::get_by_id(&pool, &created.id)
        .await
        .expect("Failed to get report")
        .expect("Report should exist");
    assert_eq!(retrieved, created);

    let updated = ReportQueries::update(&pool, &created.id, ReportUpdate::indexed(4))
        .await
        .expect("Failed to update report")
        .expect("Report should exist");
    assert_eq!(updated.status, ReportStatus::Indexed);
    assert_eq!(updated.stored_chunks, 4);
    assert!(updated.updated_at >= created.updated_at);

    assert!(
        ReportQueries::delete(&pool, &created.id)
            .await
            .expect("Failed to delete report")
    );
    assert!(
        ReportQueries::get_by_id(&pool, &created.id)
            .await
            .expect("Failed to get report")
            .is_none()
    );
}

#[tokio::test]
async fn failed_update_keeps_chunk_count() {
    let (_temp_dir, pool) = create_test_pool().await;
    let created = ReportQueries::create(&pool, "text").await.expect("create");

    ReportQueries::update(&pool, &created.id, ReportUpdate::indexed(2))
        .await
        .expect("update");
    let failed = ReportQueries::update(&pool, &created.id, ReportUpdate::failed("boom"))
        .await
        .expect("update")
        .expect("Report should exist");

    assert_eq!(failed.status, ReportStatus::Failed);
    assert_eq!(failed.stored_chunks, 2);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));
}

#[tokio::test]
async fn update_and_delete_missing_report() {
    let (_temp_dir, pool) = create_test_pool().await;

    let updated = ReportQueries::update(&pool, "doc_missing", ReportUpdate::indexed(1))
        .await
        .expect("update should not error");
    assert!(updated.is_none());

    let deleted = ReportQueries::delete(&pool, "doc_missing")
        .await
        .expect("delete should not error");
    assert!(!deleted);
}

#[tokio::test]
async fn list_recent_respects_limit_and_status() {
    let (_temp_dir, pool) = create_test_pool().await;

    let mut ids = Vec::new();
    for i in 0..5 {
        let report = ReportQueries::create(&pool, &format!("report {i}"))
            .await
            .expect("create");
        ids.push(report.id);
    }
    ReportQueries::update(&pool, &ids[0], ReportUpdate::failed("x"))
        .await
        .expect("update");

    let recent = ReportQueries::list_recent(&pool, 3).await.expect("list");
    assert_eq!(recent.len(), 3);

    let failed = ReportQueries::list_by_status(&pool, ReportStatus::Failed)
        .await
        .expect("list by status");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, ids[0]);

    assert_eq!(ReportQueries::count(&pool).await.expect("count"), 5);
}
