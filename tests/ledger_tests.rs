use sheetdrop::config::LedgerConfig;
use sheetdrop::ledger::{self, SqliteStatusLedger, StatusKind, StatusLedger};
use tempfile::{tempdir, TempDir};

async fn create_ledger() -> (SqliteStatusLedger, TempDir) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger.db");

    let ledger = SqliteStatusLedger::new(db_path.to_str().unwrap())
        .await
        .unwrap();
    ledger.run_migrations().await.unwrap();

    (ledger, dir)
}

#[tokio::test]
async fn test_latest_is_absent_for_unknown_job() {
    let (ledger, _dir) = create_ledger().await;
    assert!(ledger.latest("nope").await.unwrap().is_none());
    assert!(ledger.history("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_append_and_latest() {
    let (ledger, _dir) = create_ledger().await;

    ledger
        .append("sample", StatusKind::InProgress, &[])
        .await
        .unwrap();
    let failed = ledger
        .append(
            "sample",
            StatusKind::Failed,
            &["first cause".to_string(), "second cause".to_string()],
        )
        .await
        .unwrap();

    let latest = ledger.latest("sample").await.unwrap().unwrap();
    assert_eq!(latest.status, StatusKind::Failed);
    assert_eq!(latest.sequence_no, failed.sequence_no);
    assert_eq!(latest.detail_messages, vec!["first cause", "second cause"]);
}

#[tokio::test]
async fn test_sequence_is_strictly_increasing() {
    let (ledger, _dir) = create_ledger().await;

    let statuses = [
        StatusKind::InProgress,
        StatusKind::Saving,
        StatusKind::Success,
    ];
    for status in statuses {
        ledger.append("sample", status, &[]).await.unwrap();
        ledger.append("other", status, &[]).await.unwrap();
    }

    let history = ledger.history("sample").await.unwrap();
    assert_eq!(
        history.iter().map(|r| r.status).collect::<Vec<_>>(),
        statuses.to_vec()
    );
    assert!(history
        .windows(2)
        .all(|pair| pair[0].sequence_no < pair[1].sequence_no));
    assert!(history.iter().all(|r| r.job_id == "sample"));
}

#[tokio::test]
async fn test_history_keeps_details_per_record() {
    let (ledger, _dir) = create_ledger().await;

    ledger
        .append("workbook", StatusKind::Saving, &["sheet A".to_string()])
        .await
        .unwrap();
    ledger
        .append("workbook", StatusKind::Saving, &["sheet B".to_string()])
        .await
        .unwrap();
    ledger
        .append(
            "workbook",
            StatusKind::PartialSuccess,
            &["C: cause one".to_string(), "C: cause two".to_string()],
        )
        .await
        .unwrap();

    let history = ledger.history("workbook").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].detail_messages, vec!["sheet A"]);
    assert_eq!(history[1].detail_messages, vec!["sheet B"]);
    assert_eq!(
        history[2].detail_messages,
        vec!["C: cause one", "C: cause two"]
    );
}

#[tokio::test]
async fn test_migrations_are_idempotent_and_data_survives_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger.db");
    let db_path = db_path.to_str().unwrap();

    {
        let ledger = SqliteStatusLedger::new(db_path).await.unwrap();
        ledger.run_migrations().await.unwrap();
        ledger.run_migrations().await.unwrap();
        ledger
            .append("sample", StatusKind::Success, &[])
            .await
            .unwrap();
        ledger.close().await.unwrap();
    }

    let ledger = ledger::connect(&LedgerConfig::sqlite(db_path))
        .await
        .unwrap();
    let latest = ledger.latest("sample").await.unwrap().unwrap();
    assert_eq!(latest.status, StatusKind::Success);
}

#[tokio::test]
async fn test_concurrent_appends() {
    let (ledger, _dir) = create_ledger().await;
    let ledger = std::sync::Arc::new(ledger);

    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            let job_id = format!("job_{}", i % 2);
            ledger
                .append(&job_id, StatusKind::InProgress, &[format!("run {}", i)])
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = ledger.history("job_0").await.unwrap().len()
        + ledger.history("job_1").await.unwrap().len();
    assert_eq!(total, 8);
}

#[tokio::test]
async fn test_newer_schema_version_is_refused() {
    let (ledger, dir) = create_ledger().await;
    ledger.close().await.unwrap();

    let url = format!("sqlite:{}", dir.path().join("ledger.db").display());
    let pool = sqlx::SqlitePool::connect(&url).await.unwrap();
    sqlx::query("INSERT INTO schema_migrations (version) VALUES (99)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let err = ledger::connect(&LedgerConfig::sqlite(
        dir.path().join("ledger.db").to_str().unwrap(),
    ))
    .await
    .unwrap_err();
    assert!(err.to_string().contains("newer"), "{}", err);
}
