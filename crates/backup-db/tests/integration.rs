//! Integration tests for the `backup-db` ledger.
//!
//! Every test opens a private in-memory SQLite database (or a file in a
//! temporary directory), so no external services are needed.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use backup_db::{ArchiveStore, BackupStore, DbError, LedgerPool, SqliteConfig, Upsert};
use backup_types::{BackupRecord, RunId};

async fn ledger() -> LedgerPool {
    LedgerPool::in_memory()
        .await
        .expect("Failed to open in-memory ledger")
}

fn run(id: &str) -> RunId {
    RunId::from(id)
}

// =============================================================================
// Schema
// =============================================================================

#[tokio::test]
async fn ensure_schema_creates_file_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("backup.db");
    let path = path.to_str().expect("utf-8 path");

    let ledger = LedgerPool::connect(&SqliteConfig::file(path))
        .await
        .expect("open ledger file");
    ledger.ensure_schema().await.expect("first migration");
    ledger.ensure_schema().await.expect("second migration");

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE '%backups' ORDER BY name",
    )
    .fetch_all(ledger.pool())
    .await
    .expect("list tables");
    assert_eq!(tables, vec!["archived_backups".to_owned(), "backups".to_owned()]);

    let indexes: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM sqlite_master
          WHERE type = 'index'
            AND tbl_name IN ('backups', 'archived_backups')
            AND name NOT LIKE 'sqlite_%'",
    )
    .fetch_one(ledger.pool())
    .await
    .expect("count indexes");
    assert_eq!(indexes, 6);

    ledger.close().await;
    assert!(std::path::Path::new(path).exists());
}

#[tokio::test]
async fn reopening_a_file_keeps_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("backup.db");
    let path = path.to_str().expect("utf-8 path");

    {
        let ledger = LedgerPool::connect(&SqliteConfig::file(path)).await.unwrap();
        ledger.ensure_schema().await.unwrap();
        BackupStore::new(ledger.pool())
            .upsert_start(&run("a"), "k1", 10.0)
            .await
            .unwrap();
        ledger.close().await;
    }

    let ledger = LedgerPool::connect(&SqliteConfig::file(path)).await.unwrap();
    ledger.ensure_schema().await.unwrap();
    let record = BackupStore::new(ledger.pool()).get(&run("a")).await.unwrap();
    assert_eq!(record.map(|r| r.start_time), Some(Some(10.0)));
}

// =============================================================================
// Upserts
// =============================================================================

#[tokio::test]
async fn start_then_end_produces_complete_row() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    assert_eq!(store.upsert_start(&run("a"), "k1", 100.0).await.unwrap(), Upsert::Inserted);
    assert_eq!(store.upsert_end(&run("a"), "k1", 200.0).await.unwrap(), Upsert::Updated);

    let record = store.get(&run("a")).await.unwrap().expect("row exists");
    assert_eq!(
        record,
        BackupRecord {
            run_uuid: run("a"),
            object_key: "k1".to_owned(),
            start_time: Some(100.0),
            end_time: Some(200.0),
        }
    );
}

#[tokio::test]
async fn end_then_start_produces_the_same_row() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    assert_eq!(store.upsert_end(&run("a"), "k1", 200.0).await.unwrap(), Upsert::Inserted);
    let partial = store.get(&run("a")).await.unwrap().unwrap();
    assert_eq!(partial.start_time, None);
    assert_eq!(partial.end_time, Some(200.0));

    assert_eq!(store.upsert_start(&run("a"), "k1", 100.0).await.unwrap(), Upsert::Updated);
    let record = store.get(&run("a")).await.unwrap().unwrap();
    assert_eq!(record.start_time, Some(100.0));
    assert_eq!(record.end_time, Some(200.0));
}

#[tokio::test]
async fn duplicate_events_leave_one_row_with_same_values() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 200.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 200.0).await.unwrap();

    let all = store.list_active().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].start_time, Some(100.0));
    assert_eq!(all[0].end_time, Some(200.0));
}

#[tokio::test]
async fn update_touches_only_its_own_column() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    store.upsert_start(&run("a"), "original", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "renamed", 200.0).await.unwrap();
    store.upsert_start(&run("a"), "renamed-again", 150.0).await.unwrap();

    let record = store.get(&run("a")).await.unwrap().unwrap();
    assert_eq!(record.object_key, "original");
    assert_eq!(record.start_time, Some(150.0));
    assert_eq!(record.end_time, Some(200.0));
}

#[tokio::test]
async fn record_exists_tracks_inserts() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    assert!(!store.record_exists(&run("a")).await.unwrap());
    store.upsert_start(&run("a"), "k1", 1.0).await.unwrap();
    assert!(store.record_exists(&run("a")).await.unwrap());
    assert!(!store.record_exists(&run("b")).await.unwrap());
}

// =============================================================================
// Stale pending selection
// =============================================================================

#[tokio::test]
async fn oldest_stale_pending_orders_by_start_and_respects_cutoff() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    store.upsert_start(&run("newer"), "k-newer", 500.0).await.unwrap();
    store.upsert_start(&run("older"), "k-older", 300.0).await.unwrap();
    store.upsert_start(&run("fresh"), "k-fresh", 1000.0).await.unwrap();

    let picked = store.oldest_stale_pending(900.0).await.unwrap().unwrap();
    assert_eq!(picked.run_uuid, run("older"));

    // The cutoff is exclusive.
    assert!(store.oldest_stale_pending(300.0).await.unwrap().is_none());
}

#[tokio::test]
async fn oldest_stale_pending_skips_completed_and_startless_rows() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    store.upsert_start(&run("done"), "k1", 10.0).await.unwrap();
    store.upsert_end(&run("done"), "k1", 20.0).await.unwrap();
    store.upsert_end(&run("end-only"), "k2", 30.0).await.unwrap();

    assert!(store.oldest_stale_pending(1_000.0).await.unwrap().is_none());

    store.upsert_start(&run("pending"), "k3", 40.0).await.unwrap();
    let picked = store.oldest_stale_pending(1_000.0).await.unwrap().unwrap();
    assert_eq!(picked.run_uuid, run("pending"));
}

#[tokio::test]
async fn mark_completed_sets_end_time() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());

    store.upsert_start(&run("a"), "k1", 10.0).await.unwrap();
    assert!(store.mark_completed(&run("a"), 99.5).await.unwrap());
    assert!(!store.mark_completed(&run("missing"), 99.5).await.unwrap());

    let record = store.get(&run("a")).await.unwrap().unwrap();
    assert_eq!(record.end_time, Some(99.5));
    assert!(record.is_archivable());
}

// =============================================================================
// Archival
// =============================================================================

#[tokio::test]
async fn archive_moves_only_complete_rows() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());
    let archive = ArchiveStore::new(ledger.pool());

    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 200.0).await.unwrap();
    store.upsert_start(&run("pending"), "k2", 150.0).await.unwrap();
    store.upsert_end(&run("end-only"), "k3", 160.0).await.unwrap();

    assert_eq!(archive.archive_completed().await.unwrap(), 1);

    let archived = archive.list_archived().await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].run_uuid, run("a"));
    assert_eq!(archived[0].start_time, Some(100.0));
    assert_eq!(archived[0].end_time, Some(200.0));
    assert!(archive.is_archived(&run("a")).await.unwrap());

    let active: Vec<RunId> = store
        .list_active()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.run_uuid)
        .collect();
    assert_eq!(active, vec![run("pending"), run("end-only")]);
}

#[tokio::test]
async fn archive_with_nothing_complete_is_a_no_op() {
    let ledger = ledger().await;
    let archive = ArchiveStore::new(ledger.pool());
    assert_eq!(archive.archive_completed().await.unwrap(), 0);
    assert!(archive.list_archived().await.unwrap().is_empty());
}

#[tokio::test]
async fn archive_failure_between_insert_and_delete_rolls_back() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());
    let archive = ArchiveStore::new(ledger.pool());

    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 200.0).await.unwrap();
    store.upsert_start(&run("b"), "k2", 110.0).await.unwrap();
    store.upsert_end(&run("b"), "k2", 210.0).await.unwrap();

    // Make the delete step fail after the insert has already run.
    sqlx::query(
        r"CREATE TRIGGER block_delete BEFORE DELETE ON backups
          BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
    )
    .execute(ledger.pool())
    .await
    .unwrap();

    let result = archive.archive_completed().await;
    assert!(matches!(result, Err(DbError::Sqlite(_))));

    assert!(archive.list_archived().await.unwrap().is_empty());
    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(BackupRecord::is_archivable));

    // Once the obstacle is gone the same rows archive cleanly.
    sqlx::query("DROP TRIGGER block_delete")
        .execute(ledger.pool())
        .await
        .unwrap();
    assert_eq!(archive.archive_completed().await.unwrap(), 2);
    assert!(store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn rearchiving_a_run_replaces_the_archived_row() {
    let ledger = ledger().await;
    let store = BackupStore::new(ledger.pool());
    let archive = ArchiveStore::new(ledger.pool());

    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 200.0).await.unwrap();
    archive.archive_completed().await.unwrap();

    store.upsert_start(&run("a"), "k1", 100.0).await.unwrap();
    store.upsert_end(&run("a"), "k1", 250.0).await.unwrap();
    assert_eq!(archive.archive_completed().await.unwrap(), 1);

    let archived = archive.get(&run("a")).await.unwrap().unwrap();
    assert_eq!(archived.end_time, Some(250.0));
    assert_eq!(archive.list_archived().await.unwrap().len(), 1);
}
