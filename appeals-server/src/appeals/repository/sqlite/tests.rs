//! Tests for SQLite repository implementation.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::params;

use super::super::{AppealRepository, ResponseTemplate};
use super::{SqliteRepository, CURRENT_SCHEMA_VERSION};
use appeals_core::{Appeal, AppealFilter, AppealId, AppealStatus};

fn cancel_template(reason: &'static str) -> ResponseTemplate {
    Arc::new(move |_: &Appeal| format!("Appeal cancelled. Reason: {}", reason))
}

async fn in_progress(repo: &SqliteRepository, topic: &str) -> Appeal {
    let appeal = repo.create(topic, "message").await.unwrap();
    repo.conditional_transition(
        appeal.id,
        &[AppealStatus::New],
        AppealStatus::InProgress,
        None,
    )
    .await
    .unwrap()
    .unwrap()
}

fn count_rows(repo: &SqliteRepository, table: &str) -> i64 {
    let conn = repo.conn.lock().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
    .unwrap()
}

/// Rewrite `init_date` directly so date filters can be tested against fixed days.
fn set_init_date(repo: &SqliteRepository, id: AppealId, y: i32, m: u32, d: u32, h: u32) {
    let millis = Utc
        .with_ymd_and_hms(y, m, d, h, 0, 0)
        .unwrap()
        .timestamp_millis();
    let conn = repo.conn.lock().unwrap();
    conn.execute(
        "UPDATE appeals SET init_date = ?1, update_date = ?1 WHERE id = ?2",
        params![millis, id.0],
    )
    .unwrap();
}

/// Make every audit insert for `appeal_id` abort, simulating a fault halfway
/// through a transition.
fn fail_responses_for(repo: &SqliteRepository, appeal_id: AppealId) {
    let conn = repo.conn.lock().unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_audit BEFORE INSERT ON appeal_responses
         WHEN NEW.appeal_id = {}
         BEGIN SELECT RAISE(ABORT, 'induced audit failure'); END;",
        appeal_id.0
    ))
    .unwrap();
}

#[tokio::test]
async fn test_create_returns_new_appeal() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = repo.create("Water", "No hot water").await.unwrap();

    assert_eq!(appeal.topic, "Water");
    assert_eq!(appeal.message, "No hot water");
    assert_eq!(appeal.status, AppealStatus::New);
    assert_eq!(appeal.init_date, appeal.update_date);
    assert!(appeal.response_message.is_none());
}

#[tokio::test]
async fn test_get_returns_none_for_missing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    assert!(repo.get(AppealId(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_created_appeal_round_trips_through_list() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let created = repo.create("Water", "No hot water").await.unwrap();

    let listed = repo.list(&AppealFilter::default()).await.unwrap();
    assert_eq!(listed, vec![created.clone()]);
    assert_eq!(repo.get(created.id).await.unwrap(), Some(created));
}

#[tokio::test]
async fn test_take_moves_new_to_in_progress_without_response() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let created = repo.create("Water", "No hot water").await.unwrap();

    let taken = repo
        .conditional_transition(
            created.id,
            &[AppealStatus::New],
            AppealStatus::InProgress,
            None,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(taken.status, AppealStatus::InProgress);
    assert!(taken.update_date >= created.update_date);
    assert_eq!(taken.init_date, created.init_date);
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_transition_with_response_writes_one_audit_row() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = in_progress(&repo, "Water").await;

    let completed = repo
        .conditional_transition(
            appeal.id,
            &[AppealStatus::InProgress],
            AppealStatus::Completed,
            Some("Appeal completed. Solution: Fixed valve".to_string()),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(completed.status, AppealStatus::Completed);
    assert_eq!(
        completed.response_message.as_deref(),
        Some("Appeal completed. Solution: Fixed valve")
    );

    let responses = repo.responses(appeal.id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].appeal_id, appeal.id);
    assert!(responses[0].response_message.contains("Fixed valve"));
}

#[tokio::test]
async fn test_transition_from_wrong_status_changes_nothing() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let created = repo.create("Water", "No hot water").await.unwrap();

    let result = repo
        .conditional_transition(
            created.id,
            &[AppealStatus::InProgress],
            AppealStatus::Completed,
            Some("should not be written".to_string()),
        )
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(repo.get(created.id).await.unwrap(), Some(created));
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_terminal_appeal_cannot_move() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = in_progress(&repo, "Water").await;
    repo.conditional_transition(
        appeal.id,
        &[AppealStatus::InProgress],
        AppealStatus::Completed,
        Some("done".to_string()),
    )
    .await
    .unwrap()
    .unwrap();

    for (expected, target) in [
        (AppealStatus::New, AppealStatus::InProgress),
        (AppealStatus::InProgress, AppealStatus::Cancelled),
        (AppealStatus::New, AppealStatus::Cancelled),
    ] {
        let result = repo
            .conditional_transition(appeal.id, &[expected], target, Some("x".to_string()))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    let stored = repo.get(appeal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppealStatus::Completed);
    assert_eq!(repo.responses(appeal.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_appeal_is_not_found() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let result = repo
        .conditional_transition(
            AppealId(999),
            &[AppealStatus::New, AppealStatus::InProgress],
            AppealStatus::Cancelled,
            Some("reason".to_string()),
        )
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_failed_audit_insert_rolls_back_status_change() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = in_progress(&repo, "Water").await;
    fail_responses_for(&repo, appeal.id);

    let result = repo
        .conditional_transition(
            appeal.id,
            &[AppealStatus::InProgress],
            AppealStatus::Completed,
            Some("Fixed valve".to_string()),
        )
        .await;

    assert!(result.is_err());
    let stored = repo.get(appeal.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppealStatus::InProgress);
    assert_eq!(stored.update_date, appeal.update_date);
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_bulk_transition_cancels_every_in_progress_appeal() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let fresh = repo.create("Fresh", "still new").await.unwrap();
    let first = in_progress(&repo, "First").await;
    let second = in_progress(&repo, "Second").await;
    let third = in_progress(&repo, "Third").await;

    let cancelled = repo
        .bulk_transition(
            &[AppealStatus::InProgress],
            AppealStatus::Cancelled,
            cancel_template("shutdown"),
        )
        .await
        .unwrap();

    assert_eq!(cancelled.len(), 3);
    let mut ids: Vec<AppealId> = cancelled.iter().map(|a| a.id).collect();
    ids.sort();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
    for appeal in &cancelled {
        assert_eq!(appeal.status, AppealStatus::Cancelled);
        assert_eq!(
            appeal.response_message.as_deref(),
            Some("Appeal cancelled. Reason: shutdown")
        );
        assert_eq!(repo.responses(appeal.id).await.unwrap().len(), 1);
    }

    assert_eq!(count_rows(&repo, "appeal_responses"), 3);
    let untouched = repo.get(fresh.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AppealStatus::New);
}

#[tokio::test]
async fn test_bulk_transition_template_sees_prior_state() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = in_progress(&repo, "Water").await;

    let template: ResponseTemplate =
        Arc::new(|before: &Appeal| format!("{} was {}", before.id, before.status));
    let cancelled = repo
        .bulk_transition(&[AppealStatus::InProgress], AppealStatus::Cancelled, template)
        .await
        .unwrap();

    assert_eq!(
        cancelled[0].response_message,
        Some(format!("{} was InProgress", appeal.id))
    );
}

#[tokio::test]
async fn test_bulk_transition_with_nothing_to_do() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.create("Water", "No hot water").await.unwrap();

    let cancelled = repo
        .bulk_transition(
            &[AppealStatus::InProgress],
            AppealStatus::Cancelled,
            cancel_template("none"),
        )
        .await
        .unwrap();

    assert!(cancelled.is_empty());
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_bulk_transition_failure_rolls_back_whole_batch() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let first = in_progress(&repo, "First").await;
    let second = in_progress(&repo, "Second").await;
    let third = in_progress(&repo, "Third").await;
    // Rows are processed newest first, so the failure lands after `third`
    // has already been updated inside the transaction.
    fail_responses_for(&repo, second.id);

    let result = repo
        .bulk_transition(
            &[AppealStatus::InProgress],
            AppealStatus::Cancelled,
            cancel_template("shutdown"),
        )
        .await;

    assert!(result.is_err());
    for appeal in [&first, &second, &third] {
        let stored = repo.get(appeal.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppealStatus::InProgress);
    }
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_bulk_transition_covers_several_sources_in_one_transaction() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let fresh = repo.create("Fresh", "still new").await.unwrap();
    let busy = in_progress(&repo, "Busy").await;

    let cancelled = repo
        .bulk_transition(
            &[AppealStatus::New, AppealStatus::InProgress],
            AppealStatus::Cancelled,
            cancel_template("closing"),
        )
        .await
        .unwrap();

    let mut ids: Vec<AppealId> = cancelled.iter().map(|a| a.id).collect();
    ids.sort();
    assert_eq!(ids, vec![fresh.id, busy.id]);
    assert_eq!(count_rows(&repo, "appeal_responses"), 2);
}

#[tokio::test]
async fn test_bulk_transition_failure_in_any_source_rolls_back_all() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let fresh = repo.create("Fresh", "still new").await.unwrap();
    let busy = in_progress(&repo, "Busy").await;
    fail_responses_for(&repo, fresh.id);

    let result = repo
        .bulk_transition(
            &[AppealStatus::New, AppealStatus::InProgress],
            AppealStatus::Cancelled,
            cancel_template("closing"),
        )
        .await;

    assert!(result.is_err());
    assert_eq!(
        repo.get(fresh.id).await.unwrap().unwrap().status,
        AppealStatus::New
    );
    assert_eq!(
        repo.get(busy.id).await.unwrap().unwrap().status,
        AppealStatus::InProgress
    );
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_list_orders_newest_first() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let older = repo.create("Older", "a").await.unwrap();
    let newer = repo.create("Newer", "b").await.unwrap();
    set_init_date(&repo, older.id, 2024, 3, 1, 9);
    set_init_date(&repo, newer.id, 2024, 3, 2, 9);

    let listed = repo.list(&AppealFilter::default()).await.unwrap();
    let ids: Vec<AppealId> = listed.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}

#[tokio::test]
async fn test_list_breaks_date_ties_by_id() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let first = repo.create("First", "a").await.unwrap();
    let second = repo.create("Second", "b").await.unwrap();
    set_init_date(&repo, first.id, 2024, 3, 1, 9);
    set_init_date(&repo, second.id, 2024, 3, 1, 9);

    let listed = repo.list(&AppealFilter::default()).await.unwrap();
    let ids: Vec<AppealId> = listed.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    repo.create("Fresh", "a").await.unwrap();
    let busy_one = in_progress(&repo, "Busy one").await;
    let busy_two = in_progress(&repo, "Busy two").await;
    set_init_date(&repo, busy_one.id, 2024, 3, 5, 9);
    set_init_date(&repo, busy_two.id, 2024, 3, 4, 9);

    let listed = repo
        .list(&AppealFilter::with_status(AppealStatus::InProgress))
        .await
        .unwrap();

    let ids: Vec<AppealId> = listed.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![busy_one.id, busy_two.id]);
    assert!(listed.iter().all(|a| a.status == AppealStatus::InProgress));
}

#[tokio::test]
async fn test_list_filters_by_exact_date_and_range() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let march_1 = repo.create("A", "a").await.unwrap();
    let march_2 = repo.create("B", "b").await.unwrap();
    let march_4 = repo.create("C", "c").await.unwrap();
    set_init_date(&repo, march_1.id, 2024, 3, 1, 23);
    set_init_date(&repo, march_2.id, 2024, 3, 2, 0);
    set_init_date(&repo, march_4.id, 2024, 3, 4, 12);

    let exact = repo
        .list(&AppealFilter {
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..AppealFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].id, march_1.id);

    let range = repo
        .list(&AppealFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 4),
            ..AppealFilter::default()
        })
        .await
        .unwrap();
    let ids: Vec<AppealId> = range.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![march_4.id, march_2.id]);

    let combined = repo
        .list(&AppealFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 4),
            status: Some(AppealStatus::InProgress),
            ..AppealFilter::default()
        })
        .await
        .unwrap();
    assert!(combined.is_empty());
}

#[tokio::test]
async fn test_list_shows_latest_response_message() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = repo.create("Water", "No hot water").await.unwrap();
    repo.conditional_transition(
        appeal.id,
        &[AppealStatus::New],
        AppealStatus::Cancelled,
        Some("Appeal cancelled. Reason: duplicate".to_string()),
    )
    .await
    .unwrap()
    .unwrap();

    let listed = repo.list(&AppealFilter::default()).await.unwrap();
    assert_eq!(
        listed[0].response_message.as_deref(),
        Some("Appeal cancelled. Reason: duplicate")
    );
}

#[tokio::test]
async fn test_concurrent_takes_have_single_winner() {
    let repo = Arc::new(SqliteRepository::new_in_memory().unwrap());
    let appeal = repo.create("Water", "No hot water").await.unwrap();

    let id = appeal.id;
    let take = move |repo: Arc<SqliteRepository>| async move {
        repo.conditional_transition(
            id,
            &[AppealStatus::New],
            AppealStatus::InProgress,
            None,
        )
        .await
        .unwrap()
    };
    let (a, b) = tokio::join!(
        tokio::spawn(take(repo.clone())),
        tokio::spawn(take(repo.clone()))
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_some()).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| o.is_none()).count(), 1);
}

#[tokio::test]
async fn test_concurrent_takes_across_connections() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("appeals.db");
    let first = Arc::new(SqliteRepository::new(&db_path).unwrap());
    let second = Arc::new(SqliteRepository::new(&db_path).unwrap());
    let appeal = first.create("Water", "No hot water").await.unwrap();

    let id = appeal.id;
    let take = move |repo: Arc<SqliteRepository>| async move {
        repo.conditional_transition(
            id,
            &[AppealStatus::New],
            AppealStatus::InProgress,
            None,
        )
        .await
        .unwrap()
    };
    let (a, b) = tokio::join!(tokio::spawn(take(first)), tokio::spawn(take(second)));
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(outcomes.iter().filter(|o| o.is_some()).count(), 1);
}

#[tokio::test]
async fn test_on_disk_persistence_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("appeals.db");

    let created = {
        let repo = SqliteRepository::new(&db_path).unwrap();
        let created = repo.create("Water", "No hot water").await.unwrap();
        repo.conditional_transition(
            created.id,
            &[AppealStatus::New],
            AppealStatus::Cancelled,
            Some("Appeal cancelled. Reason: moved".to_string()),
        )
        .await
        .unwrap()
        .unwrap()
    };

    let repo = SqliteRepository::new(&db_path).unwrap();
    let stored = repo.get(created.id).await.unwrap().unwrap();
    assert_eq!(stored, created);
    assert_eq!(repo.responses(created.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ids_are_not_reused_after_delete() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let first = repo.create("Water", "No hot water").await.unwrap();
    {
        let conn = repo.conn.lock().unwrap();
        conn.execute("DELETE FROM appeals WHERE id = ?1", params![first.id.0])
            .unwrap();
    }
    let second = repo.create("Power", "Outage").await.unwrap();
    assert!(second.id > first.id);
}

#[tokio::test]
async fn test_deleting_appeal_cascades_to_responses() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = repo.create("Water", "No hot water").await.unwrap();
    repo.conditional_transition(
        appeal.id,
        &[AppealStatus::New],
        AppealStatus::Cancelled,
        Some("reason".to_string()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(count_rows(&repo, "appeal_responses"), 1);

    {
        let conn = repo.conn.lock().unwrap();
        conn.execute("DELETE FROM appeals WHERE id = ?1", params![appeal.id.0])
            .unwrap();
    }
    assert_eq!(count_rows(&repo, "appeal_responses"), 0);
}

#[tokio::test]
async fn test_creates_parent_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("dir").join("appeals.db");

    let repo = SqliteRepository::new(&db_path).unwrap();
    repo.create("Water", "No hot water").await.unwrap();
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_schema_version_persisted() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("appeals.db");
    drop(SqliteRepository::new(&db_path).unwrap());

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    let version: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(version, CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_newer_schema_version_is_rejected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("appeals.db");
    drop(SqliteRepository::new(&db_path).unwrap());
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "UPDATE schema_version SET version = ?1 WHERE id = 1",
            params![CURRENT_SCHEMA_VERSION + 1],
        )
        .unwrap();
    }

    assert!(SqliteRepository::new(&db_path).is_err());
}

#[tokio::test]
async fn test_wal_mode_enabled() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("appeals.db");
    let repo = SqliteRepository::new(&db_path).unwrap();

    let conn = repo.conn.lock().unwrap();
    let mode: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_corrupt_status_is_reported() {
    let repo = SqliteRepository::new_in_memory().unwrap();
    let appeal = repo.create("Water", "No hot water").await.unwrap();
    {
        let conn = repo.conn.lock().unwrap();
        // Bypass the CHECK constraint to simulate a row written by other tooling.
        conn.execute_batch("PRAGMA ignore_check_constraints = ON;")
            .unwrap();
        conn.execute(
            "UPDATE appeals SET status = 'Archived' WHERE id = ?1",
            params![appeal.id.0],
        )
        .unwrap();
    }

    assert!(repo.get(appeal.id).await.is_err());
}
