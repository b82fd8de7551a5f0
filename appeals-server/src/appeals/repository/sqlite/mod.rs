//! SQLite implementation of `AppealRepository`.
//!
//! This provides persistent storage that survives service restarts and can
//! be shared by several service instances pointing at the same file.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Transitions
//!
//! Every status change runs inside a `BEGIN IMMEDIATE` transaction. The
//! `UPDATE ... WHERE id = ? AND status IN (...)` clause is the compare-and-swap:
//! a racing writer either waits for the write lock and then matches zero rows,
//! or wins outright. The transaction guard rolls back when dropped, so every
//! early return leaves the database untouched.

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{
    millis_to_datetime, now_millis, AppealRepository, RepositoryError, ResponseTemplate,
};
use appeals_core::{Appeal, AppealFilter, AppealId, AppealResponse, AppealStatus};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Columns selected for an appeal, in the order `RawAppeal::from_row` reads them.
const APPEAL_COLUMNS: &str = "id, topic, message, status, init_date, update_date";

/// SQLite-backed appeal repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime.
pub struct SqliteRepository {
    /// Database connection. Exposed as `pub(crate)` so tests can install
    /// triggers that force a write to fail halfway through a transaction.
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// # Durability
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` so readers never see a half-applied transaction
    ///   and do not block the writer
    /// - `synchronous = FULL` so a committed transition survives power loss
    /// - `busy_timeout = 5000ms` so concurrent writers queue instead of failing
    /// - `foreign_keys = ON` so deleting an appeal cascades to its responses
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite can silently keep DELETE mode on filesystems without shared
        // memory support. In-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        // 0 if the table is empty (fresh database)
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Migration from version 0 (fresh database) to version 1
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS appeals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    topic TEXT NOT NULL,
                    message TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN (
                        'New', 'InProgress', 'Completed', 'Cancelled'
                    )),
                    init_date INTEGER NOT NULL,
                    update_date INTEGER NOT NULL,
                    CHECK (update_date >= init_date)
                );

                CREATE INDEX IF NOT EXISTS idx_appeals_init_date
                    ON appeals(init_date DESC, id DESC);
                CREATE INDEX IF NOT EXISTS idx_appeals_status
                    ON appeals(status);

                CREATE TABLE IF NOT EXISTS appeal_responses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    appeal_id INTEGER NOT NULL REFERENCES appeals(id) ON DELETE CASCADE,
                    response_message TEXT NOT NULL,
                    date INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_appeal_responses_appeal
                    ON appeal_responses(appeal_id, date, id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn, operation)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

fn lock<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

// =============================================================================
// Row decoding
// =============================================================================

/// An `appeals` row as stored, before status and timestamps are decoded.
struct RawAppeal {
    id: i64,
    topic: String,
    message: String,
    status: String,
    init_date: i64,
    update_date: i64,
}

impl RawAppeal {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            topic: row.get(1)?,
            message: row.get(2)?,
            status: row.get(3)?,
            init_date: row.get(4)?,
            update_date: row.get(5)?,
        })
    }

    fn into_appeal(self, response_message: Option<String>) -> Result<Appeal, RepositoryError> {
        let status: AppealStatus = self.status.parse().map_err(|_| {
            RepositoryError::corruption(format!("status '{}' of appeal {}", self.status, self.id))
        })?;
        Ok(Appeal {
            id: AppealId(self.id),
            topic: self.topic,
            message: self.message,
            status,
            response_message,
            init_date: millis_to_datetime(self.init_date, "init_date")?,
            update_date: millis_to_datetime(self.update_date, "update_date")?,
        })
    }
}

fn insert_response(
    conn: &Connection,
    appeal_id: i64,
    response_message: &str,
    date: i64,
) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO appeal_responses (appeal_id, response_message, date) VALUES (?1, ?2, ?3)",
        params![appeal_id, response_message, date],
    )
    .map_err(|e| RepositoryError::storage("insert appeal response", e.to_string()))?;
    Ok(())
}

/// Build `status IN (?n, ?n+1, ...)` for `count` placeholders starting at `first`.
fn status_in_clause(first: usize, count: usize) -> String {
    let placeholders: Vec<String> = (first..first + count).map(|i| format!("?{}", i)).collect();
    format!("status IN ({})", placeholders.join(", "))
}

// =============================================================================
// AppealRepository trait implementation
// =============================================================================

#[async_trait]
impl AppealRepository for SqliteRepository {
    async fn create(&self, topic: &str, message: &str) -> Result<Appeal, RepositoryError> {
        let topic = topic.to_string();
        let message = message.to_string();

        self.with_conn("create", move |conn| {
            let now = now_millis();
            let raw = conn
                .query_row(
                    &format!(
                        "INSERT INTO appeals (topic, message, status, init_date, update_date)
                         VALUES (?1, ?2, ?3, ?4, ?4)
                         RETURNING {}",
                        APPEAL_COLUMNS
                    ),
                    params![topic, message, AppealStatus::New.as_str(), now],
                    RawAppeal::from_row,
                )
                .map_err(|e| RepositoryError::storage("create", e.to_string()))?;
            raw.into_appeal(None)
        })
        .await
    }

    async fn get(&self, id: AppealId) -> Result<Option<Appeal>, RepositoryError> {
        self.with_conn("get", move |conn| {
            let row: Option<(RawAppeal, Option<String>)> = conn
                .query_row(
                    "SELECT a.id, a.topic, a.message, a.status, a.init_date, a.update_date,
                            (SELECT r.response_message FROM appeal_responses r
                             WHERE r.appeal_id = a.id
                             ORDER BY r.date DESC, r.id DESC LIMIT 1)
                     FROM appeals a WHERE a.id = ?1",
                    params![id.0],
                    |row| Ok((RawAppeal::from_row(row)?, row.get(6)?)),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;

            row.map(|(raw, response_message)| raw.into_appeal(response_message))
                .transpose()
        })
        .await
    }

    async fn list(&self, filter: &AppealFilter) -> Result<Vec<Appeal>, RepositoryError> {
        let mut sql = String::from(
            "SELECT a.id, a.topic, a.message, a.status, a.init_date, a.update_date,
                    (SELECT r.response_message FROM appeal_responses r
                     WHERE r.appeal_id = a.id
                     ORDER BY r.date DESC, r.id DESC LIMIT 1)
             FROM appeals a WHERE 1 = 1",
        );
        let mut values: Vec<Value> = Vec::new();

        for window in filter.date_windows() {
            values.push(Value::Integer(window.start.timestamp_millis()));
            values.push(Value::Integer(window.end.timestamp_millis()));
            sql.push_str(&format!(
                " AND a.init_date >= ?{} AND a.init_date < ?{}",
                values.len() - 1,
                values.len()
            ));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND a.status = ?{}", values.len()));
        }
        sql.push_str(" ORDER BY a.init_date DESC, a.id DESC");

        self.with_conn("list", move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok((RawAppeal::from_row(row)?, row.get::<_, Option<String>>(6)?))
                })
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let mut appeals = Vec::new();
            for row in rows {
                let (raw, response_message) =
                    row.map_err(|e| RepositoryError::storage("list", e.to_string()))?;
                appeals.push(raw.into_appeal(response_message)?);
            }
            Ok(appeals)
        })
        .await
    }

    async fn responses(&self, id: AppealId) -> Result<Vec<AppealResponse>, RepositoryError> {
        self.with_conn("responses", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, appeal_id, response_message, date
                     FROM appeal_responses
                     WHERE appeal_id = ?1
                     ORDER BY date ASC, id ASC",
                )
                .map_err(|e| RepositoryError::storage("responses", e.to_string()))?;

            let rows = stmt
                .query_map(params![id.0], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|e| RepositoryError::storage("responses", e.to_string()))?;

            let mut responses = Vec::new();
            for row in rows {
                let (response_id, appeal_id, response_message, date) =
                    row.map_err(|e| RepositoryError::storage("responses", e.to_string()))?;
                responses.push(AppealResponse {
                    id: response_id,
                    appeal_id: AppealId(appeal_id),
                    response_message,
                    date: millis_to_datetime(date, "date")?,
                });
            }
            Ok(responses)
        })
        .await
    }

    async fn conditional_transition(
        &self,
        id: AppealId,
        expected: &[AppealStatus],
        new_status: AppealStatus,
        response_message: Option<String>,
    ) -> Result<Option<Appeal>, RepositoryError> {
        if expected.is_empty() {
            return Ok(None);
        }
        let expected: Vec<&'static str> = expected.iter().map(|s| s.as_str()).collect();

        self.with_conn("conditional_transition", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("begin transition", e.to_string()))?;

            let now = now_millis();
            let sql = format!(
                "UPDATE appeals SET status = ?1, update_date = MAX(update_date, ?2)
                 WHERE id = ?3 AND {}
                 RETURNING {}",
                status_in_clause(4, expected.len()),
                APPEAL_COLUMNS
            );
            let mut values = vec![
                Value::Text(new_status.as_str().to_string()),
                Value::Integer(now),
                Value::Integer(id.0),
            ];
            values.extend(expected.iter().map(|s| Value::Text(s.to_string())));

            let updated = tx
                .query_row(&sql, params_from_iter(values), RawAppeal::from_row)
                .optional()
                .map_err(|e| RepositoryError::storage("update appeal status", e.to_string()))?;

            // No match: dropping `tx` rolls back the (empty) transaction.
            let Some(raw) = updated else {
                debug!(
                    "Appeal {} not in any of {:?}, leaving it unchanged",
                    id, expected
                );
                return Ok(None);
            };

            if let Some(message) = &response_message {
                insert_response(&tx, raw.id, message, now)?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("commit transition", e.to_string()))?;

            raw.into_appeal(response_message).map(Some)
        })
        .await
    }

    async fn bulk_transition(
        &self,
        from: &[AppealStatus],
        to: AppealStatus,
        template: ResponseTemplate,
    ) -> Result<Vec<Appeal>, RepositoryError> {
        if from.is_empty() {
            return Ok(Vec::new());
        }
        let from: Vec<Value> = from
            .iter()
            .map(|s| Value::Text(s.as_str().to_string()))
            .collect();

        self.with_conn("bulk_transition", move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| RepositoryError::storage("begin bulk transition", e.to_string()))?;

            // Snapshot the prior state under the write lock so the messages see
            // exactly the rows the UPDATE below will touch.
            let prior: Vec<RawAppeal> = {
                let mut stmt = tx
                    .prepare(&format!(
                        "SELECT {} FROM appeals WHERE {}
                         ORDER BY init_date DESC, id DESC",
                        APPEAL_COLUMNS,
                        status_in_clause(1, from.len())
                    ))
                    .map_err(|e| RepositoryError::storage("select bulk rows", e.to_string()))?;
                let rows = stmt
                    .query_map(params_from_iter(from), RawAppeal::from_row)
                    .map_err(|e| RepositoryError::storage("select bulk rows", e.to_string()))?;
                let prior = rows
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|e| RepositoryError::storage("select bulk rows", e.to_string()))?;
                prior
            };

            let now = now_millis();
            let mut transitioned = Vec::with_capacity(prior.len());
            for raw in prior {
                let before = raw.into_appeal(None)?;
                let message = template(&before);

                let changed = tx
                    .execute(
                        "UPDATE appeals SET status = ?1, update_date = MAX(update_date, ?2)
                         WHERE id = ?3 AND status = ?4",
                        params![to.as_str(), now, before.id.0, before.status.as_str()],
                    )
                    .map_err(|e| RepositoryError::storage("update appeal status", e.to_string()))?;
                if changed != 1 {
                    // Cannot happen while we hold the write lock.
                    return Err(RepositoryError::storage(
                        "bulk_transition",
                        format!("appeal {} changed status mid-transaction", before.id),
                    ));
                }
                insert_response(&tx, before.id.0, &message, now)?;

                let update_date = millis_to_datetime(now, "update_date")?.max(before.update_date);
                transitioned.push(Appeal {
                    status: to,
                    update_date,
                    response_message: Some(message),
                    ..before
                });
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("commit bulk transition", e.to_string()))?;

            Ok(transitioned)
        })
        .await
    }
}
