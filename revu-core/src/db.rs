use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::types::{RoundRecord, SessionRecord};

/// Opens (or creates) the SQLite database at `path`, configures WAL mode,
/// and applies schema migrations via the `schema_version` table.
///
/// This function is the single entry point for all database connections.
/// It sets `busy_timeout` via the `Connection` method (not a PRAGMA string) so
/// the setting takes effect regardless of pragma caching.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the file cannot be opened, WAL configuration
/// fails, or schema DDL fails.
pub async fn open_db(path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let conn = Connection::open(path).await?;

    conn.call(|db| {
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;
        db.busy_timeout(Duration::from_secs(5))?;
        Ok(())
    })
    .await?;

    // Checkpoint any leftover WAL from a previous run.
    conn.call(|db| {
        db.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    })
    .await?;

    conn.call(|db| {
        crate::schema::migrate(db)?;
        Ok(())
    })
    .await?;

    Ok(conn)
}

/// Returns the current Unix timestamp in seconds.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn session_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: r.get(0)?,
        repo_path: r.get(1)?,
        base_ref: r.get(2)?,
        round: r.get(3)?,
        last_round_edits: r.get(4)?,
        share_url: r.get(5)?,
        delete_token: r.get(6)?,
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

/// Finds the most recent session for `repo_path + base_ref`, or creates one.
///
/// On resume: updates `updated_at` to the current time via `BEGIN IMMEDIATE`
/// and returns the stored round counter. On create: generates a new UUID v4
/// and inserts the session at round 1.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query or write transaction fails.
pub async fn detect_or_create_session(
    conn: &Connection,
    repo_path: &str,
    base_ref: &str,
) -> Result<SessionRecord, tokio_rusqlite::Error> {
    let repo_path = repo_path.to_owned();
    let base_ref = base_ref.to_owned();

    conn.call(move |db| {
        let existing: Option<SessionRecord> = db
            .query_row(
                "SELECT id, repo_path, base_ref, round, last_round_edits,
                        share_url, delete_token, created_at, updated_at
                 FROM sessions
                 WHERE repo_path = ?1 AND base_ref = ?2
                 ORDER BY updated_at DESC
                 LIMIT 1",
                rusqlite::params![&repo_path, &base_ref],
                session_from_row,
            )
            .optional()?;

        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let session = match existing {
            Some(mut session) => {
                tx.execute(
                    "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, &session.id],
                )?;
                session.updated_at = now;
                session
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO sessions (id, repo_path, base_ref, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    rusqlite::params![&id, &repo_path, &base_ref, now],
                )?;
                SessionRecord {
                    id,
                    repo_path,
                    base_ref,
                    round: 1,
                    last_round_edits: 0,
                    share_url: None,
                    delete_token: None,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        tx.commit()?;
        Ok(session)
    })
    .await
}

/// Records a completed round and advances the session's stored round counter.
///
/// `round` is the number of the round that just completed; the session row is
/// moved to `round + 1`. Re-recording the same round replaces the row.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the transaction fails.
pub async fn record_round(
    conn: &Connection,
    session_id: &str,
    round: u32,
    edit_count: u32,
    comment_count: u32,
) -> Result<(), tokio_rusqlite::Error> {
    let session_id = session_id.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO rounds (session_id, round, edit_count, comment_count, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id, round)
             DO UPDATE SET edit_count = excluded.edit_count,
                           comment_count = excluded.comment_count,
                           completed_at = excluded.completed_at",
            rusqlite::params![&session_id, round, edit_count, comment_count, now],
        )?;
        tx.execute(
            "UPDATE sessions SET round = ?1, last_round_edits = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![round + 1, edit_count, now, &session_id],
        )?;
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Loads the completed rounds of `session_id`, oldest first.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the query fails.
pub async fn load_rounds(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<RoundRecord>, tokio_rusqlite::Error> {
    let session_id = session_id.to_owned();

    conn.call(move |db| {
        let mut stmt = db.prepare(
            "SELECT round, edit_count, comment_count, completed_at
             FROM rounds WHERE session_id = ?1 ORDER BY round",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![&session_id], |r| {
                Ok(RoundRecord {
                    round: r.get(0)?,
                    edit_count: r.get(1)?,
                    comment_count: r.get(2)?,
                    completed_at: r.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
    .await
}

/// Appends a finish action to the audit table.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the insert fails.
pub async fn record_finish(
    conn: &Connection,
    session_id: &str,
    round: u32,
    comment_count: u32,
    agent_notified: bool,
) -> Result<(), tokio_rusqlite::Error> {
    let session_id = session_id.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO finishes (session_id, round, comment_count, agent_notified, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![&session_id, round, comment_count, agent_notified, now],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, &session_id],
        )?;
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Stores (or clears, with `None`) the share reference and delete token.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the update fails.
pub async fn update_share(
    conn: &Connection,
    session_id: &str,
    share_url: Option<String>,
    delete_token: Option<String>,
) -> Result<(), tokio_rusqlite::Error> {
    let session_id = session_id.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE sessions SET share_url = ?1, delete_token = ?2, updated_at = ?3
             WHERE id = ?4",
            rusqlite::params![share_url, delete_token, now, &session_id],
        )?;
        tx.commit()?;
        Ok(())
    })
    .await
}

/// Updates the `updated_at` timestamp for `session_id` to the current time.
///
/// Called on shutdown so `detect_or_create_session` resumes this session next time.
///
/// # Errors
///
/// Returns `tokio_rusqlite::Error` if the `BEGIN IMMEDIATE` transaction fails.
pub async fn update_session_timestamp(
    conn: &Connection,
    session_id: &str,
) -> Result<(), tokio_rusqlite::Error> {
    let session_id = session_id.to_owned();

    conn.call(move |db| {
        let now = now_secs();
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, &session_id],
        )?;
        tx.commit()?;
        Ok(())
    })
    .await
}
