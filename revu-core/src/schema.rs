/// DDL to create the schema_version tracking table.
///
/// Applied unconditionally on every DB open (before checking the version),
/// using `IF NOT EXISTS` so it is safe to run multiple times.
pub const SCHEMA_VERSION_DDL: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    ) STRICT;
";

/// DDL for the full v1 schema.
///
/// Contains three tables:
/// - `sessions`: one row per review session, keyed by UUID v4 text, holding the
///   round counter and share reference so a restarted server resumes the round.
/// - `rounds`: one row per completed round with its edit and comment counts.
/// - `finishes`: audit of every finish action and whether an agent was waiting.
///
/// All tables use `STRICT` mode for type enforcement.
/// Foreign keys use `ON DELETE CASCADE` so removing a session cleans up all child rows.
pub const SCHEMA_V1_SQL: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        id               TEXT    PRIMARY KEY,
        repo_path        TEXT    NOT NULL,
        base_ref         TEXT    NOT NULL DEFAULT 'HEAD',
        round            INTEGER NOT NULL DEFAULT 1 CHECK(round >= 1),
        last_round_edits INTEGER NOT NULL DEFAULT 0,
        share_url        TEXT,
        delete_token     TEXT,
        created_at       INTEGER NOT NULL,
        updated_at       INTEGER NOT NULL
    ) STRICT;

    CREATE TABLE IF NOT EXISTS rounds (
        session_id    TEXT    NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        round         INTEGER NOT NULL,
        edit_count    INTEGER NOT NULL,
        comment_count INTEGER NOT NULL,
        completed_at  INTEGER NOT NULL,
        PRIMARY KEY (session_id, round)
    ) STRICT;

    CREATE TABLE IF NOT EXISTS finishes (
        session_id     TEXT    NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        round          INTEGER NOT NULL,
        comment_count  INTEGER NOT NULL,
        agent_notified INTEGER NOT NULL,
        finished_at    INTEGER NOT NULL
    ) STRICT;
";

/// Runs forward-only schema migration to migrate the DB to the latest version.
///
/// This function is idempotent: safe to call on every startup regardless of
/// whether the schema has already been applied.
///
/// # Errors
///
/// Returns `rusqlite::Error` if the DDL fails or the version row cannot be read.
pub fn migrate(db: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    db.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = db
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if version < 1 {
        let tx = db.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        tx.execute_batch(SCHEMA_V1_SQL)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
        tx.commit()?;
    }

    Ok(())
}
