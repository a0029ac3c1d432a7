use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs versioned migrations for the session schema.
///
/// Version 1 creates sessions, their append-only conversation log, and one
/// progress row per concept.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sessions (
                    user_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    topic TEXT NOT NULL,
                    level TEXT NOT NULL,
                    time_budget_minutes INTEGER NOT NULL CHECK (time_budget_minutes > 0),
                    phase TEXT NOT NULL,
                    course TEXT,
                    background TEXT NOT NULL,
                    connections TEXT NOT NULL,
                    loop_progress TEXT NOT NULL,
                    revision INTEGER NOT NULL CHECK (revision >= 0),
                    commit_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS conversation_log (
                    user_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    seq INTEGER NOT NULL CHECK (seq >= 0),
                    role TEXT NOT NULL CHECK (role IN ('tutor', 'learner', 'system')),
                    text TEXT NOT NULL,
                    at TEXT NOT NULL,
                    PRIMARY KEY (user_id, course_id, seq),
                    FOREIGN KEY (user_id, course_id)
                        REFERENCES sessions(user_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS concept_progress (
                    user_id INTEGER NOT NULL,
                    course_id INTEGER NOT NULL,
                    ordinal INTEGER NOT NULL CHECK (ordinal >= 0),
                    name TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    skipped INTEGER NOT NULL CHECK (skipped IN (0, 1)),
                    progress TEXT NOT NULL,
                    PRIMARY KEY (user_id, course_id, ordinal),
                    FOREIGN KEY (user_id, course_id)
                        REFERENCES sessions(user_id, course_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sessions_user_updated
                    ON sessions (user_id, updated_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
