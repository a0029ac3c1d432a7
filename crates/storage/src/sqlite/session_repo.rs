use sqlx::{Row, Sqlite, Transaction};
use tutor_core::model::{LearningSession, PersistedSession, SessionKey, TopicBook, UserId};

use super::SqliteRepository;
use super::mapping::{
    db, from_json, i64_to_u64, key_from_row, key_params, map_concept_row, map_listing_row,
    map_log_row, parse_level, ser, to_json, u64_to_i64, usize_to_i64,
};
use crate::repository::{SaveCheck, SessionListing, SessionRepository, StorageError, check_save};

async fn append_log_from(
    tx: &mut Transaction<'_, Sqlite>,
    session: &LearningSession,
    start: usize,
) -> Result<(), StorageError> {
    let (user_id, course_id) = key_params(session.key())?;
    for (seq, entry) in session.log().iter().enumerate().skip(start) {
        sqlx::query(
            r"
                INSERT INTO conversation_log (user_id, course_id, seq, role, text, at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(usize_to_i64("seq", seq)?)
        .bind(entry.role.as_str())
        .bind(entry.text.as_str())
        .bind(entry.at)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }
    Ok(())
}

async fn upsert_concepts(
    tx: &mut Transaction<'_, Sqlite>,
    session: &LearningSession,
) -> Result<(), StorageError> {
    let (user_id, course_id) = key_params(session.key())?;
    for (ordinal, concept) in session.concepts().iter().enumerate() {
        sqlx::query(
            r"
                INSERT INTO concept_progress (
                    user_id, course_id, ordinal, name, position, skipped, progress
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(user_id, course_id, ordinal) DO UPDATE SET
                    name = excluded.name,
                    position = excluded.position,
                    skipped = excluded.skipped,
                    progress = excluded.progress
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(usize_to_i64("ordinal", ordinal)?)
        .bind(concept.name())
        .bind(u64_to_i64("position", concept.position())?)
        .bind(i64::from(concept.is_skipped()))
        .bind(to_json(concept)?)
        .execute(&mut **tx)
        .await
        .map_err(db)?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &LearningSession) -> Result<(), StorageError> {
        let (user_id, course_id) = key_params(session.key())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let existing = sqlx::query("SELECT 1 FROM sessions WHERE user_id = ?1 AND course_id = ?2")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?;
        if existing.is_some() {
            return Err(StorageError::Conflict);
        }

        sqlx::query(
            r"
                INSERT INTO sessions (
                    user_id, course_id, topic, level, time_budget_minutes, phase, course,
                    background, connections, loop_progress, revision, commit_id,
                    created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(session.topic())
        .bind(session.level().as_str())
        .bind(i64::from(session.time_budget_minutes()))
        .bind(to_json(&session.phase())?)
        .bind(session.course().map(to_json).transpose()?)
        .bind(to_json(session.background())?)
        .bind(to_json(session.connections())?)
        .bind(to_json(&session.loop_progress())?)
        .bind(u64_to_i64("revision", session.revision())?)
        .bind(u64_to_i64("commit_id", session.commit_id())?)
        .bind(session.created_at())
        .bind(session.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        append_log_from(&mut tx, session, 0).await?;
        upsert_concepts(&mut tx, session).await?;
        tx.commit().await.map_err(db)?;

        tracing::debug!(key = %session.key(), "session created");
        Ok(())
    }

    async fn load_session(&self, key: SessionKey) -> Result<LearningSession, StorageError> {
        let (user_id, course_id) = key_params(key)?;

        let row = sqlx::query(
            r"
                SELECT
                    user_id, course_id, topic, level, time_budget_minutes, phase, course,
                    background, connections, loop_progress, revision, commit_id,
                    created_at, updated_at
                FROM sessions
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?
        .ok_or(StorageError::NotFound)?;

        let log_rows = sqlx::query(
            r"
                SELECT role, text, at
                FROM conversation_log
                WHERE user_id = ?1 AND course_id = ?2
                ORDER BY seq ASC
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let concept_rows = sqlx::query(
            r"
                SELECT name, position, progress
                FROM concept_progress
                WHERE user_id = ?1 AND course_id = ?2
                ORDER BY ordinal ASC
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let level: String = row.try_get("level").map_err(ser)?;
        let budget: i64 = row.try_get("time_budget_minutes").map_err(ser)?;
        let phase: String = row.try_get("phase").map_err(ser)?;
        let course: Option<String> = row.try_get("course").map_err(ser)?;
        let background: String = row.try_get("background").map_err(ser)?;
        let connections: String = row.try_get("connections").map_err(ser)?;
        let loop_progress: String = row.try_get("loop_progress").map_err(ser)?;

        let parts = PersistedSession {
            key: key_from_row(&row)?,
            topic: row.try_get("topic").map_err(ser)?,
            level: parse_level(&level)?,
            time_budget_minutes: u32::try_from(budget).map_err(|_| {
                StorageError::Serialization(format!("invalid time_budget_minutes: {budget}"))
            })?,
            phase: from_json("phase", &phase)?,
            course: course.as_deref().map(|c| from_json("course", c)).transpose()?,
            log: log_rows.iter().map(map_log_row).collect::<Result<_, _>>()?,
            background: from_json::<TopicBook>("background", &background)?,
            concepts: concept_rows
                .iter()
                .map(map_concept_row)
                .collect::<Result<_, _>>()?,
            connections: from_json::<TopicBook>("connections", &connections)?,
            loop_progress: from_json("loop_progress", &loop_progress)?,
            revision: i64_to_u64("revision", row.try_get::<i64, _>("revision").map_err(ser)?)?,
            commit_id: i64_to_u64(
                "commit_id",
                row.try_get::<i64, _>("commit_id").map_err(ser)?,
            )?,
            created_at: row.try_get("created_at").map_err(ser)?,
            updated_at: row.try_get("updated_at").map_err(ser)?,
        };

        LearningSession::from_persisted(parts).map_err(ser)
    }

    async fn save_session(
        &self,
        session: &LearningSession,
        expected_revision: u64,
    ) -> Result<(), StorageError> {
        let (user_id, course_id) = key_params(session.key())?;
        let mut tx = self.pool.begin().await.map_err(db)?;

        let current = sqlx::query(
            r"
                SELECT revision, commit_id
                FROM sessions
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?
        .ok_or(StorageError::NotFound)?;

        let stored_revision =
            i64_to_u64("revision", current.try_get::<i64, _>("revision").map_err(ser)?)?;
        let stored_commit_id =
            i64_to_u64("commit_id", current.try_get::<i64, _>("commit_id").map_err(ser)?)?;
        if check_save(stored_revision, stored_commit_id, session, expected_revision)?
            == SaveCheck::AlreadyApplied
        {
            tracing::debug!(
                key = %session.key(),
                revision = session.revision(),
                "save already applied"
            );
            return Ok(());
        }

        let updated = sqlx::query(
            r"
                UPDATE sessions
                SET phase = ?3,
                    course = ?4,
                    background = ?5,
                    connections = ?6,
                    loop_progress = ?7,
                    revision = ?8,
                    commit_id = ?9,
                    updated_at = ?10
                WHERE user_id = ?1 AND course_id = ?2 AND revision = ?11
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .bind(to_json(&session.phase())?)
        .bind(session.course().map(to_json).transpose()?)
        .bind(to_json(session.background())?)
        .bind(to_json(session.connections())?)
        .bind(to_json(&session.loop_progress())?)
        .bind(u64_to_i64("revision", session.revision())?)
        .bind(u64_to_i64("commit_id", session.commit_id())?)
        .bind(session.updated_at())
        .bind(u64_to_i64("expected_revision", expected_revision)?)
        .execute(&mut *tx)
        .await
        .map_err(db)?;
        if updated.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let logged: i64 = sqlx::query(
            r"
                SELECT COUNT(*) AS n
                FROM conversation_log
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?
        .try_get("n")
        .map_err(ser)?;
        let logged = usize::try_from(logged)
            .map_err(|_| StorageError::Serialization(format!("invalid log length: {logged}")))?;
        if logged > session.log().len() {
            return Err(StorageError::Serialization(format!(
                "conversation log shrank from {logged} to {} entries",
                session.log().len()
            )));
        }

        append_log_from(&mut tx, session, logged).await?;
        upsert_concepts(&mut tx, session).await?;
        tx.commit().await.map_err(db)?;

        tracing::debug!(
            key = %session.key(),
            revision = session.revision(),
            "session saved"
        );
        Ok(())
    }

    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionListing>, StorageError> {
        let user_id = u64_to_i64("user_id", user.value())?;
        let rows = sqlx::query(
            r"
                SELECT user_id, course_id, topic, phase, revision, updated_at
                FROM sessions
                WHERE user_id = ?1
                ORDER BY updated_at DESC, course_id ASC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_listing_row).collect()
    }
}
