use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tutor_core::model::{LearningSession, Phase, SessionKey, UserId};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Lightweight listing row for a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionListing {
    pub key: SessionKey,
    pub topic: String,
    pub phase: Phase,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionListing {
    #[must_use]
    pub fn from_session(session: &LearningSession) -> Self {
        Self {
            key: session.key(),
            topic: session.topic().to_string(),
            phase: session.phase(),
            revision: session.revision(),
            updated_at: session.updated_at(),
        }
    }
}

/// Persistence contract for learning sessions keyed by `(user, course)`.
///
/// Every save is one atomic commit: either the whole session state at the
/// new revision becomes visible, or nothing changes.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a brand-new session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a session already exists for the key.
    async fn create_session(&self, session: &LearningSession) -> Result<(), StorageError>;

    /// Load a session by key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn load_session(&self, key: SessionKey) -> Result<LearningSession, StorageError>;

    /// Replace the stored session, provided the stored revision is still `expected_revision`.
    ///
    /// Saving a session whose revision and commit id are already stored is a
    /// no-op, so a commit retried after an ambiguous failure cannot apply twice.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown key and
    /// `StorageError::Conflict` when another writer moved the revision.
    async fn save_session(
        &self,
        session: &LearningSession,
        expected_revision: u64,
    ) -> Result<(), StorageError>;

    /// All sessions of one learner, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the listing cannot be read.
    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionListing>, StorageError>;
}

/// Outcome of comparing an incoming save against what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaveCheck {
    Write,
    AlreadyApplied,
}

pub(crate) fn check_save(
    stored_revision: u64,
    stored_commit_id: u64,
    session: &LearningSession,
    expected_revision: u64,
) -> Result<SaveCheck, StorageError> {
    if stored_revision == session.revision() && stored_commit_id == session.commit_id() {
        return Ok(SaveCheck::AlreadyApplied);
    }
    if stored_revision != expected_revision || session.revision() <= expected_revision {
        return Err(StorageError::Conflict);
    }
    Ok(SaveCheck::Write)
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionKey, LearningSession>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn create_session(&self, session: &LearningSession) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&session.key()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(session.key(), session.clone());
        Ok(())
    }

    async fn load_session(&self, key: SessionKey) -> Result<LearningSession, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(&key).cloned().ok_or(StorageError::NotFound)
    }

    async fn save_session(
        &self,
        session: &LearningSession,
        expected_revision: u64,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard.get(&session.key()).ok_or(StorageError::NotFound)?;
        match check_save(
            stored.revision(),
            stored.commit_id(),
            session,
            expected_revision,
        )? {
            SaveCheck::AlreadyApplied => Ok(()),
            SaveCheck::Write => {
                guard.insert(session.key(), session.clone());
                Ok(())
            }
        }
    }

    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionListing>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut listings: Vec<SessionListing> = guard
            .values()
            .filter(|s| s.key().user == user)
            .map(SessionListing::from_session)
            .collect();
        listings.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(listings)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let sessions: Arc<dyn SessionRepository> = Arc::new(InMemoryRepository::new());
        Self { sessions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::{CourseId, Role, UnderstandingLevel};
    use tutor_core::time::fixed_now;

    fn build_session(user: u64, course: u64) -> LearningSession {
        LearningSession::new(
            SessionKey::new(UserId::new(user), CourseId::new(course)),
            "Chemistry",
            UnderstandingLevel::Beginner,
            30,
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_rejects_duplicate_key() {
        let repo = InMemoryRepository::new();
        let session = build_session(1, 1);
        repo.create_session(&session).await.unwrap();
        assert!(matches!(
            repo.create_session(&session).await,
            Err(StorageError::Conflict)
        ));
    }

    #[tokio::test]
    async fn save_checks_expected_revision() {
        let repo = InMemoryRepository::new();
        let mut session = build_session(1, 1);
        repo.create_session(&session).await.unwrap();

        session.bump_revision(fixed_now() + chrono::Duration::seconds(1), 1);
        repo.save_session(&session, 0).await.unwrap();
        // Same commit again: accepted without effect.
        repo.save_session(&session, 0).await.unwrap();

        let mut stale = repo.load_session(session.key()).await.unwrap();
        stale.bump_revision(fixed_now() + chrono::Duration::seconds(2), 2);
        assert!(matches!(
            repo.save_session(&stale, 0).await,
            Err(StorageError::Conflict)
        ));

        let loaded = repo.load_session(session.key()).await.unwrap();
        assert_eq!(loaded.revision(), 1);
    }

    #[tokio::test]
    async fn same_revision_and_timestamp_from_another_writer_conflicts() {
        let repo = InMemoryRepository::new();
        let base = build_session(1, 1);
        repo.create_session(&base).await.unwrap();

        let mut first = base.clone();
        first.append_log(Role::System, "first writer", fixed_now());
        first.bump_revision(fixed_now(), 100);
        let mut second = base.clone();
        second.bump_revision(fixed_now(), 200);
        assert_eq!(first.updated_at(), second.updated_at());

        repo.save_session(&first, 0).await.unwrap();
        assert!(matches!(
            repo.save_session(&second, 0).await,
            Err(StorageError::Conflict)
        ));
        assert_eq!(repo.load_session(base.key()).await.unwrap(), first);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_user() {
        let repo = InMemoryRepository::new();
        repo.create_session(&build_session(1, 1)).await.unwrap();
        repo.create_session(&build_session(1, 2)).await.unwrap();
        repo.create_session(&build_session(2, 1)).await.unwrap();

        let listed = repo.list_sessions(UserId::new(1)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|l| l.key.user == UserId::new(1)));
        assert!(matches!(
            repo.load_session(SessionKey::new(UserId::new(3), CourseId::new(1)))
                .await,
            Err(StorageError::NotFound)
        ));
    }
}
