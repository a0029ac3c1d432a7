use std::sync::Arc;

use storage::repository::{SessionListing, SessionRepository, Storage};
use tutor_core::model::{LearningSession, SessionKey, UnderstandingLevel, UserId};
use tutor_core::Clock;

use super::machine::{Collaborators, PhaseStateMachine};
use crate::config::{GenerationConfig, TutorConfig};
use crate::error::{AppServicesError, SessionError};
use crate::generation::{ChatGenerator, QuestionGenerator};
use crate::learner::Learner;
use crate::progress_service::ProgressQueryService;

/// Entry point for hosting many sessions, isolated by `(user, course)`.
#[derive(Clone)]
pub struct TutorService {
    collab: Collaborators,
}

impl TutorService {
    #[must_use]
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Wire `SQLite` storage and the chat generator from environment settings.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage cannot be opened or a setting is invalid.
    pub async fn from_env_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let config = TutorConfig::from_env()?;
        let generation = GenerationConfig::from_env()?;
        if generation.is_none() {
            tracing::warn!("TUTOR_AI_API_KEY is not set; question generation is disabled");
        }
        let chat = Arc::new(ChatGenerator::new(generation));

        Ok(Self::new(Collaborators {
            repo: Arc::clone(&storage.sessions),
            generator: Arc::clone(&chat) as Arc<dyn QuestionGenerator>,
            courses: chat,
            clock,
            config,
        }))
    }

    #[must_use]
    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.collab.repo
    }

    /// Create and persist a new session in the Initialization phase.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an empty topic or zero time budget
    /// and `SessionError::Conflict` if the key already has a session.
    pub async fn start_session(
        &self,
        key: SessionKey,
        topic: &str,
        level: UnderstandingLevel,
        time_budget_minutes: u32,
    ) -> Result<LearningSession, SessionError> {
        let session =
            LearningSession::new(key, topic, level, time_budget_minutes, self.collab.clock.now())?;
        self.collab.repo.create_session(&session).await?;
        tracing::info!(%key, topic = session.topic(), "session started");
        Ok(session)
    }

    /// Load a session and attach a learner, ready to `run` from its persisted phase.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when no session exists for `key`.
    pub async fn open<L: Learner>(
        &self,
        key: SessionKey,
        learner: L,
    ) -> Result<PhaseStateMachine<L>, SessionError> {
        let session = self.collab.repo.load_session(key).await?;
        tracing::info!(%key, phase = %session.phase(), revision = session.revision(), "session opened");
        Ok(PhaseStateMachine::new(session, self.collab.clone(), learner))
    }

    /// # Errors
    ///
    /// Returns `SessionError` if storage cannot be read.
    pub async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionListing>, SessionError> {
        Ok(self.collab.repo.list_sessions(user).await?)
    }

    #[must_use]
    pub fn progress(&self) -> ProgressQueryService {
        ProgressQueryService::new(Arc::clone(&self.collab.repo))
    }
}
