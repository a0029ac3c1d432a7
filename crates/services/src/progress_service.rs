use std::sync::Arc;

use storage::repository::SessionRepository;
use tutor_core::model::{ConceptProgress, LearningSession, SessionKey};
use tutor_core::progress::{self, ConceptMastery, ItemSchedule, ProgressReport, StrugglingItem};

use crate::error::SessionError;

/// Read-only progress views over persisted sessions.
///
/// Every call loads the latest committed revision; nothing here writes.
#[derive(Clone)]
pub struct ProgressQueryService {
    repo: Arc<dyn SessionRepository>,
}

impl ProgressQueryService {
    #[must_use]
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when no session exists for `key`.
    pub async fn report(&self, key: SessionKey) -> Result<ProgressReport, SessionError> {
        let session = self.load(key).await?;
        Ok(progress::session_report(&session))
    }

    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when no session exists for `key`.
    pub async fn concept_mastery(
        &self,
        key: SessionKey,
    ) -> Result<Vec<ConceptMastery>, SessionError> {
        let session = self.load(key).await?;
        Ok(session
            .concepts()
            .iter()
            .map(progress::concept_mastery)
            .collect())
    }

    /// Struggling items across all concepts, worst first within each concept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when no session exists for `key`.
    pub async fn struggling_items(
        &self,
        key: SessionKey,
    ) -> Result<Vec<StrugglingItem>, SessionError> {
        let session = self.load(key).await?;
        Ok(session
            .concepts()
            .iter()
            .flat_map(progress::struggling_items)
            .collect())
    }

    /// Unmastered topics per concept, in course order. Concepts with nothing
    /// left are omitted.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` when no session exists for `key`.
    pub async fn unmastered_topics(
        &self,
        key: SessionKey,
    ) -> Result<Vec<(String, Vec<String>)>, SessionError> {
        let session = self.load(key).await?;
        Ok(session
            .concepts()
            .iter()
            .map(|c| (c.name().to_string(), progress::unmastered_topics(c)))
            .filter(|(_, topics)| !topics.is_empty())
            .collect())
    }

    /// Ease and interval of every item in one concept.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for an unknown session and
    /// `SessionError::Validation` for an unknown concept name.
    pub async fn schedule(
        &self,
        key: SessionKey,
        concept: &str,
    ) -> Result<Vec<ItemSchedule>, SessionError> {
        let session = self.load(key).await?;
        let found = find_concept(&session, concept)?;
        Ok(progress::schedule_snapshot(found))
    }

    async fn load(&self, key: SessionKey) -> Result<LearningSession, SessionError> {
        Ok(self.repo.load_session(key).await?)
    }
}

fn find_concept<'a>(
    session: &'a LearningSession,
    name: &str,
) -> Result<&'a ConceptProgress, SessionError> {
    session
        .concept_by_name(name)
        .ok_or_else(|| SessionError::Validation(format!("unknown concept: {name}")))
}
