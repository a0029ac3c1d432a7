use std::future::Future;
use std::sync::Arc;

use rand::rngs::StdRng;
use storage::repository::{SessionRepository, StorageError};
use tutor_core::Clock;
use tutor_core::model::{
    ConceptProgress, ConceptStage, LearningSession, Phase, Role, SessionModelError,
};
use tutor_core::scheduler::SchedulingEngine;
use tutor_core::special::SpecialQuestionPolicy;

use crate::config::TutorConfig;
use crate::error::{GenerationError, SessionError};
use crate::generation::{CourseProvider, QuestionGenerator};
use crate::learner::{ConceptDecision, Learner};

/// Everything a machine needs besides the session and the learner.
#[derive(Clone)]
pub struct Collaborators {
    pub repo: Arc<dyn SessionRepository>,
    pub generator: Arc<dyn QuestionGenerator>,
    pub courses: Arc<dyn CourseProvider>,
    pub clock: Clock,
    pub config: TutorConfig,
}

/// A computed turn whose save failed with an ambiguous storage error.
#[derive(Debug, Clone)]
struct PendingCommit {
    draft: LearningSession,
    expected_revision: u64,
}

/// Drives one learning session through its phases.
///
/// Each turn works on a clone of the session and is swapped in only after
/// the repository accepted it, so a failed turn leaves the machine on its last
/// committed state. A commit that failed for a transient storage reason is
/// kept and re-sent unchanged by [`retry_pending`](Self::retry_pending).
pub struct PhaseStateMachine<L> {
    pub(super) session: LearningSession,
    pub(super) collab: Collaborators,
    pub(super) learner: L,
    pub(super) rng: StdRng,
    pub(super) engine: SchedulingEngine,
    pub(super) policy: SpecialQuestionPolicy,
    pending: Option<PendingCommit>,
}

impl<L: Learner> PhaseStateMachine<L> {
    #[must_use]
    pub fn new(session: LearningSession, collab: Collaborators, learner: L) -> Self {
        let rng = collab.config.rng();
        Self {
            session,
            collab,
            learner,
            rng,
            engine: SchedulingEngine::new(),
            policy: SpecialQuestionPolicy::new(),
            pending: None,
        }
    }

    /// Last committed state.
    #[must_use]
    pub fn session(&self) -> &LearningSession {
        &self.session
    }

    #[must_use]
    pub fn learner(&self) -> &L {
        &self.learner
    }

    #[must_use]
    pub fn has_pending_commit(&self) -> bool {
        self.pending.is_some()
    }

    /// Run until the session is complete.
    ///
    /// # Errors
    ///
    /// Returns the first `SessionError`; the session stays at its last
    /// committed turn and `run` may be called again to resume.
    pub async fn run(&mut self) -> Result<Phase, SessionError> {
        loop {
            let phase = self.step().await?;
            if phase.is_terminal() {
                return Ok(phase);
            }
        }
    }

    /// Run the handler of the current phase once and return the phase reached.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` when a turn fails.
    pub async fn step(&mut self) -> Result<Phase, SessionError> {
        self.retry_pending().await?;
        match self.session.phase() {
            Phase::Initialization => self.initialize().await?,
            Phase::Overview => {
                self.topic_loop(super::topics::TopicScope::Background).await?;
                self.enter_next_concept(0).await?;
            }
            Phase::Concept {
                index,
                stage: ConceptStage::Learning,
            } => self.run_concept_learning(index).await?,
            Phase::Concept {
                index,
                stage: ConceptStage::Memorizing,
            } => self.run_memorization(index).await?,
            Phase::DrawingConnections => self.run_connections().await?,
            Phase::Complete => {}
        }
        Ok(self.session.phase())
    }

    /// Re-send a commit that previously failed.
    ///
    /// Returns `Ok(true)` if a pending commit was applied.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if storage still fails (the commit
    /// stays pending) or `SessionError::Conflict` if another writer won.
    pub async fn retry_pending(&mut self) -> Result<bool, SessionError> {
        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };
        tracing::warn!(
            key = %pending.draft.key(),
            revision = pending.draft.revision(),
            "retrying pending commit"
        );
        match self
            .collab
            .repo
            .save_session(&pending.draft, pending.expected_revision)
            .await
        {
            Ok(()) => {
                self.swap_in(pending.draft);
                Ok(true)
            }
            Err(StorageError::Conflict) => Err(SessionError::Conflict),
            Err(err) => {
                self.pending = Some(pending);
                Err(SessionError::Persistence(err))
            }
        }
    }

    /// Commit a finished turn.
    pub(super) async fn commit(&mut self, mut draft: LearningSession) -> Result<(), SessionError> {
        let expected_revision = self.session.revision();
        draft.bump_revision(self.collab.clock.now(), fresh_commit_id());
        match self
            .collab
            .repo
            .save_session(&draft, expected_revision)
            .await
        {
            Ok(()) => {
                self.swap_in(draft);
                Ok(())
            }
            Err(StorageError::Conflict) => Err(SessionError::Conflict),
            Err(StorageError::NotFound) => Err(SessionError::NotFound),
            Err(err) => {
                tracing::warn!(
                    key = %draft.key(),
                    revision = draft.revision(),
                    error = %err,
                    "commit failed; keeping turn pending"
                );
                self.pending = Some(PendingCommit {
                    draft,
                    expected_revision,
                });
                Err(SessionError::Persistence(err))
            }
        }
    }

    /// Main questions already committed in the current loop.
    pub(super) fn asked_in_loop(&self) -> usize {
        usize::try_from(self.session.loop_progress().asked).unwrap_or(usize::MAX)
    }

    /// Persist that the current phase's loop is over, so a later step moves
    /// straight on instead of asking again.
    pub(super) async fn close_loop(&mut self) -> Result<(), SessionError> {
        if self.session.loop_progress().finished {
            return Ok(());
        }
        tracing::debug!(
            key = %self.session.key(),
            phase = %self.session.phase(),
            asked = self.session.loop_progress().asked,
            "topic loop closed"
        );
        let mut draft = self.session.clone();
        draft.finish_loop();
        self.commit(draft).await
    }

    fn swap_in(&mut self, draft: LearningSession) {
        if draft.phase() != self.session.phase() {
            tracing::info!(
                key = %draft.key(),
                from = %self.session.phase(),
                to = %draft.phase(),
                "phase advanced"
            );
        }
        self.session = draft;
    }

    /// Await a generation call under the configured timeout.
    pub(super) async fn timed<T, F>(&self, call: F) -> Result<T, GenerationError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        let result = match self.collab.config.generation_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(GenerationError::Timeout)),
            None => call.await,
        };
        if let Err(err) = &result {
            tracing::warn!(key = %self.session.key(), error = %err, "generation failed");
        }
        result
    }

    async fn initialize(&mut self) -> Result<(), SessionError> {
        let topic = self.session.topic().to_string();
        let constraints = self.session.constraints();
        let course = self
            .timed(self.collab.courses.generate_course(&topic, &constraints))
            .await?;

        let summary = format!(
            "Course on {topic}: {} background topics, {} concepts, {} connection topics",
            course.background_topics().len(),
            course.concepts().len(),
            course.connection_topics().len()
        );
        let mut draft = self.session.clone();
        draft.install_course(course)?;
        draft.append_log(Role::System, summary.as_str(), self.collab.clock.now());
        draft.advance_phase(Phase::Overview)?;
        self.commit(draft).await?;
        self.learner.notify(&summary).await;
        Ok(())
    }

    /// Offer concepts from `start` on until the learner picks one; with none
    /// left the session moves on to DrawingConnections.
    pub(super) async fn enter_next_concept(&mut self, start: usize) -> Result<(), SessionError> {
        let mut index = start;
        while let Some(concept) = self.session.concept(index) {
            if concept.is_skipped() {
                index += 1;
                continue;
            }
            let name = concept.name().to_string();
            let decision = self.learner.concept_decision(&name).await?;
            let mut draft = self.session.clone();
            match decision {
                ConceptDecision::Learn => {
                    draft.advance_phase(Phase::learning(index))?;
                    return self.commit(draft).await;
                }
                ConceptDecision::Skip => {
                    draft.concept_mut(index)?.mark_skipped();
                    draft.append_log(
                        Role::System,
                        format!("Concept skipped: {name}"),
                        self.collab.clock.now(),
                    );
                    self.commit(draft).await?;
                    index += 1;
                }
            }
        }

        let mut draft = self.session.clone();
        draft.advance_phase(Phase::DrawingConnections)?;
        self.commit(draft).await
    }

    async fn run_concept_learning(&mut self, index: usize) -> Result<(), SessionError> {
        self.topic_loop(super::topics::TopicScope::Concept(index))
            .await?;

        let concept = concept_at(&self.session, index)?;
        if concept.items().is_empty() || concept.memorization_complete() {
            return self.enter_next_concept(index + 1).await;
        }
        let mut draft = self.session.clone();
        draft.advance_phase(Phase::memorizing(index))?;
        self.commit(draft).await
    }
}

/// Random id within the range `SQLite` stores as a signed integer.
fn fresh_commit_id() -> u64 {
    rand::random_range(0..=i64::MAX.unsigned_abs())
}

pub(super) fn concept_at(
    session: &LearningSession,
    index: usize,
) -> Result<&ConceptProgress, SessionError> {
    session
        .concept(index)
        .ok_or_else(|| SessionModelError::UnknownConcept(index).into())
}
