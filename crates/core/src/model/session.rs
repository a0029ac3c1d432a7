use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::concept::{ConceptProgress, TopicBook};
use crate::model::course::{CourseConstraints, CourseStructure, UnderstandingLevel};
use crate::model::ids::SessionKey;
use crate::model::phase::{Phase, PhaseError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionModelError {
    #[error("topic cannot be empty")]
    EmptyTopic,

    #[error("time budget must be at least one minute")]
    InvalidTimeBudget,

    #[error("course can only be installed during initialization")]
    CourseAlreadyInstalled,

    #[error("course has not been generated yet")]
    MissingCourse,

    #[error("unknown concept index {0}")]
    UnknownConcept(usize),

    #[error("persisted session is inconsistent: {0}")]
    InvalidPersistedState(String),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Who produced a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tutor,
    Learner,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tutor => "tutor",
            Role::Learner => "learner",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Main questions asked in the current phase's dialogue loop.
///
/// Reset whenever the phase advances, so a resumed loop keeps its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopProgress {
    pub asked: u32,
    /// The loop ended by cap, mastery or the learner declining.
    pub finished: bool,
}

/// Persisted shape of a session, used by storage adapters to rehydrate.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub key: SessionKey,
    pub topic: String,
    pub level: UnderstandingLevel,
    pub time_budget_minutes: u32,
    pub phase: Phase,
    pub course: Option<CourseStructure>,
    pub log: Vec<ConversationEntry>,
    pub background: TopicBook,
    pub concepts: Vec<ConceptProgress>,
    pub connections: TopicBook,
    pub loop_progress: LoopProgress,
    pub revision: u64,
    pub commit_id: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One learner working through one course.
///
/// The phase only moves forward; the conversation log is append-only; the
/// revision increments once per committed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSession {
    key: SessionKey,
    topic: String,
    level: UnderstandingLevel,
    time_budget_minutes: u32,
    phase: Phase,
    course: Option<CourseStructure>,
    log: Vec<ConversationEntry>,
    background: TopicBook,
    concepts: Vec<ConceptProgress>,
    connections: TopicBook,
    loop_progress: LoopProgress,
    revision: u64,
    commit_id: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LearningSession {
    /// Start a new session in the `Initialization` phase.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::EmptyTopic` or `InvalidTimeBudget` on bad input.
    pub fn new(
        key: SessionKey,
        topic: impl Into<String>,
        level: UnderstandingLevel,
        time_budget_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionModelError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(SessionModelError::EmptyTopic);
        }
        if time_budget_minutes == 0 {
            return Err(SessionModelError::InvalidTimeBudget);
        }

        Ok(Self {
            key,
            topic,
            level,
            time_budget_minutes,
            phase: Phase::Initialization,
            course: None,
            log: Vec::new(),
            background: TopicBook::default(),
            concepts: Vec::new(),
            connections: TopicBook::default(),
            loop_progress: LoopProgress::default(),
            revision: 0,
            commit_id: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvalidPersistedState` if the parts contradict each other.
    pub fn from_persisted(parts: PersistedSession) -> Result<Self, SessionModelError> {
        if parts.topic.trim().is_empty() {
            return Err(SessionModelError::EmptyTopic);
        }
        if parts.time_budget_minutes == 0 {
            return Err(SessionModelError::InvalidTimeBudget);
        }
        if parts.updated_at < parts.created_at {
            return Err(SessionModelError::InvalidPersistedState(
                "updated_at is before created_at".into(),
            ));
        }
        match &parts.course {
            None if parts.phase != Phase::Initialization => {
                return Err(SessionModelError::InvalidPersistedState(format!(
                    "phase {} without a course",
                    parts.phase
                )));
            }
            Some(course) if course.concepts().len() != parts.concepts.len() => {
                return Err(SessionModelError::InvalidPersistedState(format!(
                    "course has {} concepts but {} progress entries",
                    course.concepts().len(),
                    parts.concepts.len()
                )));
            }
            _ => {}
        }
        if let Phase::Concept { index, .. } = parts.phase {
            if index >= parts.concepts.len() {
                return Err(SessionModelError::UnknownConcept(index));
            }
        }

        Ok(Self {
            key: parts.key,
            topic: parts.topic,
            level: parts.level,
            time_budget_minutes: parts.time_budget_minutes,
            phase: parts.phase,
            course: parts.course,
            log: parts.log,
            background: parts.background,
            concepts: parts.concepts,
            connections: parts.connections,
            loop_progress: parts.loop_progress,
            revision: parts.revision,
            commit_id: parts.commit_id,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.key
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn level(&self) -> UnderstandingLevel {
        self.level
    }

    #[must_use]
    pub fn time_budget_minutes(&self) -> u32 {
        self.time_budget_minutes
    }

    #[must_use]
    pub fn constraints(&self) -> CourseConstraints {
        CourseConstraints {
            level: self.level,
            time_budget_minutes: self.time_budget_minutes,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn course(&self) -> Option<&CourseStructure> {
        self.course.as_ref()
    }

    #[must_use]
    pub fn log(&self) -> &[ConversationEntry] {
        &self.log
    }

    #[must_use]
    pub fn background(&self) -> &TopicBook {
        &self.background
    }

    pub fn background_mut(&mut self) -> &mut TopicBook {
        &mut self.background
    }

    #[must_use]
    pub fn concepts(&self) -> &[ConceptProgress] {
        &self.concepts
    }

    #[must_use]
    pub fn concept(&self, index: usize) -> Option<&ConceptProgress> {
        self.concepts.get(index)
    }

    /// # Errors
    ///
    /// Returns `SessionModelError::UnknownConcept` for an out-of-range index.
    pub fn concept_mut(&mut self, index: usize) -> Result<&mut ConceptProgress, SessionModelError> {
        self.concepts
            .get_mut(index)
            .ok_or(SessionModelError::UnknownConcept(index))
    }

    #[must_use]
    pub fn concept_by_name(&self, name: &str) -> Option<&ConceptProgress> {
        self.concepts.iter().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn connections(&self) -> &TopicBook {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut TopicBook {
        &mut self.connections
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Token of the commit that produced this revision.
    #[must_use]
    pub fn commit_id(&self) -> u64 {
        self.commit_id
    }

    #[must_use]
    pub fn loop_progress(&self) -> LoopProgress {
        self.loop_progress
    }

    pub fn count_loop_question(&mut self) {
        self.loop_progress.asked = self.loop_progress.asked.saturating_add(1);
    }

    pub fn finish_loop(&mut self) {
        self.loop_progress.finished = true;
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Install the generated course and seed all progress maps.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::CourseAlreadyInstalled` outside `Initialization`.
    pub fn install_course(&mut self, course: CourseStructure) -> Result<(), SessionModelError> {
        if self.phase != Phase::Initialization || self.course.is_some() {
            return Err(SessionModelError::CourseAlreadyInstalled);
        }
        self.background = TopicBook::new(course.background_topics().iter().cloned());
        self.concepts = course
            .concepts()
            .iter()
            .map(ConceptProgress::from_outline)
            .collect();
        self.connections = TopicBook::new(course.connection_topics().iter().cloned());
        self.course = Some(course);
        Ok(())
    }

    /// Move to a strictly later phase.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError` for backwards moves, `MissingCourse` when leaving
    /// initialization without a course, and `UnknownConcept` for a bad index.
    pub fn advance_phase(&mut self, next: Phase) -> Result<(), SessionModelError> {
        self.phase.check_advance(next)?;
        if self.course.is_none() {
            return Err(SessionModelError::MissingCourse);
        }
        if let Phase::Concept { index, .. } = next {
            if index >= self.concepts.len() {
                return Err(SessionModelError::UnknownConcept(index));
            }
        }
        self.phase = next;
        self.loop_progress = LoopProgress::default();
        Ok(())
    }

    pub fn append_log(&mut self, role: Role, text: impl Into<String>, at: DateTime<Utc>) {
        self.log.push(ConversationEntry {
            role,
            text: text.into(),
            at,
        });
    }

    /// Stamp the session as the next committed revision.
    ///
    /// `commit_id` identifies this exact commit so storage can tell a retried
    /// save from a different turn at the same revision.
    pub fn bump_revision(&mut self, now: DateTime<Utc>, commit_id: u64) {
        self.revision += 1;
        self.commit_id = commit_id;
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
