use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

/// Errors that can occur while building review values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("comprehension score must be between 0 and 5, got {0}")]
    OutOfRange(u8),
}

//
// ─── COMPREHENSION SCORE ──────────────────────────────────────────────────────
//

/// Integer 0–5 rating of answer quality, as returned by the evaluator.
///
/// - `0..=1`: failed recall
/// - `2..=3`: partial understanding
/// - `4`: correct with hesitation
/// - `5`: complete understanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const ZERO: Score = Score(0);
    pub const MAX: Score = Score(5);

    /// Validates a raw score.
    ///
    /// # Errors
    ///
    /// Returns `ScoreError::OutOfRange` if the value is above 5.
    pub fn new(value: u8) -> Result<Self, ScoreError> {
        if value > 5 {
            return Err(ScoreError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    /// Builds a score from any integer, saturating into `0..=5`.
    #[must_use]
    pub fn saturating(value: i64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Self(value.clamp(0, 5) as u8)
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// A flashcard answer at or above 4 counts toward item mastery.
    #[must_use]
    pub fn is_passing(self) -> bool {
        self.0 >= 4
    }
}

impl TryFrom<u8> for Score {
    type Error = ScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

//
// ─── EVALUATION ───────────────────────────────────────────────────────────────
//

/// Evaluator verdict attached to an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub comprehension: Score,
    pub feedback: String,
    pub target_topic: Option<String>,
}

impl Evaluation {
    #[must_use]
    pub fn new(comprehension: Score, feedback: impl Into<String>) -> Self {
        Self {
            comprehension,
            feedback: feedback.into(),
            target_topic: None,
        }
    }

    #[must_use]
    pub fn for_topic(mut self, topic: impl Into<String>) -> Self {
        self.target_topic = Some(topic.into());
        self
    }
}

//
// ─── ATTEMPT ──────────────────────────────────────────────────────────────────
//

/// One answered question. Attempts are only ever appended, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    question: String,
    answer: String,
    evaluation: Evaluation,
    at: DateTime<Utc>,
}

impl Attempt {
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        evaluation: Evaluation,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            evaluation,
            at,
        }
    }

    #[must_use]
    pub fn question(&self) -> &str {
        &self.question
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    #[must_use]
    pub fn comprehension(&self) -> Score {
        self.evaluation.comprehension
    }

    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
