use async_trait::async_trait;
use thiserror::Error;
use tutor_core::model::{Phase, SKIP_COMMAND};

/// What the learner typed in reply to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnerInput {
    Answer(String),
    /// The `/skip` command.
    Skip,
}

impl LearnerInput {
    /// Classify raw text, recognizing the `/skip` command.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case(SKIP_COMMAND) {
            Self::Skip
        } else {
            Self::Answer(trimmed.to_string())
        }
    }
}

/// Whether the learner wants to study the next concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConceptDecision {
    Learn,
    Skip,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LearnerError {
    #[error("learner input closed")]
    Closed,
    #[error("learner io failed: {0}")]
    Io(String),
}

/// The person on the other side of the dialogue.
#[async_trait]
pub trait Learner: Send {
    /// Show a prompt and wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError` when no reply can be read.
    async fn answer(&mut self, prompt: &str) -> Result<LearnerInput, LearnerError>;

    /// Ask whether to keep going in the current phase.
    ///
    /// # Errors
    ///
    /// Returns `LearnerError` when no reply can be read.
    async fn confirm_continue(&mut self, phase: Phase) -> Result<bool, LearnerError>;

    /// # Errors
    ///
    /// Returns `LearnerError` when no reply can be read.
    async fn concept_decision(&mut self, concept: &str) -> Result<ConceptDecision, LearnerError>;

    /// Show feedback or status text; no reply expected.
    async fn notify(&mut self, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_skip_command() {
        assert_eq!(LearnerInput::parse("  /skip\n"), LearnerInput::Skip);
        assert_eq!(LearnerInput::parse("/SKIP"), LearnerInput::Skip);
        assert_eq!(
            LearnerInput::parse(" H2O "),
            LearnerInput::Answer("H2O".into())
        );
    }
}
