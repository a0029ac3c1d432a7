use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhaseError {
    #[error("cannot move from {from} back to {to}")]
    Backwards { from: Phase, to: Phase },
    #[error("session is complete")]
    Complete,
}

/// Sub-state of a concept: topic learning, then the nested memorization round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStage {
    Learning,
    Memorizing,
}

/// Session phase. Phases are totally ordered and a session only ever moves forward:
///
/// `Initialization → Overview → Concept[0]{Learning → Memorizing} → … → DrawingConnections → Complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Overview,
    Concept { index: usize, stage: ConceptStage },
    DrawingConnections,
    Complete,
}

impl Phase {
    #[must_use]
    pub fn learning(index: usize) -> Self {
        Self::Concept {
            index,
            stage: ConceptStage::Learning,
        }
    }

    #[must_use]
    pub fn memorizing(index: usize) -> Self {
        Self::Concept {
            index,
            stage: ConceptStage::Memorizing,
        }
    }

    fn rank(self) -> (u8, usize, u8) {
        match self {
            Self::Initialization => (0, 0, 0),
            Self::Overview => (1, 0, 0),
            Self::Concept { index, stage } => {
                let sub = match stage {
                    ConceptStage::Learning => 0,
                    ConceptStage::Memorizing => 1,
                };
                (2, index, sub)
            }
            Self::DrawingConnections => (3, 0, 0),
            Self::Complete => (4, 0, 0),
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns `Ok` if `next` is strictly later than `self`.
    ///
    /// # Errors
    ///
    /// `PhaseError::Complete` when leaving the terminal phase, otherwise
    /// `PhaseError::Backwards` for any transition that does not move forward.
    pub fn check_advance(self, next: Phase) -> Result<(), PhaseError> {
        if self.is_terminal() {
            return Err(PhaseError::Complete);
        }
        if next <= self {
            return Err(PhaseError::Backwards {
                from: self,
                to: next,
            });
        }
        Ok(())
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization => f.write_str("initialization"),
            Self::Overview => f.write_str("overview"),
            Self::Concept {
                index,
                stage: ConceptStage::Learning,
            } => write!(f, "concept-learning[{index}]"),
            Self::Concept {
                index,
                stage: ConceptStage::Memorizing,
            } => write!(f, "memorization[{index}]"),
            Self::DrawingConnections => f.write_str("drawing-connections"),
            Self::Complete => f.write_str("complete"),
        }
    }
}
