use thiserror::Error;

use crate::model::{CourseError, PhaseError, ScoreError, SessionModelError};
use crate::scheduler::SchedulerError;

/// Any domain rule violation raised by this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Session(#[from] SessionModelError),
}
