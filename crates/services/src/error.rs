//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use tutor_core::model::{CourseError, ScoreError, SessionModelError};
use tutor_core::scheduler::SchedulerError;

use crate::learner::LearnerError;

/// Errors emitted by question generators and course providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GenerationError {
    #[error("generation is not configured")]
    Disabled,
    #[error("generation timed out")]
    Timeout,
    #[error("generation returned an empty response")]
    EmptyResponse,
    #[error("generation returned a malformed reply: {0}")]
    Malformed(String),
    #[error("generation request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while driving or querying a learning session.
///
/// Every variant aborts the current turn only; the session keeps its last
/// committed state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("session not found")]
    NotFound,
    #[error("session was changed concurrently or already exists")]
    Conflict,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("turn could not be committed: {0}")]
    Persistence(#[source] StorageError),
    #[error(transparent)]
    Learner(#[from] LearnerError),
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            StorageError::Conflict => Self::Conflict,
            other => Self::Persistence(other),
        }
    }
}

impl From<tutor_core::Error> for SessionError {
    fn from(err: tutor_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<SessionModelError> for SessionError {
    fn from(err: SessionModelError) -> Self {
        tutor_core::Error::from(err).into()
    }
}

impl From<SchedulerError> for SessionError {
    fn from(err: SchedulerError) -> Self {
        tutor_core::Error::from(err).into()
    }
}

impl From<CourseError> for SessionError {
    fn from(err: CourseError) -> Self {
        tutor_core::Error::from(err).into()
    }
}

impl From<ScoreError> for SessionError {
    fn from(err: ScoreError) -> Self {
        tutor_core::Error::from(err).into()
    }
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },
    #[error("invalid base url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors emitted while bootstrapping services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
