#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod generation;
pub mod learner;
pub mod progress_service;
pub mod sessions;

pub use tutor_core::Clock;

pub use config::{GenerationConfig, LoopLimits, TutorConfig};
pub use error::{AppServicesError, ConfigError, GenerationError, SessionError};
pub use generation::{
    ChatGenerator, CourseProvider, EvaluationReply, EvaluationRequest, QuestionGenerator,
    QuestionPurpose, QuestionRequest, TopicScore,
};
pub use learner::{ConceptDecision, Learner, LearnerError, LearnerInput};
pub use progress_service::ProgressQueryService;
pub use sessions::{Collaborators, PhaseStateMachine, TutorService};
