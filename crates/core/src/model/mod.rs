mod concept;
mod course;
mod ids;
mod phase;
mod review;
mod session;

pub use ids::{CourseId, ParseIdError, SessionKey, UserId};

pub use concept::{
    ConceptProgress, ItemProgress, SKIP_COMMAND, SpecialQuestionKind, SpecialQuestionRecord,
    TopicBook, TopicProgress,
};
pub use course::{
    ConceptOutline, CourseConstraints, CourseError, CourseStructure, UnderstandingLevel,
};
pub use phase::{ConceptStage, Phase, PhaseError};
pub use review::{Attempt, Evaluation, Score, ScoreError};
pub use session::{
    ConversationEntry, LearningSession, LoopProgress, PersistedSession, Role, SessionModelError,
};
