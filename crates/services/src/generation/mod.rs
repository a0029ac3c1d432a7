//! Seams to the natural-language collaborators: question/feedback generation
//! and course authoring.

mod chat;

use async_trait::async_trait;
use tutor_core::model::{
    CourseConstraints, CourseStructure, Score, SpecialQuestionKind, UnderstandingLevel,
};

use crate::error::GenerationError;

pub use chat::ChatGenerator;

/// What a generated question is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionPurpose {
    /// Overview of the background topics.
    Background,
    /// Understanding questions for one concept.
    Concept { concept: String },
    /// Supplementary question after a flashcard.
    Special {
        kind: SpecialQuestionKind,
        concept: String,
        item: String,
        paired_item: Option<String>,
    },
    /// Cross-concept synthesis question.
    Connection,
    /// Single follow-up to the previous connection question.
    FollowUp { question: String, answer: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionRequest {
    pub subject: String,
    pub level: UnderstandingLevel,
    pub purpose: QuestionPurpose,
    /// Topics the question should address, most important first.
    pub focus_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub subject: String,
    pub level: UnderstandingLevel,
    pub question: String,
    pub answer: String,
    /// Topics the evaluator may score individually. Empty for flashcards.
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScore {
    pub topic: String,
    pub comprehension: Score,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationReply {
    /// Overall comprehension of the answer.
    pub comprehension: Score,
    pub feedback: String,
    /// Per-topic scores when one answer addressed several topics.
    pub topics: Vec<TopicScore>,
    /// The evaluator suggests a follow-up question.
    pub follow_up: bool,
}

impl EvaluationReply {
    #[must_use]
    pub fn new(comprehension: Score, feedback: impl Into<String>) -> Self {
        Self {
            comprehension,
            feedback: feedback.into(),
            topics: Vec::new(),
            follow_up: false,
        }
    }

    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>, comprehension: Score) -> Self {
        self.topics.push(TopicScore {
            topic: topic.into(),
            comprehension,
        });
        self
    }

    #[must_use]
    pub fn with_follow_up(mut self) -> Self {
        self.follow_up = true;
        self
    }
}

#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns `GenerationError` when no question could be produced.
    async fn generate_question(
        &self,
        request: &QuestionRequest,
    ) -> Result<String, GenerationError>;

    /// # Errors
    ///
    /// Returns `GenerationError` when the answer could not be scored.
    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationReply, GenerationError>;
}

#[async_trait]
pub trait CourseProvider: Send + Sync {
    /// Produce the course once, during initialization.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError` when no valid course could be produced.
    async fn generate_course(
        &self,
        topic: &str,
        constraints: &CourseConstraints,
    ) -> Result<CourseStructure, GenerationError>;
}
