use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mastery;
use crate::model::course::ConceptOutline;
use crate::model::review::{Attempt, Evaluation, Score};

/// Answer text recorded for a `/skip` command.
pub const SKIP_COMMAND: &str = "/skip";

//
// ─── TOPICS ────────────────────────────────────────────────────────────────────
//

/// Comprehension state for a single topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProgress {
    name: String,
    comprehension: Score,
    attempts: Vec<Attempt>,
}

impl TopicProgress {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comprehension: Score::ZERO,
            attempts: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn comprehension(&self) -> Score {
        self.comprehension
    }

    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    #[must_use]
    pub fn is_mastered(&self) -> bool {
        mastery::topic_mastered(self.comprehension)
    }

    /// Append an attempt; the latest evaluation replaces the comprehension level.
    pub fn record(&mut self, attempt: Attempt) {
        self.comprehension = attempt.comprehension();
        self.attempts.push(attempt);
    }
}

/// Ordered set of topics. Order follows the course and decides which topic
/// is "first unmastered".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBook {
    topics: Vec<TopicProgress>,
}

impl TopicBook {
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: names.into_iter().map(TopicProgress::new).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TopicProgress> {
        self.topics.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TopicProgress> {
        self.topics.iter().find(|t| t.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut TopicProgress> {
        self.topics.iter_mut().find(|t| t.name == name)
    }

    /// Names of topics still below mastery, in course order.
    #[must_use]
    pub fn unmastered(&self) -> Vec<&str> {
        self.topics
            .iter()
            .filter(|t| !t.is_mastered())
            .map(TopicProgress::name)
            .collect()
    }

    #[must_use]
    pub fn first_unmastered(&self) -> Option<&str> {
        self.topics
            .iter()
            .find(|t| !t.is_mastered())
            .map(TopicProgress::name)
    }

    #[must_use]
    pub fn all_mastered(&self) -> bool {
        self.topics.iter().all(TopicProgress::is_mastered)
    }

    #[must_use]
    pub fn mastered_count(&self) -> usize {
        self.topics.iter().filter(|t| t.is_mastered()).count()
    }

    /// Record an evaluated answer against one topic.
    ///
    /// Returns `false` (and records nothing) if the topic is not part of this book.
    pub fn record(
        &mut self,
        topic: &str,
        question: &str,
        answer: &str,
        comprehension: Score,
        feedback: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(progress) = self.get_mut(topic) else {
            return false;
        };
        let evaluation = Evaluation::new(comprehension, feedback).for_topic(topic);
        progress.record(Attempt::new(question, answer, evaluation, at));
        true
    }

    /// Apply the `/skip` command: only the first unmastered topic is marked as mastered.
    ///
    /// Returns the skipped topic, or `None` if everything is already mastered.
    pub fn apply_skip(&mut self, question: &str, at: DateTime<Utc>) -> Option<String> {
        let progress = self.topics.iter_mut().find(|t| !t.is_mastered())?;
        let evaluation = Evaluation::new(Score::MAX, "Skipped by learner").for_topic(&progress.name);
        progress.record(Attempt::new(question, SKIP_COMMAND, evaluation, at));
        Some(progress.name.clone())
    }
}

//
// ─── ITEMS ─────────────────────────────────────────────────────────────────────
//

/// Memorization state for one flashcard item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    name: String,
    attempts: Vec<Attempt>,
    success_count: u8,
    ease: f64,
    interval: u32,
    last_review_position: Option<u64>,
    next_due_position: u64,
}

impl ItemProgress {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attempts: Vec::new(),
            success_count: 0,
            ease: crate::scheduler::DEFAULT_EASE,
            interval: 0,
            last_review_position: None,
            next_due_position: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    #[must_use]
    pub fn success_count(&self) -> u8 {
        self.success_count
    }

    #[must_use]
    pub fn ease(&self) -> f64 {
        self.ease
    }

    #[must_use]
    pub fn interval(&self) -> u32 {
        self.interval
    }

    #[must_use]
    pub fn last_review_position(&self) -> Option<u64> {
        self.last_review_position
    }

    #[must_use]
    pub fn next_due_position(&self) -> u64 {
        self.next_due_position
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        mastery::item_retired(self.success_count)
    }

    #[must_use]
    pub fn average_comprehension(&self) -> Option<f64> {
        mastery::average_comprehension(&self.attempts)
    }

    pub(crate) fn apply_schedule(
        &mut self,
        attempt: Attempt,
        position: u64,
        ease: f64,
        interval: u32,
        due: u64,
        success_count: u8,
    ) {
        self.attempts.push(attempt);
        self.ease = ease;
        self.interval = interval;
        self.last_review_position = Some(position);
        self.next_due_position = due;
        self.success_count = success_count;
    }
}

//
// ─── SPECIAL QUESTIONS ─────────────────────────────────────────────────────────
//

/// Supplementary prompt injected between flashcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialQuestionKind {
    Elaboration,
    Connection,
    HighLevelRecall,
}

impl SpecialQuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elaboration => "elaboration",
            Self::Connection => "connection",
            Self::HighLevelRecall => "high_level_recall",
        }
    }
}

/// A special question that was asked. Never touches scheduling fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialQuestionRecord {
    pub kind: SpecialQuestionKind,
    pub item: String,
    pub paired_item: Option<String>,
    pub attempt: Attempt,
    pub position: u64,
}

//
// ─── CONCEPT ───────────────────────────────────────────────────────────────────
//

/// Everything tracked for one concept. The position counter is the logical
/// clock of the flashcard scheduler and belongs to this concept alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptProgress {
    name: String,
    topics: TopicBook,
    items: Vec<ItemProgress>,
    memorize_fields: Vec<String>,
    special_questions: Vec<SpecialQuestionRecord>,
    position: u64,
    skipped: bool,
}

impl ConceptProgress {
    #[must_use]
    pub fn from_outline(outline: &ConceptOutline) -> Self {
        Self {
            name: outline.name.clone(),
            topics: TopicBook::new(outline.topics.iter().cloned()),
            items: outline
                .memorize_items
                .iter()
                .map(ItemProgress::new)
                .collect(),
            memorize_fields: outline.memorize_fields.clone(),
            special_questions: Vec::new(),
            position: 0,
            skipped: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn topics(&self) -> &TopicBook {
        &self.topics
    }

    pub fn topics_mut(&mut self) -> &mut TopicBook {
        &mut self.topics
    }

    #[must_use]
    pub fn items(&self) -> &[ItemProgress] {
        &self.items
    }

    #[must_use]
    pub fn item(&self, name: &str) -> Option<&ItemProgress> {
        self.items.iter().find(|i| i.name == name)
    }

    pub(crate) fn item_mut(&mut self, name: &str) -> Option<&mut ItemProgress> {
        self.items.iter_mut().find(|i| i.name == name)
    }

    #[must_use]
    pub fn memorize_fields(&self) -> &[String] {
        &self.memorize_fields
    }

    #[must_use]
    pub fn special_questions(&self) -> &[SpecialQuestionRecord] {
        &self.special_questions
    }

    /// Current value of the global position counter.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Learner chose not to study this concept; its topics stay unmastered.
    pub fn mark_skipped(&mut self) {
        self.skipped = true;
    }

    #[must_use]
    pub fn memorization_complete(&self) -> bool {
        self.items.iter().all(ItemProgress::is_retired)
    }

    pub fn record_special(&mut self, record: SpecialQuestionRecord) {
        self.special_questions.push(record);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
