use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mastery;
use crate::model::{Attempt, ConceptProgress, Score};

pub const DEFAULT_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 4.0;

// Absorbs float noise from repeated multiplications before rounding to whole cards.
const CARD_EPSILON: f64 = 1e-9;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("item already mastered: {0}")]
    ItemRetired(String),
    #[error("review plan computed at position {planned} but concept is at {current}")]
    StalePlan { planned: u64, current: u64 },
}

//
// ─── SCHEDULE ENTRY ────────────────────────────────────────────────────────────
//

/// Working copy of one item's scheduling fields for the current round.
///
/// Entries are rebuilt from persisted `ItemProgress` when a round starts or
/// resumes, so they never need to be stored themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardScheduleEntry {
    pub item: String,
    pub ease: f64,
    pub interval: u32,
    pub due: u64,
    pub success_count: u8,
}

impl FlashcardScheduleEntry {
    #[must_use]
    pub fn is_active(&self) -> bool {
        mastery::item_eligible(self.success_count)
    }
}

//
// ─── REVIEW PLAN ───────────────────────────────────────────────────────────────
//

/// Fully computed outcome of presenting one card.
///
/// A plan is computed from a concept snapshot and applied exactly once: it
/// carries the counter value it was computed from, and applying it to a concept
/// whose counter has already moved fails with `SchedulerError::StalePlan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub item: String,
    pub score: Score,
    pub planned_at: u64,
    pub position: u64,
    pub ease: f64,
    pub interval: u32,
    pub due: u64,
    pub success_count: u8,
}

impl ReviewPlan {
    /// The item reached the mastery streak and leaves the queue.
    #[must_use]
    pub fn retires_item(&self) -> bool {
        mastery::item_retired(self.success_count)
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Position-based spaced-repetition scheduler.
///
/// Time is measured in cards: each concept owns a counter that advances by one
/// per presented flashcard, and an item's interval says how many cards must be
/// shown before it becomes due again.
///
/// # Examples
///
/// ```
/// # use tutor_core::scheduler::SchedulingEngine;
/// # use tutor_core::model::Score;
/// let ease = SchedulingEngine::update_ease(Score::MAX, 2.5);
/// assert!((ease - 2.875).abs() < 1e-9);
/// assert_eq!(SchedulingEngine::compute_interval(Score::MAX, ease), 15);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulingEngine;

impl SchedulingEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the round queue: every item that is not yet retired, seeded from
    /// its persisted scheduling fields.
    #[must_use]
    pub fn initialize(&self, concept: &ConceptProgress) -> Vec<FlashcardScheduleEntry> {
        concept
            .items()
            .iter()
            .filter(|item| !item.is_retired())
            .map(|item| FlashcardScheduleEntry {
                item: item.name().to_string(),
                ease: item.ease(),
                interval: item.interval(),
                due: item.next_due_position(),
                success_count: item.success_count(),
            })
            .collect()
    }

    /// Pick the next card.
    ///
    /// Overdue cards (due at or before `position`) win, earliest due first.
    /// When nothing is overdue the earliest upcoming card is returned so the
    /// round always makes progress. Ties go to queue order. `None` means every
    /// item is retired and the round is over.
    #[must_use]
    pub fn select_next<'a>(
        &self,
        queue: &'a [FlashcardScheduleEntry],
        position: u64,
    ) -> Option<&'a FlashcardScheduleEntry> {
        let active = || queue.iter().filter(|e| e.is_active());
        active()
            .filter(|e| e.due <= position)
            .min_by_key(|e| e.due)
            .or_else(|| active().min_by_key(|e| e.due))
    }

    /// New ease after an answer, clamped to `[MIN_EASE, MAX_EASE]`.
    #[must_use]
    pub fn update_ease(score: Score, ease: f64) -> f64 {
        let factor = match score.value() {
            0 | 1 => 0.8,
            2 | 3 => 0.85,
            4 => 1.0,
            _ => 1.15,
        };
        (ease * factor).clamp(MIN_EASE, MAX_EASE)
    }

    /// Interval in cards for the given score and the already-updated ease.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute_interval(score: Score, ease: f64) -> u32 {
        match score.value() {
            0 | 1 => 1,
            2 | 3 => ((ease * 0.8 + CARD_EPSILON).floor() as u32).max(2),
            4 => (ease * 3.0 - CARD_EPSILON).ceil() as u32,
            _ => (ease * 5.0 - CARD_EPSILON).ceil() as u32,
        }
    }

    /// Compute the full outcome of presenting `item` and scoring it `score`.
    ///
    /// Pure: the concept is not modified.
    ///
    /// # Errors
    ///
    /// Returns `UnknownItem` or `ItemRetired` when the item cannot be presented.
    pub fn plan_review(
        &self,
        concept: &ConceptProgress,
        item: &str,
        score: Score,
    ) -> Result<ReviewPlan, SchedulerError> {
        let progress = concept
            .item(item)
            .ok_or_else(|| SchedulerError::UnknownItem(item.to_string()))?;
        if progress.is_retired() {
            return Err(SchedulerError::ItemRetired(item.to_string()));
        }

        // The counter moves before the due position is computed.
        let position = concept.position() + 1;
        let ease = Self::update_ease(score, progress.ease());
        let interval = Self::compute_interval(score, ease);
        let success_count = mastery::next_success_count(progress.success_count(), score);

        Ok(ReviewPlan {
            item: item.to_string(),
            score,
            planned_at: concept.position(),
            position,
            ease,
            interval,
            due: position + u64::from(interval),
            success_count,
        })
    }

    /// Write a plan and its attempt into the concept.
    ///
    /// # Errors
    ///
    /// Returns `StalePlan` if the concept's counter no longer matches the plan,
    /// which is what makes a retried turn unable to double-count.
    pub fn apply_review(
        &self,
        concept: &mut ConceptProgress,
        plan: &ReviewPlan,
        attempt: Attempt,
    ) -> Result<(), SchedulerError> {
        if concept.position() != plan.planned_at {
            return Err(SchedulerError::StalePlan {
                planned: plan.planned_at,
                current: concept.position(),
            });
        }
        let item = concept
            .item_mut(&plan.item)
            .ok_or_else(|| SchedulerError::UnknownItem(plan.item.clone()))?;
        item.apply_schedule(
            attempt,
            plan.position,
            plan.ease,
            plan.interval,
            plan.due,
            plan.success_count,
        );
        concept.set_position(plan.position);
        tracing::debug!(
            concept = concept.name(),
            item = %plan.item,
            score = plan.score.value(),
            position = plan.position,
            ease = plan.ease,
            interval = plan.interval,
            due = plan.due,
            success = plan.success_count,
            "flashcard scheduled"
        );
        Ok(())
    }

    /// Mirror an applied plan into the round queue; retired items leave it.
    pub fn advance(&self, queue: &mut Vec<FlashcardScheduleEntry>, plan: &ReviewPlan) {
        if plan.retires_item() {
            queue.retain(|e| e.item != plan.item);
            return;
        }
        if let Some(entry) = queue.iter_mut().find(|e| e.item == plan.item) {
            entry.ease = plan.ease;
            entry.interval = plan.interval;
            entry.due = plan.due;
            entry.success_count = plan.success_count;
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
