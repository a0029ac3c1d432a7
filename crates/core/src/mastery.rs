//! Pure mastery predicates shared by the scheduler, the policy, and progress queries.

use crate::model::{Attempt, ItemProgress, Score};

/// Consecutive passing flashcard answers needed to retire an item.
pub const ITEM_MASTERY_SUCCESSES: u8 = 2;

/// Topic comprehension at which a topic counts as mastered.
pub const TOPIC_MASTERY_SCORE: Score = Score::MAX;

/// Rolling average below which an item counts as struggling.
pub const STRUGGLING_AVERAGE: f64 = 3.0;

#[must_use]
pub fn topic_mastered(comprehension: Score) -> bool {
    comprehension >= TOPIC_MASTERY_SCORE
}

#[must_use]
pub fn item_retired(success_count: u8) -> bool {
    success_count >= ITEM_MASTERY_SUCCESSES
}

/// An item may be shown iff it is not yet retired.
#[must_use]
pub fn item_eligible(success_count: u8) -> bool {
    !item_retired(success_count)
}

/// Success count after an evaluation: passing answers add one, anything else resets.
#[must_use]
pub fn next_success_count(current: u8, score: Score) -> u8 {
    if score.is_passing() {
        current.saturating_add(1).min(ITEM_MASTERY_SUCCESSES)
    } else {
        0
    }
}

#[must_use]
pub fn average_comprehension(attempts: &[Attempt]) -> Option<f64> {
    if attempts.is_empty() {
        return None;
    }
    let total: u32 = attempts
        .iter()
        .map(|a| u32::from(a.comprehension().value()))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let len = attempts.len() as f64;
    Some(f64::from(total) / len)
}

/// Active item that has been failing: reviewed with no current streak, or a low average.
#[must_use]
pub fn is_struggling(item: &ItemProgress) -> bool {
    if item.is_retired() || item.attempts().is_empty() {
        return false;
    }
    item.success_count() == 0
        || item
            .average_comprehension()
            .is_some_and(|avg| avg < STRUGGLING_AVERAGE)
}
