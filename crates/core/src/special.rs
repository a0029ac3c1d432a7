//! Supplementary questions injected between flashcards.
//!
//! After every flashcard evaluation one uniform draw `r ∈ [0, 1)` picks at most
//! one extra prompt. The random source is always passed in so callers (and
//! tests) control reproducibility.

use rand::Rng;

use crate::mastery;
use crate::model::{
    Attempt, ConceptProgress, ItemProgress, Score, SpecialQuestionKind, SpecialQuestionRecord,
};

const LOW_ELABORATION: f64 = 0.4;
const LOW_RECALL: f64 = 0.6;
const HIGH_CONNECTION: f64 = 0.3;
const HIGH_RECALL: f64 = 0.5;
const MID_RECALL: f64 = 0.2;

/// A special question to ask, not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialQuestion {
    pub kind: SpecialQuestionKind,
    /// The flashcard item that was just answered.
    pub item: String,
    /// Struggling item linked to `item` for connection questions.
    pub paired_item: Option<String>,
}

impl SpecialQuestion {
    #[must_use]
    pub fn into_record(self, attempt: Attempt, position: u64) -> SpecialQuestionRecord {
        SpecialQuestionRecord {
            kind: self.kind,
            item: self.item,
            paired_item: self.paired_item,
            attempt,
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialDecision {
    None,
    Ask(SpecialQuestion),
    /// The draw chose a connection question but there is no struggling item to
    /// pair with. Nothing is asked and nothing is recorded.
    ConnectionUnavailable,
}

impl SpecialDecision {
    #[must_use]
    pub fn question(&self) -> Option<&SpecialQuestion> {
        match self {
            Self::Ask(q) => Some(q),
            Self::None | Self::ConnectionUnavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialQuestionPolicy;

impl SpecialQuestionPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Draw from `rng` and decide what, if anything, follows the flashcard for `answered`.
    pub fn decide<R: Rng + ?Sized>(
        &self,
        concept: &ConceptProgress,
        answered: &str,
        comprehension: Score,
        rng: &mut R,
    ) -> SpecialDecision {
        let r: f64 = rng.random();
        self.decide_with_draw(concept, answered, comprehension, r)
    }

    /// Deterministic core of [`decide`](Self::decide) for a known draw.
    #[must_use]
    pub fn decide_with_draw(
        &self,
        concept: &ConceptProgress,
        answered: &str,
        comprehension: Score,
        r: f64,
    ) -> SpecialDecision {
        let ask = |kind, paired_item| {
            SpecialDecision::Ask(SpecialQuestion {
                kind,
                item: answered.to_string(),
                paired_item,
            })
        };

        let decision = match comprehension.value() {
            0..=2 if r < LOW_ELABORATION => ask(SpecialQuestionKind::Elaboration, None),
            0..=2 if r < LOW_RECALL => ask(SpecialQuestionKind::HighLevelRecall, None),
            5 if r < HIGH_CONNECTION => match most_struggling(concept, answered) {
                Some(target) => ask(
                    SpecialQuestionKind::Connection,
                    Some(target.name().to_string()),
                ),
                None => SpecialDecision::ConnectionUnavailable,
            },
            5 if r < HIGH_RECALL => ask(SpecialQuestionKind::HighLevelRecall, None),
            3 | 4 if r < MID_RECALL => ask(SpecialQuestionKind::HighLevelRecall, None),
            _ => SpecialDecision::None,
        };

        if decision == SpecialDecision::ConnectionUnavailable {
            tracing::debug!(
                concept = concept.name(),
                item = answered,
                "connection question selected without a struggling item; skipping"
            );
        }
        decision
    }
}

/// The item struggling the most, other than `exclude`.
///
/// Ordered by success count, then average comprehension, then course order.
#[must_use]
pub fn most_struggling<'a>(
    concept: &'a ConceptProgress,
    exclude: &str,
) -> Option<&'a ItemProgress> {
    concept
        .items()
        .iter()
        .filter(|item| item.name() != exclude && mastery::is_struggling(item))
        .min_by(|a, b| {
            a.success_count().cmp(&b.success_count()).then_with(|| {
                let avg_a = a.average_comprehension().unwrap_or(0.0);
                let avg_b = b.average_comprehension().unwrap_or(0.0);
                avg_a.total_cmp(&avg_b)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConceptOutline, Evaluation};
    use crate::scheduler::SchedulingEngine;
    use crate::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn score(v: u8) -> Score {
        Score::new(v).unwrap()
    }

    fn concept() -> ConceptProgress {
        let outline = ConceptOutline::new("Elements", vec!["Periodic table".into()])
            .with_memorization(
                vec!["symbol".into()],
                vec!["Hydrogen".into(), "Helium".into(), "Lithium".into()],
            );
        ConceptProgress::from_outline(&outline)
    }

    fn review(concept: &mut ConceptProgress, item: &str, v: u8) {
        let engine = SchedulingEngine::new();
        let plan = engine.plan_review(concept, item, score(v)).unwrap();
        let attempt = Attempt::new("card", "answer", Evaluation::new(score(v), ""), fixed_now());
        engine.apply_review(concept, &plan, attempt).unwrap();
    }

    fn kind(decision: &SpecialDecision) -> Option<SpecialQuestionKind> {
        decision.question().map(|q| q.kind)
    }

    #[test]
    fn full_score_with_struggling_item() {
        let policy = SpecialQuestionPolicy::new();
        let mut c = concept();
        review(&mut c, "Helium", 1);
        review(&mut c, "Hydrogen", 5);

        let decision = policy.decide_with_draw(&c, "Hydrogen", score(5), 0.25);
        let question = decision.question().unwrap();
        assert_eq!(question.kind, SpecialQuestionKind::Connection);
        assert_eq!(question.item, "Hydrogen");
        assert_eq!(question.paired_item.as_deref(), Some("Helium"));

        assert_eq!(
            kind(&policy.decide_with_draw(&c, "Hydrogen", score(5), 0.45)),
            Some(SpecialQuestionKind::HighLevelRecall)
        );
        assert_eq!(
            policy.decide_with_draw(&c, "Hydrogen", score(5), 0.9),
            SpecialDecision::None
        );
    }

    #[test]
    fn full_score_without_struggling_item() {
        let policy = SpecialQuestionPolicy::new();
        let mut c = concept();
        review(&mut c, "Hydrogen", 5);

        assert_eq!(
            policy.decide_with_draw(&c, "Hydrogen", score(5), 0.25),
            SpecialDecision::ConnectionUnavailable
        );
        assert_eq!(
            kind(&policy.decide_with_draw(&c, "Hydrogen", score(5), 0.45)),
            Some(SpecialQuestionKind::HighLevelRecall)
        );
        assert_eq!(
            policy.decide_with_draw(&c, "Hydrogen", score(5), 0.9),
            SpecialDecision::None
        );
    }

    #[test]
    fn answered_item_is_never_its_own_pair() {
        let policy = SpecialQuestionPolicy::new();
        let mut c = concept();
        review(&mut c, "Lithium", 0);
        review(&mut c, "Lithium", 0);
        review(&mut c, "Lithium", 5);
        assert_eq!(
            policy.decide_with_draw(&c, "Lithium", score(5), 0.1),
            SpecialDecision::ConnectionUnavailable
        );
    }

    #[test]
    fn low_scores() {
        let policy = SpecialQuestionPolicy::new();
        let c = concept();
        for v in 0..=2 {
            assert_eq!(
                kind(&policy.decide_with_draw(&c, "Helium", score(v), 0.0)),
                Some(SpecialQuestionKind::Elaboration)
            );
            assert_eq!(
                kind(&policy.decide_with_draw(&c, "Helium", score(v), 0.5)),
                Some(SpecialQuestionKind::HighLevelRecall)
            );
            assert_eq!(
                policy.decide_with_draw(&c, "Helium", score(v), 0.6),
                SpecialDecision::None
            );
        }
    }

    #[test]
    fn middle_scores() {
        let policy = SpecialQuestionPolicy::new();
        let c = concept();
        for v in 3..=4 {
            assert_eq!(
                kind(&policy.decide_with_draw(&c, "Helium", score(v), 0.19)),
                Some(SpecialQuestionKind::HighLevelRecall)
            );
            assert_eq!(
                policy.decide_with_draw(&c, "Helium", score(v), 0.2),
                SpecialDecision::None
            );
        }
    }

    #[test]
    fn most_struggling_orders_by_streak_then_average() {
        let mut c = concept();
        review(&mut c, "Hydrogen", 2);
        review(&mut c, "Helium", 0);
        review(&mut c, "Lithium", 4);
        assert_eq!(most_struggling(&c, "Lithium").unwrap().name(), "Helium");
        assert_eq!(most_struggling(&c, "Helium").unwrap().name(), "Hydrogen");
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let policy = SpecialQuestionPolicy::new();
        let c = concept();
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|i| policy.decide(&c, "Helium", score(i % 6), &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
