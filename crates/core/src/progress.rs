//! Read-only projections of session state for analytics and recommendation consumers.
//!
//! Nothing here mutates a session; every function borrows and builds plain
//! serializable snapshots.

use serde::Serialize;

use crate::mastery;
use crate::model::{ConceptProgress, ItemProgress, LearningSession, Phase, SessionKey, TopicBook};

/// Mastered topics and retired items of one concept, over the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptMastery {
    pub concept: String,
    pub mastered_topics: usize,
    pub total_topics: usize,
    pub retired_items: usize,
    pub total_items: usize,
    pub skipped: bool,
}

impl ConceptMastery {
    /// Percentage in `[0, 100]`. A concept with nothing to master counts as complete.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        let total = self.total_topics + self.total_items;
        if total == 0 {
            return 100.0;
        }
        let mastered = self.mastered_topics + self.retired_items;
        mastered as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrugglingItem {
    pub concept: String,
    pub item: String,
    pub success_count: u8,
    pub average_comprehension: Option<f64>,
    pub attempts: usize,
}

/// Scheduling fields of one item as the scheduler currently sees them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSchedule {
    pub item: String,
    pub ease: f64,
    pub interval: u32,
    pub next_due_position: u64,
    pub last_review_position: Option<u64>,
    pub success_count: u8,
    pub retired: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub mastered: usize,
    pub total: usize,
}

impl From<&TopicBook> for TopicSummary {
    fn from(book: &TopicBook) -> Self {
        Self {
            mastered: book.mastered_count(),
            total: book.len(),
        }
    }
}

/// Whole-session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub key: SessionKey,
    pub topic: String,
    pub phase: Phase,
    pub revision: u64,
    pub background: TopicSummary,
    pub concepts: Vec<ConceptMastery>,
    pub connections: TopicSummary,
    pub struggling: Vec<StrugglingItem>,
}

impl ProgressReport {
    /// Mean of the per-concept percentages; 0 before a course exists.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn overall_percent(&self) -> f64 {
        if self.concepts.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.concepts.iter().map(ConceptMastery::percent).sum();
        sum / self.concepts.len() as f64
    }
}

#[must_use]
pub fn concept_mastery(concept: &ConceptProgress) -> ConceptMastery {
    ConceptMastery {
        concept: concept.name().to_string(),
        mastered_topics: concept.topics().mastered_count(),
        total_topics: concept.topics().len(),
        retired_items: concept.items().iter().filter(|i| i.is_retired()).count(),
        total_items: concept.items().len(),
        skipped: concept.is_skipped(),
    }
}

/// Struggling items, worst first.
#[must_use]
pub fn struggling_items(concept: &ConceptProgress) -> Vec<StrugglingItem> {
    let mut items: Vec<&ItemProgress> = concept
        .items()
        .iter()
        .filter(|item| mastery::is_struggling(item))
        .collect();
    items.sort_by(|a, b| {
        a.success_count().cmp(&b.success_count()).then_with(|| {
            let avg_a = a.average_comprehension().unwrap_or(0.0);
            let avg_b = b.average_comprehension().unwrap_or(0.0);
            avg_a.total_cmp(&avg_b)
        })
    });
    items
        .into_iter()
        .map(|item| StrugglingItem {
            concept: concept.name().to_string(),
            item: item.name().to_string(),
            success_count: item.success_count(),
            average_comprehension: item.average_comprehension(),
            attempts: item.attempts().len(),
        })
        .collect()
}

#[must_use]
pub fn unmastered_topics(concept: &ConceptProgress) -> Vec<String> {
    concept
        .topics()
        .unmastered()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[must_use]
pub fn schedule_snapshot(concept: &ConceptProgress) -> Vec<ItemSchedule> {
    concept
        .items()
        .iter()
        .map(|item| ItemSchedule {
            item: item.name().to_string(),
            ease: item.ease(),
            interval: item.interval(),
            next_due_position: item.next_due_position(),
            last_review_position: item.last_review_position(),
            success_count: item.success_count(),
            retired: item.is_retired(),
        })
        .collect()
}

#[must_use]
pub fn session_report(session: &LearningSession) -> ProgressReport {
    ProgressReport {
        key: session.key(),
        topic: session.topic().to_string(),
        phase: session.phase(),
        revision: session.revision(),
        background: TopicSummary::from(session.background()),
        concepts: session.concepts().iter().map(concept_mastery).collect(),
        connections: TopicSummary::from(session.connections()),
        struggling: session
            .concepts()
            .iter()
            .flat_map(struggling_items)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attempt, ConceptOutline, Evaluation, Score};
    use crate::scheduler::SchedulingEngine;
    use crate::time::fixed_now;

    fn concept() -> ConceptProgress {
        let outline = ConceptOutline::new("Elements", vec!["Periodic table".into(), "Groups".into()])
            .with_memorization(vec!["symbol".into()], vec!["Hydrogen".into(), "Helium".into()]);
        ConceptProgress::from_outline(&outline)
    }

    fn review(concept: &mut ConceptProgress, item: &str, v: u8) {
        let engine = SchedulingEngine::new();
        let score = Score::new(v).unwrap();
        let plan = engine.plan_review(concept, item, score).unwrap();
        let attempt = Attempt::new("card", "answer", Evaluation::new(score, ""), fixed_now());
        engine.apply_review(concept, &plan, attempt).unwrap();
    }

    #[test]
    fn mastery_counts_topics_and_items() {
        let mut c = concept();
        c.topics_mut()
            .record("Groups", "q", "a", Score::MAX, "", fixed_now());
        review(&mut c, "Hydrogen", 5);
        review(&mut c, "Hydrogen", 4);

        let m = concept_mastery(&c);
        assert_eq!(m.mastered_topics, 1);
        assert_eq!(m.retired_items, 1);
        assert!((m.percent() - 50.0).abs() < 1e-9);
        assert_eq!(unmastered_topics(&c), vec!["Periodic table".to_string()]);
    }

    #[test]
    fn empty_concept_is_complete() {
        let c = ConceptProgress::from_outline(&ConceptOutline::new("Empty", Vec::new()));
        assert!((concept_mastery(&c).percent() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn struggling_list_is_worst_first() {
        let mut c = concept();
        review(&mut c, "Hydrogen", 2);
        review(&mut c, "Helium", 1);
        let list = struggling_items(&c);
        let names: Vec<_> = list.iter().map(|s| s.item.as_str()).collect();
        assert_eq!(names, vec!["Helium", "Hydrogen"]);
        assert_eq!(list[0].attempts, 1);
    }

    #[test]
    fn snapshot_reflects_scheduler_state() {
        let mut c = concept();
        review(&mut c, "Helium", 5);
        let snap = schedule_snapshot(&c);
        let helium = snap.iter().find(|s| s.item == "Helium").unwrap();
        assert_eq!(helium.interval, 15);
        assert_eq!(helium.next_due_position, 16);
        assert_eq!(helium.last_review_position, Some(1));
        assert!(!helium.retired);
    }
}
