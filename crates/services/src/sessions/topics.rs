use chrono::{DateTime, Utc};
use tutor_core::model::{LearningSession, Role, SKIP_COMMAND, TopicBook, TopicProgress};

use super::machine::{PhaseStateMachine, concept_at};
use crate::error::SessionError;
use crate::generation::{EvaluationReply, EvaluationRequest, QuestionPurpose, QuestionRequest};
use crate::learner::{Learner, LearnerInput};

/// Which topic book a dialogue turn scores against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TopicScope {
    Background,
    Concept(usize),
    Connections,
}

impl TopicScope {
    fn book(self, session: &LearningSession) -> Result<&TopicBook, SessionError> {
        Ok(match self {
            Self::Background => session.background(),
            Self::Concept(index) => concept_at(session, index)?.topics(),
            Self::Connections => session.connections(),
        })
    }

    fn book_mut(self, session: &mut LearningSession) -> Result<&mut TopicBook, SessionError> {
        Ok(match self {
            Self::Background => session.background_mut(),
            Self::Concept(index) => session.concept_mut(index)?.topics_mut(),
            Self::Connections => session.connections_mut(),
        })
    }
}

/// What a committed topic turn produced.
#[derive(Debug, Clone)]
pub(super) struct TurnOutcome {
    pub question: String,
    /// `None` when the learner skipped.
    pub answer: Option<String>,
    pub follow_up: bool,
}

impl<L: Learner> PhaseStateMachine<L> {
    /// Question loop shared by Overview and ConceptLearning.
    ///
    /// Stops once every topic in scope is mastered, after the question cap, or
    /// when the learner declines at a confirmation point. The count of asked
    /// questions lives on the session, so a loop resumed after a failed turn
    /// keeps its cap, and a closed loop is never reopened.
    pub(super) async fn topic_loop(&mut self, scope: TopicScope) -> Result<(), SessionError> {
        if self.session.loop_progress().finished {
            return Ok(());
        }
        let limits = self.collab.config.limits;
        let purpose = match scope {
            TopicScope::Concept(index) => QuestionPurpose::Concept {
                concept: concept_at(&self.session, index)?.name().to_string(),
            },
            TopicScope::Background | TopicScope::Connections => QuestionPurpose::Background,
        };

        loop {
            let asked = self.asked_in_loop();
            if asked >= limits.max_topic_questions {
                break;
            }
            if scope.book(&self.session)?.all_mastered() {
                break;
            }
            if limits.confirm_due(asked)
                && !self.learner.confirm_continue(self.session.phase()).await?
            {
                tracing::debug!(key = %self.session.key(), asked, "learner stopped topic loop");
                break;
            }
            self.topic_turn(scope, purpose.clone()).await?;
        }
        self.close_loop().await
    }

    /// One question, one answer, one commit.
    ///
    /// Every question except a follow-up counts against the loop's budget.
    pub(super) async fn topic_turn(
        &mut self,
        scope: TopicScope,
        purpose: QuestionPurpose,
    ) -> Result<TurnOutcome, SessionError> {
        let counted = !matches!(purpose, QuestionPurpose::FollowUp { .. });
        let book = scope.book(&self.session)?;
        let mut focus_topics: Vec<String> =
            book.unmastered().into_iter().map(str::to_string).collect();
        if focus_topics.is_empty() {
            focus_topics = book.iter().map(|t| t.name().to_string()).collect();
        }
        let all_topics: Vec<String> = book.iter().map(|t| t.name().to_string()).collect();

        let request = QuestionRequest {
            subject: self.session.topic().to_string(),
            level: self.session.level(),
            purpose,
            focus_topics,
        };
        let question = self
            .timed(self.collab.generator.generate_question(&request))
            .await?;
        let input = self.learner.answer(&question).await?;

        let now = self.collab.clock.now();
        let mut draft = self.session.clone();
        if counted {
            draft.count_loop_question();
        }
        draft.append_log(Role::Tutor, question.as_str(), now);

        let (outcome, feedback) = match input {
            LearnerInput::Skip => {
                draft.append_log(Role::Learner, SKIP_COMMAND, now);
                let feedback = match scope.book_mut(&mut draft)?.apply_skip(&question, now) {
                    Some(topic) => format!("Skipped: {topic}"),
                    None => String::from("Nothing left to skip."),
                };
                let outcome = TurnOutcome {
                    question,
                    answer: None,
                    follow_up: false,
                };
                (outcome, feedback)
            }
            LearnerInput::Answer(answer) => {
                let evaluation = EvaluationRequest {
                    subject: request.subject,
                    level: request.level,
                    question: question.clone(),
                    answer: answer.clone(),
                    topics: all_topics,
                };
                let reply = self
                    .timed(self.collab.generator.evaluate(&evaluation))
                    .await?;
                draft.append_log(Role::Learner, answer.as_str(), now);
                record_reply(scope.book_mut(&mut draft)?, &question, &answer, &reply, now);
                draft.append_log(Role::Tutor, reply.feedback.as_str(), now);
                let outcome = TurnOutcome {
                    question,
                    answer: Some(answer),
                    follow_up: reply.follow_up,
                };
                (outcome, reply.feedback)
            }
        };

        self.commit(draft).await?;
        self.learner.notify(&feedback).await;
        Ok(outcome)
    }
}

/// Write an evaluation into the book.
///
/// Per-topic scores go to the topics they name; unknown names are ignored.
/// With no usable per-topic score the overall comprehension lands on the first
/// unmastered topic, or the first topic once all are mastered.
fn record_reply(
    book: &mut TopicBook,
    question: &str,
    answer: &str,
    reply: &EvaluationReply,
    at: DateTime<Utc>,
) {
    let mut recorded = 0;
    for score in &reply.topics {
        if book.record(
            &score.topic,
            question,
            answer,
            score.comprehension,
            &reply.feedback,
            at,
        ) {
            recorded += 1;
        } else {
            tracing::debug!(topic = %score.topic, "evaluation named an unknown topic");
        }
    }
    if recorded > 0 {
        return;
    }

    let target = book
        .first_unmastered()
        .or_else(|| book.iter().next().map(TopicProgress::name))
        .map(str::to_string);
    if let Some(topic) = target {
        book.record(
            &topic,
            question,
            answer,
            reply.comprehension,
            &reply.feedback,
            at,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::model::Score;
    use tutor_core::time::fixed_now;

    fn score(value: u8) -> Score {
        Score::new(value).unwrap()
    }

    #[test]
    fn per_topic_scores_overwrite_named_topics_only() {
        let mut book = TopicBook::new(["Atoms", "Bonds", "Ions"]);
        let reply = EvaluationReply::new(score(2), "ok")
            .with_topic("Bonds", score(5))
            .with_topic("Ions", score(4))
            .with_topic("Quarks", score(5));

        record_reply(&mut book, "q", "a", &reply, fixed_now());

        assert_eq!(book.unmastered(), vec!["Atoms", "Ions"]);
        assert_eq!(book.get("Ions").unwrap().comprehension(), score(4));
        assert!(book.get("Atoms").unwrap().attempts().is_empty());
    }

    #[test]
    fn overall_score_falls_back_to_first_unmastered_topic() {
        let mut book = TopicBook::new(["Atoms", "Bonds"]);
        book.record("Atoms", "q0", "a0", score(5), "", fixed_now());

        let reply = EvaluationReply::new(score(3), "partial").with_topic("Quarks", score(5));
        record_reply(&mut book, "q", "a", &reply, fixed_now());

        let bonds = book.get("Bonds").unwrap();
        assert_eq!(bonds.comprehension(), score(3));
        assert_eq!(bonds.attempts().len(), 1);
    }

    #[test]
    fn later_evaluation_replaces_comprehension() {
        let mut book = TopicBook::new(["Atoms"]);
        record_reply(
            &mut book,
            "q1",
            "a1",
            &EvaluationReply::new(score(5), ""),
            fixed_now(),
        );
        record_reply(
            &mut book,
            "q2",
            "a2",
            &EvaluationReply::new(score(1), "").with_topic("Atoms", score(1)),
            fixed_now(),
        );
        assert_eq!(book.get("Atoms").unwrap().comprehension(), score(1));
        assert!(!book.all_mastered());
    }
}
