use tutor_core::model::{Attempt, Evaluation, Role, SKIP_COMMAND, Score};
use tutor_core::scheduler::{FlashcardScheduleEntry, ReviewPlan};
use tutor_core::special::SpecialDecision;

use super::machine::{PhaseStateMachine, concept_at};
use crate::error::SessionError;
use crate::generation::{EvaluationReply, EvaluationRequest, QuestionPurpose, QuestionRequest};
use crate::learner::{Learner, LearnerInput};

impl<L: Learner> PhaseStateMachine<L> {
    /// Flashcard round for one concept, resumed from its persisted item state.
    pub(super) async fn run_memorization(&mut self, index: usize) -> Result<(), SessionError> {
        let mut queue = self.engine.initialize(concept_at(&self.session, index)?);
        tracing::debug!(
            key = %self.session.key(),
            concept = index,
            cards = queue.len(),
            "memorization round started"
        );

        loop {
            let position = concept_at(&self.session, index)?.position();
            let Some(entry) = self.engine.select_next(&queue, position) else {
                break;
            };
            let item = entry.item.clone();

            let plan = self.flashcard_turn(index, &item).await?;
            self.advance_queue(&mut queue, &plan);
            self.special_turn(index, &item, plan.score).await?;
        }

        self.enter_next_concept(index + 1).await
    }

    fn advance_queue(&self, queue: &mut Vec<FlashcardScheduleEntry>, plan: &ReviewPlan) {
        self.engine.advance(queue, plan);
        if plan.retires_item() {
            tracing::debug!(key = %self.session.key(), item = %plan.item, "item retired");
        }
    }

    /// Present one card, score it, and commit the scheduling update.
    async fn flashcard_turn(
        &mut self,
        index: usize,
        item: &str,
    ) -> Result<ReviewPlan, SessionError> {
        let concept = concept_at(&self.session, index)?;
        let prompt = if concept.memorize_fields().is_empty() {
            format!("{}: {item}", concept.name())
        } else {
            format!(
                "{}: {item}\nRecall its {}.",
                concept.name(),
                concept.memorize_fields().join(", ")
            )
        };

        let input = self.learner.answer(&prompt).await?;
        let (answer, reply) = self.score_answer(&prompt, input).await?;
        let plan = self.engine.plan_review(
            concept_at(&self.session, index)?,
            item,
            reply.comprehension,
        )?;

        let now = self.collab.clock.now();
        let mut draft = self.session.clone();
        draft.append_log(Role::Tutor, prompt.as_str(), now);
        draft.append_log(Role::Learner, answer.as_str(), now);
        draft.append_log(Role::Tutor, reply.feedback.as_str(), now);
        let attempt = Attempt::new(
            prompt,
            answer,
            Evaluation::new(reply.comprehension, reply.feedback.as_str()),
            now,
        );
        self.engine
            .apply_review(draft.concept_mut(index)?, &plan, attempt)?;

        self.commit(draft).await?;
        self.learner.notify(&reply.feedback).await;
        Ok(plan)
    }

    /// Maybe ask one supplementary question after a card.
    async fn special_turn(
        &mut self,
        index: usize,
        item: &str,
        comprehension: Score,
    ) -> Result<(), SessionError> {
        let decision = self.policy.decide(
            concept_at(&self.session, index)?,
            item,
            comprehension,
            &mut self.rng,
        );
        let SpecialDecision::Ask(special) = decision else {
            return Ok(());
        };
        tracing::debug!(
            key = %self.session.key(),
            kind = special.kind.as_str(),
            item,
            paired = ?special.paired_item,
            "special question selected"
        );

        let request = QuestionRequest {
            subject: self.session.topic().to_string(),
            level: self.session.level(),
            purpose: QuestionPurpose::Special {
                kind: special.kind,
                concept: concept_at(&self.session, index)?.name().to_string(),
                item: special.item.clone(),
                paired_item: special.paired_item.clone(),
            },
            focus_topics: Vec::new(),
        };
        let question = self
            .timed(self.collab.generator.generate_question(&request))
            .await?;
        let input = self.learner.answer(&question).await?;
        let (answer, reply) = self.score_answer(&question, input).await?;

        let now = self.collab.clock.now();
        let mut draft = self.session.clone();
        draft.append_log(Role::Tutor, question.as_str(), now);
        draft.append_log(Role::Learner, answer.as_str(), now);
        draft.append_log(Role::Tutor, reply.feedback.as_str(), now);
        let concept = draft.concept_mut(index)?;
        let position = concept.position();
        let attempt = Attempt::new(
            question,
            answer,
            Evaluation::new(reply.comprehension, reply.feedback.as_str()),
            now,
        );
        concept.record_special(special.into_record(attempt, position));

        self.commit(draft).await?;
        self.learner.notify(&reply.feedback).await;
        Ok(())
    }

    /// Evaluate a free answer; `/skip` scores zero without calling the evaluator.
    async fn score_answer(
        &self,
        question: &str,
        input: LearnerInput,
    ) -> Result<(String, EvaluationReply), SessionError> {
        match input {
            LearnerInput::Skip => Ok((
                SKIP_COMMAND.to_string(),
                EvaluationReply::new(Score::ZERO, "Skipped."),
            )),
            LearnerInput::Answer(answer) => {
                let request = EvaluationRequest {
                    subject: self.session.topic().to_string(),
                    level: self.session.level(),
                    question: question.to_string(),
                    answer: answer.clone(),
                    topics: Vec::new(),
                };
                let reply = self
                    .timed(self.collab.generator.evaluate(&request))
                    .await?;
                Ok((answer, reply))
            }
        }
    }
}
