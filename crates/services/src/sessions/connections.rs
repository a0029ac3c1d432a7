use tutor_core::model::Phase;

use super::machine::PhaseStateMachine;
use super::topics::TopicScope;
use crate::error::SessionError;
use crate::generation::QuestionPurpose;
use crate::learner::Learner;

impl<L: Learner> PhaseStateMachine<L> {
    /// Cross-concept synthesis questions, then Complete.
    ///
    /// Main questions are bounded by two per connection topic and the global
    /// cap; a follow-up the evaluator asks for does not count against it. The
    /// count is read back from the session, so resuming never resets it.
    pub(super) async fn run_connections(&mut self) -> Result<(), SessionError> {
        let limits = self.collab.config.limits;
        let bound = limits.connection_bound(self.session.connections().len());

        loop {
            let asked = self.asked_in_loop();
            if asked >= bound {
                break;
            }
            if limits.confirm_due(asked)
                && !self.learner.confirm_continue(self.session.phase()).await?
            {
                break;
            }
            let outcome = self
                .topic_turn(TopicScope::Connections, QuestionPurpose::Connection)
                .await?;

            if let (true, Some(answer)) = (outcome.follow_up, outcome.answer) {
                let purpose = QuestionPurpose::FollowUp {
                    question: outcome.question,
                    answer,
                };
                self.topic_turn(TopicScope::Connections, purpose).await?;
            }
        }
        tracing::debug!(
            key = %self.session.key(),
            asked = self.session.loop_progress().asked,
            bound,
            "connections finished"
        );

        let mut draft = self.session.clone();
        draft.advance_phase(Phase::Complete)?;
        self.commit(draft).await
    }
}
