mod common;

use std::sync::Arc;

use common::{
    ScriptedGenerator, ScriptedLearner, chemistry_course, collaborators, key, score, started,
    strings,
};
use services::{
    ConceptDecision, EvaluationReply, LearnerInput, QuestionPurpose, SessionError, TutorService,
};
use storage::repository::{InMemoryRepository, SessionRepository};
use tutor_core::model::{ConceptOutline, CourseStructure, Phase, SKIP_COMMAND, Score};

fn service(generator: &Arc<ScriptedGenerator>, course: CourseStructure) -> TutorService {
    let repo: Arc<dyn SessionRepository> = Arc::new(InMemoryRepository::new());
    TutorService::new(collaborators(
        repo,
        Arc::clone(generator) as _,
        course,
    ))
}

#[tokio::test]
async fn full_course_runs_to_complete_and_persists_every_turn() {
    let generator = Arc::new(ScriptedGenerator::new());
    let service = service(&generator, chemistry_course());
    let key = key(1, 1);
    started(&service, key).await;

    let mut machine = service.open(key, ScriptedLearner::new()).await.unwrap();
    let phase = machine.run().await.unwrap();
    assert_eq!(phase, Phase::Complete);

    let session = machine.session();
    assert!(session.background().all_mastered());
    let elements = session.concept_by_name("Elements").unwrap();
    assert!(elements.memorization_complete());
    // Two cards, each answered twice at score 5 before retiring.
    assert_eq!(elements.position(), 4);
    let hydrogen = elements.item("Hydrogen").unwrap();
    assert_eq!(hydrogen.success_count(), 2);
    assert_eq!(hydrogen.last_review_position(), Some(3));
    assert!(session.concept_by_name("Bonds").unwrap().items().is_empty());

    // One connection topic allows two main questions.
    assert_eq!(
        generator.count_purpose(|p| matches!(p, QuestionPurpose::Connection)),
        2
    );
    assert_eq!(session.connections().get("Trends").unwrap().attempts().len(), 2);

    let stored = service.repository().load_session(key).await.unwrap();
    assert_eq!(&stored, session);
}

#[tokio::test]
async fn skip_masters_first_unmastered_topic_without_evaluation() {
    let generator = Arc::new(ScriptedGenerator::new());
    let course = CourseStructure::new(
        strings(&["Matter", "Energy"]),
        vec![ConceptOutline::new("Bonds", strings(&["Covalent"]))],
        Vec::new(),
    )
    .unwrap();
    let service = service(&generator, course);
    let key = key(1, 2);
    started(&service, key).await;

    let learner = ScriptedLearner::new().inputs(vec![LearnerInput::Skip]);
    let mut machine = service.open(key, learner).await.unwrap();
    assert_eq!(machine.step().await.unwrap(), Phase::Overview);
    assert_eq!(machine.step().await.unwrap(), Phase::learning(0));

    let background = machine.session().background();
    let matter = background.get("Matter").unwrap();
    assert_eq!(matter.comprehension(), Score::MAX);
    assert_eq!(matter.attempts().len(), 1);
    assert_eq!(matter.attempts()[0].answer(), SKIP_COMMAND);
    // Only the second overview question was evaluated; it landed on Energy.
    assert_eq!(generator.evaluate_calls(), 1);
    assert_eq!(background.get("Energy").unwrap().attempts().len(), 1);
}

#[tokio::test]
async fn topic_loop_stops_at_question_cap_and_confirms_every_third() {
    let generator = Arc::new(ScriptedGenerator::with_default(EvaluationReply::new(
        score(1),
        "Not yet.",
    )));
    let service = service(&generator, chemistry_course());
    let key = key(2, 1);
    started(&service, key).await;

    let mut machine = service.open(key, ScriptedLearner::new()).await.unwrap();
    machine.step().await.unwrap();
    assert_eq!(machine.step().await.unwrap(), Phase::learning(0));

    assert_eq!(
        generator.count_purpose(|p| matches!(p, QuestionPurpose::Background)),
        15
    );
    assert_eq!(machine.learner().confirm_calls, 4);
    assert!(!machine.session().background().all_mastered());
}

#[tokio::test]
async fn declining_ends_topic_loop_early() {
    let generator = Arc::new(ScriptedGenerator::with_default(EvaluationReply::new(
        score(2),
        "Keep going.",
    )));
    let service = service(&generator, chemistry_course());
    let key = key(2, 2);
    started(&service, key).await;

    let learner = ScriptedLearner::new().confirms(vec![false]);
    let mut machine = service.open(key, learner).await.unwrap();
    machine.step().await.unwrap();
    assert_eq!(machine.step().await.unwrap(), Phase::learning(0));
    assert_eq!(generator.questions().len(), 3);
}

#[tokio::test]
async fn skipped_concept_keeps_topics_unmastered_and_moves_on() {
    let generator = Arc::new(ScriptedGenerator::new());
    let service = service(&generator, chemistry_course());
    let key = key(3, 1);
    started(&service, key).await;

    let learner = ScriptedLearner::new().decisions(vec![ConceptDecision::Skip]);
    let mut machine = service.open(key, learner).await.unwrap();
    machine.step().await.unwrap();
    assert_eq!(machine.step().await.unwrap(), Phase::learning(1));

    let elements = machine.session().concept(0).unwrap();
    assert!(elements.is_skipped());
    assert!(!elements.topics().all_mastered());
    assert_eq!(elements.position(), 0);

    let report = service.progress().report(key).await.unwrap();
    assert!(report.concepts[0].skipped);
}

#[tokio::test]
async fn connections_are_bounded_and_follow_ups_do_not_count() {
    let generator = Arc::new(ScriptedGenerator::with_default(
        EvaluationReply::new(Score::MAX, "Nice link.").with_follow_up(),
    ));
    let course = CourseStructure::new(
        Vec::new(),
        vec![ConceptOutline::new("Bonds", strings(&["Covalent"]))],
        strings(&["Trends", "Energy flow"]),
    )
    .unwrap();
    let service = service(&generator, course);
    let key = key(4, 1);
    started(&service, key).await;

    let mut machine = service.open(key, ScriptedLearner::new()).await.unwrap();
    assert_eq!(machine.run().await.unwrap(), Phase::Complete);

    assert_eq!(
        generator.count_purpose(|p| matches!(p, QuestionPurpose::Connection)),
        4
    );
    assert_eq!(
        generator.count_purpose(|p| matches!(p, QuestionPurpose::FollowUp { .. })),
        4
    );
    // Confirmation is asked once, before the fourth main question.
    assert_eq!(machine.learner().confirm_calls, 1);
}

#[tokio::test]
async fn course_without_connection_topics_completes_immediately() {
    let generator = Arc::new(ScriptedGenerator::new());
    let course = CourseStructure::new(
        Vec::new(),
        vec![ConceptOutline::new("Bonds", strings(&["Covalent"]))],
        Vec::new(),
    )
    .unwrap();
    let service = service(&generator, course);
    let key = key(4, 2);
    started(&service, key).await;

    let mut machine = service.open(key, ScriptedLearner::new()).await.unwrap();
    assert_eq!(machine.run().await.unwrap(), Phase::Complete);
    assert_eq!(
        generator.count_purpose(|p| matches!(p, QuestionPurpose::Connection)),
        0
    );
}

#[tokio::test]
async fn low_flashcard_scores_keep_items_in_rotation() {
    let generator = Arc::new(ScriptedGenerator::new().script(vec![
        Some(EvaluationReply::new(Score::MAX, "ok")),
        Some(EvaluationReply::new(Score::MAX, "ok")),
        Some(EvaluationReply::new(score(1), "Not quite.")),
    ]));
    let service = service(&generator, chemistry_course());
    let key = key(5, 1);
    started(&service, key).await;

    let mut machine = service.open(key, ScriptedLearner::new()).await.unwrap();
    machine.step().await.unwrap();
    machine.step().await.unwrap();
    assert_eq!(machine.step().await.unwrap(), Phase::memorizing(0));
    machine.run().await.unwrap();

    let elements = machine.session().concept(0).unwrap();
    assert!(elements.memorization_complete());
    // The first card failed once, so the round needed five presentations.
    assert_eq!(elements.position(), 5);
    let hydrogen = elements.item("Hydrogen").unwrap();
    assert_eq!(hydrogen.attempts().len(), 3);
    assert_eq!(hydrogen.attempts()[0].comprehension(), score(1));
}

#[tokio::test]
async fn resumed_session_continues_from_persisted_phase() {
    let generator = Arc::new(ScriptedGenerator::new());
    let service = service(&generator, chemistry_course());
    let key = key(6, 1);
    started(&service, key).await;

    let mut first = service.open(key, ScriptedLearner::new()).await.unwrap();
    first.step().await.unwrap();
    first.step().await.unwrap();
    assert_eq!(first.step().await.unwrap(), Phase::memorizing(0));
    drop(first);

    let mut resumed = service.open(key, ScriptedLearner::new()).await.unwrap();
    assert_eq!(resumed.session().phase(), Phase::memorizing(0));
    assert_eq!(resumed.run().await.unwrap(), Phase::Complete);
    assert_eq!(resumed.session().concept(0).unwrap().position(), 4);
}

#[tokio::test]
async fn starting_twice_for_same_key_conflicts() {
    let generator = Arc::new(ScriptedGenerator::new());
    let service = service(&generator, chemistry_course());
    let key = key(7, 1);
    started(&service, key).await;

    let err = service
        .start_session(key, "Physics", tutor_core::model::UnderstandingLevel::Advanced, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Conflict));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let generator = Arc::new(ScriptedGenerator::new());
    let service = service(&generator, chemistry_course());
    let err = service
        .open(key(99, 99), ScriptedLearner::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, SessionError::NotFound));
    assert!(matches!(
        service.progress().report(key(99, 99)).await,
        Err(SessionError::NotFound)
    ));
}
