#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use services::{
    Collaborators, ConceptDecision, CourseProvider, EvaluationReply, EvaluationRequest,
    GenerationError, Learner, LearnerError, LearnerInput, QuestionGenerator, QuestionPurpose,
    QuestionRequest, TutorConfig, TutorService,
};
use storage::repository::{InMemoryRepository, SessionListing, SessionRepository, StorageError};
use tutor_core::model::{
    ConceptOutline, CourseConstraints, CourseId, CourseStructure, LearningSession, Phase, Score,
    SessionKey, UnderstandingLevel, UserId,
};
use tutor_core::time::fixed_clock;

pub const SEED: u64 = 7;

pub fn key(user: u64, course: u64) -> SessionKey {
    SessionKey::new(UserId::new(user), CourseId::new(course))
}

pub fn score(value: u8) -> Score {
    Score::new(value).unwrap()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// One background topic, a concept with two flashcards, a concept without
/// flashcards, one connection topic.
pub fn chemistry_course() -> CourseStructure {
    CourseStructure::new(
        strings(&["Matter"]),
        vec![
            ConceptOutline::new("Elements", strings(&["Periodic table"])).with_memorization(
                strings(&["symbol"]),
                strings(&["Hydrogen", "Helium"]),
            ),
            ConceptOutline::new("Bonds", strings(&["Covalent"])),
        ],
        strings(&["Trends"]),
    )
    .unwrap()
}

//
// ─── GENERATOR ─────────────────────────────────────────────────────────────────
//

/// Numbered questions and scripted evaluations; `None` in the script fails
/// that evaluation.
pub struct ScriptedGenerator {
    evaluations: Mutex<VecDeque<Option<EvaluationReply>>>,
    default_reply: EvaluationReply,
    questions: Mutex<Vec<QuestionRequest>>,
    evaluate_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::with_default(EvaluationReply::new(Score::MAX, "Great."))
    }

    pub fn with_default(default_reply: EvaluationReply) -> Self {
        Self {
            evaluations: Mutex::new(VecDeque::new()),
            default_reply,
            questions: Mutex::new(Vec::new()),
            evaluate_calls: AtomicUsize::new(0),
        }
    }

    pub fn script(self, replies: Vec<Option<EvaluationReply>>) -> Self {
        self.queue(replies);
        self
    }

    /// Append scripted evaluations to a generator already in use.
    pub fn queue(&self, replies: Vec<Option<EvaluationReply>>) {
        self.evaluations.lock().unwrap().extend(replies);
    }

    pub fn questions(&self) -> Vec<QuestionRequest> {
        self.questions.lock().unwrap().clone()
    }

    pub fn count_purpose(&self, matches: impl Fn(&QuestionPurpose) -> bool) -> usize {
        self.questions
            .lock()
            .unwrap()
            .iter()
            .filter(|q| matches(&q.purpose))
            .count()
    }

    pub fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate_question(
        &self,
        request: &QuestionRequest,
    ) -> Result<String, GenerationError> {
        let mut questions = self.questions.lock().unwrap();
        questions.push(request.clone());
        Ok(format!("Q{}", questions.len()))
    }

    async fn evaluate(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<EvaluationReply, GenerationError> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        match self.evaluations.lock().unwrap().pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) => Err(GenerationError::Malformed("scripted failure".into())),
            None => Ok(self.default_reply.clone()),
        }
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowGenerator;

#[async_trait]
impl QuestionGenerator for SlowGenerator {
    async fn generate_question(
        &self,
        _request: &QuestionRequest,
    ) -> Result<String, GenerationError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok("too late".into())
    }

    async fn evaluate(
        &self,
        _request: &EvaluationRequest,
    ) -> Result<EvaluationReply, GenerationError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(EvaluationReply::new(Score::MAX, "too late"))
    }
}

pub struct FixedCourse(pub CourseStructure);

#[async_trait]
impl CourseProvider for FixedCourse {
    async fn generate_course(
        &self,
        _topic: &str,
        _constraints: &CourseConstraints,
    ) -> Result<CourseStructure, GenerationError> {
        Ok(self.0.clone())
    }
}

//
// ─── LEARNER ───────────────────────────────────────────────────────────────────
//

/// Replays scripted input; once a script runs dry it answers, confirms, and
/// learns.
#[derive(Default)]
pub struct ScriptedLearner {
    pub inputs: VecDeque<LearnerInput>,
    pub confirms: VecDeque<bool>,
    pub decisions: VecDeque<ConceptDecision>,
    pub prompts: Vec<String>,
    pub notes: Vec<String>,
    pub confirm_calls: usize,
    /// Concept offers answered by hanging up.
    pub dropped_decisions: usize,
}

impl ScriptedLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(mut self, inputs: Vec<LearnerInput>) -> Self {
        self.inputs = inputs.into();
        self
    }

    pub fn confirms(mut self, confirms: Vec<bool>) -> Self {
        self.confirms = confirms.into();
        self
    }

    pub fn decisions(mut self, decisions: Vec<ConceptDecision>) -> Self {
        self.decisions = decisions.into();
        self
    }

    pub fn drop_decisions(mut self, count: usize) -> Self {
        self.dropped_decisions = count;
        self
    }
}

#[async_trait]
impl Learner for ScriptedLearner {
    async fn answer(&mut self, prompt: &str) -> Result<LearnerInput, LearnerError> {
        self.prompts.push(prompt.to_string());
        Ok(self
            .inputs
            .pop_front()
            .unwrap_or_else(|| LearnerInput::Answer("I think I know this".into())))
    }

    async fn confirm_continue(&mut self, _phase: Phase) -> Result<bool, LearnerError> {
        self.confirm_calls += 1;
        Ok(self.confirms.pop_front().unwrap_or(true))
    }

    async fn concept_decision(&mut self, _concept: &str) -> Result<ConceptDecision, LearnerError> {
        if self.dropped_decisions > 0 {
            self.dropped_decisions -= 1;
            return Err(LearnerError::Closed);
        }
        Ok(self.decisions.pop_front().unwrap_or(ConceptDecision::Learn))
    }

    async fn notify(&mut self, text: &str) {
        self.notes.push(text.to_string());
    }
}

//
// ─── REPOSITORY ────────────────────────────────────────────────────────────────
//

/// In-memory repository whose saves can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyRepository {
    inner: InMemoryRepository,
    /// Saves rejected before anything is written.
    fail_saves: Arc<AtomicUsize>,
    /// Saves written but reported as failed, as if the acknowledgement was lost.
    lose_acks: Arc<AtomicUsize>,
    /// Successful saves left before one is rejected.
    saves_before_failure: Arc<Mutex<Option<usize>>>,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.fail_saves.store(count, Ordering::SeqCst);
    }

    pub fn lose_next_acks(&self, count: usize) {
        self.lose_acks.store(count, Ordering::SeqCst);
    }

    /// Let `successes` saves through, then reject the next one.
    pub fn fail_after(&self, successes: usize) {
        *self.saves_before_failure.lock().unwrap() = Some(successes);
    }

    fn scheduled_failure_due(&self) -> bool {
        let mut countdown = self.saves_before_failure.lock().unwrap();
        match *countdown {
            Some(0) => {
                *countdown = None;
                true
            }
            Some(left) => {
                *countdown = Some(left - 1);
                false
            }
            None => false,
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl SessionRepository for FlakyRepository {
    async fn create_session(&self, session: &LearningSession) -> Result<(), StorageError> {
        self.inner.create_session(session).await
    }

    async fn load_session(&self, key: SessionKey) -> Result<LearningSession, StorageError> {
        self.inner.load_session(key).await
    }

    async fn save_session(
        &self,
        session: &LearningSession,
        expected_revision: u64,
    ) -> Result<(), StorageError> {
        if take_one(&self.fail_saves) || self.scheduled_failure_due() {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.save_session(session, expected_revision).await?;
        if take_one(&self.lose_acks) {
            return Err(StorageError::Connection("connection reset".into()));
        }
        Ok(())
    }

    async fn list_sessions(&self, user: UserId) -> Result<Vec<SessionListing>, StorageError> {
        self.inner.list_sessions(user).await
    }
}

//
// ─── WIRING ────────────────────────────────────────────────────────────────────
//

pub fn collaborators(
    repo: Arc<dyn SessionRepository>,
    generator: Arc<dyn QuestionGenerator>,
    course: CourseStructure,
) -> Collaborators {
    Collaborators {
        repo,
        generator,
        courses: Arc::new(FixedCourse(course)),
        clock: fixed_clock(),
        config: TutorConfig::default().with_seed(SEED),
    }
}

pub async fn started(service: &TutorService, key: SessionKey) -> LearningSession {
    service
        .start_session(key, "Chemistry", UnderstandingLevel::Beginner, 30)
        .await
        .unwrap()
}
