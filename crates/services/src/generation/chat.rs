use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tutor_core::model::{ConceptOutline, CourseConstraints, CourseStructure, Score};

use super::{
    CourseProvider, EvaluationReply, EvaluationRequest, QuestionGenerator, QuestionPurpose,
    QuestionRequest, TopicScore,
};
use crate::config::GenerationConfig;
use crate::error::GenerationError;

const TUTOR_SYSTEM_PROMPT: &str = "You are a patient tutor. Keep questions short and concrete.";

/// OpenAI-compatible chat-completions client acting as both question
/// generator and course provider.
#[derive(Clone)]
pub struct ChatGenerator {
    client: Client,
    config: Option<GenerationConfig>,
}

impl ChatGenerator {
    #[must_use]
    pub fn new(config: Option<GenerationConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.config.is_some()
    }

    async fn complete(&self, prompt: String, json: bool) -> Result<String, GenerationError> {
        let config = self.config.as_ref().ok_or(GenerationError::Disabled)?;

        let payload = ChatRequest {
            model: config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: TUTOR_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            response_format: json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let response = self
            .client
            .post(config.completions_url())
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "chat completion failed");
            return Err(GenerationError::HttpStatus(response.status()));
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(GenerationError::EmptyResponse)?;

        Ok(content)
    }
}

#[async_trait]
impl QuestionGenerator for ChatGenerator {
    async fn generate_question(
        &self,
        request: &QuestionRequest,
    ) -> Result<String, GenerationError> {
        self.complete(question_prompt(request), false).await
    }

    async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationReply, GenerationError> {
        let raw = self.complete(evaluation_prompt(request), true).await?;
        parse_evaluation(&raw)
    }
}

#[async_trait]
impl CourseProvider for ChatGenerator {
    async fn generate_course(
        &self,
        topic: &str,
        constraints: &CourseConstraints,
    ) -> Result<CourseStructure, GenerationError> {
        let raw = self.complete(course_prompt(topic, constraints), true).await?;
        parse_course(&raw)
    }
}

//
// ─── PROMPTS ───────────────────────────────────────────────────────────────────
//

fn question_prompt(request: &QuestionRequest) -> String {
    let focus = request.focus_topics.join(", ");
    let task = match &request.purpose {
        QuestionPurpose::Background => {
            format!("Ask one overview question covering some of: {focus}.")
        }
        QuestionPurpose::Concept { concept } => {
            format!("Ask one question about the concept \"{concept}\" focusing on: {focus}.")
        }
        QuestionPurpose::Special {
            kind,
            concept,
            item,
            paired_item,
        } => match paired_item {
            Some(paired) => format!(
                "Ask one {} question within \"{concept}\" linking \"{item}\" to \"{paired}\".",
                kind.as_str()
            ),
            None => format!(
                "Ask one {} question within \"{concept}\" about \"{item}\".",
                kind.as_str()
            ),
        },
        QuestionPurpose::Connection => {
            format!("Ask one question that draws connections between: {focus}.")
        }
        QuestionPurpose::FollowUp { question, answer } => format!(
            "The learner was asked \"{question}\" and answered \"{answer}\". \
             Ask one short follow-up question that deepens the connection."
        ),
    };
    format!(
        "Subject: {}. Learner level: {}.\n{task}\nReply with the question only.",
        request.subject, request.level
    )
}

fn evaluation_prompt(request: &EvaluationRequest) -> String {
    let topics = if request.topics.is_empty() {
        String::from("none")
    } else {
        request.topics.join(", ")
    };
    format!(
        "Subject: {}. Learner level: {}.\nQuestion: {}\nAnswer: {}\n\
         Candidate topics: {topics}\n\
         Score comprehension from 0 to 5. Reply with JSON: \
         {{\"comprehension\": n, \"feedback\": \"...\", \
         \"topics\": [{{\"topic\": \"...\", \"comprehension\": n}}], \"follow_up\": bool}}. \
         Only list candidate topics the answer actually addressed.",
        request.subject, request.level, request.question, request.answer
    )
}

fn course_prompt(topic: &str, constraints: &CourseConstraints) -> String {
    format!(
        "Design a course on \"{topic}\" for a {} learner with {} minutes.\n\
         Reply with JSON: {{\"background_topics\": [..], \"concepts\": [{{\"name\": \"..\", \
         \"topics\": [..], \"memorize_fields\": [..], \"memorize_items\": [..]}}], \
         \"connection_topics\": [..]}}.",
        constraints.level, constraints.time_budget_minutes
    )
}

//
// ─── REPLY PARSING ─────────────────────────────────────────────────────────────
//

/// The JSON object inside a reply, ignoring code fences or surrounding prose.
fn json_body(raw: &str) -> Result<&str, GenerationError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&raw[s..=e]),
        _ => Err(GenerationError::Malformed("reply contains no JSON object".into())),
    }
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    serde_json::from_str(json_body(raw)?).map_err(|e| GenerationError::Malformed(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct EvaluationPayload {
    comprehension: i64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    topics: Vec<TopicScorePayload>,
    #[serde(default)]
    follow_up: bool,
}

#[derive(Debug, Deserialize)]
struct TopicScorePayload {
    topic: String,
    comprehension: i64,
}

fn parse_evaluation(raw: &str) -> Result<EvaluationReply, GenerationError> {
    let payload: EvaluationPayload = parse_json(raw)?;
    Ok(EvaluationReply {
        comprehension: Score::saturating(payload.comprehension),
        feedback: payload.feedback.trim().to_string(),
        topics: payload
            .topics
            .into_iter()
            .map(|t| TopicScore {
                topic: t.topic.trim().to_string(),
                comprehension: Score::saturating(t.comprehension),
            })
            .collect(),
        follow_up: payload.follow_up,
    })
}

#[derive(Debug, Deserialize)]
struct CoursePayload {
    #[serde(default)]
    background_topics: Vec<String>,
    concepts: Vec<ConceptPayload>,
    #[serde(default)]
    connection_topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConceptPayload {
    name: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    memorize_fields: Vec<String>,
    #[serde(default)]
    memorize_items: Vec<String>,
}

fn parse_course(raw: &str) -> Result<CourseStructure, GenerationError> {
    let payload: CoursePayload = parse_json(raw)?;
    let concepts = payload
        .concepts
        .into_iter()
        .map(|c| {
            ConceptOutline::new(c.name, c.topics)
                .with_memorization(c.memorize_fields, c.memorize_items)
        })
        .collect();
    CourseStructure::new(payload.background_topics, concepts, payload.connection_topics)
        .map_err(|e| GenerationError::Malformed(e.to_string()))
}

//
// ─── WIRE TYPES ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}
