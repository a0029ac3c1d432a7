use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CourseError {
    #[error("course must contain at least one concept")]
    NoConcepts,

    #[error("concept name cannot be empty")]
    EmptyConceptName,

    #[error("duplicate concept: {0}")]
    DuplicateConcept(String),

    #[error("concept {concept} has an empty {what} entry")]
    EmptyEntry { concept: String, what: &'static str },

    #[error("concept {concept} lists {what} {name} twice")]
    DuplicateEntry {
        concept: String,
        what: &'static str,
        name: String,
    },

    #[error("concept {0} has memorization items but no fields to recall")]
    MissingMemorizeFields(String),

    #[error("time budget must be at least one minute")]
    InvalidTimeBudget,

    #[error("unknown understanding level: {0}")]
    UnknownLevel(String),
}

//
// ─── UNDERSTANDING LEVEL ───────────────────────────────────────────────────────
//

/// Learner's self-reported starting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnderstandingLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl UnderstandingLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for UnderstandingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnderstandingLevel {
    type Err = CourseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(CourseError::UnknownLevel(other.to_string())),
        }
    }
}

//
// ─── CONSTRAINTS ───────────────────────────────────────────────────────────────
//

/// Constraints handed to the course provider during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseConstraints {
    pub level: UnderstandingLevel,
    pub time_budget_minutes: u32,
}

//
// ─── COURSE STRUCTURE ──────────────────────────────────────────────────────────
//

/// One concept of the curriculum: topics to understand plus items to memorize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptOutline {
    pub name: String,
    pub topics: Vec<String>,
    #[serde(default)]
    pub memorize_fields: Vec<String>,
    #[serde(default)]
    pub memorize_items: Vec<String>,
}

impl ConceptOutline {
    #[must_use]
    pub fn new(name: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            name: name.into(),
            topics,
            memorize_fields: Vec::new(),
            memorize_items: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_memorization(mut self, fields: Vec<String>, items: Vec<String>) -> Self {
        self.memorize_fields = fields;
        self.memorize_items = items;
        self
    }
}

/// Course produced once by the course provider and frozen for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStructure {
    background_topics: Vec<String>,
    concepts: Vec<ConceptOutline>,
    connection_topics: Vec<String>,
}

impl CourseStructure {
    /// Validate and normalize (trim) a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseError` when the course has no concepts, blank names,
    /// duplicates, or items without any field to recall.
    pub fn new(
        background_topics: Vec<String>,
        concepts: Vec<ConceptOutline>,
        connection_topics: Vec<String>,
    ) -> Result<Self, CourseError> {
        if concepts.is_empty() {
            return Err(CourseError::NoConcepts);
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(concepts.len());
        for concept in concepts {
            let name = concept.name.trim().to_string();
            if name.is_empty() {
                return Err(CourseError::EmptyConceptName);
            }
            if !seen.insert(name.clone()) {
                return Err(CourseError::DuplicateConcept(name));
            }
            let topics = normalize_list(&name, "topic", concept.topics)?;
            let memorize_fields = normalize_list(&name, "field", concept.memorize_fields)?;
            let memorize_items = normalize_list(&name, "item", concept.memorize_items)?;
            if !memorize_items.is_empty() && memorize_fields.is_empty() {
                return Err(CourseError::MissingMemorizeFields(name));
            }
            normalized.push(ConceptOutline {
                name,
                topics,
                memorize_fields,
                memorize_items,
            });
        }

        Ok(Self {
            background_topics: normalize_list("background", "topic", background_topics)?,
            concepts: normalized,
            connection_topics: normalize_list("connections", "topic", connection_topics)?,
        })
    }

    #[must_use]
    pub fn background_topics(&self) -> &[String] {
        &self.background_topics
    }

    #[must_use]
    pub fn concepts(&self) -> &[ConceptOutline] {
        &self.concepts
    }

    #[must_use]
    pub fn connection_topics(&self) -> &[String] {
        &self.connection_topics
    }
}

fn normalize_list(
    concept: &str,
    what: &'static str,
    values: Vec<String>,
) -> Result<Vec<String>, CourseError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            return Err(CourseError::EmptyEntry {
                concept: concept.to_string(),
                what,
            });
        }
        if !seen.insert(trimmed.clone()) {
            return Err(CourseError::DuplicateEntry {
                concept: concept.to_string(),
                what,
                name: trimmed,
            });
        }
        out.push(trimmed);
    }
    Ok(out)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
