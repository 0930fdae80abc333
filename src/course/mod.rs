
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::{CourseRagError, Result};

const COLLECTION_PREFIX: &str = "course-";
const MAX_COURSE_ID_LENGTH: usize = 64;

/// Stable identifier of a course; scopes exactly one vector collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CourseId(String);

impl CourseId {
    /// Accepts 1-64 ASCII letters, digits, '-' and '_', which keeps collection
    /// names and chunk ids unambiguous for every storage backend
    #[inline]
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(CourseRagError::InvalidInput(
                "Course id cannot be empty".to_string(),
            ));
        }

        if trimmed.len() > MAX_COURSE_ID_LENGTH {
            return Err(CourseRagError::InvalidInput(format!(
                "Course id is longer than {} characters",
                MAX_COURSE_ID_LENGTH
            )));
        }

        if let Some(bad) = trimmed
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_')
        {
            return Err(CourseRagError::InvalidInput(format!(
                "Course id '{}' contains unsupported character '{}'",
                trimmed, bad
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the vector collection holding this course's chunks
    #[inline]
    pub fn collection_name(&self) -> String {
        format!("{}{}", COLLECTION_PREFIX, self.0)
    }

    /// Deterministic document id, so re-ingestion overwrites instead of duplicating
    #[inline]
    pub fn chunk_id(&self, index: usize) -> String {
        format!("{}_chunk_{}", self.0, index)
    }

    /// Recover the course id from a collection name, if it is one of ours
    #[inline]
    pub fn from_collection_name(name: &str) -> Option<Self> {
        name.strip_prefix(COLLECTION_PREFIX)
            .and_then(|raw| Self::parse(raw).ok())
    }
}

impl FromStr for CourseId {
    type Err = CourseRagError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CourseId {
    type Error = CourseRagError;

    #[inline]
    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CourseId> for String {
    #[inline]
    fn from(id: CourseId) -> Self {
        id.0
    }
}

impl fmt::Display for CourseId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The written material of a course that gets indexed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseContent {
    pub description: String,
    pub prerequisites: Vec<String>,
    pub outcomes: Vec<String>,
}

impl CourseContent {
    #[inline]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_prerequisites(mut self, prerequisites: Vec<String>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    #[inline]
    pub fn with_outcomes(mut self, outcomes: Vec<String>) -> Self {
        self.outcomes = outcomes;
        self
    }

    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(CourseRagError::InvalidInput(
                "Course description is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Single text block that is chunked and embedded
    #[inline]
    pub fn combined_text(&self) -> String {
        format!(
            "{}\n\nPrerequisites:\n{}\n\nLearning Outcomes:\n{}",
            self.description.trim(),
            self.prerequisites.join("\n"),
            self.outcomes.join("\n")
        )
    }
}

/// Metadata attached to a course collection when it is created
#[inline]
pub fn collection_metadata(course: &CourseId) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(
        "description".to_string(),
        Value::String(format!("Vector store for course {}", course)),
    );
    metadata.insert("courseId".to_string(), Value::String(course.to_string()));
    metadata
}
