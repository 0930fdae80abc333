// Retrieval and answering: embed the question, pull the closest chunks, ask the model

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::completion::{ChatMessage, CompletionModel, CompletionRequest, strip_reasoning};
use crate::course::{CourseId, collection_metadata};
use crate::database::{QueryOptions, QueryResult, VectorStore};
use crate::embeddings::Embedder;
use crate::{CourseRagError, Result};

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const SYSTEM_PROMPT: &str = "You are a helpful course assistant.";

/// Answers learner questions from a course's indexed chunks
pub struct CourseAssistant {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    completion: Arc<dyn CompletionModel>,
    top_k: usize,
    temperature: f32,
}

impl CourseAssistant {
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        completion: Arc<dyn CompletionModel>,
    ) -> Self {
        Self {
            embedder,
            store,
            completion,
            top_k: DEFAULT_TOP_K,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// The most similar chunks for a question, closest first.
    ///
    /// The collection is created if missing, so a never-ingested course
    /// yields an empty result instead of an error.
    pub async fn retrieve(&self, course: &CourseId, question: &str, top_k: usize) -> Result<QueryResult> {
        let question = validate_question(question)?;
        let collection = course.collection_name();

        let embedding = self.embedder.embed(question).await?;
        self.store
            .create_or_get_collection(&collection, Some(collection_metadata(course)))
            .await?;

        let result = self
            .store
            .query(&collection, &embedding, &QueryOptions::top_k(top_k))
            .await?;

        debug!(
            "Retrieved {} chunks from '{}' for question of {} characters",
            result.len(),
            collection,
            question.chars().count()
        );
        Ok(result)
    }

    /// Answer a question using only the course's retrieved context.
    ///
    /// Any failure after input validation is wrapped in
    /// [`CourseRagError::AnswerGeneration`], whose user message is the generic
    /// "AI assistant unavailable".
    pub async fn answer(&self, course: &CourseId, question: &str) -> Result<String> {
        let question = validate_question(question)?;

        self.generate(course, question)
            .await
            .map_err(|source| {
                warn!(course_id = %course, "Answer generation failed: {}", source);
                CourseRagError::AnswerGeneration {
                    course_id: course.to_string(),
                    source: Box::new(source),
                }
            })
    }

    async fn generate(&self, course: &CourseId, question: &str) -> Result<String> {
        let retrieved = self.retrieve(course, question, self.top_k).await?;
        if retrieved.is_empty() {
            info!(
                "No indexed content for course {}; asking the model with an empty context",
                course
            );
        }

        let context = assemble_context(&retrieved);
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_prompt(&context, question)),
            ],
            temperature: self.temperature,
        };

        let raw = self.completion.complete(&request).await?;
        Ok(strip_reasoning(&raw))
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(CourseRagError::InvalidInput(
            "Question cannot be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Retrieved chunk texts in similarity order, one per line
#[inline]
pub fn assemble_context(result: &QueryResult) -> String {
    result.documents().collect::<Vec<_>>().join("\n")
}

#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "Use only the context below to answer the learner's question. \
         If the context does not contain the answer, say that you don't know.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\
         Answer briefly, in a friendly and conversational tone.",
        context, question
    )
}
