use super::*;
use crate::completion::Role;
use crate::database::{QueryMatch, QueryResult};
use crate::indexer::CourseIndexer;
use crate::testing::{HashEmbedder, MemoryStore, ScriptedCompletion};

fn course() -> CourseId {
    CourseId::parse("go-intro").expect("valid id")
}

struct Fixture {
    store: Arc<MemoryStore>,
    completion: Arc<ScriptedCompletion>,
    assistant: CourseAssistant,
}

fn fixture(completion: ScriptedCompletion) -> Fixture {
    let embedder = Arc::new(HashEmbedder::new());
    let store = Arc::new(MemoryStore::new());
    let completion = Arc::new(completion);
    let assistant = CourseAssistant::new(embedder, store.clone(), completion.clone());
    Fixture {
        store,
        completion,
        assistant,
    }
}

async fn ingest(store: Arc<MemoryStore>, text: &str) {
    CourseIndexer::new(Arc::new(HashEmbedder::new()), store)
        .with_chunking(crate::embeddings::ChunkingConfig {
            max_chunk_length: 20,
        })
        .ingest_text(&course(), text)
        .await
        .expect("ingestion succeeds");
}

#[test]
fn context_joins_documents_in_order() {
    let result = QueryResult::from_matches(
        vec![
            QueryMatch::new("b".to_string(), Some("Second.".to_string()), None, 0.4),
            QueryMatch::new("a".to_string(), Some("First.".to_string()), None, 0.1),
        ],
        4,
    );

    assert_eq!(assemble_context(&result), "First.\nSecond.");
    assert_eq!(assemble_context(&QueryResult::default()), "");
}

#[test]
fn prompt_contains_context_and_question() {
    let prompt = build_prompt("Go is fast.", "Is Go fast?");
    assert!(prompt.contains("Context:\nGo is fast."));
    assert!(prompt.contains("Question: Is Go fast?"));
    assert!(prompt.starts_with("Use only the context"));
}

#[tokio::test]
async fn identical_question_ranks_matching_chunk_first() {
    let fx = fixture(ScriptedCompletion::replying("ok"));
    ingest(fx.store.clone(), "Intro to Go. Go is fast. Go has goroutines.").await;

    let result = fx
        .assistant
        .retrieve(&course(), "Go has goroutines.", 3)
        .await
        .expect("retrieval succeeds");

    let top = &result.matches[0];
    assert_eq!(top.document.as_deref(), Some("Go has goroutines."));
    assert!(top.distance.abs() < 1e-5);
    assert!((top.similarity - 1.0).abs() < 1e-5);
    assert!(result.matches.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn retrieval_respects_top_k() {
    let fx = fixture(ScriptedCompletion::replying("ok"));
    ingest(fx.store.clone(), "Intro to Go. Go is fast. Go has goroutines.").await;

    let result = fx
        .assistant
        .retrieve(&course(), "Go", 2)
        .await
        .expect("retrieval succeeds");

    assert_eq!(result.len(), 2);
}

#[tokio::test]
async fn answers_with_context_and_strips_reasoning() {
    let fx = fixture(ScriptedCompletion::replying(
        "<think>The context mentions goroutines.</think>\n\nYes, Go has goroutines!",
    ));
    ingest(fx.store.clone(), "Intro to Go. Go is fast. Go has goroutines.").await;

    let answer = fx
        .assistant
        .answer(&course(), "Does Go have goroutines?")
        .await
        .expect("answer succeeds");

    assert_eq!(answer, "Yes, Go has goroutines!");

    let requests = fx.completion.requests();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, SYSTEM_PROMPT);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.contains("Go has goroutines."));
    assert!(messages[1].content.contains("Question: Does Go have goroutines?"));
    assert_eq!(requests[0].temperature, DEFAULT_TEMPERATURE);
}

#[tokio::test]
async fn empty_course_still_asks_the_model() {
    let fx = fixture(ScriptedCompletion::replying("I don't know yet."));

    let answer = fx
        .assistant
        .answer(&course(), "What is this course about?")
        .await
        .expect("empty context is not an error");

    assert_eq!(answer, "I don't know yet.");
    let requests = fx.completion.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].messages[1].content.contains("Context:\n\n"));
    assert_eq!(fx.store.creates(), 1);
}

#[tokio::test]
async fn completion_failure_is_wrapped() {
    let fx = fixture(ScriptedCompletion::failing());

    let err = fx
        .assistant
        .answer(&course(), "Anything?")
        .await
        .expect_err("model is down");

    assert!(matches!(
        &err,
        CourseRagError::AnswerGeneration { course_id, source }
            if course_id == "go-intro" && matches!(**source, CourseRagError::Completion(_))
    ));
    assert_eq!(err.user_message(), crate::ASSISTANT_UNAVAILABLE);
}

#[tokio::test]
async fn embedding_failure_is_wrapped() {
    let store = Arc::new(MemoryStore::new());
    let assistant = CourseAssistant::new(
        Arc::new(HashEmbedder::failing_on("broken", 1)),
        store,
        Arc::new(ScriptedCompletion::replying("unused")),
    );

    let err = assistant
        .answer(&course(), "a broken question")
        .await
        .expect_err("embedding fails");

    assert!(matches!(
        &err,
        CourseRagError::AnswerGeneration { source, .. }
            if matches!(**source, CourseRagError::EmbeddingProvider(_))
    ));
}

#[tokio::test]
async fn blank_question_is_rejected_before_any_call() {
    let fx = fixture(ScriptedCompletion::replying("unused"));

    let err = fx.assistant.answer(&course(), "   ").await.expect_err("blank");

    assert!(matches!(err, CourseRagError::InvalidInput(_)));
    assert!(fx.completion.requests().is_empty());
}

#[test]
fn top_k_is_at_least_one() {
    let fx = fixture(ScriptedCompletion::replying("unused"));
    assert_eq!(fx.assistant.with_top_k(0).top_k(), 1);
}
