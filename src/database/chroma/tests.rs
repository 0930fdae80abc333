use super::*;
use crate::course::CourseId;
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROOT: &str = "/api/v2/tenants/default_tenant/databases/default_database";

fn test_config(base_url: String) -> VectorStoreConfig {
    VectorStoreConfig {
        base_url,
        ..VectorStoreConfig::default()
    }
}

fn collections_path() -> String {
    format!("{}/collections", ROOT)
}

fn document(index: usize, embedding: Vec<f32>) -> Document {
    Document::from_chunk(
        &CourseId::parse("7").expect("valid id"),
        index,
        format!("Sentence {}.", index),
        embedding,
        Utc::now(),
    )
}

async fn mount_listing(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(collections_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "uuid-other", "name": "course-other", "metadata": null },
            { "id": "uuid-7", "name": "course-7", "metadata": { "courseId": "7" } }
        ])))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[test]
fn api_root_uses_tenant_and_database() {
    let store = ChromaStore::new(&VectorStoreConfig {
        base_url: "http://chroma:8000/".to_string(),
        tenant: "acme".to_string(),
        database: "courses".to_string(),
        ..VectorStoreConfig::default()
    })
    .expect("valid config");

    assert_eq!(
        store.api_root,
        "http://chroma:8000/api/v2/tenants/acme/databases/courses"
    );
}

#[tokio::test]
async fn create_or_get_sends_get_or_create_and_cosine_space() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(collections_path()))
        .and(body_partial_json(json!({
            "name": "course-7",
            "get_or_create": true,
            "metadata": { "courseId": "7", "hnsw:space": "cosine" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "uuid-7",
            "name": "course-7",
            "metadata": { "courseId": "7", "hnsw:space": "cosine" }
        })))
        .expect(2)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let mut metadata = CollectionMetadata::new();
    metadata.insert("courseId".to_string(), json!("7"));

    let first = store
        .create_or_get_collection("course-7", Some(metadata.clone()))
        .await
        .expect("create succeeds");
    let second = store
        .create_or_get_collection("course-7", Some(metadata))
        .await
        .expect("get succeeds");

    assert_eq!(first.id, "uuid-7");
    assert_eq!(first, second);
}

#[tokio::test]
async fn upsert_keeps_arrays_aligned_and_caches_handle() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/uuid-7/upsert", collections_path())))
        .and(body_partial_json(json!({
            "ids": ["7_chunk_0", "7_chunk_1"],
            "documents": ["Sentence 0.", "Sentence 1."],
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(true)))
        .expect(2)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let docs = vec![document(0, vec![1.0, 0.0]), document(1, vec![0.0, 1.0])];

    store.upsert("course-7", &docs).await.expect("first upsert");
    store.upsert("course-7", &docs).await.expect("second upsert uses cached id");
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let err = store.count("course-missing").await.expect_err("unknown name");

    assert!(matches!(err, CourseRagError::CollectionNotFound(name) if name == "course-missing"));
}

#[tokio::test]
async fn listing_follows_pages() {
    let server = MockServer::start().await;
    let full_page: Vec<Value> = (0..LIST_PAGE_SIZE)
        .map(|i| json!({ "id": format!("id-{}", i), "name": format!("course-{}", i) }))
        .collect();

    Mock::given(method("GET"))
        .and(path(collections_path()))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(full_page)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(collections_path()))
        .and(query_param("offset", LIST_PAGE_SIZE.to_string()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": "last", "name": "notes" }])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let names = store.list_collections().await.expect("listing succeeds");

    assert_eq!(names.len(), LIST_PAGE_SIZE + 1);
    assert_eq!(names.last().map(String::as_str), Some("notes"));
}

#[tokio::test]
async fn query_parses_nested_arrays() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/uuid-7/query", collections_path())))
        .and(body_partial_json(json!({
            "query_embeddings": [[1.0, 0.0]],
            "n_results": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ids": [["7_chunk_1", "7_chunk_0"]],
            "documents": [["Sentence 1.", "Sentence 0."]],
            "metadatas": [[
                { "courseId": "7", "chunkIndex": 1, "chunkLength": 11, "createdAt": "2024-05-01T10:00:00Z" },
                null
            ]],
            "distances": [[0.4, 0.0]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let result = store
        .query("course-7", &[1.0, 0.0], &QueryOptions::top_k(2))
        .await
        .expect("query succeeds");

    assert_eq!(result.len(), 2);
    assert_eq!(result.matches[0].id, "7_chunk_0");
    assert_eq!(result.matches[0].similarity, 1.0);
    assert!(result.matches[0].metadata.is_none());
    assert_eq!(result.matches[1].document.as_deref(), Some("Sentence 1."));
    assert_eq!(
        result.matches[1].metadata.as_ref().map(|m| m.chunk_index),
        Some(1)
    );
    assert!((result.matches[1].similarity - 0.6).abs() < 1e-6);
}

#[tokio::test]
async fn stale_cached_id_is_invalidated_on_404() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/uuid-7/count", collections_path())))
        .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let err = store.count("course-7").await.expect_err("collection vanished");

    assert!(matches!(err, CourseRagError::CollectionNotFound(_)));
    assert!(store.cached("course-7").await.is_none());
}

#[tokio::test]
async fn delete_drops_cached_handle() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/uuid-7", collections_path())))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    store.delete_collection("course-7").await.expect("delete succeeds");

    assert!(store.cached("course-7").await.is_none());
}

#[tokio::test]
async fn mixed_dimensions_are_rejected_before_any_request() {
    let server = MockServer::start().await;
    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let docs = vec![document(0, vec![1.0, 0.0]), document(1, vec![1.0])];

    let err = store.upsert("course-7", &docs).await.expect_err("mixed dimensions");

    assert!(matches!(
        err,
        CourseRagError::StoreWrite {
            source: ProviderError::InvalidRequest(_),
            ..
        }
    ));
}

#[tokio::test]
async fn server_errors_on_write_are_store_write_errors() {
    let server = MockServer::start().await;
    mount_listing(&server, 1).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/uuid-7/upsert", collections_path())))
        .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
        .mount(&server)
        .await;

    let store = ChromaStore::new(&test_config(server.uri())).expect("valid config");
    let err = store
        .upsert("course-7", &[document(0, vec![1.0, 0.0])])
        .await
        .expect_err("server error");

    assert!(matches!(err, CourseRagError::StoreWrite { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn heartbeat_and_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/healthcheck"))
        .and(header("Authorization", "Bearer chroma-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "is_executor_ready": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = ChromaStore::new(&VectorStoreConfig {
        auth_token: Some("chroma-token".to_string()),
        ..test_config(server.uri())
    })
    .expect("valid config");

    store.heartbeat().await.expect("server is healthy");
}
