use super::*;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, serde::Deserialize)]
struct Echo {
    value: u32,
}

#[test]
fn transient_classification() {
    assert!(ProviderError::Transport("reset".to_string()).is_transient());
    assert!(
        ProviderError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient()
    );
    assert!(
        ProviderError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient()
    );
    assert!(
        !ProviderError::Status {
            status: 401,
            body: String::new()
        }
        .is_transient()
    );
    assert!(!ProviderError::MalformedResponse("x".to_string()).is_transient());
}

#[test]
fn not_found_detection() {
    let err = ProviderError::Status {
        status: 404,
        body: "missing".to_string(),
    };
    assert!(err.is_not_found());
    assert!(!ProviderError::Transport("x".to_string()).is_not_found());
}

#[test]
fn base_url_normalization() {
    assert_eq!(
        normalize_base_url("http://localhost:8000/").expect("valid url"),
        "http://localhost:8000"
    );
    assert_eq!(
        normalize_base_url(" https://api.example.com/v1 ").expect("valid url"),
        "https://api.example.com/v1"
    );
    assert!(normalize_base_url("ftp://example.com").is_err());
    assert!(normalize_base_url("not a url").is_err());
}

#[test]
fn long_error_bodies_are_truncated() {
    let body = "x".repeat(MAX_ERROR_BODY_CHARS * 2);
    let truncated = truncate_body(&body);
    assert_eq!(truncated.len(), MAX_ERROR_BODY_CHARS + 3);
    assert!(truncated.ends_with("..."));
    assert_eq!(truncate_body("  short  "), "short");
}

#[test]
fn empty_bearer_is_ignored() {
    let client = JsonClient::new(Duration::from_secs(5), Some("   ".to_string()));
    assert!(!client.has_credentials());

    let client = JsonClient::new(Duration::from_secs(5), Some("token".to_string()));
    assert!(client.has_credentials());
}

#[tokio::test]
async fn post_sends_json_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("Authorization", "Bearer secret"))
        .and(body_json(json!({ "value": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": 8 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = JsonClient::new(Duration::from_secs(5), Some("secret".to_string()));
    let echo: Echo = client
        .post(format!("{}/echo", server.uri()), &json!({ "value": 7 }))
        .await
        .expect("post should succeed");

    assert_eq!(echo.value, 8);
}

#[tokio::test]
async fn error_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database on fire"))
        .mount(&server)
        .await;

    let client = JsonClient::new(Duration::from_secs(5), None);
    let err = client
        .get::<Echo>(format!("{}/broken", server.uri()))
        .await
        .expect_err("500 must fail");

    assert_eq!(
        err,
        ProviderError::Status {
            status: 500,
            body: "database on fire".to_string()
        }
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn malformed_json_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = JsonClient::new(Duration::from_secs(5), None);
    let err = client
        .get::<Echo>(format!("{}/garbage", server.uri()))
        .await
        .expect_err("html is not json");

    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn unreachable_host_is_transport_error() {
    let client = JsonClient::new(Duration::from_secs(2), None);
    let err = client
        .delete("http://127.0.0.1:9/collections/x".to_string())
        .await
        .expect_err("nothing listens on the discard port");

    assert!(matches!(err, ProviderError::Transport(_)));
}
