// Blocking JSON-over-HTTP plumbing shared by the provider clients.
// Requests run on tokio's blocking pool so callers can fan them out concurrently.

#[cfg(test)]
mod tests;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::CourseRagError;

/// Longest response body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

impl ProviderError {
    /// Transport failures, rate limiting and server errors are worth retrying
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MalformedResponse(_) | Self::InvalidRequest(_) | Self::Backend(_) => false,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Validate a configured base URL and strip any trailing slash so endpoint paths can be appended
#[inline]
pub fn normalize_base_url(raw: &str) -> crate::Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed)
        .map_err(|e| CourseRagError::Config(format!("Invalid base URL '{}': {}", raw, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CourseRagError::Config(format!(
            "Base URL '{}' must use http or https",
            raw
        )));
    }

    Ok(trimmed.to_string())
}

/// JSON client with a per-request timeout and optional bearer authentication
#[derive(Debug, Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
    bearer: Option<String>,
}

impl JsonClient {
    #[inline]
    pub fn new(timeout: Duration, bearer: Option<String>) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            agent,
            bearer: bearer.filter(|token| !token.trim().is_empty()),
        }
    }

    #[inline]
    pub fn has_credentials(&self) -> bool {
        self.bearer.is_some()
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post<B, R>(&self, url: String, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let payload = serde_json::to_string(body)
            .map_err(|e| ProviderError::InvalidRequest(format!("cannot encode body: {}", e)))?;
        let text = self.post_raw(url, payload).await?;
        decode(&text)
    }

    /// POST a JSON body, ignoring whatever the server answers on success
    pub async fn post_discard<B>(&self, url: String, body: &B) -> Result<(), ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(body)
            .map_err(|e| ProviderError::InvalidRequest(format!("cannot encode body: {}", e)))?;
        self.post_raw(url, payload).await.map(|_| ())
    }

    pub async fn get<R>(&self, url: String) -> Result<R, ProviderError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let agent = self.agent.clone();
        let bearer = self.bearer.clone();

        let text = run_blocking(move || {
            debug!("GET {}", url);
            let mut request = agent.get(url.as_str());
            if let Some(token) = bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            read_response(&url, request.call())
        })
        .await?;

        decode(&text)
    }

    pub async fn delete(&self, url: String) -> Result<(), ProviderError> {
        let agent = self.agent.clone();
        let bearer = self.bearer.clone();

        run_blocking(move || {
            debug!("DELETE {}", url);
            let mut request = agent.delete(url.as_str());
            if let Some(token) = bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            read_response(&url, request.call()).map(|_| ())
        })
        .await
    }

    async fn post_raw(&self, url: String, payload: String) -> Result<String, ProviderError> {
        let agent = self.agent.clone();
        let bearer = self.bearer.clone();

        run_blocking(move || {
            debug!("POST {} ({} bytes)", url, payload.len());
            let mut request = agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(token) = bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            read_response(&url, request.send(&payload))
        })
        .await
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ProviderError::Transport(format!("request task failed: {}", e)))?
}

fn read_response(
    url: &str,
    result: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<String, ProviderError> {
    let mut response = result.map_err(|e| {
        warn!("Transport error calling {}: {}", url, e);
        ProviderError::Transport(e.to_string())
    })?;

    let status = response.status();
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| ProviderError::Transport(format!("failed to read response body: {}", e)))?;

    if !status.is_success() {
        warn!("{} answered with HTTP {}", url, status.as_u16());
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    Ok(body)
}

fn decode<R: DeserializeOwned>(text: &str) -> Result<R, ProviderError> {
    serde_json::from_str(text).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.trim().to_string()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", head.trim_end())
    }
}
