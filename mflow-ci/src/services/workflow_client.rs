//! Workflow API client
//!
//! Issues calls against the remote content-discovery workflow endpoint,
//! applies the transient-failure cooldown/retry policy, and archives every
//! raw response body to a dated audit file for offline replay.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = "mflow-ci/0.1.0";

/// Application-level status signalling "request rate exceeded, retry later"
pub const CODE_RATE_LIMITED: i64 = 4013;
/// Application-level status signalling "remote service overloaded, retry later"
pub const CODE_SERVICE_OVERLOADED: i64 = 4027;

/// Workflow client errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Network or HTTP-level failure (retried within the ceiling)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the envelope shape (not retried)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Terminal application-level failure reported by the workflow
    #[error("Workflow error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// Retry ceiling reached while the failure stayed transient
    #[error("Retries exhausted after {attempts} attempts: {detail}")]
    RetryExhausted { attempts: u32, detail: String },
}

/// Raw response envelope from the workflow endpoint.
///
/// `data` is itself a JSON-encoded string; decoding it is the response
/// decoder's job, not the client's.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEnvelope {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Value,
}

/// The remote workflows this service invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    SearchNotes,
    AuthorNotes,
    NoteDetail,
    Comments,
    TopicSnapshot,
}

impl WorkflowKind {
    /// Fixed workflow identifier on the remote service
    pub fn workflow_id(&self) -> &'static str {
        match self {
            WorkflowKind::SearchNotes => "7480441452158648331",
            WorkflowKind::AuthorNotes => "7480852360857714739",
            WorkflowKind::NoteDetail => "7480909217434271071",
            WorkflowKind::Comments => "7480911530259172519",
            WorkflowKind::TopicSnapshot => "7480974048203358642",
        }
    }

    /// Call-site name used for audit log files
    pub fn call_site(&self) -> &'static str {
        match self {
            WorkflowKind::SearchNotes => "search_notes",
            WorkflowKind::AuthorNotes => "author_notes",
            WorkflowKind::NoteDetail => "note_detail",
            WorkflowKind::Comments => "comments",
            WorkflowKind::TopicSnapshot => "topic_snapshot",
        }
    }
}

/// Client configuration, resolved from TOML + environment
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_token: String,
    pub session_cookie: Option<String>,
    pub max_retries: u32,
    pub cooldown: Duration,
    pub min_interval: Duration,
    pub timeout: Duration,
    pub audit_dir: PathBuf,
}

/// Rate limiter enforcing a minimum interval between outbound calls
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Is this application code a transient condition worth retrying?
pub fn is_transient_code(code: i64) -> bool {
    code == CODE_RATE_LIMITED || code == CODE_SERVICE_OVERLOADED
}

/// Workflow API client
pub struct WorkflowClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    config: ClientConfig,
}

impl WorkflowClient {
    pub fn new(config: ClientConfig) -> Result<Self, WorkflowError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config.min_interval)),
            config,
        })
    }

    /// Invoke a workflow with the given parameters.
    ///
    /// The shared session cookie is injected into the parameter set when
    /// the caller did not supply one. Transient failures (rate limit,
    /// overload, transport) cool down and retry the same call; the retry
    /// ceiling is strictly enforced for every transient kind.
    pub async fn invoke(
        &self,
        kind: WorkflowKind,
        parameters: Map<String, Value>,
    ) -> Result<RawEnvelope, WorkflowError> {
        let mut params = parameters;
        if let Some(cookie) = &self.config.session_cookie {
            params
                .entry("cookie".to_string())
                .or_insert_with(|| Value::String(cookie.clone()));
        }

        let body = serde_json::json!({
            "parameters": params,
            "workflow_id": kind.workflow_id(),
        });

        let mut retries = 0u32;

        loop {
            self.rate_limiter.wait().await;

            let envelope = match self.send_once(kind, &body).await {
                Ok(envelope) => envelope,
                Err(WorkflowError::Transport(detail)) => {
                    if retries >= self.config.max_retries {
                        return Err(WorkflowError::RetryExhausted {
                            attempts: retries,
                            detail,
                        });
                    }
                    retries += 1;
                    tracing::warn!(
                        workflow = kind.call_site(),
                        retries,
                        detail = %detail,
                        "Transport failure, cooling down before retry"
                    );
                    tokio::time::sleep(self.config.cooldown).await;
                    continue;
                }
                Err(other) => return Err(other),
            };

            match envelope.code {
                0 => return Ok(envelope),
                code if is_transient_code(code) => {
                    if retries >= self.config.max_retries {
                        return Err(WorkflowError::RetryExhausted {
                            attempts: retries,
                            detail: format!("workflow code {}", code),
                        });
                    }
                    retries += 1;
                    tracing::warn!(
                        workflow = kind.call_site(),
                        code,
                        retries,
                        "Transient workflow status, cooling down before retry"
                    );
                    tokio::time::sleep(self.config.cooldown).await;
                }
                code => {
                    tracing::error!(
                        workflow = kind.call_site(),
                        code,
                        msg = %envelope.msg,
                        "Workflow call failed"
                    );
                    return Err(WorkflowError::Api {
                        code,
                        msg: envelope.msg,
                    });
                }
            }
        }
    }

    /// One outbound call: POST, archive the verbatim body, parse the envelope
    async fn send_once(&self, kind: WorkflowKind, body: &Value) -> Result<RawEnvelope, WorkflowError> {
        tracing::debug!(workflow = kind.call_site(), "Invoking workflow endpoint");

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::Transport(format!("HTTP {}", status)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| WorkflowError::Transport(e.to_string()))?;

        self.archive_response(kind.call_site(), &text);

        serde_json::from_str(&text).map_err(|e| {
            WorkflowError::Protocol(format!(
                "malformed envelope: {} (body: {})",
                e,
                crate::services::envelope::excerpt(&text)
            ))
        })
    }

    /// Persist the verbatim response body to a dated, call-site-scoped file.
    ///
    /// Audit writes are best-effort: a failure is logged and never fails
    /// the call itself.
    fn archive_response(&self, call_site: &str, body: &str) {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = self
            .config
            .audit_dir
            .join(format!("{}_{}.json", call_site, timestamp));

        let result = std::fs::create_dir_all(&self.config.audit_dir)
            .and_then(|_| std::fs::write(&path, body));

        match result {
            Ok(()) => tracing::debug!(path = %path.display(), "Archived workflow response"),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to archive workflow response"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ClientConfig {
        ClientConfig {
            endpoint: "http://127.0.0.1:9/run".to_string(),
            api_token: "test-token".to_string(),
            session_cookie: Some("session=abc".to_string()),
            max_retries: 3,
            cooldown: Duration::from_millis(10),
            min_interval: Duration::from_millis(0),
            timeout: Duration::from_secs(5),
            audit_dir: std::env::temp_dir().join("mflow-audit-test"),
        }
    }

    #[test]
    fn client_creation() {
        let client = WorkflowClient::new(test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn transient_codes() {
        assert!(is_transient_code(CODE_RATE_LIMITED));
        assert!(is_transient_code(CODE_SERVICE_OVERLOADED));
        assert!(!is_transient_code(0));
        assert!(!is_transient_code(700012));
    }

    #[test]
    fn workflow_ids_are_distinct() {
        let kinds = [
            WorkflowKind::SearchNotes,
            WorkflowKind::AuthorNotes,
            WorkflowKind::NoteDetail,
            WorkflowKind::Comments,
            WorkflowKind::TopicSnapshot,
        ];
        for a in &kinds {
            for b in &kinds {
                if a != b {
                    assert_ne!(a.workflow_id(), b.workflow_id());
                    assert_ne!(a.call_site(), b.call_site());
                }
            }
        }
    }

    #[tokio::test]
    async fn rate_limiter_timing() {
        let limiter = RateLimiter::new(Duration::from_millis(100));

        let start = Instant::now();
        limiter.wait().await;
        let first_elapsed = start.elapsed();
        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(50));
        assert!(second_elapsed >= Duration::from_millis(90));
    }
}
