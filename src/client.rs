//! HTTP client for the chatbot backend.
//!
//! The backend owns the model conversation, footprint calculation and report
//! persistence; this side only speaks its JSON endpoints:
//!
//! | Method | Path                      | Reply                                   |
//! |--------|---------------------------|-----------------------------------------|
//! | POST   | `/start_conversation`     | `{response}`                            |
//! | POST   | `/send_message` `{text}`  | `{response}` or `{error}`               |
//! | POST   | `/generate_report`        | `{status, redirect_url}` or `{error}`   |
//! | POST   | `/api/clear_conversation` | `{status}`                              |
//! | GET    | `/api/history?limit=N`    | `[{id, created_at, ...}]`               |
//! | POST   | `/report/delete/{id}`     | `{message}`                             |
//!
//! Only `/send_message` is retried, and only when the connection itself failed.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;

/// Errors talking to the backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("invalid {0} header value")]
    InvalidHeader(&'static str),

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned {status}: {message}")]
    Status {
        endpoint: &'static str,
        status: u16,
        message: String,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    /// Only requests that never reached the backend are safe to resend.
    /// `/send_message` records the user line before replying, so any answer,
    /// 5xx included, is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { source, .. } => source.is_connect(),
            _ => false,
        }
    }
}

/// Footprint breakdown returned by backends that inline the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintSummary {
    pub total_kg_co2e: f64,
    #[serde(default)]
    pub details_kg_co2e: BTreeMap<String, f64>,
}

/// A successfully generated report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedReport {
    /// Absolute URL of the report page, when the backend redirects.
    pub redirect_url: Option<String>,
    pub narrative: Option<String>,
    pub summary: Option<FootprintSummary>,
}

/// Result of a `/generate_report` call that reached the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Ready(GeneratedReport),
    /// Backend declined; `fallback_url` points at the manual calculator when offered.
    Failed {
        reason: String,
        fallback_url: Option<String>,
    },
}

/// Row of the report history listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_conversation: Option<bool>,
}

/// Backend operations the chat session depends on.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    /// Open a conversation; returns the bot greeting.
    async fn start_conversation(&self) -> Result<String, BackendError>;

    /// Forward a user line; returns the bot reply.
    async fn send_message(&self, text: &str) -> Result<String, BackendError>;

    /// Ask the backend to build the report from the conversation so far.
    async fn generate_report(&self) -> Result<ReportOutcome, BackendError>;

    /// Drop the server-side conversation state.
    async fn clear_conversation(&self) -> Result<(), BackendError>;
}

#[derive(Deserialize)]
struct BotReply {
    response: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Deserialize, Default)]
struct ReportResponse {
    status: Option<String>,
    redirect_url: Option<String>,
    error: Option<String>,
    redirect: Option<String>,
    narrative_report: Option<String>,
    data_for_dashboard: Option<FootprintSummary>,
}

const START: &str = "/start_conversation";
const SEND: &str = "/send_message";
const REPORT: &str = "/generate_report";
const CLEAR: &str = "/api/clear_conversation";
const HISTORY: &str = "/api/history";
const DELETE: &str = "/report/delete";

/// reqwest-backed [`ChatBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: Url,
    send_attempts: u32,
    retry_backoff: Duration,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.session_cookie {
            let value =
                HeaderValue::from_str(cookie).map_err(|_| BackendError::InvalidHeader("Cookie"))?;
            headers.insert(COOKIE, value);
        }

        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("pegada/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|source| BackendError::Transport {
                endpoint: "client",
                source,
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            send_attempts: config.send_attempts.max(1),
            retry_backoff: config.retry_backoff,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Most recent reports, newest first.
    pub async fn list_history(&self, limit: u32) -> Result<Vec<HistoryEntry>, BackendError> {
        let mut url = self.endpoint(HISTORY)?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                endpoint: HISTORY,
                source,
            })?;
        let (status, body) = read_body(HISTORY, response).await?;
        decode_json(HISTORY, status, &body)
    }

    /// Browser page for a history entry.
    pub fn report_page_url(&self, id: i64) -> String {
        resolve(&self.base_url, &format!("history/{id}"))
    }

    /// Delete one report; returns the backend's confirmation text.
    pub async fn delete_report(&self, id: i64) -> Result<String, BackendError> {
        let path = format!("{DELETE}/{id}");
        let (status, body) = self.post(DELETE, &path, None).await?;
        let reply: MessageBody = decode_json(DELETE, status, &body)?;
        Ok(reply.message)
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| BackendError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn post(
        &self,
        endpoint: &'static str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, String), BackendError> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let request = match body {
            Some(json) => self.http.post(url).json(&json),
            None => self.http.post(url).json(&serde_json::json!({})),
        };
        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Transport { endpoint, source })?;
        read_body(endpoint, response).await
    }

    async fn send_once(&self, text: &str) -> Result<String, BackendError> {
        let (status, body) = self
            .post(SEND, SEND, Some(serde_json::json!({ "text": text })))
            .await?;
        let reply: BotReply = decode_json(SEND, status, &body)?;
        Ok(reply.response)
    }
}

impl ChatBackend for HttpBackend {
    async fn start_conversation(&self) -> Result<String, BackendError> {
        let (status, body) = self.post(START, START, None).await?;
        let reply: BotReply = decode_json(START, status, &body)?;
        Ok(reply.response)
    }

    async fn send_message(&self, text: &str) -> Result<String, BackendError> {
        let mut attempt = 1;
        loop {
            match self.send_once(text).await {
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_retryable() && attempt < self.send_attempts => {
                    warn!(attempt, max = self.send_attempts, error = %e, "send_message failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn generate_report(&self) -> Result<ReportOutcome, BackendError> {
        let (status, body) = self.post(REPORT, REPORT, None).await?;
        decode_report(&self.base_url, status, &body)
    }

    async fn clear_conversation(&self) -> Result<(), BackendError> {
        let (status, body) = self.post(CLEAR, CLEAR, None).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(CLEAR, status, &body))
        }
    }
}

async fn read_body(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<(StatusCode, String), BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| BackendError::Transport { endpoint, source })?;
    debug!(endpoint, status = status.as_u16(), bytes = body.len(), "response");
    Ok((status, body))
}

fn decode_json<T: DeserializeOwned>(
    endpoint: &'static str,
    status: StatusCode,
    body: &str,
) -> Result<T, BackendError> {
    if !status.is_success() {
        return Err(status_error(endpoint, status, body));
    }
    serde_json::from_str(body).map_err(|source| BackendError::Decode { endpoint, source })
}

fn status_error(endpoint: &'static str, status: StatusCode, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .or(parsed.message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    BackendError::Status {
        endpoint,
        status: status.as_u16(),
        message,
    }
}

fn decode_report(base: &Url, status: StatusCode, body: &str) -> Result<ReportOutcome, BackendError> {
    let parsed: ReportResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if !status.is_success() => return Err(status_error(REPORT, status, body)),
        Err(source) => {
            return Err(BackendError::Decode {
                endpoint: REPORT,
                source,
            });
        }
    };

    let inline = parsed.narrative_report.is_some() || parsed.data_for_dashboard.is_some();
    let succeeded = match parsed.status.as_deref() {
        Some(s) => s == "success",
        None => status.is_success() && parsed.error.is_none() && inline,
    };

    if succeeded {
        return Ok(ReportOutcome::Ready(GeneratedReport {
            redirect_url: parsed.redirect_url.map(|u| resolve(base, &u)),
            narrative: parsed.narrative_report,
            summary: parsed.data_for_dashboard,
        }));
    }

    let reason = parsed
        .error
        .unwrap_or_else(|| match parsed.status {
            Some(s) => format!("backend reported status {s:?}"),
            None => format!("backend returned {status}"),
        });
    Ok(ReportOutcome::Failed {
        reason,
        fallback_url: parsed.redirect.map(|u| resolve(base, &u)),
    })
}

/// Resolve a possibly relative redirect against the backend root.
fn resolve(base: &Url, target: &str) -> String {
    base.join(target.trim_start_matches('/'))
        .map(String::from)
        .unwrap_or_else(|_| target.to_string())
}
