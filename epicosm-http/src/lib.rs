//! Authenticated GET executor for the harvesting pipeline.
//!
//! - One bearer credential, fixed at construction, rides on every request
//! - Responses are classified: `200` parses as JSON, `429`/`503` and transport
//!   failures retry forever on the [`BackoffPolicy`] schedule, `401` is fatal,
//!   anything else is handed back untouched as [`Exchange::Soft`]
//! - Secrets never reach the logs; only the auth kind is recorded
//!
//! Example (no_run):
//! ```rust,no_run
//! # async fn demo() -> Result<(), epicosm_http::HttpError> {
//! use epicosm_http::{BackoffPolicy, BearerToken, Exchange, HttpClient};
//!
//! let client = HttpClient::new(
//!     "https://api.twitter.com",
//!     BearerToken::new("token")?,
//!     BackoffPolicy::default(),
//! )?;
//! match client.get("2/users/12/following", &[("max_results".into(), "1000".into())]).await? {
//!     Exchange::Success(body) => println!("{body}"),
//!     Exchange::Soft { status, .. } => println!("upstream said {status}"),
//! }
//! # Ok(()) }
//! ```
//!
//! Observability: structured `tracing` events are emitted for request start,
//! rate-limit headers, retries, soft failures, and the fatal auth rejection.

pub mod backoff;

pub use backoff::{BackoffPolicy, BackoffSchedule, Pause, RecordingPause, TokioPause};
pub use reqwest::StatusCode;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = "v2FullArchiveSearchPython";

// ==============================
// Errors
// ==============================

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("client build failed: {0}")]
    Build(String),
    /// The upstream rejected the credential. Waiting never fixes this.
    #[error("bearer token rejected (401): {0}")]
    Unauthorized(String),
}

// ==============================
// Credential
// ==============================

/// Process-wide bearer credential. Sanitised once; `Debug` never shows it.
#[derive(Clone)]
pub struct BearerToken(Arc<str>);

impl BearerToken {
    pub fn new(raw: &str) -> Result<Self, HttpError> {
        Ok(Self(Arc::from(sanitize_api_key(raw)?)))
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

// ==============================
// Outcomes
// ==============================

/// What a caller gets back once retries are exhausted by a non-transient answer.
#[derive(Debug, Clone)]
pub enum Exchange {
    /// `200` with a JSON body.
    Success(Value),
    /// Any other non-fatal answer, body passed through for inspection.
    Soft { status: StatusCode, body: String },
}

/// Classification of a single round trip.
#[derive(Debug)]
enum Attempt {
    Success(Value),
    Transient { status: Option<StatusCode>, reason: String },
    Fatal(String),
    Soft { status: StatusCode, body: String },
}

// ==============================
// Client
// ==============================

#[derive(Clone)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    token: BearerToken,
    backoff: BackoffPolicy,
    pause: Arc<dyn Pause>,
    pub default_timeout: Duration,
}

impl HttpClient {
    /// Construct a client anchored to a base URL.
    ///
    /// ```no_run
    /// use epicosm_http::{BackoffPolicy, BearerToken, HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new(
    ///     "https://api.twitter.com",
    ///     BearerToken::new("token")?,
    ///     BackoffPolicy::default(),
    /// )?;
    /// assert_eq!(client.default_timeout, Duration::from_secs(30));
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str, token: BearerToken, backoff: BackoffPolicy) -> Result<Self, HttpError> {
        Self::with_user_agent(base, token, backoff, DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(
        base: &str,
        token: BearerToken,
        backoff: BackoffPolicy,
        user_agent: &str,
    ) -> Result<Self, HttpError> {
        let base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent).map_err(|e| HttpError::Build(e.to_string()))?,
        );
        let inner = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            token,
            backoff,
            pause: Arc::new(TokioPause),
            default_timeout: Duration::from_secs(30),
        })
    }

    /// Swap the retry sleeper (tests record instead of sleeping).
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Issue one logical GET, retrying transient failures until something else happens.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Exchange, HttpError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| HttpError::Url(e.to_string()))?;

        let req_id = format!(
            "r{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let mut schedule = self.backoff.schedule();
        let mut attempt = 0u64;

        loop {
            attempt += 1;
            tracing::debug!(
                req_id=%req_id,
                attempt,
                host_path=%format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query=?query,
                auth_kind="bearer",
                "http.request.start"
            );

            match self.attempt_once(&url, query, &req_id).await {
                Attempt::Success(body) => return Ok(Exchange::Success(body)),
                Attempt::Soft { status, body } => {
                    tracing::warn!(
                        req_id=%req_id,
                        %status,
                        message=%extract_error_message(body.as_bytes()),
                        "http.soft_failure"
                    );
                    return Ok(Exchange::Soft { status, body });
                }
                Attempt::Fatal(message) => {
                    tracing::error!(req_id=%req_id, message=%message, "http.unauthorized");
                    return Err(HttpError::Unauthorized(message));
                }
                Attempt::Transient { status, reason } => {
                    let units = schedule.next().unwrap_or(self.backoff.cap);
                    let delay = self.backoff.to_duration(units);
                    tracing::warn!(
                        req_id=%req_id,
                        status=?status,
                        attempt,
                        backoff_units=units,
                        backoff_ms=delay.as_millis() as u64,
                        reason=%reason,
                        "http.retrying"
                    );
                    self.pause.pause(delay).await;
                }
            }
        }
    }

    async fn attempt_once(&self, url: &Url, query: &[(String, String)], req_id: &str) -> Attempt {
        let rb = self
            .inner
            .get(url.clone())
            .timeout(self.default_timeout)
            .query(query)
            .bearer_auth(self.token.expose());

        let t0 = std::time::Instant::now();
        let resp = match rb.send().await {
            Ok(resp) => resp,
            Err(err) => {
                return Attempt::Transient {
                    status: None,
                    reason: format!("send failed: {err}"),
                };
            }
        };
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return Attempt::Transient {
                    status: Some(status),
                    reason: format!("body read failed: {err}"),
                };
            }
        };

        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        tracing::debug!(
            req_id=%req_id,
            %status,
            duration_ms=t0.elapsed().as_millis() as u64,
            body_len=bytes.len(),
            rate_limit.limit=?header("x-rate-limit-limit"),
            rate_limit.remaining=?header("x-rate-limit-remaining"),
            rate_limit.reset=?header("x-rate-limit-reset"),
            "http.response.headers"
        );

        classify(status, &bytes)
    }
}

fn classify(status: StatusCode, bytes: &[u8]) -> Attempt {
    match status {
        StatusCode::OK => match serde_json::from_slice::<Value>(bytes) {
            Ok(body) => Attempt::Success(body),
            Err(e) => Attempt::Soft {
                status,
                body: format!("undecodable body ({e}): {}", snip_body(bytes)),
            },
        },
        StatusCode::TOO_MANY_REQUESTS => Attempt::Transient {
            status: Some(status),
            reason: "rate limited".into(),
        },
        StatusCode::SERVICE_UNAVAILABLE => Attempt::Transient {
            status: Some(status),
            reason: "upstream unavailable".into(),
        },
        StatusCode::UNAUTHORIZED => Attempt::Fatal(extract_error_message(bytes)),
        _ => Attempt::Soft {
            status,
            body: String::from_utf8_lossy(bytes).into_owned(),
        },
    }
}

// ==============================
// Helpers
// ==============================

/// Pull a human-readable message out of a Twitter-style error body.
pub fn extract_error_message(body: &[u8]) -> String {
    // Twitter: {"errors":[{"message":"...", "detail":"...", "title":"..."}]}
    #[derive(Deserialize)]
    struct TwErrors {
        errors: Vec<TwErr>,
    }
    #[derive(Deserialize)]
    struct TwErr {
        #[serde(default)]
        message: String,
        #[serde(default)]
        detail: String,
        #[serde(default)]
        title: String,
    }

    // Problem details: {"title":"...","detail":"..."}
    #[derive(Deserialize)]
    struct Problem {
        #[serde(default)]
        title: String,
        #[serde(default)]
        detail: String,
    }

    if let Ok(tw) = serde_json::from_slice::<TwErrors>(body) {
        if let Some(first) = tw.errors.into_iter().next() {
            for candidate in [first.message, first.detail, first.title] {
                if !candidate.is_empty() {
                    return candidate;
                }
            }
        }
    }
    if let Ok(p) = serde_json::from_slice::<Problem>(body) {
        if !p.detail.is_empty() {
            return p.detail;
        }
        if !p.title.is_empty() {
            return p.title;
        }
    }
    snip_body(body)
}

fn snip_body(body: &[u8]) -> String {
    let mut snip = String::from_utf8_lossy(body).to_string();
    if snip.len() > 500 {
        let mut cut = 500;
        while !snip.is_char_boundary(cut) {
            cut -= 1;
        }
        snip.truncate(cut);
        snip.push_str("...");
    }
    snip
}

fn sanitize_api_key(raw: &str) -> Result<String, HttpError> {
    let mut s = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    s.retain(|ch| !ch.is_ascii_whitespace());

    if s.is_empty() {
        return Err(HttpError::Build("bearer token is empty".into()));
    }
    if !s.is_ascii() {
        return Err(HttpError::Build("bearer token contains non-ASCII bytes".into()));
    }
    if s.bytes().any(|b| b < 0x20 || b == 0x7F) {
        return Err(HttpError::Build(
            "bearer token contains control characters".into(),
        ));
    }

    HeaderValue::from_str(&format!("Bearer {}", s))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(s)
}
