//! Thin wrapper around the Twitter/X v2 endpoints the harvester touches.
//!
//! Auth, retries and status classification live in the shared [`HttpClient`];
//! this layer only shapes paths and query parameters.
use crate::twitter::pager::{PageOutcome, Paginator};
use crate::twitter::types::{ApiError, Envelope, User};
use epicosm_http::{Exchange, HttpClient, HttpError};
use time::{Duration, OffsetDateTime};

/// Fields requested for every post.
pub const TWEET_FIELDS: &str = "id,author_id,created_at,text";
/// Token parameter for user-scoped list endpoints.
const PAGINATION_TOKEN: &str = "pagination_token";
/// The user-lookup endpoint accepts at most this many handles per call.
pub const LOOKUP_CHUNK: usize = 100;
/// The recent-search index only reaches back this far.
const RECENT_INDEX_DAYS: i64 = 7;

#[derive(Clone)]
pub struct TwitterApi {
    http: HttpClient,
}

impl TwitterApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Accounts followed by `user_id`, `page_size` per page.
    pub fn following(&self, user_id: &str, page_size: u32) -> Paginator<'_> {
        Paginator::new(
            &self.http,
            format!("2/users/{user_id}/following"),
            vec![("max_results".into(), page_size.to_string())],
            PAGINATION_TOKEN,
        )
        .with_target(user_id)
    }

    /// Posts authored by `user_id`, newest first.
    pub fn timeline(&self, user_id: &str, page_size: u32) -> Paginator<'_> {
        Paginator::new(
            &self.http,
            format!("2/users/{user_id}/tweets"),
            vec![
                ("max_results".into(), page_size.to_string()),
                ("tweet.fields".into(), TWEET_FIELDS.into()),
            ],
            PAGINATION_TOKEN,
        )
        .with_target(user_id)
    }

    /// One bounded recent-search page for posts authored by `account_id`.
    ///
    /// The endpoint already limits itself to seven days; a shorter `lookback`
    /// adds an explicit `start_time`.
    pub async fn recent_from(
        &self,
        account_id: &str,
        max_results: u32,
        lookback: Duration,
    ) -> Result<PageOutcome, HttpError> {
        let mut params: Vec<(String, String)> = vec![
            ("query".into(), format!("from:{account_id}")),
            ("max_results".into(), max_results.to_string()),
            ("tweet.fields".into(), TWEET_FIELDS.into()),
        ];

        if lookback < Duration::days(RECENT_INDEX_DAYS) {
            let start = OffsetDateTime::now_utc() - lookback;
            if let Ok(stamp) = start.format(&time::format_description::well_known::Rfc3339) {
                params.push(("start_time".into(), stamp));
            }
        }

        let exchange = self.http.get("2/tweets/search/recent", &params).await?;
        let outcome = PageOutcome::from_exchange(exchange);
        tracing::debug!(
            account_id,
            terminal = outcome.is_terminal(),
            "twitter.recent_from"
        );
        Ok(outcome)
    }

    /// Resolve up to [`LOOKUP_CHUNK`] handles to persistent ids.
    ///
    /// Unknown or suspended handles come back in `errors` next to the resolved
    /// ones, so this does not go through the page classification. `None` means
    /// nothing usable came back for the whole chunk.
    pub async fn lookup_usernames(&self, handles: &[String]) -> Result<Option<Lookup>, HttpError> {
        let joined = handles.join(",");
        let body = match self
            .http
            .get("2/users/by", &[("usernames".to_string(), joined)])
            .await?
        {
            Exchange::Success(body) => body,
            Exchange::Soft { status, body } => {
                tracing::warn!(
                    %status,
                    handles = handles.len(),
                    message = %epicosm_http::extract_error_message(body.as_bytes()),
                    "twitter.lookup.soft_failure"
                );
                return Ok(None);
            }
        };

        let env: Envelope = match serde_json::from_value(body) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "twitter.lookup.malformed");
                return Ok(None);
            }
        };
        let users = env
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value::<User>(v).ok())
            .collect();
        let missing = env
            .errors
            .unwrap_or_default()
            .iter()
            .map(ApiError::summary)
            .collect();
        Ok(Some(Lookup { users, missing }))
    }
}

/// Result of one user-lookup call.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub users: Vec<User>,
    /// One message per handle the API could not resolve.
    pub missing: Vec<String>,
}
