//! Continuation-token pagination over any list endpoint.
//!
//! A [`Paginator`] issues the first request with the base query, then one more
//! request per `meta.next_token`, merging the token into the query under the
//! endpoint's parameter name. Nothing is persisted: a new paginator always
//! starts from page one.
use crate::twitter::types::Envelope;
use epicosm_http::{Exchange, HttpClient, HttpError};
use futures::Stream;

/// A non-terminal page.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<serde_json::Value>,
    pub result_count: Option<u64>,
    pub next_token: Option<String>,
}

/// What one page request produced.
///
/// Callers react to `EndOfStream` and `SoftError` identically (stop, move to
/// the next target); the split only exists for logs.
#[derive(Debug, Clone)]
pub enum PageOutcome {
    Page(Page),
    EndOfStream,
    SoftError(String),
}

impl PageOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PageOutcome::Page(_))
    }

    /// Collapse an executor answer into a page outcome.
    ///
    /// `result_count == 0` is end-of-stream, an `errors` array or a missing
    /// `data` array is a soft error.
    pub fn from_exchange(exchange: Exchange) -> Self {
        let body = match exchange {
            Exchange::Success(body) => body,
            Exchange::Soft { status, body } => {
                return PageOutcome::SoftError(format!(
                    "HTTP {status}: {}",
                    epicosm_http::extract_error_message(body.as_bytes())
                ));
            }
        };

        let env: Envelope = match serde_json::from_value(body) {
            Ok(env) => env,
            Err(e) => return PageOutcome::SoftError(format!("malformed envelope: {e}")),
        };

        let meta = env.meta.clone().unwrap_or_default();
        if meta.result_count == Some(0) {
            return PageOutcome::EndOfStream;
        }
        if let Some(summary) = env.error_summary() {
            return PageOutcome::SoftError(summary);
        }
        match env.data {
            Some(data) => PageOutcome::Page(Page {
                data,
                result_count: meta.result_count,
                next_token: meta.next_token,
            }),
            None => PageOutcome::SoftError("response carries no data array".into()),
        }
    }
}

#[derive(Debug, Clone)]
enum PagerState {
    First,
    Next(String),
    Done,
}

pub struct Paginator<'a> {
    http: &'a HttpClient,
    path: String,
    query: Vec<(String, String)>,
    token_param: &'static str,
    target: String,
    state: PagerState,
    requests: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(
        http: &'a HttpClient,
        path: impl Into<String>,
        query: Vec<(String, String)>,
        token_param: &'static str,
    ) -> Self {
        let path = path.into();
        Self {
            http,
            target: path.clone(),
            path,
            query,
            token_param,
            state: PagerState::First,
            requests: 0,
        }
    }

    /// Label used in log events (a seed id, an account id).
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Number of requests issued so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Fetch the next page. After a terminal outcome no further request is made.
    pub async fn next_outcome(&mut self) -> Result<PageOutcome, HttpError> {
        let query = match &self.state {
            PagerState::Done => return Ok(PageOutcome::EndOfStream),
            PagerState::First => self.query.clone(),
            PagerState::Next(token) => {
                let mut q: Vec<(String, String)> = self
                    .query
                    .iter()
                    .filter(|(k, _)| k != self.token_param)
                    .cloned()
                    .collect();
                q.push((self.token_param.to_string(), token.clone()));
                q
            }
        };

        let exchange = self.http.get(&self.path, &query).await?;
        self.requests += 1;
        let outcome = PageOutcome::from_exchange(exchange);

        self.state = match &outcome {
            PageOutcome::Page(page) => match &page.next_token {
                Some(token) => PagerState::Next(token.clone()),
                None => PagerState::Done,
            },
            _ => PagerState::Done,
        };

        match &outcome {
            PageOutcome::Page(page) => tracing::debug!(
                target_id=%self.target,
                page=self.requests,
                items=page.data.len(),
                has_next=page.next_token.is_some(),
                "pager.page"
            ),
            PageOutcome::EndOfStream => tracing::info!(
                target_id=%self.target,
                page=self.requests,
                "pager.end_of_stream"
            ),
            PageOutcome::SoftError(detail) => tracing::warn!(
                target_id=%self.target,
                page=self.requests,
                detail=%detail,
                "pager.soft_error"
            ),
        }
        Ok(outcome)
    }

    /// Lazy, finite stream of pages. Ends at the first terminal outcome; only the
    /// fatal credential rejection surfaces as an error item.
    pub fn pages(self) -> impl Stream<Item = Result<Page, HttpError>> + 'a {
        let mut pager = self;
        async_stream::try_stream! {
            loop {
                match pager.next_outcome().await? {
                    PageOutcome::Page(page) => yield page,
                    PageOutcome::EndOfStream | PageOutcome::SoftError(_) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epicosm_http::StatusCode;
    use serde_json::json;

    fn outcome(body: serde_json::Value) -> PageOutcome {
        PageOutcome::from_exchange(Exchange::Success(body))
    }

    #[test]
    fn zero_count_errors_and_missing_data_are_all_terminal() {
        let empty = outcome(json!({"meta": {"result_count": 0}}));
        let errored = outcome(json!({"errors": [{"title": "Forbidden", "detail": "suspended"}]}));
        let no_data = outcome(json!({"meta": {"result_count": 3}}));

        assert!(matches!(empty, PageOutcome::EndOfStream));
        assert!(matches!(errored, PageOutcome::SoftError(ref d) if d.contains("suspended")));
        assert!(matches!(no_data, PageOutcome::SoftError(_)));
        assert!(empty.is_terminal() && errored.is_terminal() && no_data.is_terminal());
    }

    #[test]
    fn page_carries_continuation() {
        match outcome(json!({"data": [{"id": "1"}], "meta": {"result_count": 1, "next_token": "t2"}})) {
            PageOutcome::Page(page) => {
                assert_eq!(page.data.len(), 1);
                assert_eq!(page.next_token.as_deref(), Some("t2"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn soft_http_answer_is_soft_error() {
        let got = PageOutcome::from_exchange(Exchange::Soft {
            status: StatusCode::NOT_FOUND,
            body: r#"{"errors":[{"detail":"Could not find user"}]}"#.into(),
        });
        match got {
            PageOutcome::SoftError(detail) => {
                assert!(detail.contains("404"));
                assert!(detail.contains("Could not find user"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_envelope_is_soft() {
        assert!(matches!(outcome(json!({"data": "nope"})), PageOutcome::SoftError(_)));
    }
}
