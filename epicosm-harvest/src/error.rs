use epicosm_common::EpicosmError;
use epicosm_http::HttpError;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Credential rejected upstream. Stops the whole run.
    #[error("bearer token rejected (401): {0}")]
    Unauthorized(String),

    #[error("http: {0}")]
    Http(HttpError),

    #[error("store: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Seeds(#[from] EpicosmError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown scoring algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("collection `{0}` has no text to score")]
    NotScorable(String),
}

impl From<HttpError> for HarvestError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Unauthorized(msg) => HarvestError::Unauthorized(msg),
            other => HarvestError::Http(other),
        }
    }
}

impl HarvestError {
    /// Errors that must end a multi-seed run instead of moving to the next seed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::Unauthorized(_))
    }
}
