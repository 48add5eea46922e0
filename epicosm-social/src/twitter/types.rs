use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{data, meta, errors}` shape every v2 endpoint answers with.
///
/// Items stay as raw JSON: follow edges keep whatever account metadata the API
/// returned, and posts are stored as documents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Envelope {
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub errors: Option<Vec<ApiError>>,
    // Top-level problem details appear on some error answers.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Meta {
    #[serde(default)]
    pub result_count: Option<u64>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiError {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl ApiError {
    pub fn summary(&self) -> String {
        self.detail
            .as_deref()
            .or(self.message.as_deref())
            .or(self.title.as_deref())
            .unwrap_or("unspecified error")
            .to_string()
    }
}

impl Envelope {
    /// First reported problem, if the payload carries one.
    pub fn error_summary(&self) -> Option<String> {
        let first = self.errors.as_ref().and_then(|e| e.first());
        match first {
            Some(err) => Some(match &self.title {
                Some(title) => format!("{title}: {}", err.summary()),
                None => err.summary(),
            }),
            None => None,
        }
    }
}

/// Account returned by the user-lookup endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}
