use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EditableContent {
    pub path: String,
    pub key: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// One `{path, key, content}` triple of a batched save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpdate {
    pub path: String,
    pub key: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub path: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBatchRequest {
    pub updates: Option<Vec<ContentUpdate>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SingleContentResponse {
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEntry {
    pub key: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageContentResponse {
    pub contents: Vec<ContentEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentBatchResponse {
    pub updated: Vec<EditableContent>,
}

/// Ensures a page path always starts with `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
