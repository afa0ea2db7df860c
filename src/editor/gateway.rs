use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::models::{
    ContentBatchResponse, ContentEntry, ContentUpdate, EditableContent, PageContentResponse,
    SessionUserResponse, SingleContentResponse,
};

pub const GENERIC_SAVE_ERROR: &str = "Could not save changes";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success response, carrying the server's `error` message when it sent one.
    #[error("{}", .message.as_deref().unwrap_or(GENERIC_SAVE_ERROR))]
    Rejected { status: u16, message: Option<String> },
}

impl GatewayError {
    /// Message fit for showing to the editor.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Rejected { message: Some(message), .. } => message.clone(),
            _ => GENERIC_SAVE_ERROR.to_string(),
        }
    }
}

/// Read and batched-write access to persisted page copy.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn fetch_field(&self, path: &str, key: &str) -> Result<Option<String>, GatewayError>;
    async fn fetch_page(&self, path: &str) -> Result<Vec<ContentEntry>, GatewayError>;
    async fn save_contents(
        &self,
        updates: &[ContentUpdate],
    ) -> Result<Vec<EditableContent>, GatewayError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Talks to a running server. The session cookie set by `login` is kept in
/// the client's cookie store and sent with every later request.
pub struct HttpContentGateway {
    client: Client,
    base_url: String,
}

impl HttpContentGateway {
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUserResponse, GatewayError> {
        let res = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Ok(check(res).await?.json().await?)
    }

    pub async fn logout(&self) -> Result<(), GatewayError> {
        let res = self.client.post(self.url("/auth/logout")).send().await?;
        check(res).await?;
        Ok(())
    }
}

async fn check(res: Response) -> Result<Response, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let message = res
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|message| !message.is_empty());
    Err(GatewayError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ContentGateway for HttpContentGateway {
    async fn fetch_field(&self, path: &str, key: &str) -> Result<Option<String>, GatewayError> {
        let res = self
            .client
            .get(self.url("/content"))
            .query(&[("path", path), ("key", key)])
            .send()
            .await?;
        let body: SingleContentResponse = check(res).await?.json().await?;
        Ok(body.content)
    }

    async fn fetch_page(&self, path: &str) -> Result<Vec<ContentEntry>, GatewayError> {
        let res = self
            .client
            .get(self.url("/content"))
            .query(&[("path", path)])
            .send()
            .await?;
        let body: PageContentResponse = check(res).await?.json().await?;
        Ok(body.contents)
    }

    async fn save_contents(
        &self,
        updates: &[ContentUpdate],
    ) -> Result<Vec<EditableContent>, GatewayError> {
        let res = self
            .client
            .put(self.url("/content"))
            .json(&json!({ "updates": updates }))
            .send()
            .await?;
        let body: ContentBatchResponse = check(res).await?.json().await?;
        Ok(body.updated)
    }
}
