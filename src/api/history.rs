use async_trait::async_trait;
use thiserror::Error;

use crate::api::ChatMessageDto;
use crate::utils::url::construct_api_url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("history request failed with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("history request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Read side of the persisted transcript. The backend returns the most
/// recent window (50 entries) in chronological order; synthetic greetings
/// are never part of it.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn get_history(&self) -> Result<Vec<ChatMessageDto>, ApiError>;
}

pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl HttpChatBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_token: api_token.into(),
        }
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn get_history(&self) -> Result<Vec<ChatMessageDto>, ApiError> {
        let history_url = construct_api_url(&self.base_url, "chat/history");
        let response = self
            .client
            .get(history_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(ApiError::Status { status, body });
        }

        Ok(response.json::<Vec<ChatMessageDto>>().await?)
    }
}
