//! Backend abstraction for template selection and chat completion

use std::sync::Arc;

use async_trait::async_trait;
use kiln_ai::{ChatRequest, ChatResponse, TextGenerator};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{
    chat::ChatService,
    error::{Error, Result},
    template::{TemplateBundle, TemplateSelector},
};

/// The two round-trips a session makes
#[async_trait]
pub trait Backend: Send + Sync {
    /// Pick a starter template for `prompt`
    async fn template(&self, prompt: &str) -> Result<TemplateBundle>;

    /// Complete a conversation
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

/// Runs both services in-process against a text generator
#[derive(Clone)]
pub struct DirectBackend {
    selector: TemplateSelector,
    chat: ChatService,
}

impl DirectBackend {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            selector: TemplateSelector::new(Arc::clone(&generator)),
            chat: ChatService::new(generator),
        }
    }

    pub fn from_parts(selector: TemplateSelector, chat: ChatService) -> Self {
        Self { selector, chat }
    }
}

#[async_trait]
impl Backend for DirectBackend {
    async fn template(&self, prompt: &str) -> Result<TemplateBundle> {
        self.selector.select(prompt).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.chat.chat(request).await
    }
}

/// Body of a template request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRequest {
    pub prompt: String,
}

/// Error body returned by the backend server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Talks to a `kiln --serve` instance over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, T>(&self, route: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, route);
        tracing::debug!(url = %url, "backend request");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(kiln_ai::Error::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, &text));
        }

        Ok(response.json::<T>().await.map_err(kiln_ai::Error::from)?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn template(&self, prompt: &str) -> Result<TemplateBundle> {
        let request = TemplateRequest {
            prompt: prompt.to_string(),
        };
        self.post("template", &request).await
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.post("chat", &request).await
    }
}

/// Map a failed response onto an error; 403 means the prompt was rejected.
pub fn error_for_status(status: StatusCode, body: &str) -> Error {
    if status == StatusCode::FORBIDDEN {
        return Error::Forbidden;
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let detail = parsed
        .details
        .or(parsed.error)
        .or(parsed.message)
        .unwrap_or_else(|| format!("HTTP {}", status));
    tracing::warn!(status = %status, detail = %detail, "backend request failed");
    Error::Upstream(detail)
}
