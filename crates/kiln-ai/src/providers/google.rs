//! Gemini provider over `streamGenerateContent` with SSE framing

use crate::{
    error::{Error, Result},
    providers::{TextGenerator, get_api_key},
    stream::{TextEvent, TextEventStream},
    types::{GenerationConfig, Model},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

/// Environment variables checked for a Gemini key, in order
pub const API_KEY_ENV_VARS: &[&str] = &["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Gemini client bound to one model
pub struct GoogleProvider {
    client: reqwest::Client,
    api_key: String,
    model: Model,
}

impl GoogleProvider {
    pub fn new(api_key: impl Into<String>, model: Model) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
        }
    }

    /// Read the key from `GOOGLE_API_KEY` or `GEMINI_API_KEY`
    pub fn from_env(model: Model) -> Result<Self> {
        let api_key = get_api_key(None, API_KEY_ENV_VARS)?;
        Ok(Self::new(api_key, model))
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.model.base_url.trim_end_matches('/'),
            self.model.id,
            self.api_key
        )
    }
}

#[async_trait]
impl TextGenerator for GoogleProvider {
    async fn stream(&self, prompt: &str) -> Result<TextEventStream> {
        tracing::debug!(model = %self.model.id, prompt_len = prompt.len(), "gemini request");

        let body = GenerateRequest::single_turn(prompt, &self.model.generation);
        let request = self.client.post(self.endpoint()).json(&body);
        let source = EventSource::new(request)
            .map_err(|e| Error::Sse(format!("Failed to open stream: {}", e)))?;

        Ok(Box::pin(text_events(source)))
    }
}

/// Text and finish reason carried by one SSE payload
#[derive(Debug, Default, PartialEq)]
struct Chunk {
    texts: Vec<String>,
    finish_reason: Option<String>,
}

/// Decode one `data:` payload. Error envelopes become `Error::Api`.
fn decode_chunk(data: &str) -> Result<Chunk> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(data) {
        let status = envelope.error.status.unwrap_or_else(|| "gemini_error".to_string());
        return Err(Error::api(status, envelope.error.message));
    }

    let response: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::UnexpectedResponse(format!("Failed to parse chunk: {}", e)))?;

    let mut chunk = Chunk::default();
    for candidate in response.candidates {
        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        chunk.texts.extend(parts.into_iter().filter_map(|p| p.text));
        if candidate.finish_reason.is_some() {
            chunk.finish_reason = candidate.finish_reason;
        }
    }
    Ok(chunk)
}

fn text_events(mut source: EventSource) -> impl futures::Stream<Item = TextEvent> {
    stream! {
        let mut finish_reason = None;

        while let Some(event) = source.next().await {
            let message = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => message,
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    yield TextEvent::Error { message: format!("SSE error: {}", e) };
                    return;
                }
            };

            let data = message.data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }

            match decode_chunk(data) {
                Ok(chunk) => {
                    for text in chunk.texts {
                        yield TextEvent::Delta { text };
                    }
                    finish_reason = chunk.finish_reason.or(finish_reason);
                }
                Err(e) => {
                    source.close();
                    yield TextEvent::Error { message: e.detail() };
                    return;
                }
            }
        }

        yield TextEvent::Done { finish_reason };
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationSettings,
}

impl GenerateRequest {
    fn single_turn(prompt: &str, generation: &GenerationConfig) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationSettings {
                max_output_tokens: generation.max_output_tokens,
                temperature: generation.temperature,
                top_p: generation.top_p,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    message: String,
    status: Option<String>,
}
