//! Streaming event types and utilities

use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Events emitted while a completion is generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextEvent {
    /// A chunk of generated text
    Delta { text: String },
    /// Generation finished
    Done {
        #[serde(default)]
        finish_reason: Option<String>,
    },
    /// Error occurred
    Error { message: String },
}

impl TextEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TextEvent::Done { .. } | TextEvent::Error { .. })
    }
}

/// A stream of text events
pub type TextEventStream = Pin<Box<dyn Stream<Item = TextEvent> + Send>>;

/// Drain a stream into the full response text.
///
/// Stops at the first terminal event. An `Error` event becomes `Error::Api`.
pub async fn collect_text(mut stream: TextEventStream) -> Result<String> {
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        match event {
            TextEvent::Delta { text: delta } => text.push_str(&delta),
            TextEvent::Done { finish_reason } => {
                tracing::debug!(?finish_reason, len = text.len(), "completion finished");
                break;
            }
            TextEvent::Error { message } => {
                return Err(Error::api("stream_error", message));
            }
        }
    }

    Ok(text)
}
