//! Error types for kiln-ai

use thiserror::Error;

/// Result type alias using kiln-ai Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when talking to a completion service
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response
    #[error("API error: {message} (type: {error_type})")]
    Api { error_type: String, message: String },

    /// Invalid API key
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Server-sent events error
    #[error("SSE error: {0}")]
    Sse(String),

    /// Unexpected response format
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Create an API error from type and message
    pub fn api(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            error_type: error_type.into(),
            message: message.into(),
        }
    }

    /// Human-readable detail for surfacing to users, without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Api { message, .. } => message.clone(),
            Error::Sse(msg) | Error::UnexpectedResponse(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_constructor() {
        let e = Error::api("quota_error", "Quota exceeded");
        assert_eq!(e.to_string(), "API error: Quota exceeded (type: quota_error)");
    }

    #[test]
    fn test_detail_strips_prefix() {
        assert_eq!(Error::api("x", "boom").detail(), "boom");
        assert_eq!(
            Error::UnexpectedResponse("No response generated".into()).detail(),
            "No response generated"
        );
        assert_eq!(Error::Sse("stream closed".into()).detail(), "stream closed");
        assert_eq!(
            Error::InvalidApiKey.detail(),
            "Invalid or missing API key"
        );
    }
}
