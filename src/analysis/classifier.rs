use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{RawResponse, TransportError};
use crate::sources::MediaKind;

/// The fixed set of failure categories shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    QuotaExceeded,
    ModelOverloaded,
    NetworkError,
    ValidationError,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::ModelOverloaded => "model_overloaded",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure, classified and carrying the text to show the user
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,

    /// HTTP status, when the failure came from a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

const OVERLOADED_MARKER: &str = "overloaded";

impl ClassifiedError {
    fn new(category: ErrorCategory, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            category,
            message: message.into(),
            retryable,
            status: None,
        }
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ValidationError, message, false)
    }

    pub fn missing_media(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::validation("Please upload a video file or enter a video URL."),
            _ => Self::validation("Please upload a file first."),
        }
    }

    pub fn file_too_large(kind: MediaKind, size_bytes: u64, ceiling_mb: u64) -> Self {
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        Self::validation(format!(
            "{} file is too large ({:.2} MB). Please use a file smaller than {} MB.\n\n{}",
            kind.label(),
            size_mb,
            ceiling_mb,
            kind.compression_tip()
        ))
    }

    pub fn unrecognized_youtube_url() -> Self {
        Self::validation(
            "Could not extract YouTube video ID from the provided URL. Please check the URL and try again.\n\n\
             Supported formats:\n\
             - https://www.youtube.com/watch?v=VIDEO_ID\n\
             - https://youtu.be/VIDEO_ID\n\
             - https://www.youtube.com/embed/VIDEO_ID\n\
             - https://www.youtube.com/shorts/VIDEO_ID",
        )
    }

    pub fn quota_exceeded(details: &str) -> Self {
        Self::new(
            ErrorCategory::QuotaExceeded,
            format!(
                "API quota exceeded. The inference API has rate limits for free usage.\n\n\
                 Please try again later or consider upgrading to a paid tier for higher quotas.\n\n\
                 Details: {}",
                details
            ),
            true,
        )
        .with_status(429)
    }

    pub fn model_overloaded() -> Self {
        Self::new(
            ErrorCategory::ModelOverloaded,
            "The model is currently overloaded with requests.\n\n\
             This is a temporary issue that occurs during peak usage times. Please try again in a few minutes.\n\n\
             Alternative options:\n\
             1. Try again with a smaller file\n\
             2. Try again during off-peak hours\n\
             3. Try the image recognition feature which uses a different model",
            true,
        )
        .with_status(503)
    }

    pub fn network(error: &TransportError, base_url: &str) -> Self {
        Self::new(
            ErrorCategory::NetworkError,
            format!(
                "Error connecting to the server: {}\n\n\
                 Please check your connection and make sure the server is running at {}.",
                error, base_url
            ),
            true,
        )
    }

    pub fn unknown(status: u16, raw: &str) -> Self {
        Self::new(
            ErrorCategory::Unknown,
            format!("Backend server error {}: {}", status, raw),
            false,
        )
        .with_status(status)
    }
}

/// Pull a human-readable message out of the usual error body shapes:
/// `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"error": {"error": {"message": "..."}}}`.
pub fn error_message(body: &Value) -> Option<&str> {
    let error = &body["error"];
    error
        .as_str()
        .or_else(|| error["message"].as_str())
        .or_else(|| error["error"]["message"].as_str())
}

/// Classify a non-success HTTP response.
///
/// Never fails: a body that is not JSON is treated as opaque text.
pub fn classify_response(response: &RawResponse) -> ClassifiedError {
    let raw = response.text();

    if let Ok(json) = serde_json::from_str::<Value>(&raw) {
        if let Some(message) = error_message(&json) {
            tracing::debug!("Backend error message: {}", message);
        }
    }

    if response.status == 429 {
        return ClassifiedError::quota_exceeded(&raw);
    }

    if response.status == 503 && raw.contains(OVERLOADED_MARKER) {
        return ClassifiedError::model_overloaded();
    }

    ClassifiedError::unknown(response.status, &raw)
}

/// Classify a failure where no response was received
pub fn classify_transport(error: &TransportError, base_url: &str) -> ClassifiedError {
    ClassifiedError::network(error, base_url)
}
