//! Wire-level request descriptions and the transport that sends them.
//!
//! Payloads are plain data so they can be inspected (and logged) before a
//! request is built; [`HttpTransport`] turns them into reqwest calls.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part as FormPart};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Backend endpoints, all relative to the configured base URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Endpoint {
    ProcessImage,
    ProcessAudio,
    ProcessVideo,
    ProcessVideoUrl,
    ProcessYoutube,
    ConvertVideo,
    CreateShareableLink,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ProcessImage => "process-image",
            Endpoint::ProcessAudio => "process-audio",
            Endpoint::ProcessVideo => "process-video",
            Endpoint::ProcessVideoUrl => "process-video-url",
            Endpoint::ProcessYoutube => "process-youtube",
            Endpoint::ConvertVideo => "convert-video",
            Endpoint::CreateShareableLink => "create-shareable-link",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.path())
    }
}

/// One multipart field
#[derive(Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime_type: String,
        bytes: Vec<u8>,
    },
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Part::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Part::Text { name, .. } | Part::File { name, .. } => name,
        }
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Part::Text { name, value } => write!(f, "{}={:?}", name, value),
            Part::File {
                name,
                file_name,
                mime_type,
                bytes,
            } => write!(f, "{}=<{} {} {} bytes>", name, file_name, mime_type, bytes.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Multipart(Vec<Part>),
    Json(serde_json::Value),
}

/// A fully described POST request
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub endpoint: Endpoint,
    pub body: Body,
}

impl Payload {
    pub fn multipart(endpoint: Endpoint, parts: Vec<Part>) -> Self {
        Self {
            endpoint,
            body: Body::Multipart(parts),
        }
    }

    pub fn json(endpoint: Endpoint, value: serde_json::Value) -> Self {
        Self {
            endpoint,
            body: Body::Json(value),
        }
    }

    /// Look up a text field (multipart) or a string member (JSON)
    pub fn text_field(&self, name: &str) -> Option<&str> {
        match &self.body {
            Body::Multipart(parts) => parts.iter().find_map(|part| match part {
                Part::Text { name: n, value } if n == name => Some(value.as_str()),
                _ => None,
            }),
            Body::Json(value) => value.get(name).and_then(|v| v.as_str()),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.body, Body::Json(_))
    }
}

/// Whatever came back over HTTP, success or not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// No response was received at all
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// The seam between request building and the network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one payload. Exactly one network call, never retried.
    async fn send(&self, payload: Payload) -> Result<RawResponse, TransportError>;

    /// Base URL requests are sent to, for diagnostics
    fn base_url(&self) -> String;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: Url, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::MediaLensError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<Url, TransportError> {
        self.base_url
            .join(endpoint.path())
            .map_err(|e| TransportError::Request {
                url: format!("{}{}", self.base_url, endpoint.path()),
                reason: e.to_string(),
            })
    }

    fn build_form(parts: Vec<Part>) -> Result<Form, reqwest::Error> {
        let mut form = Form::new();
        for part in parts {
            form = match part {
                Part::Text { name, value } => form.text(name, value),
                Part::File {
                    name,
                    file_name,
                    mime_type,
                    bytes,
                } => form.part(
                    name,
                    FormPart::bytes(bytes).file_name(file_name).mime_str(&mime_type)?,
                ),
            };
        }
        Ok(form)
    }

    fn map_error(url: &Url, error: reqwest::Error) -> TransportError {
        let url = url.to_string();
        if error.is_timeout() {
            TransportError::Timeout { url }
        } else if error.is_connect() {
            TransportError::Connect {
                url,
                reason: error.to_string(),
            }
        } else {
            TransportError::Request {
                url,
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Payload) -> Result<RawResponse, TransportError> {
        let url = self.endpoint_url(payload.endpoint)?;
        tracing::debug!("POST {} ({})", url, if payload.is_json() { "json" } else { "multipart" });

        let request = self.client.post(url.clone());
        let request = match payload.body {
            Body::Json(value) => request.json(&value),
            Body::Multipart(parts) => {
                let form = Self::build_form(parts).map_err(|e| Self::map_error(&url, e))?;
                request.multipart(form)
            }
        };

        let response = request.send().await.map_err(|e| Self::map_error(&url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(&url, e))?
            .to_vec();

        tracing::debug!("{} responded {} ({} bytes)", url, status, body.len());

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn base_url(&self) -> String {
        self.base_url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(Url::parse(base).unwrap(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let transport = transport("http://localhost:3030/");
        assert_eq!(
            transport.endpoint_url(Endpoint::ProcessYoutube).unwrap().as_str(),
            "http://localhost:3030/process-youtube"
        );
        assert_eq!(
            transport.endpoint_url(Endpoint::CreateShareableLink).unwrap().as_str(),
            "http://localhost:3030/create-shareable-link"
        );
    }

    #[test]
    fn test_payload_text_field_lookup() {
        let multipart = Payload::multipart(
            Endpoint::ProcessVideoUrl,
            vec![Part::text("videoUrl", "https://x/y.mp4"), Part::text("prompt", "p")],
        );
        assert_eq!(multipart.text_field("videoUrl"), Some("https://x/y.mp4"));
        assert_eq!(multipart.text_field("missing"), None);

        let json = Payload::json(Endpoint::ProcessYoutube, json!({"videoId": "dQw4w9WgXcQ"}));
        assert!(json.is_json());
        assert_eq!(json.text_field("videoId"), Some("dQw4w9WgXcQ"));
    }

    #[test]
    fn test_file_part_debug_hides_bytes() {
        let part = Part::File {
            name: "image".into(),
            file_name: "cat.png".into(),
            mime_type: "image/png".into(),
            bytes: vec![0; 4096],
        };
        assert_eq!(format!("{:?}", part), "image=<cat.png image/png 4096 bytes>");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) is essentially never listening locally
        let transport = transport("http://127.0.0.1:9/");
        let payload = Payload::json(Endpoint::ProcessYoutube, json!({"videoId": "dQw4w9WgXcQ"}));

        let err = transport.send(payload).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Request { .. } | TransportError::Timeout { .. }
        ));
    }
}
