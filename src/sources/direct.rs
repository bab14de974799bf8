use async_trait::async_trait;

use super::{validate_url, MediaReference, MediaSource, RemoteMedia};
use crate::analysis::ClassifiedError;

/// Source for plain (non-YouTube) video URLs, forwarded to the backend verbatim
pub struct DirectVideoSource;

impl DirectVideoSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for DirectVideoSource {
    async fn resolve(&self, url: &str) -> Result<MediaReference, ClassifiedError> {
        let url = url.trim();
        validate_url(url)?;

        Ok(MediaReference::Url(RemoteMedia {
            url: url.to_string(),
            video_id: None,
        }))
    }

    fn supports_url(&self, url: &str) -> bool {
        validate_url(url.trim()).is_ok()
    }

    fn platform_name(&self) -> &'static str {
        "Direct video URL"
    }
}

impl Default for DirectVideoSource {
    fn default() -> Self {
        Self::new()
    }
}
