use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{MediaReference, MediaSource, RemoteMedia};
use crate::analysis::ClassifiedError;

/// Length of every YouTube video id
pub const VIDEO_ID_LEN: usize = 11;

/// Known YouTube URL shapes, tried in order. Captures are deliberately
/// unbounded so an over-long id fails re-validation instead of being truncated.
static URL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // watch?v=ID (v may follow other query params) and youtu.be/ID
        r"(?:youtube\.com/watch\?(?:[^#\s]*&)?v=|youtu\.be/)([A-Za-z0-9_-]+)",
        r"youtube\.com/embed/([A-Za-z0-9_-]+)",
        r"youtube\.com/v/([A-Za-z0-9_-]+)",
        // channel-scoped: youtube.com/user/<name>...v=ID
        r"youtube\.com/user/[^&?\n]+/?v=([A-Za-z0-9_-]+)",
        r"youtube\.com/shorts/([A-Za-z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static YouTube pattern is valid"))
    .collect()
});

/// A validated 11-character YouTube video id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Accepts exactly 11 characters of `[A-Za-z0-9_-]`
    pub fn parse(candidate: &str) -> Option<Self> {
        let valid = candidate.len() == VIDEO_ID_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

        valid.then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Embeddable player URL, used for previews
    pub fn embed_url(&self) -> String {
        format!("https://www.youtube.com/embed/{}", self.0)
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid YouTube video id: {}", value))
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

/// Extract the video id from a YouTube URL.
///
/// Returns `None` when no known shape matches or the captured id is not
/// exactly 11 characters. `None` means "not YouTube", not an error.
pub fn extract_video_id(url: &str) -> Option<VideoId> {
    let url = url.trim();

    for (index, pattern) in URL_PATTERNS.iter().enumerate() {
        let Some(candidate) = pattern.captures(url).and_then(|caps| caps.get(1)) else {
            continue;
        };

        match VideoId::parse(candidate.as_str()) {
            Some(id) => {
                tracing::debug!("Matched YouTube pattern {}: {}", index, id);
                return Some(id);
            }
            None => {
                tracing::debug!("Rejected YouTube id candidate: {}", candidate.as_str());
            }
        }
    }

    None
}

/// Cheap host heuristic: does the user believe this is a YouTube URL?
pub fn looks_like_youtube(url: &str) -> bool {
    url.contains("youtube.com") || url.contains("youtu.be")
}

/// Media source for YouTube links, routed to the backend by id
pub struct YoutubeSource;

impl YoutubeSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for YoutubeSource {
    async fn resolve(&self, url: &str) -> Result<MediaReference, ClassifiedError> {
        let video_id = extract_video_id(url).ok_or_else(ClassifiedError::unrecognized_youtube_url)?;

        Ok(MediaReference::Url(RemoteMedia {
            url: url.trim().to_string(),
            video_id: Some(video_id),
        }))
    }

    fn supports_url(&self, url: &str) -> bool {
        looks_like_youtube(url)
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }
}

impl Default for YoutubeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str) -> Option<String> {
        extract_video_id(url).map(String::from)
    }

    #[test]
    fn test_known_url_shapes() {
        let expected = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=120"), expected);
        assert_eq!(id("https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ?si=xyz"), expected);
        assert_eq!(id("https://www.youtube.com/embed/dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://www.youtube.com/v/dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://www.youtube.com/user/someone#p/u/1/v=dQw4w9WgXcQ"), expected);
        assert_eq!(id("https://www.youtube.com/shorts/dQw4w9WgXcQ"), expected);
        assert_eq!(id("  https://m.youtube.com/watch?v=dQw4w9WgXcQ  "), expected);
    }

    #[test]
    fn test_id_must_be_exactly_eleven_chars() {
        assert_eq!(id("https://youtu.be/dQw4w9WgXc"), None);
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQQ"), None);
        assert_eq!(id("https://www.youtube.com/watch?v=abc"), None);
        assert_eq!(id("https://www.youtube.com/shorts/a_b-c_d-e_f-"), None);
        assert_eq!(id("https://www.youtube.com/shorts/a_b-c_d-e_f"), Some("a_b-c_d-e_f".to_string()));
    }

    #[test]
    fn test_non_youtube_urls() {
        assert_eq!(id("https://vimeo.com/123456789"), None);
        assert_eq!(id("https://www.youtube.com/feed/subscriptions"), None);
        assert_eq!(id(""), None);
    }

    #[test]
    fn test_looks_like_youtube() {
        assert!(looks_like_youtube("https://youtu.be/x"));
        assert!(looks_like_youtube("https://www.youtube.com/feed"));
        assert!(!looks_like_youtube("https://example.com/video.mp4"));
    }

    #[test]
    fn test_video_id_parse_and_embed() {
        assert!(VideoId::parse("dQw4w9WgXc!").is_none());
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.embed_url(), "https://www.youtube.com/embed/dQw4w9WgXcQ");
    }

    #[tokio::test]
    async fn test_source_rejects_unextractable_youtube_url() {
        let err = YoutubeSource::new()
            .resolve("https://www.youtube.com/feed/subscriptions")
            .await
            .unwrap_err();
        assert!(err.message.contains("Supported formats"));
    }
}
