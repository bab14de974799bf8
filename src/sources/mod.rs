use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub mod direct;
pub mod local;
pub mod youtube;

use crate::analysis::ClassifiedError;
use crate::config::Limits;

pub use local::LocalMedia;
pub use youtube::VideoId;

/// The three kinds of media the backend can analyze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Capitalized name used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Audio => "Audio",
            MediaKind::Video => "Video",
        }
    }

    /// MIME family prefix a file of this kind must carry
    pub fn mime_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/",
            MediaKind::Audio => "audio/",
            MediaKind::Video => "video/",
        }
    }

    /// Suggestion shown when a file of this kind is over the size ceiling
    pub fn compression_tip(&self) -> &'static str {
        match self {
            MediaKind::Image => {
                "Tip: You can use an image editor or an online image compressor to reduce the file size."
            }
            MediaKind::Audio => {
                "Tip: You can use a tool like Audacity or an online audio compressor to reduce the file size."
            }
            MediaKind::Video => {
                "Tip: You can use a tool like HandBrake or an online video compressor to reduce the file size."
            }
        }
    }

    pub const ALL: [MediaKind; 3] = [MediaKind::Image, MediaKind::Audio, MediaKind::Video];
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote video URL, tagged with its YouTube id when it has one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    /// The URL exactly as the user supplied it (trimmed)
    pub url: String,

    /// Present iff the URL was recognized as a YouTube video
    pub video_id: Option<VideoId>,
}

impl RemoteMedia {
    pub fn is_youtube(&self) -> bool {
        self.video_id.is_some()
    }
}

/// The single canonical handle on whatever media the user supplied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaReference {
    File(LocalMedia),
    Url(RemoteMedia),
}

impl MediaReference {
    /// Short description for logs and console output
    pub fn describe(&self) -> String {
        match self {
            MediaReference::File(media) => format!(
                "{} ({}, {})",
                media.file_name,
                media.mime_type,
                crate::utils::format_file_size(media.size_bytes)
            ),
            MediaReference::Url(remote) => match &remote.video_id {
                Some(id) => format!("YouTube video {}", id),
                None => match crate::utils::extract_domain(&remote.url) {
                    Some(domain) => format!("video on {}", domain),
                    None => remote.url.clone(),
                },
            },
        }
    }
}

/// Trait for turning a pasted URL into a media reference
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Resolve the URL into a media reference
    async fn resolve(&self, url: &str) -> Result<MediaReference, ClassifiedError>;

    /// Check if this source claims the given URL
    fn supports_url(&self, url: &str) -> bool;

    /// Get the name of this source
    fn platform_name(&self) -> &'static str;
}

/// Registry that decides which source handles a user input
pub struct SourceRegistry {
    sources: Vec<Box<dyn MediaSource>>,
    local: local::LocalFileSource,
}

impl SourceRegistry {
    /// Create a new registry with the default sources
    pub fn new(limits: Limits) -> Self {
        let mut registry = Self {
            sources: Vec::new(),
            local: local::LocalFileSource::new(limits),
        };

        // YouTube must be consulted before the catch-all direct source
        registry.register(Box::new(youtube::YoutubeSource::new()));
        registry.register(Box::new(direct::DirectVideoSource::new()));

        registry
    }

    /// Register a new source
    pub fn register(&mut self, source: Box<dyn MediaSource>) {
        self.sources.push(source);
    }

    /// Find a source that supports the given URL
    pub fn find_source(&self, url: &str) -> Option<&dyn MediaSource> {
        self.sources
            .iter()
            .find(|source| source.supports_url(url))
            .map(|boxed| boxed.as_ref())
    }

    /// List all registered URL sources
    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.sources
            .iter()
            .map(|source| source.platform_name())
            .collect()
    }

    /// Access the local file source directly (drag-drop of in-memory bytes)
    pub fn local(&self) -> &local::LocalFileSource {
        &self.local
    }

    /// Check if input is a local file path rather than a URL
    pub fn is_local_file(&self, input: &str) -> bool {
        if input.starts_with("http://") || input.starts_with("https://") {
            return false;
        }

        let path = Path::new(input);
        if path.exists() {
            return true;
        }

        let has_extension = path.extension().is_some();
        let has_path_separators = input.contains('/') || input.contains('\\');

        has_extension || has_path_separators
    }

    /// Resolve user input for the given media kind into a media reference
    pub async fn resolve(&self, input: &str, kind: MediaKind) -> Result<MediaReference, ClassifiedError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ClassifiedError::missing_media(kind));
        }

        // `youtu.be/<id>` pasted without a scheme still looks like a path
        let schemeless_youtube = youtube::looks_like_youtube(input) && !Path::new(input).exists();

        if !schemeless_youtube && self.is_local_file(input) {
            return self.local.resolve_path(Path::new(input), kind).await;
        }

        // Only the video tab accepts pasted URLs
        if kind != MediaKind::Video {
            return Err(ClassifiedError::validation(format!(
                "{} analysis needs a local file. URLs are only accepted for video.",
                kind.label()
            )));
        }

        let source = self.find_source(input).ok_or_else(|| {
            ClassifiedError::validation(format!("Unsupported URL format: {}", input))
        })?;

        tracing::debug!("Resolving {} with {} source", input, source.platform_name());
        source.resolve(input).await
    }
}

/// Validate that a URL is absolute and uses HTTP(S)
pub fn validate_url(url: &str) -> Result<Url, ClassifiedError> {
    let parsed = Url::parse(url)
        .map_err(|_| ClassifiedError::validation(format!("Invalid URL format: {}", url)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ClassifiedError::validation(
            "URL must use HTTP or HTTPS protocol",
        ));
    }

    Ok(parsed)
}
