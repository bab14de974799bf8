use std::path::{Path, PathBuf};
use tokio::fs;

use super::{MediaKind, MediaReference};
use crate::analysis::ClassifiedError;
use crate::config::Limits;

/// A local file, read into memory and ready to be attached to a multipart request
#[derive(Clone, PartialEq, Eq)]
pub struct LocalMedia {
    pub file_name: String,
    pub path: Option<PathBuf>,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size_bytes: u64,
}

impl std::fmt::Debug for LocalMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMedia")
            .field("file_name", &self.file_name)
            .field("path", &self.path)
            .field("mime_type", &self.mime_type)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Guess a MIME type from a file extension
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "mp3" => "audio/mpeg",
        "m4a" | "aac" => "audio/mp4",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "wmv" => "video/x-ms-wmv",
        _ => return None,
    };
    Some(mime)
}

/// MIME type for an extension as the given kind. Containers that carry
/// either audio or video (`webm`, `ogg`, `mp4`) follow the requested kind.
pub fn mime_for_kind(ext: &str, kind: MediaKind) -> Option<&'static str> {
    let mime = match (ext.to_lowercase().as_str(), kind) {
        ("webm", MediaKind::Audio) => "audio/webm",
        ("mp4", MediaKind::Audio) => "audio/mp4",
        ("ogg", MediaKind::Video) | ("ogv", _) => "video/ogg",
        _ => return mime_from_extension(ext),
    };
    Some(mime)
}

/// Reject files above the kind-specific ceiling. Runs before anything is read or sent.
pub fn check_size(kind: MediaKind, size_bytes: u64, limits: &Limits) -> Result<(), ClassifiedError> {
    if size_bytes > limits.ceiling_bytes(kind) {
        return Err(ClassifiedError::file_too_large(kind, size_bytes, limits.ceiling_mb(kind)));
    }
    Ok(())
}

/// Source for files picked or dropped by the user
pub struct LocalFileSource {
    limits: Limits,
}

impl LocalFileSource {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Determine the MIME type of a named file and check it matches the media kind
    fn mime_for(&self, file_name: &str, kind: MediaKind) -> Result<&'static str, ClassifiedError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let mime = mime_for_kind(ext, kind).ok_or_else(|| {
            ClassifiedError::validation(format!(
                "Unsupported file type '{}' for {} analysis.",
                file_name, kind
            ))
        })?;

        if !mime.starts_with(kind.mime_prefix()) {
            return Err(ClassifiedError::validation(format!(
                "The selected file does not look like {} {} (detected {}).",
                if kind == MediaKind::Video { "a" } else { "an" },
                kind,
                mime
            )));
        }

        Ok(mime)
    }

    /// Resolve a file on disk. The size ceiling is checked from metadata
    /// before the file is read.
    pub async fn resolve_path(&self, path: &Path, kind: MediaKind) -> Result<MediaReference, ClassifiedError> {
        let metadata = fs::metadata(path).await.map_err(|e| {
            ClassifiedError::validation(format!("Cannot access file {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(ClassifiedError::validation(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();

        let mime_type = self.mime_for(&file_name, kind)?;
        check_size(kind, metadata.len(), &self.limits)?;

        if metadata.len() == 0 {
            return Err(ClassifiedError::validation(format!(
                "File is empty: {}",
                path.display()
            )));
        }

        let bytes = fs::read(path).await.map_err(|e| {
            ClassifiedError::validation(format!("Cannot read file {}: {}", path.display(), e))
        })?;

        tracing::debug!("Loaded local {} file {} ({} bytes)", kind, file_name, bytes.len());

        Ok(MediaReference::File(LocalMedia {
            file_name,
            path: Some(path.to_path_buf()),
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: mime_type.to_string(),
        }))
    }

    /// Resolve media that is already in memory (drag-drop, clipboard)
    pub fn resolve_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        kind: MediaKind,
    ) -> Result<MediaReference, ClassifiedError> {
        let mime_type = self.mime_for(file_name, kind)?;
        check_size(kind, bytes.len() as u64, &self.limits)?;

        if bytes.is_empty() {
            return Err(ClassifiedError::validation(format!("File is empty: {}", file_name)));
        }

        Ok(MediaReference::File(LocalMedia {
            file_name: file_name.to_string(),
            path: None,
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: mime_type.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ErrorCategory;
    use std::io::Write;

    const MB: u64 = 1024 * 1024;

    fn source() -> LocalFileSource {
        LocalFileSource::new(Limits::default())
    }

    #[test]
    fn test_check_size_boundary() {
        let limits = Limits::default();
        assert!(check_size(MediaKind::Image, 20 * MB, &limits).is_ok());

        let err = check_size(MediaKind::Image, 20 * MB + 1, &limits).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ValidationError);
        assert!(err.message.contains("Image file is too large"));
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.png");
        let file = std::fs::File::create(&path).unwrap();
        // sparse file, nothing is actually written
        file.set_len(25 * MB).unwrap();

        let err = source().resolve_path(&path, MediaKind::Image).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::ValidationError);
        assert!(err.message.contains("25.00 MB"));
    }

    #[tokio::test]
    async fn test_resolve_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.mp3");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"ID3fake-mp3-bytes").unwrap();

        let reference = source().resolve_path(&path, MediaKind::Audio).await.unwrap();
        match reference {
            MediaReference::File(media) => {
                assert_eq!(media.file_name, "voice.mp3");
                assert_eq!(media.mime_type, "audio/mpeg");
                assert_eq!(media.size_bytes, 17);
            }
            other => panic!("expected file reference, got {:?}", other),
        }
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let err = source()
            .resolve_bytes("clip.mp4", vec![1, 2, 3], MediaKind::Image)
            .unwrap_err();
        assert!(err.message.contains("does not look like an image"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = source()
            .resolve_bytes("notes.txt", vec![1], MediaKind::Audio)
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ValidationError);
    }

    #[test]
    fn test_audio_in_video_containers_accepted() {
        for (name, mime) in [
            ("clip.webm", "audio/webm"),
            ("clip.ogg", "audio/ogg"),
            ("clip.mp4", "audio/mp4"),
        ] {
            match source().resolve_bytes(name, vec![1, 2, 3], MediaKind::Audio) {
                Ok(MediaReference::File(media)) => assert_eq!(media.mime_type, mime),
                other => panic!("expected {} to resolve as audio, got {:?}", name, other),
            }
        }

        match source().resolve_bytes("clip.ogg", vec![1], MediaKind::Video) {
            Ok(MediaReference::File(media)) => assert_eq!(media.mime_type, "video/ogg"),
            other => panic!("expected video/ogg, got {:?}", other),
        }
        // Audio-only extensions stay audio
        assert!(source().resolve_bytes("song.mp3", vec![1], MediaKind::Video).is_err());
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("JPG"), Some("image/jpeg"));
        assert_eq!(mime_from_extension("webm"), Some("video/webm"));
        assert_eq!(mime_from_extension("m4a"), Some("audio/mp4"));
        assert_eq!(mime_from_extension("exe"), None);
    }
}
