use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::analysis::{ClassifiedError, PromptProfile};
use crate::sources::MediaKind;

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend connection settings
    pub api: ApiConfig,

    /// Upload size ceilings
    pub limits: Limits,

    /// Screen capture settings
    pub recording: RecordingConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Deployment environment; decides how the base URL is resolved
    pub environment: Environment,

    /// Explicit backend host used in development
    pub base_url: String,

    /// Host that relative production URLs are served from
    pub origin: Option<String>,

    /// Name of the environment variable that must hold the inference API key
    pub api_key_env: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Per-kind upload ceilings, in megabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub image_mb: u64,
    pub audio_mb: u64,
    pub video_mb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// ffmpeg binary used for capture
    pub ffmpeg_path: String,

    /// ffmpeg input format for the display (x11grab, avfoundation, gdigrab)
    pub display_format: String,

    /// ffmpeg input device for the display
    pub display_input: String,

    /// ffmpeg input format for the microphone (pulse, avfoundation, dshow)
    pub microphone_format: String,

    /// ffmpeg input device for the microphone
    pub microphone_input: String,

    /// Capture frame rate
    pub framerate: u32,

    /// Chunk buffering interval in milliseconds
    pub timeslice_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for downloaded recordings and exports
    pub output_dir: Option<PathBuf>,

    /// Which set of default instructions to use
    pub prompt_profile: PromptProfile,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            base_url: "http://localhost:3030".to_string(),
            origin: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            image_mb: 20,
            audio_mb: 20,
            video_mb: 20,
        }
    }
}

impl Limits {
    pub fn ceiling_mb(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.image_mb,
            MediaKind::Audio => self.audio_mb,
            MediaKind::Video => self.video_mb,
        }
    }

    /// Ceiling in bytes; huge configured values clamp to `u64::MAX`
    pub fn ceiling_bytes(&self, kind: MediaKind) -> u64 {
        self.ceiling_mb(kind).saturating_mul(BYTES_PER_MB)
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let (display_format, display_input, microphone_format, microphone_input) =
            if cfg!(target_os = "macos") {
                ("avfoundation", "1:none", "avfoundation", ":0")
            } else if cfg!(target_os = "windows") {
                ("gdigrab", "desktop", "dshow", "audio=Microphone")
            } else {
                ("x11grab", ":0.0", "pulse", "default")
            };

        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            display_format: display_format.to_string(),
            display_input: display_input.to_string(),
            microphone_format: microphone_format.to_string(),
            microphone_input: microphone_input.to_string(),
            framerate: 30,
            timeslice_ms: 1000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            prompt_profile: PromptProfile::General,
        }
    }
}

impl Config {
    /// Load configuration from file or create default, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // A config next to the working directory wins
        let local_config = PathBuf::from("medialens.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("medialens").join("config.yaml"))
    }

    /// Apply `MEDIALENS_ENV` and `MEDIALENS_API_URL`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("MEDIALENS_ENV") {
            match env.to_lowercase().as_str() {
                "production" => self.api.environment = Environment::Production,
                "development" => self.api.environment = Environment::Development,
                other => tracing::warn!("Ignoring unknown MEDIALENS_ENV value: {}", other),
            }
        }

        if let Ok(url) = std::env::var("MEDIALENS_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.base_url()?;

        for kind in MediaKind::ALL {
            if self.limits.ceiling_mb(kind) == 0 {
                anyhow::bail!("Size limit for {} must be greater than zero", kind);
            }
        }

        if self.recording.timeslice_ms == 0 {
            anyhow::bail!("recording.timeslice_ms must be greater than zero");
        }

        Ok(())
    }

    /// Resolve the backend base URL. Production serves the API relative to the
    /// site origin; development talks to an explicit host.
    pub fn base_url(&self) -> Result<Url> {
        let raw = match self.api.environment {
            Environment::Production => self
                .api
                .origin
                .as_deref()
                .context("api.origin must be set in production (API URLs are relative)")?,
            Environment::Development => self.api.base_url.as_str(),
        };

        let mut url = Url::parse(raw.trim()).with_context(|| format!("Invalid API base URL: {}", raw))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    /// Short-circuit with a validation error when the API key is absent
    pub fn check_api_key(&self) -> std::result::Result<(), ClassifiedError> {
        check_api_key_value(&self.api.api_key_env, std::env::var(&self.api.api_key_env).ok())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Environment: {:?}", self.api.environment);
        match self.base_url() {
            Ok(url) => println!("  API Base URL: {}", url),
            Err(e) => println!("  API Base URL: <invalid: {}>", e),
        }
        println!(
            "  API Key ({}): {}",
            self.api.api_key_env,
            if self.check_api_key().is_ok() { "present" } else { "missing" }
        );
        println!(
            "  Size Limits: image {} MB, audio {} MB, video {} MB",
            self.limits.image_mb, self.limits.audio_mb, self.limits.video_mb
        );
        println!(
            "  Capture: {} {} (mic: {} {})",
            self.recording.display_format,
            self.recording.display_input,
            self.recording.microphone_format,
            self.recording.microphone_input
        );
        println!("  Prompt Profile: {}", self.app.prompt_profile);
    }

    /// Directory exports are written to
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.app.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Could not determine current directory"),
        }
    }
}

/// Presence check on an API key value read from `env_var`
pub fn check_api_key_value(
    env_var: &str,
    value: Option<String>,
) -> std::result::Result<(), ClassifiedError> {
    match value {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(ClassifiedError::validation(format!(
            "API key not found. Please set the {} environment variable.",
            env_var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ErrorCategory;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url().unwrap().as_str(), "http://localhost:3030/");
        assert_eq!(config.limits.ceiling_bytes(MediaKind::Video), 20 * 1024 * 1024);
        assert_eq!(config.recording.timeslice_ms, 1000);
    }

    #[test]
    fn test_huge_limit_does_not_overflow() {
        let limits = Limits {
            video_mb: u64::MAX,
            ..Limits::default()
        };
        assert_eq!(limits.ceiling_bytes(MediaKind::Video), u64::MAX);
        assert!(crate::sources::local::check_size(MediaKind::Video, u64::MAX, &limits).is_ok());
    }

    #[test]
    fn test_production_requires_origin() {
        let mut config = Config::default();
        config.api.environment = Environment::Production;
        assert!(config.base_url().is_err());

        config.api.origin = Some("https://medialens.example.com".to_string());
        assert_eq!(config.base_url().unwrap().as_str(), "https://medialens.example.com/");
    }

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let mut config = Config::default();
        config.api.base_url = "http://10.0.0.5:3030/api".to_string();
        let url = config.base_url().unwrap();
        assert_eq!(url.join("process-image").unwrap().as_str(), "http://10.0.0.5:3030/api/process-image");
    }

    #[test]
    fn test_missing_api_key_is_validation_error() {
        let err = check_api_key_value("GEMINI_API_KEY", None).unwrap_err();
        assert_eq!(err.category, ErrorCategory::ValidationError);
        assert!(err.message.contains("GEMINI_API_KEY"));

        assert!(check_api_key_value("GEMINI_API_KEY", Some("  ".to_string())).is_err());
        assert!(check_api_key_value("GEMINI_API_KEY", Some("k-123".to_string())).is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "api:\n  base_url: http://backend:9000\nlimits:\n  video_mb: 50\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.base_url, "http://backend:9000");
        assert_eq!(config.api.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.limits.video_mb, 50);
        assert_eq!(config.limits.image_mb, 20);
    }
}
