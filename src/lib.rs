//! MediaLens - A Rust client for multimodal media analysis
//!
//! This library resolves local media files and remote video URLs (including YouTube),
//! dispatches them to a multimodal inference backend, and normalizes the backend's
//! answers into a single markdown string. It also records the screen (with optional
//! microphone) and exports finished recordings as WebM, transcoded MP4, or a
//! shareable link.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod export;
pub mod output;
pub mod recorder;
pub mod sources;
pub mod utils;

pub use analysis::{
    AnalysisOutcome, AnalysisRequest, Analyzer, ClassifiedError, ErrorCategory, PromptProfile,
    ResultState, SubmitOutcome,
};
pub use cli::{Cli, Commands, ExportTarget, OutputFormat};
pub use config::Config;
pub use dispatch::{Endpoint, HttpTransport, Payload, RawResponse, Transport};
pub use export::{ExportFormat, ExportPipeline};
pub use recorder::{RecordingSession, RecordingState, ScreenRecorder};
pub use sources::{MediaKind, MediaReference, SourceRegistry};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MediaLensError>;

/// Error types specific to the client itself (as opposed to classified backend failures)
#[derive(thiserror::Error, Debug)]
pub enum MediaLensError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Recorder is {0}; that action is not allowed now")]
    InvalidRecorderState(&'static str),

    #[error("{0} export is already in progress")]
    ExportBusy(&'static str),

    #[error("Transport failure: {0}")]
    Transport(#[from] dispatch::TransportError),

    #[error("{0}")]
    Classified(#[from] ClassifiedError),
}
