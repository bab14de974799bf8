use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::analysis::PromptProfile;
use crate::export::ExportFormat;
use crate::sources::MediaKind;

#[derive(Parser)]
#[command(
    name = "medialens",
    about = "MediaLens - Analyze images, audio and video with a multimodal inference backend",
    version,
    long_about = "Submit an image, an audio clip, a video file or a video URL (including YouTube) together with an instruction, and get back a markdown analysis. Can also record the screen and export the recording as WebM, MP4 or a shareable link."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a local media file or a video URL
    Analyze {
        /// File path, or a video URL (YouTube or direct link)
        #[arg(value_name = "FILE_OR_URL")]
        input: String,

        /// Media kind of the input
        #[arg(short, long, value_enum, default_value = "image")]
        kind: MediaKind,

        /// Instruction for the model (a default for the media kind is used if omitted)
        #[arg(short, long)]
        prompt: Option<String>,

        /// Default-instruction profile (overrides the configured one)
        #[arg(long, value_enum)]
        profile: Option<PromptProfile>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Record the screen until Enter is pressed, then export the recording
    Record {
        /// Also capture the microphone (recording continues without it if unavailable)
        #[arg(short, long)]
        microphone: bool,

        /// Directory for saved recordings
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Export actions to run once recording stops (defaults to webm)
        #[arg(short, long = "export", value_enum)]
        exports: Vec<ExportTarget>,
    },

    /// Export an existing WebM recording
    Export {
        /// Path to the recording
        #[arg(value_name = "RECORDING")]
        recording: PathBuf,

        /// Export action
        #[arg(short, long, value_enum, default_value = "mp4")]
        format: ExportTarget,

        /// Directory for exported files
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported inputs
    Sources,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Markdown text
    Text,
    /// JSON with status and classified error
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportTarget {
    /// Save the raw WebM recording
    Webm,
    /// Convert to MP4 on the server
    Mp4,
    /// Upload and print a shareable link
    Link,
}

impl ExportTarget {
    /// Requested exports in first-seen order, each at most once. Nothing
    /// requested means a WebM download.
    pub fn plan(requested: Vec<ExportTarget>) -> Vec<ExportTarget> {
        let mut plan: Vec<ExportTarget> = Vec::with_capacity(requested.len());
        for target in requested {
            if !plan.contains(&target) {
                plan.push(target);
            }
        }
        if plan.is_empty() {
            plan.push(ExportTarget::Webm);
        }
        plan
    }
}

impl From<ExportTarget> for ExportFormat {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::Webm => ExportFormat::Webm,
            ExportTarget::Mp4 => ExportFormat::Mp4,
            ExportTarget::Link => ExportFormat::ShareableLink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_arguments() {
        let cli = Cli::parse_from([
            "medialens",
            "analyze",
            "https://youtu.be/dQw4w9WgXcQ",
            "--kind",
            "video",
            "--profile",
            "education",
            "--format",
            "json",
        ]);

        match cli.command {
            Commands::Analyze {
                input,
                kind,
                profile,
                format,
                prompt,
                ..
            } => {
                assert_eq!(input, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(kind, MediaKind::Video);
                assert_eq!(profile, Some(PromptProfile::Education));
                assert_eq!(format, OutputFormat::Json);
                assert!(prompt.is_none());
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_record_accepts_repeated_exports() {
        let cli = Cli::parse_from(["medialens", "record", "-m", "--export", "mp4", "--export", "link"]);
        match cli.command {
            Commands::Record {
                microphone, exports, ..
            } => {
                assert!(microphone);
                assert_eq!(exports, vec![ExportTarget::Mp4, ExportTarget::Link]);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_export_plan_drops_repeats() {
        use ExportTarget::*;
        assert_eq!(ExportTarget::plan(vec![Mp4, Link, Mp4, Link]), vec![Mp4, Link]);
        assert_eq!(ExportTarget::plan(vec![Link, Webm, Link]), vec![Link, Webm]);
        assert_eq!(ExportTarget::plan(Vec::new()), vec![Webm]);
    }

    #[test]
    fn test_export_target_mapping() {
        assert_eq!(ExportFormat::from(ExportTarget::Link), ExportFormat::ShareableLink);
        assert_eq!(ExportFormat::from(ExportTarget::Webm), ExportFormat::Webm);
    }
}
