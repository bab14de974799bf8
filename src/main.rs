use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medialens::cli::{Cli, Commands, ExportTarget, OutputFormat};
use medialens::recorder::{wait_for_stop, FfmpegCapture};
use medialens::utils::{format_file_size, format_recording_time};
use medialens::{
    output, AnalysisOutcome, Analyzer, Config, ExportPipeline, HttpTransport, MediaKind,
    MediaLensError, PromptProfile, ScreenRecorder, SourceRegistry, SubmitOutcome,
};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "medialens=debug" } else { "medialens=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().await?;

    match cli.command {
        Commands::Analyze {
            input,
            kind,
            prompt,
            profile,
            output,
            format,
        } => {
            let profile = profile.unwrap_or(config.app.prompt_profile);
            analyze(&config, &input, kind, prompt.as_deref(), profile, output.as_deref(), format, cli.quiet)
                .await
        }
        Commands::Record {
            microphone,
            output_dir,
            exports,
        } => record(&config, microphone, output_dir, exports, cli.quiet).await,
        Commands::Export {
            recording,
            format,
            output_dir,
        } => {
            let blob = fs_err::read(&recording).context("Failed to read recording")?;
            let dir = match output_dir {
                Some(dir) => dir,
                None => config.output_dir()?,
            };
            let pipeline = ExportPipeline::new(transport(&config)?);
            let ok = run_export(&pipeline, format, &blob, &dir, cli.quiet).await?;
            Ok(exit_code(ok))
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Edit it to change the backend URL, size limits or capture devices.");
                println!("Run `medialens config --show` to see the effective settings.");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sources => {
            let registry = SourceRegistry::new(config.limits);
            println!("Supported inputs:");
            for kind in MediaKind::ALL {
                println!(
                    "  • Local {} files (up to {} MB)",
                    kind,
                    config.limits.ceiling_mb(kind)
                );
            }
            println!("Video URLs (analyze --kind video):");
            for platform in registry.list_platforms() {
                println!("  • {}", platform);
            }
            println!("YouTube URL shapes:");
            for shape in [
                "https://www.youtube.com/watch?v=VIDEO_ID",
                "https://youtu.be/VIDEO_ID",
                "https://www.youtube.com/embed/VIDEO_ID",
                "https://www.youtube.com/v/VIDEO_ID",
                "https://www.youtube.com/user/NAME?v=VIDEO_ID",
                "https://www.youtube.com/shorts/VIDEO_ID",
            ] {
                println!("  • {}", shape);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn transport(config: &Config) -> Result<Arc<HttpTransport>> {
    let base_url = config.base_url()?;
    tracing::debug!("Using backend at {}", base_url);
    let transport = HttpTransport::new(base_url, Duration::from_secs(config.api.timeout_secs))?;
    Ok(Arc::new(transport))
}

fn spinner(quiet: bool, message: impl Into<String>) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    progress.set_message(message.into());
    progress.enable_steady_tick(Duration::from_millis(120));
    Ok(progress)
}

#[allow(clippy::too_many_arguments)]
async fn analyze(
    config: &Config,
    input: &str,
    kind: MediaKind,
    prompt: Option<&str>,
    profile: PromptProfile,
    output_path: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> Result<ExitCode> {
    let registry = SourceRegistry::new(config.limits);
    let analyzer = Analyzer::new(transport(config)?, config.limits, profile)
        .with_credentials(config.check_api_key());
    analyzer.switch_tab(kind);

    tracing::info!("Starting {} analysis ({} profile)", kind, profile);

    let outcome = match registry.resolve(input, kind).await {
        Ok(reference) => {
            tracing::info!("Resolved input to {}", reference.describe());
            analyzer.select_media(reference);

            let progress = spinner(quiet, format!("Analyzing {}...", kind))?;
            let submitted = analyzer.submit(prompt).await;
            progress.finish_and_clear();

            match submitted {
                SubmitOutcome::Completed(outcome) => outcome,
                SubmitOutcome::Discarded | SubmitOutcome::Busy => {
                    anyhow::bail!("The analysis was superseded before it completed")
                }
            }
        }
        Err(error) => AnalysisOutcome::Failure { error },
    };

    match output_path {
        Some(path) => {
            output::save_to_file(&outcome, path, format)?;
            match &outcome {
                AnalysisOutcome::Success { .. } => println!("Analysis saved to: {}", path.display()),
                AnalysisOutcome::Failure { error } => output::print_error(error),
            }
        }
        None => output::print_to_console(&outcome, format)?,
    }

    Ok(exit_code(outcome.is_success()))
}

async fn record(
    config: &Config,
    microphone: bool,
    output_dir: Option<PathBuf>,
    exports: Vec<ExportTarget>,
    quiet: bool,
) -> Result<ExitCode> {
    let dir = match output_dir {
        Some(dir) => dir,
        None => config.output_dir()?,
    };

    let backend = Arc::new(FfmpegCapture::new(config.recording.clone()));
    let mut recorder = ScreenRecorder::new(backend, Duration::from_millis(config.recording.timeslice_ms));

    recorder.start(microphone).await?;
    if microphone && recorder.live_track_count() < 2 {
        eprintln!("⚠️  Microphone unavailable, recording video only");
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let progress = ProgressBar::new_spinner();
        progress.set_style(ProgressStyle::default_spinner().template("{spinner:.red} {msg}")?);
        progress
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let request = wait_for_stop(stdin, tokio::signal::ctrl_c(), Duration::from_secs(1), || {
        progress.set_message(format!(
            "Recording {}  (press Enter or Ctrl-C to stop)",
            format_recording_time(recorder.elapsed_seconds())
        ));
        progress.tick();
    })
    .await;
    tracing::debug!("Stop requested: {:?}", request);
    progress.finish_and_clear();

    let blob = recorder.stop().await?;
    println!(
        "Recorded {} ({})",
        format_recording_time(recorder.elapsed_seconds()),
        format_file_size(blob.len() as u64)
    );

    let pipeline = ExportPipeline::new(transport(config)?);
    let mut ok = true;
    for target in ExportTarget::plan(exports) {
        ok &= run_export(&pipeline, target, &blob, &dir, quiet).await?;
    }

    Ok(exit_code(ok))
}

/// Run one export action. Classified failures are printed and reported as `false`.
async fn run_export(
    pipeline: &ExportPipeline,
    target: ExportTarget,
    blob: &[u8],
    dir: &Path,
    quiet: bool,
) -> Result<bool> {
    let result = match target {
        ExportTarget::Webm => pipeline
            .download_webm(blob, dir)
            .map(|path| format!("Recording saved to: {}", path.display())),
        ExportTarget::Mp4 => {
            let progress = spinner(quiet, "Converting to MP4...")?;
            let result = pipeline.transcode_to(blob, dir).await;
            progress.finish_and_clear();
            result.map(|path| format!("MP4 saved to: {}", path.display()))
        }
        ExportTarget::Link => {
            let progress = spinner(quiet, "Creating shareable link...")?;
            let result = pipeline.publish(blob).await;
            progress.finish_and_clear();
            result.map(|url| format!("Shareable link: {}", url))
        }
    };

    match result {
        Ok(message) => {
            println!("{}", message);
            Ok(true)
        }
        Err(MediaLensError::Classified(error)) => {
            output::print_error(&error);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
