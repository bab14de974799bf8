use anyhow::Result;
use console::style;
use std::path::Path;

use crate::analysis::{AnalysisOutcome, ClassifiedError, ErrorCategory};
use crate::cli::OutputFormat;

/// Render an outcome as text (the canonical markdown, or the error message) or JSON
pub fn format_outcome(outcome: &AnalysisOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(match outcome {
            AnalysisOutcome::Success { result } => result.clone(),
            AnalysisOutcome::Failure { error } => format_error_plain(error),
        }),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
    }
}

fn format_error_plain(error: &ClassifiedError) -> String {
    let mut text = format!("[{}] {}", error.category, error.message);
    if error.retryable {
        text.push_str("\n\nThis error is temporary; run the same command again to retry.");
    }
    text
}

/// Headline shown above an error on the console
pub fn category_title(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::QuotaExceeded => "Quota exceeded",
        ErrorCategory::ModelOverloaded => "Model overloaded",
        ErrorCategory::NetworkError => "Network error",
        ErrorCategory::ValidationError => "Invalid input",
        ErrorCategory::Unknown => "Server error",
    }
}

/// Save an analysis outcome to file
pub fn save_to_file(outcome: &AnalysisOutcome, path: &Path, format: OutputFormat) -> Result<()> {
    let content = format_outcome(outcome, format)?;
    fs_err::write(path, content)?;
    Ok(())
}

/// Print an analysis outcome to the console. Failures go to stderr.
pub fn print_to_console(outcome: &AnalysisOutcome, format: OutputFormat) -> Result<()> {
    match (outcome, format) {
        (AnalysisOutcome::Failure { error }, OutputFormat::Text) => print_error(error),
        (AnalysisOutcome::Success { .. }, _) => println!("{}", format_outcome(outcome, format)?),
        (AnalysisOutcome::Failure { .. }, OutputFormat::Json) => {
            eprintln!("{}", format_outcome(outcome, format)?)
        }
    }
    Ok(())
}

/// Print a classified error with a styled headline
pub fn print_error(error: &ClassifiedError) {
    let title = category_title(error.category);
    let headline = if error.retryable {
        style(title).yellow().bold()
    } else {
        style(title).red().bold()
    };

    eprintln!("{} {}", headline, style(format!("({})", error.category)).dim());
    eprintln!();
    eprintln!("{}", error.message);

    if error.retryable {
        eprintln!();
        eprintln!("{}", style("This error is temporary; run the same command again to retry.").dim());
    }
}
