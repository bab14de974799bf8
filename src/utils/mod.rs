use chrono::{Local, NaiveDate};
use url::Url;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Elapsed recording time as zero-padded `MM:SS`
pub fn format_recording_time(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Download name for a recording made on `date`
pub fn recording_filename_for(date: NaiveDate, extension: &str) -> String {
    format!("medialens-recording-{}.{}", date.format("%Y-%m-%d"), extension)
}

/// Download name for a recording made today
pub fn recording_filename(extension: &str) -> String {
    recording_filename_for(Local::now().date_naive(), extension)
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|host| {
        host.strip_prefix("www.").unwrap_or(host).to_string()
    })
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("-version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(20 * 1024 * 1024), "20.0 MB");
    }

    #[test]
    fn test_format_recording_time() {
        assert_eq!(format_recording_time(0), "00:00");
        assert_eq!(format_recording_time(5), "00:05");
        assert_eq!(format_recording_time(65), "01:05");
        assert_eq!(format_recording_time(3600), "60:00");
    }

    #[test]
    fn test_recording_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(recording_filename_for(date, "webm"), "medialens-recording-2024-03-09.webm");
        assert!(recording_filename("mp4").starts_with("medialens-recording-"));
        assert!(recording_filename("mp4").ends_with(".mp4"));
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(extract_domain("https://www.youtube.com/watch?v=123"), Some("youtube.com".to_string()));
        assert_eq!(extract_domain("https://cdn.example.com/clip.mp4"), Some("cdn.example.com".to_string()));
        assert_eq!(extract_domain("invalid-url"), None);
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        assert!(!check_command_available("definitely-not-a-real-command-xyz").await);
    }
}
