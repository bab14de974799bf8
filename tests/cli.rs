use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Working directory with a local config pointing at a backend that is never reached
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs_err::write(
        dir.path().join("medialens.yaml"),
        "api:\n  environment: development\n  base_url: http://127.0.0.1:9\n  timeout_secs: 2\n",
    )
    .unwrap();
    dir
}

fn medialens(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("medialens").unwrap();
    cmd.current_dir(dir.path())
        .env("GEMINI_API_KEY", "test-key")
        .env_remove("MEDIALENS_API_URL")
        .env_remove("MEDIALENS_ENV")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = workspace();
    medialens(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn test_sources_lists_url_platforms() {
    let dir = workspace();
    medialens(&dir)
        .arg("sources")
        .assert()
        .success()
        .stdout(predicate::str::contains("YouTube"))
        .stdout(predicate::str::contains("Direct video URL"))
        .stdout(predicate::str::contains("up to 20 MB"));
}

#[test]
fn test_config_show_uses_local_file() {
    let dir = workspace();
    medialens(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:9/"))
        .stdout(predicate::str::contains("present"));
}

#[test]
fn test_oversized_image_is_rejected_before_dispatch() {
    let dir = workspace();
    let file = fs_err::File::create(dir.path().join("big.png")).unwrap();
    file.set_len(25 * 1024 * 1024).unwrap();

    medialens(&dir)
        .args(["-q", "analyze", "big.png", "--kind", "image"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Image file is too large"))
        .stderr(predicate::str::contains("validation_error"))
        .stderr(predicate::str::contains("Error connecting").not());
}

#[test]
fn test_missing_api_key_is_validation_error() {
    let dir = workspace();
    fs_err::write(dir.path().join("cat.png"), b"\x89PNG fake image").unwrap();

    medialens(&dir)
        .env_remove("GEMINI_API_KEY")
        .args(["-q", "analyze", "cat.png", "--kind", "image"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}

#[test]
fn test_malformed_youtube_url_reports_json_failure() {
    let dir = workspace();
    medialens(&dir)
        .args([
            "-q",
            "analyze",
            "https://www.youtube.com/watch?v=tooshort",
            "--kind",
            "video",
            "--format",
            "json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains(r#""category": "validation_error""#))
        .stderr(predicate::str::contains("Supported formats"));
}

#[test]
fn test_url_for_audio_kind_is_rejected() {
    let dir = workspace();
    medialens(&dir)
        .args(["-q", "analyze", "https://example.com/song.mp3", "--kind", "audio"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("URLs are only accepted for video"));
}

#[test]
fn test_unreachable_backend_is_network_error() {
    let dir = workspace();
    medialens(&dir)
        .args(["-q", "analyze", "https://youtu.be/dQw4w9WgXcQ", "--kind", "video"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("network_error"))
        .stderr(predicate::str::contains("http://127.0.0.1:9/"));
}
