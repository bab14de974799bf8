use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{CaptureBackend, CaptureStream, CaptureTrack, Encoder, EncoderControl, TrackKind};
use crate::config::RecordingConfig;
use crate::{MediaLensError, Result};

/// How long ffmpeg gets to flush after `q` before it is killed
const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a microphone probe may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

type ProcessSlot = Arc<Mutex<Option<Child>>>;

/// A display or microphone input of the shared ffmpeg process
pub struct FfmpegTrack {
    kind: TrackKind,
    input_format: String,
    input: String,
    live: AtomicBool,
    process: ProcessSlot,
}

impl FfmpegTrack {
    fn new(kind: TrackKind, input_format: &str, input: &str, process: ProcessSlot) -> Arc<Self> {
        Arc::new(Self {
            kind,
            input_format: input_format.to_string(),
            input: input.to_string(),
            live: AtomicBool::new(true),
            process,
        })
    }
}

impl CaptureTrack for FfmpegTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> String {
        format!("{} {}", self.input_format, self.input)
    }

    fn stop(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }

        // The device is held by the ffmpeg process; make sure it is gone.
        // If the encoder is finishing right now it owns the lock and will reap it.
        if let Ok(mut slot) = self.process.try_lock() {
            if let Some(child) = slot.as_mut() {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("ffmpeg already exited: {}", e);
                }
            }
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Capture backend that drives an `ffmpeg` subprocess
pub struct FfmpegCapture {
    config: RecordingConfig,
    process: ProcessSlot,
}

impl FfmpegCapture {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            process: Arc::new(Mutex::new(None)),
        }
    }

    /// Check if ffmpeg is available
    pub async fn check_availability(&self) -> bool {
        crate::utils::check_command_available(&self.config.ffmpeg_path).await
    }

    /// Arguments for one input, by track kind
    fn input_args(&self, track: &dyn CaptureTrack) -> Vec<String> {
        match track.kind() {
            TrackKind::Display => vec![
                "-f".into(),
                self.config.display_format.clone(),
                "-framerate".into(),
                self.config.framerate.to_string(),
                "-i".into(),
                self.config.display_input.clone(),
            ],
            TrackKind::Microphone => vec![
                "-f".into(),
                self.config.microphone_format.clone(),
                "-i".into(),
                self.config.microphone_input.clone(),
            ],
        }
    }

    /// Full ffmpeg command line: live inputs in, WebM (VP9/Opus) on stdout
    pub fn encoder_args(&self, stream: &CaptureStream) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        let live: Vec<_> = stream.tracks().iter().filter(|t| t.is_live()).collect();
        for track in &live {
            args.extend(self.input_args(track.as_ref()));
        }

        for (index, track) in live.iter().enumerate() {
            let selector = match track.kind() {
                TrackKind::Display => format!("{}:v", index),
                TrackKind::Microphone => format!("{}:a", index),
            };
            args.extend(["-map".into(), selector]);
        }

        args.extend(
            [
                "-c:v", "libvpx-vp9", "-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M",
            ]
            .map(String::from),
        );

        if live.iter().any(|t| t.kind() == TrackKind::Microphone) {
            args.extend(["-c:a", "libopus"].map(String::from));
        }

        args.extend(["-f", "webm", "pipe:1"].map(String::from));
        args
    }
}

#[async_trait]
impl CaptureBackend for FfmpegCapture {
    async fn display_stream(&self) -> Result<CaptureStream> {
        if !self.check_availability().await {
            return Err(MediaLensError::Capture(format!(
                "{} is not available. Please install it: https://ffmpeg.org/download.html",
                self.config.ffmpeg_path
            )));
        }

        let track: Arc<dyn CaptureTrack> = FfmpegTrack::new(
            TrackKind::Display,
            &self.config.display_format,
            &self.config.display_input,
            self.process.clone(),
        );
        Ok(CaptureStream::new(vec![track]))
    }

    async fn microphone_stream(&self) -> Result<CaptureStream> {
        tracing::debug!(
            "Probing microphone {} {}",
            self.config.microphone_format,
            self.config.microphone_input
        );

        let probe = Command::new(&self.config.ffmpeg_path)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                self.config.microphone_format.as_str(),
                "-i",
                self.config.microphone_input.as_str(),
                "-t",
                "0.1",
                "-f",
                "null",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| MediaLensError::Capture("microphone probe timed out".into()))??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(MediaLensError::Capture(format!("microphone unavailable: {}", error.trim())));
        }

        let track: Arc<dyn CaptureTrack> = FfmpegTrack::new(
            TrackKind::Microphone,
            &self.config.microphone_format,
            &self.config.microphone_input,
            self.process.clone(),
        );
        Ok(CaptureStream::new(vec![track]))
    }

    async fn start_encoder(&self, stream: &CaptureStream, timeslice: Duration) -> Result<Encoder> {
        let args = self.encoder_args(stream);
        tracing::debug!("Spawning {} {}", self.config.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaLensError::Capture("ffmpeg stdout was not captured".into()))?;

        *self.process.lock().await = Some(child);

        let (tx, rx) = mpsc::channel(64);
        let reader = tokio::spawn(read_chunks(stdout, tx, timeslice));

        Ok(Encoder {
            chunks: rx,
            control: Box::new(FfmpegControl {
                stdin,
                process: self.process.clone(),
                reader: Some(reader),
            }),
        })
    }
}

/// Read ffmpeg's stdout, emitting whatever accumulated once per timeslice
async fn read_chunks(mut stdout: ChildStdout, chunks: mpsc::Sender<Vec<u8>>, timeslice: Duration) {
    let mut ticker = tokio::time::interval(timeslice);
    ticker.tick().await;

    let mut pending: Vec<u8> = Vec::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        tokio::select! {
            read = stdout.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&buffer[..n]),
                Err(e) => {
                    tracing::warn!("Reading ffmpeg output failed: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => {
                if !pending.is_empty() && chunks.send(std::mem::take(&mut pending)).await.is_err() {
                    return;
                }
            }
        }
    }

    if !pending.is_empty() {
        let _ = chunks.send(pending).await;
    }
}

struct FfmpegControl {
    stdin: Option<ChildStdin>,
    process: ProcessSlot,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl EncoderControl for FfmpegControl {
    async fn finish(&mut self) -> Result<()> {
        // `q` asks ffmpeg to finalize the container and exit
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::debug!("Could not signal ffmpeg: {}", e);
            }
        }

        let child = self.process.lock().await.take();
        if let Some(mut child) = child {
            match tokio::time::timeout(FINISH_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) if !status.success() => {
                    tracing::warn!("ffmpeg exited with {}", status);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    tracing::warn!("ffmpeg did not exit in time, killing it");
                    child.kill().await?;
                }
            }
        }

        if let Some(reader) = self.reader.take() {
            reader
                .await
                .map_err(|e| MediaLensError::Capture(format!("chunk reader failed: {}", e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> FfmpegCapture {
        FfmpegCapture::new(RecordingConfig {
            display_format: "x11grab".into(),
            display_input: ":0.0".into(),
            microphone_format: "pulse".into(),
            microphone_input: "default".into(),
            ..RecordingConfig::default()
        })
    }

    fn track(capture: &FfmpegCapture, kind: TrackKind) -> Arc<dyn CaptureTrack> {
        FfmpegTrack::new(kind, "fmt", "in", capture.process.clone())
    }

    #[test]
    fn test_encoder_args_video_only() {
        let capture = capture();
        let stream = CaptureStream::new(vec![track(&capture, TrackKind::Display)]);
        let args = capture.encoder_args(&stream).join(" ");

        assert!(args.contains("-f x11grab -framerate 30 -i :0.0"));
        assert!(args.contains("-map 0:v"));
        assert!(!args.contains("libopus"));
        assert!(args.ends_with("-f webm pipe:1"));
    }

    #[test]
    fn test_encoder_args_with_microphone() {
        let capture = capture();
        let stream = CaptureStream::new(vec![
            track(&capture, TrackKind::Display),
            track(&capture, TrackKind::Microphone),
        ]);
        let args = capture.encoder_args(&stream).join(" ");

        assert!(args.contains("-f pulse -i default"));
        assert!(args.contains("-map 0:v -map 1:a"));
        assert!(args.contains("-c:a libopus"));
    }

    #[test]
    fn test_stopped_tracks_are_not_encoded() {
        let capture = capture();
        let mic = track(&capture, TrackKind::Microphone);
        mic.stop();
        assert!(!mic.is_live());

        let stream = CaptureStream::new(vec![track(&capture, TrackKind::Display), mic]);
        let args = capture.encoder_args(&stream).join(" ");
        assert!(!args.contains("pulse"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_capture_error() {
        let capture = FfmpegCapture::new(RecordingConfig {
            ffmpeg_path: "definitely-not-ffmpeg-binary".into(),
            ..RecordingConfig::default()
        });
        assert!(matches!(capture.display_stream().await, Err(MediaLensError::Capture(_))));
    }
}
