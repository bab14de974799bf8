//! Screen capture: display (+ optional microphone) tracks feeding an encoder
//! that hands back a chunk per timeslice. Chunks are joined into one
//! immutable blob when recording stops.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub mod ffmpeg;

pub use ffmpeg::FfmpegCapture;

use crate::{MediaLensError, Result};

/// MIME type of the raw captured format
pub const RECORDING_MIME: &str = "video/webm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Display,
    Microphone,
}

/// A live capture source holding an OS-level lock until stopped
pub trait CaptureTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> String;

    /// Release the underlying device. Idempotent.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// A set of tracks that are encoded together
#[derive(Clone, Default)]
pub struct CaptureStream {
    tracks: Vec<Arc<dyn CaptureTrack>>,
}

impl CaptureStream {
    pub fn new(tracks: Vec<Arc<dyn CaptureTrack>>) -> Self {
        Self { tracks }
    }

    pub fn add_track(&mut self, track: Arc<dyn CaptureTrack>) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[Arc<dyn CaptureTrack>] {
        &self.tracks
    }

    pub fn has_microphone(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Microphone)
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            if track.is_live() {
                tracing::debug!("Stopping capture track {}", track.label());
            }
            track.stop();
        }
    }
}

/// Finishes an encoder: flush what is buffered, then close the chunk channel
#[async_trait]
pub trait EncoderControl: Send {
    async fn finish(&mut self) -> Result<()>;
}

/// A running encoder. `chunks` closes once the encoder has finished.
pub struct Encoder {
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub control: Box<dyn EncoderControl>,
}

/// Platform capture facilities
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Ask for display capture (the permission prompt, where there is one)
    async fn display_stream(&self) -> Result<CaptureStream>;

    /// Ask for a microphone stream
    async fn microphone_stream(&self) -> Result<CaptureStream>;

    /// Start encoding the stream, emitting one chunk per `timeslice`
    async fn start_encoder(&self, stream: &CaptureStream, timeslice: Duration) -> Result<Encoder>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Capturing,
    Finalized,
}

impl RecordingState {
    fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Capturing => "capturing",
            RecordingState::Finalized => "finalized",
        }
    }
}

/// One capture lifecycle, from start to finalized blob
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub id: Uuid,
    pub state: RecordingState,
    pub chunks: Vec<Vec<u8>>,
    pub elapsed_seconds: u64,
    pub with_microphone: bool,
    blob: Option<Arc<[u8]>>,
}

impl RecordingSession {
    fn capturing(with_microphone: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecordingState::Capturing,
            with_microphone,
            ..Default::default()
        }
    }

    /// Buffer a chunk; ignored unless capturing
    fn push_chunk(&mut self, chunk: Vec<u8>) {
        if self.state == RecordingState::Capturing && !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    /// The capturing -> finalized transition. Produces the blob exactly once.
    fn finalize(&mut self, elapsed_seconds: u64) {
        if self.state != RecordingState::Capturing {
            return;
        }
        let blob: Vec<u8> = std::mem::take(&mut self.chunks).concat();
        self.blob = Some(Arc::from(blob));
        self.elapsed_seconds = elapsed_seconds;
        self.state = RecordingState::Finalized;
    }

    pub fn blob(&self) -> Option<Arc<[u8]>> {
        self.blob.clone()
    }
}

struct ActiveCapture {
    stream: CaptureStream,
    control: Box<dyn EncoderControl>,
    pump: Option<JoinHandle<()>>,
    session: Arc<Mutex<RecordingSession>>,
    started: Instant,
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        // abort path: capture locks must not outlive the session
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.stream.stop_all();
    }
}

enum Phase {
    Idle,
    Capturing(ActiveCapture),
    Finalized(RecordingSession),
}

/// Drives one recording session at a time
pub struct ScreenRecorder {
    backend: Arc<dyn CaptureBackend>,
    timeslice: Duration,
    phase: Phase,
}

impl ScreenRecorder {
    pub fn new(backend: Arc<dyn CaptureBackend>, timeslice: Duration) -> Self {
        Self {
            backend,
            timeslice,
            phase: Phase::Idle,
        }
    }

    pub fn state(&self) -> RecordingState {
        match self.phase {
            Phase::Idle => RecordingState::Idle,
            Phase::Capturing(_) => RecordingState::Capturing,
            Phase::Finalized(_) => RecordingState::Finalized,
        }
    }

    /// Whole seconds since capture started (or the final length once finalized)
    pub fn elapsed_seconds(&self) -> u64 {
        match &self.phase {
            Phase::Idle => 0,
            Phase::Capturing(active) => active.started.elapsed().as_secs(),
            Phase::Finalized(session) => session.elapsed_seconds,
        }
    }

    pub fn live_track_count(&self) -> usize {
        match &self.phase {
            Phase::Capturing(active) => active.stream.live_track_count(),
            _ => 0,
        }
    }

    /// The finalized session, if there is one
    pub fn session(&self) -> Option<&RecordingSession> {
        match &self.phase {
            Phase::Finalized(session) => Some(session),
            _ => None,
        }
    }

    /// Start capturing. Microphone failure is not fatal: recording goes on
    /// video-only.
    pub async fn start(&mut self, with_microphone: bool) -> Result<()> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(MediaLensError::InvalidRecorderState(self.state().as_str()));
        }

        let mut stream = self.backend.display_stream().await?;

        if with_microphone {
            match self.backend.microphone_stream().await {
                Ok(mic) => {
                    for track in mic.tracks() {
                        stream.add_track(track.clone());
                    }
                }
                Err(e) => tracing::warn!("Microphone unavailable, recording video only: {}", e),
            }
        }

        let encoder = match self.backend.start_encoder(&stream, self.timeslice).await {
            Ok(encoder) => encoder,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };

        let session = Arc::new(Mutex::new(RecordingSession::capturing(stream.has_microphone())));
        let pump = tokio::spawn(pump_chunks(encoder.chunks, session.clone()));

        tracing::info!(
            "Recording started with {} track(s), microphone: {}",
            stream.tracks().len(),
            stream.has_microphone()
        );

        self.phase = Phase::Capturing(ActiveCapture {
            stream,
            control: encoder.control,
            pump: Some(pump),
            session,
            started: Instant::now(),
        });

        Ok(())
    }

    /// Stop capturing: flush the encoder, assemble the blob, release every track
    pub async fn stop(&mut self) -> Result<Arc<[u8]>> {
        let mut active = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Capturing(active) => active,
            other => {
                let state = match other {
                    Phase::Finalized(_) => "finalized",
                    _ => "idle",
                };
                self.phase = other;
                return Err(MediaLensError::InvalidRecorderState(state));
            }
        };

        if let Err(e) = active.control.finish().await {
            tracing::warn!("Encoder did not finish cleanly: {}", e);
        }

        if let Some(pump) = active.pump.take() {
            if let Err(e) = pump.await {
                tracing::warn!("Chunk pump ended abnormally: {}", e);
            }
        }

        active.stream.stop_all();
        debug_assert_eq!(active.stream.live_track_count(), 0);

        let elapsed = active.started.elapsed().as_secs();
        let session = {
            let mut guard = active.session.lock().unwrap_or_else(PoisonError::into_inner);
            guard.finalize(elapsed);
            std::mem::take(&mut *guard)
        };

        let blob = session
            .blob()
            .ok_or_else(|| MediaLensError::Capture("recording produced no blob".to_string()))?;

        tracing::info!(
            "Recording {} finalized: {} bytes, {}s",
            session.id,
            blob.len(),
            session.elapsed_seconds
        );

        self.phase = Phase::Finalized(session);
        Ok(blob)
    }

    /// Throw away the current session, releasing any capture tracks
    pub async fn discard(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Capturing(mut active) => {
                if let Err(e) = active.control.finish().await {
                    tracing::debug!("Encoder finish during discard failed: {}", e);
                }
                // Drop stops the tracks and the pump
                drop(active);
                tracing::info!("Recording discarded while capturing");
            }
            Phase::Finalized(session) => {
                tracing::info!("Discarded recording {}", session.id);
            }
            Phase::Idle => {}
        }
    }
}

/// Why [`wait_for_stop`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRequest {
    /// A line was entered
    Enter,
    /// The interrupt future resolved (Ctrl-C)
    Interrupt,
}

/// Wait until the user asks to stop recording, calling `on_tick` every `tick`.
///
/// A closed or unreadable `input` never counts as a stop request; from then
/// on only `interrupt` can end the wait.
pub async fn wait_for_stop<R, F>(input: R, interrupt: F, tick: Duration, mut on_tick: impl FnMut()) -> StopRequest
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    let mut lines = input.lines();
    let mut input_open = true;
    let mut ticker = tokio::time::interval(tick);
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = ticker.tick() => on_tick(),
            line = lines.next_line(), if input_open => match line {
                Ok(Some(_)) => return StopRequest::Enter,
                Ok(None) => {
                    tracing::info!("Input closed; recording until interrupted");
                    input_open = false;
                }
                Err(e) => {
                    tracing::warn!("Could not read input ({}); recording until interrupted", e);
                    input_open = false;
                }
            },
            _ = &mut interrupt => return StopRequest::Interrupt,
        }
    }
}

async fn pump_chunks(mut chunks: mpsc::Receiver<Vec<u8>>, session: Arc<Mutex<RecordingSession>>) {
    while let Some(chunk) = chunks.recv().await {
        session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_chunk(chunk);
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeBackend;
    use super::*;

    fn five_chunks() -> Vec<Vec<u8>> {
        (0u8..5).map(|i| vec![i; 4]).collect()
    }

    fn recorder(backend: Arc<FakeBackend>) -> ScreenRecorder {
        ScreenRecorder::new(backend, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_stop_after_five_chunks_without_microphone() {
        let backend = Arc::new(FakeBackend::new(five_chunks(), true));
        let mut recorder = recorder(backend.clone());

        recorder.start(false).await.unwrap();
        assert_eq!(recorder.state(), RecordingState::Capturing);
        assert_eq!(recorder.live_track_count(), 1);

        let blob = recorder.stop().await.unwrap();
        assert_eq!(blob.len(), 20);
        assert_eq!(&blob[..4], &[0, 0, 0, 0]);
        assert_eq!(&blob[16..], &[4, 4, 4, 4]);

        assert_eq!(recorder.state(), RecordingState::Finalized);
        assert_eq!(backend.live_tracks(), 0);
        assert_eq!(recorder.live_track_count(), 0);

        let session = recorder.session().unwrap();
        assert!(session.chunks.is_empty());
        assert!(!session.with_microphone);
    }

    #[tokio::test]
    async fn test_microphone_failure_is_not_fatal() {
        let backend = Arc::new(FakeBackend::new(five_chunks(), false));
        let mut recorder = recorder(backend.clone());

        recorder.start(true).await.unwrap();
        assert_eq!(recorder.live_track_count(), 1);

        recorder.stop().await.unwrap();
        assert!(!recorder.session().unwrap().with_microphone);
    }

    #[tokio::test]
    async fn test_microphone_tracks_are_released_on_stop() {
        let backend = Arc::new(FakeBackend::new(five_chunks(), true));
        let mut recorder = recorder(backend.clone());

        recorder.start(true).await.unwrap();
        assert_eq!(recorder.live_track_count(), 2);

        recorder.stop().await.unwrap();
        assert_eq!(backend.live_tracks(), 0);
        assert!(recorder.session().unwrap().with_microphone);
    }

    #[tokio::test]
    async fn test_new_recording_requires_discard() {
        let backend = Arc::new(FakeBackend::new(five_chunks(), true));
        let mut recorder = recorder(backend.clone());

        recorder.start(false).await.unwrap();
        assert!(matches!(
            recorder.start(false).await,
            Err(MediaLensError::InvalidRecorderState("capturing"))
        ));

        let first = recorder.stop().await.unwrap();
        assert!(matches!(
            recorder.start(false).await,
            Err(MediaLensError::InvalidRecorderState("finalized"))
        ));
        assert!(matches!(recorder.stop().await, Err(MediaLensError::InvalidRecorderState("finalized"))));

        // the finalized blob is untouched by the failed calls
        assert_eq!(recorder.session().unwrap().blob().unwrap(), first);

        recorder.discard().await;
        assert_eq!(recorder.state(), RecordingState::Idle);
        recorder.start(false).await.unwrap();
    }

    #[tokio::test]
    async fn test_discard_while_capturing_releases_tracks() {
        let backend = Arc::new(FakeBackend::new(five_chunks(), true));
        let mut recorder = recorder(backend.clone());

        recorder.start(true).await.unwrap();
        recorder.discard().await;

        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(backend.live_tracks(), 0);
        assert!(recorder.session().is_none());
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_rejected() {
        let backend = Arc::new(FakeBackend::new(Vec::new(), true));
        let mut recorder = recorder(backend);
        assert!(matches!(recorder.stop().await, Err(MediaLensError::InvalidRecorderState("idle"))));
    }

    #[test]
    fn test_chunks_ignored_after_finalize() {
        let mut session = RecordingSession::capturing(false);
        session.push_chunk(vec![1, 2]);
        session.push_chunk(Vec::new());
        session.finalize(3);
        session.push_chunk(vec![9]);

        assert_eq!(session.blob().unwrap().as_ref(), &[1, 2]);
        assert!(session.chunks.is_empty());
        assert_eq!(session.elapsed_seconds, 3);

        // a second finalize does not rebuild the blob
        session.finalize(10);
        assert_eq!(session.elapsed_seconds, 3);
    }

    #[tokio::test]
    async fn test_enter_stops_recording() {
        let request = wait_for_stop(&b"\n"[..], std::future::pending::<()>(), Duration::from_millis(10), || {}).await;
        assert_eq!(request, StopRequest::Enter);
    }

    #[tokio::test]
    async fn test_closed_input_waits_for_interrupt() {
        let started = Instant::now();
        let mut ticks = 0;
        let request = wait_for_stop(
            &b""[..],
            tokio::time::sleep(Duration::from_millis(80)),
            Duration::from_millis(10),
            || ticks += 1,
        )
        .await;

        assert_eq!(request, StopRequest::Interrupt);
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert!(ticks > 1);
    }
}
