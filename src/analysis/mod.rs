//! Analysis pipeline: request building, single-flight dispatch per media tab,
//! and turning backend answers into either a canonical string or a
//! classified error.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub mod classifier;
pub mod normalizer;

pub use classifier::{classify_response, classify_transport, ClassifiedError, ErrorCategory};
pub use normalizer::normalize;

use crate::config::Limits;
use crate::dispatch::{Endpoint, Part, Payload, Transport};
use crate::sources::local::check_size;
use crate::sources::youtube::looks_like_youtube;
use crate::sources::{MediaKind, MediaReference};

/// Which surface's default instructions to use when the user gives none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PromptProfile {
    /// General media analysis
    #[default]
    General,
    /// Study-oriented explanations
    Education,
}

const FORMAT_HINT: &str =
    "Format your response using Markdown and LaTeX for any mathematical expressions or formulas.";

impl PromptProfile {
    /// Default instruction for a media kind, and for YouTube references
    pub fn default_instruction(&self, kind: MediaKind, youtube: bool) -> String {
        let body = match (self, kind, youtube) {
            (PromptProfile::General, MediaKind::Image, _) => {
                "Describe this image in detail. Identify objects, people, scenes, colors, and any other notable elements."
            }
            (PromptProfile::General, MediaKind::Audio, _) => {
                "Transcribe this audio. Identify the speaker if possible and any background noises. Provide a detailed analysis of the audio content."
            }
            (PromptProfile::General, MediaKind::Video, false) => {
                "Analyze this video. Identify key frames, objects, people, and provide a scene classification. Describe the content in detail and transcribe any speech if possible."
            }
            (PromptProfile::General, MediaKind::Video, true) => {
                "Analyze this YouTube video. Identify key frames, objects, people, and provide a scene classification. Describe the content in detail and transcribe any speech if possible."
            }
            (PromptProfile::Education, MediaKind::Image, _) => {
                "Explain the educational content of this image. Identify concepts, diagrams, formulas, and any text, and explain how they relate to each other."
            }
            (PromptProfile::Education, MediaKind::Audio, _) => {
                "Transcribe this lecture audio and summarize the key concepts, definitions, and examples it covers."
            }
            (PromptProfile::Education, MediaKind::Video, false) => {
                "Summarize the educational content of this video. List the key concepts in order, explain each one, and transcribe any important speech."
            }
            (PromptProfile::Education, MediaKind::Video, true) => {
                "Summarize the educational content of this YouTube video. List the key concepts in order, explain each one, and transcribe any important speech."
            }
        };
        format!("{} {}", body, FORMAT_HINT)
    }
}

impl std::fmt::Display for PromptProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptProfile::General => write!(f, "general"),
            PromptProfile::Education => write!(f, "education"),
        }
    }
}

/// One analysis submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    media_kind: MediaKind,
    reference: MediaReference,
    instruction: String,
}

impl AnalysisRequest {
    /// Build a request, falling back to the profile's default instruction
    /// when `instruction` is missing or blank.
    pub fn new(
        media_kind: MediaKind,
        reference: MediaReference,
        instruction: Option<&str>,
        profile: PromptProfile,
    ) -> Self {
        let instruction = match instruction.map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => {
                let youtube = matches!(&reference, MediaReference::Url(remote) if remote.is_youtube());
                profile.default_instruction(media_kind, youtube)
            }
        };

        Self {
            media_kind,
            reference,
            instruction,
        }
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn reference(&self) -> &MediaReference {
        &self.reference
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

/// Pick the destination and build the kind-specific body.
///
/// All validation happens here, so a request that fails it never reaches
/// the transport.
pub fn build_payload(request: &AnalysisRequest, limits: &Limits) -> Result<Payload, ClassifiedError> {
    let prompt = Part::text("prompt", request.instruction());

    match (request.media_kind(), request.reference()) {
        (kind, MediaReference::File(media)) => {
            check_size(kind, media.size_bytes, limits)?;

            let (endpoint, field) = match kind {
                MediaKind::Image => (Endpoint::ProcessImage, "image"),
                MediaKind::Audio => (Endpoint::ProcessAudio, "audio"),
                MediaKind::Video => (Endpoint::ProcessVideo, "video"),
            };

            let file = Part::File {
                name: field.to_string(),
                file_name: media.file_name.clone(),
                mime_type: media.mime_type.clone(),
                bytes: media.bytes.clone(),
            };

            Ok(Payload::multipart(endpoint, vec![file, prompt]))
        }
        (MediaKind::Video, MediaReference::Url(remote)) => match &remote.video_id {
            Some(video_id) => Ok(Payload::json(
                Endpoint::ProcessYoutube,
                json!({
                    "videoId": video_id.as_str(),
                    "prompt": request.instruction(),
                }),
            )),
            None if looks_like_youtube(&remote.url) => Err(ClassifiedError::unrecognized_youtube_url()),
            None => Ok(Payload::multipart(
                Endpoint::ProcessVideoUrl,
                vec![Part::text("videoUrl", remote.url.as_str()), prompt],
            )),
        },
        (kind, MediaReference::Url(_)) => Err(ClassifiedError::validation(format!(
            "{} analysis needs a local file. URLs are only accepted for video.",
            kind.label()
        ))),
    }
}

/// The final state of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Success { result: String },
    Failure { error: ClassifiedError },
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisOutcome::Success { .. })
    }
}

/// What the result panel of a tab currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ResultState {
    #[default]
    Absent,
    Pending,
    Final(AnalysisOutcome),
}

/// How a call to [`Analyzer::submit`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The outcome was stored as the tab's result
    Completed(AnalysisOutcome),
    /// The response arrived for a superseded submission and was dropped
    Discarded,
    /// A submission for this tab is already in flight
    Busy,
}

#[derive(Debug, Default)]
struct TabState {
    media: Option<MediaReference>,
    result: ResultState,
    in_flight: Option<u64>,
    last_request: Option<AnalysisRequest>,
}

#[derive(Debug)]
struct WorkbenchState {
    active: MediaKind,
    tabs: HashMap<MediaKind, TabState>,
    next_ticket: u64,
}

impl WorkbenchState {
    fn tab(&mut self, kind: MediaKind) -> &mut TabState {
        self.tabs.entry(kind).or_default()
    }
}

/// Shared analysis front-end for every presentation surface.
///
/// Holds one tab per media kind. Each tab allows a single submission in
/// flight; responses for submissions that were superseded (tab switched,
/// media cleared, result closed) are discarded when they arrive.
pub struct Analyzer {
    transport: Arc<dyn Transport>,
    limits: Limits,
    profile: PromptProfile,
    credentials: Result<(), ClassifiedError>,
    state: Mutex<WorkbenchState>,
}

impl Analyzer {
    pub fn new(transport: Arc<dyn Transport>, limits: Limits, profile: PromptProfile) -> Self {
        Self {
            transport,
            limits,
            profile,
            credentials: Ok(()),
            state: Mutex::new(WorkbenchState {
                active: MediaKind::Image,
                tabs: HashMap::new(),
                next_ticket: 1,
            }),
        }
    }

    /// Record the outcome of the API key presence check; a failure
    /// short-circuits every submission before any network call.
    pub fn with_credentials(mut self, check: Result<(), ClassifiedError>) -> Self {
        self.credentials = check;
        self
    }

    pub fn profile(&self) -> PromptProfile {
        self.profile
    }

    fn state(&self) -> MutexGuard<'_, WorkbenchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_tab(&self) -> MediaKind {
        self.state().active
    }

    /// Switch media-kind tab. The tab being left loses its media, its
    /// result and interest in any in-flight response.
    pub fn switch_tab(&self, kind: MediaKind) {
        let mut state = self.state();
        if state.active == kind {
            return;
        }

        let previous = state.active;
        let tab = state.tab(previous);
        if tab.in_flight.take().is_some() {
            tracing::info!("Abandoning in-flight {} request after tab switch", previous);
        }
        tab.media = None;
        tab.result = ResultState::Absent;

        state.active = kind;
    }

    /// Select media for the active tab, superseding any previous selection
    pub fn select_media(&self, reference: MediaReference) {
        let mut state = self.state();
        let active = state.active;
        let tab = state.tab(active);
        if let Some(previous) = tab.media.replace(reference) {
            tracing::debug!("Released previous {} selection: {}", active, previous.describe());
        }
    }

    /// Clear the active tab's media; an in-flight response will be discarded
    pub fn clear_media(&self) {
        let mut state = self.state();
        let active = state.active;
        let tab = state.tab(active);
        tab.media = None;
        tab.in_flight = None;
    }

    /// Close the result view of the active tab
    pub fn close_result(&self) {
        let mut state = self.state();
        let active = state.active;
        let tab = state.tab(active);
        tab.result = ResultState::Absent;
        tab.in_flight = None;
    }

    pub fn media(&self) -> Option<MediaReference> {
        let mut state = self.state();
        let active = state.active;
        state.tab(active).media.clone()
    }

    pub fn result(&self) -> ResultState {
        let mut state = self.state();
        let active = state.active;
        state.tab(active).result.clone()
    }

    /// Whether the submit control of the active tab should be disabled
    pub fn is_busy(&self) -> bool {
        let mut state = self.state();
        let active = state.active;
        state.tab(active).in_flight.is_some()
    }

    /// Submit the active tab's media with an optional instruction
    pub async fn submit(&self, instruction: Option<&str>) -> SubmitOutcome {
        let prepared = {
            let mut state = self.state();
            let kind = state.active;
            let tab = state.tab(kind);

            if tab.in_flight.is_some() {
                return SubmitOutcome::Busy;
            }

            match tab.media.clone() {
                Some(reference) => Ok(AnalysisRequest::new(kind, reference, instruction, self.profile)),
                None => Err(ClassifiedError::missing_media(kind)),
            }
        };

        match prepared {
            Ok(request) => self.dispatch(request).await,
            Err(error) => self.fail_validation(error),
        }
    }

    /// Re-issue the last request of the active tab unchanged
    pub async fn retry(&self) -> SubmitOutcome {
        let last = {
            let mut state = self.state();
            let kind = state.active;
            let tab = state.tab(kind);
            if tab.in_flight.is_some() {
                return SubmitOutcome::Busy;
            }
            tab.last_request.clone()
        };

        match last {
            Some(request) => self.dispatch(request).await,
            None => self.fail_validation(ClassifiedError::validation("There is no previous request to retry.")),
        }
    }

    fn fail_validation(&self, error: ClassifiedError) -> SubmitOutcome {
        let outcome = AnalysisOutcome::Failure { error };
        let mut state = self.state();
        let active = state.active;
        state.tab(active).result = ResultState::Final(outcome.clone());
        SubmitOutcome::Completed(outcome)
    }

    async fn dispatch(&self, request: AnalysisRequest) -> SubmitOutcome {
        let kind = request.media_kind();

        let payload = match self
            .credentials
            .clone()
            .and_then(|_| build_payload(&request, &self.limits))
        {
            Ok(payload) => payload,
            Err(error) => {
                tracing::info!("Rejected {} request before dispatch: {}", kind, error.category);
                return self.fail_validation(error);
            }
        };

        let ticket = {
            let mut state = self.state();
            let ticket = state.next_ticket;
            state.next_ticket += 1;

            let tab = state.tab(kind);
            if tab.in_flight.is_some() {
                return SubmitOutcome::Busy;
            }
            tab.in_flight = Some(ticket);
            tab.result = ResultState::Pending;
            tab.last_request = Some(request);
            ticket
        };

        tracing::info!("Dispatching {} request #{} to {}", kind, ticket, payload.endpoint);

        let outcome = match self.transport.send(payload).await {
            Ok(response) if response.is_success() => AnalysisOutcome::Success {
                result: normalize(&response.body),
            },
            Ok(response) => {
                tracing::warn!("Backend responded {} for {} request #{}", response.status, kind, ticket);
                AnalysisOutcome::Failure {
                    error: classify_response(&response),
                }
            }
            Err(error) => {
                tracing::warn!("No response for {} request #{}: {}", kind, ticket, error);
                AnalysisOutcome::Failure {
                    error: classify_transport(&error, &self.transport.base_url()),
                }
            }
        };

        let mut state = self.state();
        let current = state.active == kind;
        let tab = state.tab(kind);
        if !current || tab.in_flight != Some(ticket) {
            tracing::warn!("Discarding superseded response for {} request #{}", kind, ticket);
            return SubmitOutcome::Discarded;
        }

        tab.in_flight = None;
        tab.media = None;
        tab.result = ResultState::Final(outcome.clone());
        SubmitOutcome::Completed(outcome)
    }
}
