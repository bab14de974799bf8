//! Export actions on a finalized recording: local WebM download,
//! server-side transcode and shareable-link publication.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::analysis::{classify_response, classify_transport, ClassifiedError};
use crate::dispatch::{Endpoint, Part, Payload, RawResponse, Transport};
use crate::recorder::RECORDING_MIME;
use crate::{MediaLensError, Result};

/// File name the recording is uploaded under
const UPLOAD_FILE_NAME: &str = "recording.webm";

/// Target format when a transcode does not name one
pub const DEFAULT_TRANSCODE_FORMAT: &str = "mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Webm,
    Mp4,
    ShareableLink,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Webm => "webm",
            ExportFormat::Mp4 => "mp4",
            ExportFormat::ShareableLink => "shareable_link",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    #[default]
    Idle,
    InFlight,
    Done,
    Failed,
}

/// The last known state of one export action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportJob {
    pub format: ExportFormat,
    pub status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

impl ExportJob {
    fn idle(format: ExportFormat) -> Self {
        Self {
            format,
            status: ExportStatus::Idle,
            result_url: None,
        }
    }
}

/// Runs export actions for one recording session.
///
/// Each action tracks its own job; triggering an action while the same
/// action is in flight fails with [`MediaLensError::ExportBusy`]. Different
/// actions never block each other.
pub struct ExportPipeline {
    transport: Arc<dyn Transport>,
    jobs: Mutex<HashMap<ExportFormat, ExportJob>>,
}

impl ExportPipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<ExportFormat, ExportJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of an export action
    pub fn job(&self, format: ExportFormat) -> ExportJob {
        self.jobs()
            .get(&format)
            .cloned()
            .unwrap_or_else(|| ExportJob::idle(format))
    }

    pub fn is_in_flight(&self, format: ExportFormat) -> bool {
        self.job(format).status == ExportStatus::InFlight
    }

    fn begin(&self, format: ExportFormat) -> Result<JobGuard<'_>> {
        let mut jobs = self.jobs();
        let job = jobs.entry(format).or_insert_with(|| ExportJob::idle(format));
        if job.status == ExportStatus::InFlight {
            return Err(MediaLensError::ExportBusy(format.as_str()));
        }
        job.status = ExportStatus::InFlight;
        job.result_url = None;

        Ok(JobGuard {
            pipeline: self,
            format,
            settled: false,
        })
    }

    fn settle(&self, format: ExportFormat, status: ExportStatus, result_url: Option<String>) {
        let mut jobs = self.jobs();
        let job = jobs.entry(format).or_insert_with(|| ExportJob::idle(format));
        job.status = status;
        job.result_url = result_url;
    }

    /// Save the raw recording into `dir`. No network call.
    pub fn download_webm(&self, blob: &[u8], dir: &Path) -> Result<PathBuf> {
        let job = self.begin(ExportFormat::Webm)?;

        let path = dir.join(crate::utils::recording_filename("webm"));
        let result = write_file(dir, &path, blob).map(|_| path);

        job.finish(&result, None);
        if let Ok(path) = &result {
            tracing::info!("Saved recording to {}", path.display());
        }
        result
    }

    /// Ask the backend to convert the recording; returns the converted bytes
    pub async fn transcode(&self, blob: &[u8], format: Option<&str>) -> Result<Vec<u8>> {
        let job = self.begin(ExportFormat::Mp4)?;
        let result = self.convert(blob, format).await;
        job.finish(&result, None);
        result
    }

    /// Transcode to MP4 and write the result into `dir`. The job is done
    /// only once the file is on disk.
    pub async fn transcode_to(&self, blob: &[u8], dir: &Path) -> Result<PathBuf> {
        let job = self.begin(ExportFormat::Mp4)?;

        let path = dir.join(crate::utils::recording_filename(DEFAULT_TRANSCODE_FORMAT));
        let result = match self.convert(blob, Some(DEFAULT_TRANSCODE_FORMAT)).await {
            Ok(converted) => write_file(dir, &path, &converted).map(|_| path),
            Err(e) => Err(e),
        };

        job.finish(&result, None);
        if let Ok(path) = &result {
            tracing::info!("Saved converted recording to {}", path.display());
        }
        result
    }

    async fn convert(&self, blob: &[u8], format: Option<&str>) -> Result<Vec<u8>> {
        let format = format
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_TRANSCODE_FORMAT);

        let payload = Payload::multipart(
            Endpoint::ConvertVideo,
            vec![recording_part(blob), Part::text("format", format)],
        );

        self.send(payload).await.map(|response| response.body)
    }

    /// Upload the recording and return the shareable URL
    pub async fn publish(&self, blob: &[u8]) -> Result<String> {
        let job = self.begin(ExportFormat::ShareableLink)?;

        let payload = Payload::multipart(Endpoint::CreateShareableLink, vec![recording_part(blob)]);

        let result = match self.send(payload).await {
            Ok(response) => shareable_url(&response),
            Err(e) => Err(e),
        };

        let url = result.as_ref().ok().cloned();
        job.finish(&result, url);
        result
    }

    async fn send(&self, payload: Payload) -> Result<RawResponse> {
        let endpoint = payload.endpoint;
        tracing::debug!("Export request to {}", endpoint);

        match self.transport.send(payload).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => {
                let error = classify_response(&response);
                tracing::warn!("{} failed: {}", endpoint, error.category);
                Err(error.into())
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", endpoint, e);
                Err(classify_transport(&e, &self.transport.base_url()).into())
            }
        }
    }
}

/// Marks its job `Failed` if dropped before [`JobGuard::finish`], e.g. when
/// the export future is cancelled mid-request.
struct JobGuard<'a> {
    pipeline: &'a ExportPipeline,
    format: ExportFormat,
    settled: bool,
}

impl JobGuard<'_> {
    fn finish<T>(mut self, result: &Result<T>, result_url: Option<String>) {
        let status = if result.is_ok() {
            ExportStatus::Done
        } else {
            ExportStatus::Failed
        };
        self.pipeline.settle(self.format, status, result_url);
        self.settled = true;
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("{} export abandoned before completion", self.format);
            self.pipeline.settle(self.format, ExportStatus::Failed, None);
        }
    }
}

fn write_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs_err::create_dir_all(dir)?;
    fs_err::write(path, bytes)?;
    Ok(())
}

fn recording_part(blob: &[u8]) -> Part {
    Part::File {
        name: "video".to_string(),
        file_name: UPLOAD_FILE_NAME.to_string(),
        mime_type: RECORDING_MIME.to_string(),
        bytes: blob.to_vec(),
    }
}

/// Pull `url` out of a `create-shareable-link` response
fn shareable_url(response: &RawResponse) -> Result<String> {
    let url = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|body| body["url"].as_str().map(str::to_string))
        .filter(|url| !url.is_empty());

    url.ok_or_else(|| ClassifiedError::unknown(response.status, &response.text()).into())
}
