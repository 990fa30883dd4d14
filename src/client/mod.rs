//! Client-side job orchestration.
//!
//! [`Orchestrator::submit`] takes a finished booth session (the captured
//! photos plus a style) and drives it end to end: encode, one call to the
//! styling worker, then a best-effort download of every artifact. Submissions
//! are deduplicated by idempotency key; concurrent submits of the same
//! session share one underlying job. The job itself runs in a spawned task,
//! so a caller that stops awaiting does not stop the work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, interval_at, sleep_until};

use crate::models::job::{ArtifactOrigin, EncodedPhoto, JobState, PhotoItem, StyledPhoto};
use crate::models::style::StylePreset;
use crate::models::wire::StyleBatchRequest;
use crate::services::imaging;
use crate::timing::{PhaseTimer, client_phase};

use self::registry::{Begin, JobLease, JobPublisher, JobRegistry};
use self::transport::{ArtifactFetcher, WorkerTransport};

mod registry;
pub mod transport;

/// What every waiter on a job receives.
pub type JobOutcome = Result<Arc<Vec<StyledPhoto>>, SubmitError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("expected {expected} photos, got {got}")]
    InvalidCount { expected: usize, got: usize },

    #[error("photo {index} could not be encoded: {message}")]
    EncodingFailed { index: usize, message: String },

    #[error("styling timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("styling was cancelled")]
    Cancelled,

    #[error("styling failed: {0}")]
    Api(String),
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Photos a session must hand in; anything else is rejected up front.
    pub expected_count: usize,
    /// End-to-end deadline for encode plus the worker call.
    pub timeout: Duration,
    /// Interval between liveness log lines while waiting on the worker.
    pub heartbeat: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            expected_count: 4,
            timeout: Duration::from_secs(240),
            heartbeat: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn WorkerTransport>,
    fetcher: Arc<dyn ArtifactFetcher>,
    registry: Arc<JobRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn WorkerTransport>,
        fetcher: Arc<dyn ArtifactFetcher>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            transport,
            fetcher,
            registry: JobRegistry::new(),
            config,
        }
    }

    /// Submit a session for styling, or attach to the identical in-flight
    /// submission. The returned photos are in capture order; any artifact
    /// that could not be fetched back comes through as the original capture.
    ///
    /// Callers managing the credit ledger must debit only after this returns
    /// `Ok` with the full-length result; any error, including a timeout that
    /// leaves the worker running, means no credit was consumed.
    pub async fn submit(
        &self,
        key: &str,
        photos: Vec<Vec<u8>>,
        style: StylePreset,
    ) -> JobOutcome {
        if photos.len() != self.config.expected_count {
            return Err(SubmitError::InvalidCount {
                expected: self.config.expected_count,
                got: photos.len(),
            });
        }

        match self.registry.begin(key) {
            Begin::Attached(lease) => {
                tracing::info!(key, "joining in-flight styling job");
                await_outcome(lease).await
            }
            Begin::Created { lease, publisher } => {
                let ctx = DriveCtx {
                    key: key.to_string(),
                    transport: Arc::clone(&self.transport),
                    fetcher: Arc::clone(&self.fetcher),
                    registry: Arc::clone(&self.registry),
                    config: self.config,
                };
                tokio::spawn(drive(ctx, publisher, photos, style));
                await_outcome(lease).await
            }
        }
    }

    /// Request cancellation of the job under `key`. Returns whether a job was
    /// there to cancel; the job itself winds down at its next checkpoint.
    pub fn cancel(&self, key: &str) -> bool {
        let found = self.registry.cancel(key);
        if found {
            tracing::info!(key, "cancellation requested");
        }
        found
    }

    /// State of the job under `key`; `Idle` when nothing is in flight.
    pub fn state(&self, key: &str) -> JobState {
        self.registry.state(key)
    }
}

async fn await_outcome(mut lease: JobLease) -> JobOutcome {
    loop {
        if let Some(outcome) = lease.outcome_rx.borrow_and_update().clone() {
            return outcome;
        }
        if lease.outcome_rx.changed().await.is_err() {
            // Runner dropped its channel without publishing.
            return Err(SubmitError::Api("styling task ended without a result".into()));
        }
    }
}

struct DriveCtx {
    key: String,
    transport: Arc<dyn WorkerTransport>,
    fetcher: Arc<dyn ArtifactFetcher>,
    registry: Arc<JobRegistry>,
    config: OrchestratorConfig,
}

/// Removes the registry entry when the runner ends, even if it panicked; a
/// stranded key would block every later submit under it.
struct FinishGuard {
    registry: Arc<JobRegistry>,
    key: String,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.registry.finish(&self.key);
    }
}

/// Run one job to its outcome and publish it. Always finishes the registry
/// entry, whatever happened.
async fn drive(ctx: DriveCtx, publisher: JobPublisher, photos: Vec<Vec<u8>>, style: StylePreset) {
    let _finish = FinishGuard {
        registry: Arc::clone(&ctx.registry),
        key: ctx.key.clone(),
    };
    let outcome = run_job(&ctx, &publisher, photos, style).await;
    let final_state = match &outcome {
        Ok(_) => JobState::Complete,
        Err(SubmitError::Cancelled) => JobState::Cancelled,
        Err(_) => JobState::Failed,
    };
    match &outcome {
        Ok(styled) => tracing::info!(key = %ctx.key, photos = styled.len(), "styling job complete"),
        Err(err) => tracing::warn!(key = %ctx.key, error = %err, "styling job failed"),
    }
    publisher.state_tx.send_replace(final_state);
    publisher.outcome_tx.send_replace(Some(outcome));
}

async fn run_job(
    ctx: &DriveCtx,
    publisher: &JobPublisher,
    photos: Vec<Vec<u8>>,
    style: StylePreset,
) -> JobOutcome {
    let cancel = &publisher.cancel;
    let mut timer = PhaseTimer::start(format!("submit-{}", ctx.key));
    // The deadline spans encoding and the worker call. Downloads run after
    // it: they are bounded by their own socket timeouts and degrade to the
    // originals instead of failing.
    let deadline = Instant::now() + ctx.config.timeout;

    publisher.state_tx.send_replace(JobState::Encoding);
    timer.start_phase(client_phase::ENCODE);
    let mut items: Vec<PhotoItem> = photos
        .into_iter()
        .enumerate()
        .map(|(index, source)| PhotoItem::new(index, source))
        .collect();
    let mut wire_photos = Vec::with_capacity(items.len());
    for item in &mut items {
        if cancel.is_cancelled() {
            timer.error(client_phase::ENCODE, "cancelled during encode");
            return Err(SubmitError::Cancelled);
        }
        let encoded = EncodedPhoto(
            imaging::to_jpeg_base64(item.source.clone(), imaging::JPEG_QUALITY)
                .await
                .map_err(|e| {
                    timer.error(client_phase::ENCODE, "photo could not be encoded");
                    SubmitError::EncodingFailed {
                        index: item.index,
                        message: e.to_string(),
                    }
                })?,
        );
        wire_photos.push(encoded.as_str().to_string());
        item.encoded = Some(encoded);
    }
    timer.end_phase(client_phase::ENCODE, "photos encoded");

    publisher.state_tx.send_replace(JobState::Dispatched);
    let request = StyleBatchRequest {
        photos: wire_photos,
        style: style.to_string(),
    };

    publisher.state_tx.send_replace(JobState::AwaitingResult);
    timer.start_phase(client_phase::API_CALL);
    let call = ctx.transport.process(&request);
    tokio::pin!(call);
    let mut heartbeat = interval_at(Instant::now() + ctx.config.heartbeat, ctx.config.heartbeat);
    let result = loop {
        tokio::select! {
            result = &mut call => break result,
            _ = sleep_until(deadline) => {
                timer.error(client_phase::API_CALL, "deadline elapsed, abandoning job");
                // Tear the whole job down; waiters all see the timeout.
                cancel.cancel();
                return Err(SubmitError::Timeout {
                    after_ms: ctx.config.timeout.as_millis() as u64,
                });
            }
            _ = cancel.cancelled() => {
                timer.error(client_phase::API_CALL, "cancelled while waiting on worker");
                return Err(SubmitError::Cancelled);
            }
            _ = heartbeat.tick() => {
                timer.progress(client_phase::API_CALL, "still waiting on worker");
            }
        }
    };
    let urls = match result {
        Ok(urls) => urls,
        Err(err) => {
            timer.error(client_phase::API_CALL, "worker call failed");
            return Err(SubmitError::Api(err.to_string()));
        }
    };
    if urls.len() != items.len() {
        timer.error(client_phase::API_CALL, "worker answered with wrong arity");
        return Err(SubmitError::Api(format!(
            "malformed response: expected {} urls, got {}",
            items.len(),
            urls.len()
        )));
    }
    timer.end_phase(client_phase::API_CALL, "worker finished");

    publisher.state_tx.send_replace(JobState::Downloading);
    timer.start_phase(client_phase::DOWNLOAD);
    let mut styled = Vec::with_capacity(items.len());
    for (item, url) in items.iter_mut().zip(&urls) {
        if cancel.is_cancelled() {
            timer.error(client_phase::DOWNLOAD, "cancelled during download");
            return Err(SubmitError::Cancelled);
        }
        item.result_url = Some(url.clone());
        match fetch_decodable(ctx.fetcher.as_ref(), url).await {
            Ok(bytes) => styled.push(StyledPhoto {
                index: item.index,
                bytes,
                origin: ArtifactOrigin::Styled,
            }),
            Err(reason) => {
                tracing::warn!(
                    key = %ctx.key,
                    index = item.index,
                    url = %url,
                    reason = %reason,
                    "artifact fetch failed, keeping original"
                );
                timer.progress(
                    client_phase::DOWNLOAD,
                    &format!("photo {} fell back to the original", item.index),
                );
                styled.push(StyledPhoto {
                    index: item.index,
                    bytes: item.source.clone(),
                    origin: ArtifactOrigin::OriginalFallback,
                });
            }
        }
    }
    timer.end_phase(client_phase::DOWNLOAD, "artifacts fetched");
    timer.summary();

    Ok(Arc::new(styled))
}

/// Fetch an artifact and make sure it decodes as an image before trusting it.
async fn fetch_decodable(fetcher: &dyn ArtifactFetcher, url: &str) -> Result<Vec<u8>, String> {
    let bytes = fetcher.fetch(url).await.map_err(|e| e.to_string())?;
    tokio::task::spawn_blocking(move || match image::load_from_memory(&bytes) {
        Ok(_) => Ok(bytes),
        Err(e) => Err(format!("artifact is not a decodable image: {e}")),
    })
    .await
    .map_err(|e| e.to_string())?
}
