//! Sequential styling worker.
//!
//! The server half of the pipeline: one batch in, every photo styled,
//! normalized and uploaded in order, or the whole job fails. There is no
//! per-photo parallelism: the model rate-limits aggressively, and one
//! in-flight call with a pause between photos is the shape that survives it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tokio::time::sleep;
use uuid::Uuid;

use crate::models::job::{AttemptOutcome, AttemptRecord};
use crate::models::style::StylePreset;
use crate::services::genmodel::{ModelError, StyleModel};
use crate::services::imaging::{self, ImagingError, OutputFrame};
use crate::services::retry::{self, RetryPolicy};
use crate::services::storage::{ArtifactStore, StorageError, artifact_key};
use crate::timing::{PhaseTimer, server_phase};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("batch contained no photos")]
    EmptyBatch,

    #[error("photo {index} failed: {source}")]
    Model {
        index: usize,
        #[source]
        source: ModelError,
    },

    #[error("photo {index} still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: usize,
        attempts: u32,
        #[source]
        source: ModelError,
    },

    #[error("photo {index} could not be fitted to the output frame: {source}")]
    Normalize {
        index: usize,
        #[source]
        source: ImagingError,
    },

    #[error("photo {index} upload failed: {source}")]
    Upload {
        index: usize,
        #[source]
        source: StorageError,
    },
}

/// One finished photo: where it landed and what it took to get there.
#[derive(Debug, Clone)]
pub struct ProcessedItem {
    pub index: usize,
    pub url: String,
    pub records: Vec<AttemptRecord>,
}

impl ProcessedItem {
    /// Model calls spent on this photo, counting the successful one.
    pub fn attempts(&self) -> u32 {
        self.records.len() as u32
    }
}

/// A fully processed batch. Items are in submission order.
#[derive(Debug, Clone)]
pub struct StyledBatch {
    pub job_id: Uuid,
    pub style: StylePreset,
    pub items: Vec<ProcessedItem>,
}

impl StyledBatch {
    pub fn urls(&self) -> Vec<String> {
        self.items.iter().map(|item| item.url.clone()).collect()
    }
}

pub struct StyleWorker {
    model: Arc<dyn StyleModel>,
    store: Arc<dyn ArtifactStore>,
    retry: RetryPolicy,
    inter_item_delay: Duration,
    frame: OutputFrame,
}

impl StyleWorker {
    pub fn new(
        model: Arc<dyn StyleModel>,
        store: Arc<dyn ArtifactStore>,
        retry: RetryPolicy,
        inter_item_delay: Duration,
        frame: OutputFrame,
    ) -> Self {
        Self {
            model,
            store,
            retry,
            inter_item_delay,
            frame,
        }
    }

    /// Style every photo in the batch, strictly in order. All-or-nothing: the
    /// first terminal failure fails the job, and artifacts already uploaded
    /// stay where they are (the key namespace is reaped by bucket lifecycle,
    /// not by us).
    pub async fn process(
        &self,
        job_id: Uuid,
        style: StylePreset,
        photos: &[String],
    ) -> Result<StyledBatch, WorkerError> {
        if photos.is_empty() {
            return Err(WorkerError::EmptyBatch);
        }

        let mut timer = PhaseTimer::start(format!("job-{job_id}"));
        timer.start_phase(server_phase::INIT);
        let prompt = style.prompt();
        tracing::info!(%job_id, %style, photos = photos.len(), "styling batch accepted");
        timer.end_phase(server_phase::INIT, "batch validated");

        let mut items = Vec::with_capacity(photos.len());
        for (index, photo) in photos.iter().enumerate() {
            timer.start_phase(server_phase::GEMINI);
            let (styled, records) = match self
                .stylize_with_retry(&mut timer, index, photo, prompt)
                .await
            {
                Ok(done) => done,
                Err(err) => {
                    timer.error(server_phase::GEMINI, &format!("photo {index} failed: {err}"));
                    return Err(err);
                }
            };
            timer.end_phase(
                server_phase::GEMINI,
                &format!("photo {index} styled after {} attempt(s)", records.len()),
            );

            timer.start_phase(server_phase::UPLOAD);
            let normalized = match imaging::normalize(styled, self.frame).await {
                Ok(bytes) => bytes,
                Err(source) => {
                    timer.error(
                        server_phase::UPLOAD,
                        &format!("photo {index} could not be fitted to the frame"),
                    );
                    return Err(WorkerError::Normalize { index, source });
                }
            };
            let key = artifact_key(job_id, style, index);
            let url = match self.store.put_public(&key, &normalized, "image/png").await {
                Ok(url) => url,
                Err(source) => {
                    timer.error(server_phase::UPLOAD, &format!("photo {index} upload failed"));
                    return Err(WorkerError::Upload { index, source });
                }
            };
            timer.end_phase(server_phase::UPLOAD, &format!("photo {index} uploaded"));
            counter!("styling_photos_total").increment(1);
            items.push(ProcessedItem {
                index,
                url,
                records,
            });

            // Spacing between model calls, pointless after the last photo.
            if index + 1 < photos.len() {
                tracing::debug!(
                    %job_id,
                    index,
                    delay_ms = self.inter_item_delay.as_millis() as u64,
                    "pausing before next photo"
                );
                sleep(self.inter_item_delay).await;
            }
        }

        timer.summary();
        tracing::info!(%job_id, photos = items.len(), "styling batch complete");
        Ok(StyledBatch {
            job_id,
            style,
            items,
        })
    }

    /// Call the model until it succeeds, the error is fatal, or the attempt
    /// budget runs out. Backoff doubles after each failure.
    async fn stylize_with_retry(
        &self,
        timer: &mut PhaseTimer,
        index: usize,
        photo_b64: &str,
        prompt: &str,
    ) -> Result<(Vec<u8>, Vec<AttemptRecord>), WorkerError> {
        let mut records = Vec::new();
        loop {
            let attempt = records.len() as u32 + 1;
            let call_started = Instant::now();
            match self.model.stylize(photo_b64, prompt).await {
                Ok(bytes) => {
                    counter!("model_attempts_total", "outcome" => "success").increment(1);
                    records.push(AttemptRecord {
                        at: Utc::now(),
                        outcome: AttemptOutcome::Success,
                        elapsed: call_started.elapsed(),
                        backoff: None,
                    });
                    return Ok((bytes, records));
                }
                Err(err) if !retry::classify(&err).is_retryable() => {
                    counter!("model_attempts_total", "outcome" => "fatal").increment(1);
                    records.push(AttemptRecord {
                        at: Utc::now(),
                        outcome: AttemptOutcome::FatalError(err.to_string()),
                        elapsed: call_started.elapsed(),
                        backoff: None,
                    });
                    tracing::debug!(index, attempts = records.len(), "model call failed fatally");
                    return Err(WorkerError::Model { index, source: err });
                }
                Err(err) => {
                    counter!("model_attempts_total", "outcome" => "retryable").increment(1);
                    let elapsed = call_started.elapsed();
                    if attempt >= self.retry.max_retries {
                        records.push(AttemptRecord {
                            at: Utc::now(),
                            outcome: AttemptOutcome::RetryableError(err.to_string()),
                            elapsed,
                            backoff: None,
                        });
                        tracing::debug!(
                            index,
                            attempts = records.len(),
                            "model retry budget exhausted"
                        );
                        return Err(WorkerError::RetriesExhausted {
                            index,
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let backoff = self.retry.delay_for(attempt - 1);
                    records.push(AttemptRecord {
                        at: Utc::now(),
                        outcome: AttemptOutcome::RetryableError(err.to_string()),
                        elapsed,
                        backoff: Some(backoff),
                    });
                    timer.progress(
                        server_phase::GEMINI,
                        &format!(
                            "photo {index} attempt {attempt} failed ({err}), backing off {}ms",
                            backoff.as_millis()
                        ),
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}
