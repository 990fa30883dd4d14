use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of a client-initiated styling job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Encoding,
    Dispatched,
    AwaitingResult,
    Downloading,
    Complete,
    Failed,
    Cancelled,
}

/// Transport-ready form of one photo: base64 of the JPEG re-encode.
#[derive(Debug, Clone)]
pub struct EncodedPhoto(pub String);

impl EncodedPhoto {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One photo travelling through a job, addressed by its capture order. The
/// index is stable end-to-end: the server stores under it and the response
/// array is read back by it.
#[derive(Debug, Clone)]
pub struct PhotoItem {
    pub index: usize,
    pub source: Vec<u8>,
    pub encoded: Option<EncodedPhoto>,
    pub result_url: Option<String>,
}

impl PhotoItem {
    pub fn new(index: usize, source: Vec<u8>) -> Self {
        Self {
            index,
            source,
            encoded: None,
            result_url: None,
        }
    }
}

/// Outcome of a single model call for a single photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RetryableError(String),
    FatalError(String),
}

/// One model call, recorded for diagnostics only; never persisted.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub elapsed: Duration,
    /// Backoff slept before the next attempt; `None` on success or abort.
    pub backoff: Option<Duration>,
}

/// Where the bytes of a finished artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// Downloaded and decoded from the worker's styled output.
    Styled,
    /// Download or decode failed; the original capture stands in.
    OriginalFallback,
}

/// Final per-photo artifact handed back to the caller.
#[derive(Debug, Clone)]
pub struct StyledPhoto {
    pub index: usize,
    pub bytes: Vec<u8>,
    pub origin: ArtifactOrigin,
}
