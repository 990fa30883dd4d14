//! Wire seams between the orchestrator and the outside world.
//!
//! Two traits keep the orchestrator testable: [`WorkerTransport`] carries the
//! batch to the styling worker, [`ArtifactFetcher`] brings finished artifacts
//! back from their public URLs. The HTTP implementations live here too.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::wire::{StyleBatchRequest, StyleBatchResponse};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("worker returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The worker answered with the response envelope's error field set.
    #[error("worker reported: {0}")]
    Worker(String),

    #[error("malformed worker response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("download returned status {0}")]
    Status(u16),
}

/// Carries one styling batch to the worker and returns the artifact URLs.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn process(&self, request: &StyleBatchRequest) -> Result<Vec<String>, TransportError>;
}

/// Fetches one finished artifact from its public URL.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

/// HTTP transport posting to the worker's `/api/v1/style` route.
pub struct HttpWorkerTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWorkerTransport {
    /// `timeout` bounds a single worker call at the socket level; the
    /// orchestrator keeps its own end-to-end deadline on top.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/style", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl WorkerTransport for HttpWorkerTransport {
    async fn process(&self, request: &StyleBatchRequest) -> Result<Vec<String>, TransportError> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status().as_u16();
        match response.json::<StyleBatchResponse>().await {
            Ok(body) => unwrap_envelope(status, body),
            Err(e) if (200..300).contains(&status) => Err(TransportError::Malformed(e.to_string())),
            Err(_) => Err(TransportError::Status {
                status,
                message: "worker returned an unreadable error".into(),
            }),
        }
    }
}

/// Plain HTTP GET fetcher for public artifact URLs.
pub struct HttpArtifactFetcher {
    client: reqwest::Client,
}

impl HttpArtifactFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// The error field wins over the HTTP status: a worker that filled it in has
/// told us exactly what went wrong.
fn unwrap_envelope(status: u16, body: StyleBatchResponse) -> Result<Vec<String>, TransportError> {
    if let Some(error) = body.error {
        return Err(TransportError::Worker(error));
    }
    if !(200..300).contains(&status) {
        return Err(TransportError::Status {
            status,
            message: "worker rejected the batch".into(),
        });
    }
    Ok(body.styled_photo_urls)
}
