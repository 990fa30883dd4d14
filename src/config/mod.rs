use std::time::Duration;

use serde::Deserialize;

use crate::client::OrchestratorConfig;
use crate::services::imaging::OutputFrame;
use crate::services::retry::{self, RetryPolicy};

/// Server-side configuration, read from the environment.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Google AI Studio API key for Gemini.
    pub gemini_api_key: String,

    /// Gemini model that takes an image part and answers with one.
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Per-call timeout for model requests, in milliseconds.
    #[serde(default = "default_model_timeout_ms")]
    pub model_timeout_ms: u64,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Public base URL the bucket is served from (custom domain or r2.dev).
    pub r2_public_base_url: String,

    /// Model attempts per photo, counting the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff step in milliseconds; doubles after each failure.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Pause between photos of one batch, in milliseconds.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Output frame every artifact is fitted to.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    #[serde(default = "default_frame_height")]
    pub frame_height: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.initial_delay_ms))
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn frame(&self) -> OutputFrame {
        OutputFrame::new(self.frame_width, self.frame_height)
    }
}

/// Client-side configuration for the submit CLI.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the styling worker (e.g., "http://localhost:3000").
    pub worker_url: String,

    /// Photos a booth session must hand in.
    #[serde(default = "default_expected_photo_count")]
    pub expected_photo_count: usize,

    /// End-to-end deadline for one submission, in milliseconds.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// Interval between liveness log lines while waiting on the worker.
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            expected_count: self.expected_photo_count,
            timeout: Duration::from_millis(self.submit_timeout_ms),
            heartbeat: Duration::from_millis(self.heartbeat_ms),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_model_timeout_ms() -> u64 {
    120_000
}

fn default_max_retries() -> u32 {
    retry::DEFAULT_MAX_RETRIES
}

fn default_initial_delay_ms() -> u64 {
    retry::DEFAULT_INITIAL_DELAY.as_millis() as u64
}

fn default_inter_item_delay_ms() -> u64 {
    4_000
}

fn default_frame_width() -> u32 {
    1080
}

fn default_frame_height() -> u32 {
    1440
}

fn default_expected_photo_count() -> usize {
    4
}

fn default_submit_timeout_ms() -> u64 {
    240_000
}

fn default_heartbeat_ms() -> u64 {
    10_000
}
