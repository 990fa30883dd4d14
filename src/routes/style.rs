use std::str::FromStr;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use garde::Validate;
use metrics::{counter, histogram};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::style::StylePreset;
use crate::models::wire::{StyleBatchRequest, StyleBatchResponse};
use crate::services::worker::WorkerError;

/// POST /api/v1/style — run one styling batch to completion and answer with the
/// artifact URLs, in the same order the photos came in. Failures answer with
/// the same envelope, error field set and URL list empty.
pub async fn style_batch(
    State(state): State<AppState>,
    Json(request): Json<StyleBatchRequest>,
) -> (StatusCode, Json<StyleBatchResponse>) {
    counter!("styling_jobs_total").increment(1);

    if let Err(report) = request.validate() {
        counter!("styling_jobs_failed").increment(1);
        return reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("invalid request: {report}"),
        );
    }

    let Ok(style) = StylePreset::from_str(&request.style) else {
        counter!("styling_jobs_failed").increment(1);
        return reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "unknown style '{}', expected one of: {}",
                request.style,
                StylePreset::registry()
            ),
        );
    };

    let job_id = Uuid::new_v4();
    let started = Instant::now();

    // A client that times out or cancels drops the connection, and hyper drops
    // this handler future with it. The batch must run to completion regardless,
    // so processing lives on its own task and we only await the handle here.
    let worker = state.worker.clone();
    let photos = request.photos;
    let processing = tokio::spawn(async move { worker.process(job_id, style, &photos).await });

    let outcome = match processing.await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            counter!("styling_jobs_failed").increment(1);
            tracing::error!(%job_id, error = %join_err, "styling task aborted");
            return reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("styling task aborted: {join_err}"),
            );
        }
    };

    match outcome {
        Ok(batch) => {
            histogram!("styling_processing_seconds").record(started.elapsed().as_secs_f64());
            counter!("styling_jobs_completed").increment(1);
            (StatusCode::OK, Json(StyleBatchResponse::ok(batch.urls())))
        }
        Err(err) => {
            histogram!("styling_processing_seconds").record(started.elapsed().as_secs_f64());
            counter!("styling_jobs_failed").increment(1);
            tracing::error!(%job_id, error = %err, "styling batch failed");
            let status = match &err {
                WorkerError::EmptyBatch => StatusCode::UNPROCESSABLE_ENTITY,
                // Model and storage failures are upstream; normalize is ours.
                WorkerError::Model { .. }
                | WorkerError::RetriesExhausted { .. }
                | WorkerError::Upload { .. } => StatusCode::BAD_GATEWAY,
                WorkerError::Normalize { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            reject(status, err.to_string())
        }
    }
}

fn reject(status: StatusCode, message: String) -> (StatusCode, Json<StyleBatchResponse>) {
    (status, Json(StyleBatchResponse::failed(message)))
}
