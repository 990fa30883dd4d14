use std::sync::Arc;
use std::time::Instant;

use crate::services::storage::ArtifactStore;
use crate::services::worker::StyleWorker;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<StyleWorker>,
    pub storage: Arc<dyn ArtifactStore>,
    pub started: Instant,
}

impl AppState {
    pub fn new(worker: StyleWorker, storage: Arc<dyn ArtifactStore>) -> Self {
        Self {
            worker: Arc::new(worker),
            storage,
            started: Instant::now(),
        }
    }
}
