//! Single-flight job registry.
//!
//! One entry per idempotency key while a job is in flight. The first caller
//! creates the entry and gets the publishing side; everyone else attaches as
//! a waiter on the same watch channels. Waiters are refcounted so a caller
//! abandoning its await never tears down the shared job; only the runner
//! removes the entry, after it has published the outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobState;

use super::JobOutcome;

struct JobEntry {
    cancel: CancellationToken,
    state_rx: watch::Receiver<JobState>,
    outcome_rx: watch::Receiver<Option<JobOutcome>>,
    waiters: usize,
}

/// A caller's handle on one in-flight job. Dropping it detaches the waiter;
/// the job itself keeps running.
pub(super) struct JobLease {
    key: String,
    registry: Arc<JobRegistry>,
    pub outcome_rx: watch::Receiver<Option<JobOutcome>>,
}

impl Drop for JobLease {
    fn drop(&mut self) {
        self.registry.detach(&self.key);
    }
}

/// The runner's side of a job: the token it watches and the channels it
/// publishes through.
pub(super) struct JobPublisher {
    pub cancel: CancellationToken,
    pub state_tx: watch::Sender<JobState>,
    pub outcome_tx: watch::Sender<Option<JobOutcome>>,
}

pub(super) enum Begin {
    /// No job under this key yet: run it and publish.
    Created {
        lease: JobLease,
        publisher: JobPublisher,
    },
    /// Already in flight: await the shared outcome.
    Attached(JobLease),
}

#[derive(Default)]
pub(super) struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach to the job under `key`, creating it if absent. Atomic: two
    /// racing callers get one `Created` and one `Attached`.
    pub fn begin(self: &Arc<Self>, key: &str) -> Begin {
        let mut jobs = self.lock();
        if let Some(entry) = jobs.get_mut(key) {
            entry.waiters += 1;
            tracing::debug!(key, waiters = entry.waiters, "attached to in-flight job");
            return Begin::Attached(self.lease(key, entry.outcome_rx.clone()));
        }

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(JobState::Idle);
        let (outcome_tx, outcome_rx) = watch::channel(None);
        jobs.insert(
            key.to_string(),
            JobEntry {
                cancel: cancel.clone(),
                state_rx,
                outcome_rx: outcome_rx.clone(),
                waiters: 1,
            },
        );
        Begin::Created {
            lease: self.lease(key, outcome_rx),
            publisher: JobPublisher {
                cancel,
                state_tx,
                outcome_tx,
            },
        }
    }

    /// Fire the cancellation token of the job under `key`, if any.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().get(key) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Current state of the job under `key`; `Idle` when nothing is in
    /// flight (never was, or already finished).
    pub fn state(&self, key: &str) -> JobState {
        self.lock()
            .get(key)
            .map(|entry| *entry.state_rx.borrow())
            .unwrap_or(JobState::Idle)
    }

    pub fn waiter_count(&self, key: &str) -> usize {
        self.lock().get(key).map(|entry| entry.waiters).unwrap_or(0)
    }

    /// Remove the entry. Called by the runner once the outcome is published;
    /// waiters already hold their receiver and still see it.
    pub fn finish(&self, key: &str) {
        if self.lock().remove(key).is_some() {
            tracing::debug!(key, "job entry removed");
        }
    }

    fn detach(&self, key: &str) {
        if let Some(entry) = self.lock().get_mut(key) {
            entry.waiters = entry.waiters.saturating_sub(1);
            tracing::debug!(key, waiters = entry.waiters, "waiter detached");
        }
    }

    fn lease(
        self: &Arc<Self>,
        key: &str,
        outcome_rx: watch::Receiver<Option<JobOutcome>>,
    ) -> JobLease {
        JobLease {
            key: key.to_string(),
            registry: Arc::clone(self),
            outcome_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
