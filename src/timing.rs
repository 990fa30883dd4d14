//! Phase timing diagnostics.
//!
//! A [`PhaseTimer`] is an instance-scoped stopwatch for one session (one job,
//! one request). It records named phases as they open and close and can log a
//! breakdown at the end. It is observability only: nothing in here feeds back
//! into retry or control-flow decisions, and two sides of a pipeline each keep
//! their own timer with their own clock.

use std::time::{Duration, Instant};

/// A closed phase: how long it ran and where the session clock stood when it
/// ended. Records are immutable once the phase closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub name: String,
    pub elapsed: Duration,
    /// Cumulative session time at the moment the phase closed.
    pub ended_at: Duration,
}

/// Per-session phase stopwatch.
#[derive(Debug)]
pub struct PhaseTimer {
    session: String,
    started: Instant,
    open: Vec<(String, Instant)>,
    closed: Vec<PhaseReport>,
}

impl PhaseTimer {
    /// Start a new timing session.
    pub fn start(session: impl Into<String>) -> Self {
        let session = session.into();
        tracing::info!(session = %session, "timing session started");
        Self {
            session,
            started: Instant::now(),
            open: Vec::new(),
            closed: Vec::new(),
        }
    }

    /// Total time since the session started.
    pub fn session_elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Open a phase. Phases may repeat (one per photo, say); each occurrence
    /// becomes its own record.
    pub fn start_phase(&mut self, name: &str) {
        tracing::info!(
            session = %self.session,
            phase = name,
            total_ms = self.session_elapsed().as_millis() as u64,
            "phase started"
        );
        self.open.push((name.to_string(), Instant::now()));
    }

    /// Log mid-phase progress without closing anything.
    pub fn progress(&self, name: &str, message: &str) {
        let phase_ms = self
            .open_elapsed(name)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        tracing::info!(
            session = %self.session,
            phase = name,
            phase_ms,
            total_ms = self.session_elapsed().as_millis() as u64,
            "{message}"
        );
    }

    /// Close the most recent open occurrence of a phase and record it.
    /// Closing a phase that was never opened logs a warning and records
    /// nothing; diagnostics must not turn into failures.
    pub fn end_phase(&mut self, name: &str, message: &str) -> Duration {
        let Some(pos) = self.open.iter().rposition(|(n, _)| n == name) else {
            tracing::warn!(session = %self.session, phase = name, "phase closed without being opened");
            return Duration::ZERO;
        };
        let (name, opened) = self.open.remove(pos);
        let elapsed = opened.elapsed();
        let ended_at = self.session_elapsed();
        tracing::info!(
            session = %self.session,
            phase = %name,
            phase_ms = elapsed.as_millis() as u64,
            total_ms = ended_at.as_millis() as u64,
            "{message}"
        );
        self.closed.push(PhaseReport {
            name,
            elapsed,
            ended_at,
        });
        elapsed
    }

    /// Log a failure inside a phase. Leaves records untouched.
    pub fn error(&self, name: &str, message: &str) {
        let phase_ms = self
            .open_elapsed(name)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        tracing::error!(
            session = %self.session,
            phase = name,
            phase_ms,
            total_ms = self.session_elapsed().as_millis() as u64,
            "{message}"
        );
    }

    /// Log every closed phase with its share of total session time, and
    /// return the records for callers that want them.
    pub fn summary(&self) -> Vec<PhaseReport> {
        let total = self.session_elapsed();
        let total_ms = total.as_millis().max(1) as f64;
        for report in &self.closed {
            let pct = report.elapsed.as_millis() as f64 / total_ms * 100.0;
            tracing::info!(
                session = %self.session,
                phase = %report.name,
                phase_ms = report.elapsed.as_millis() as u64,
                pct = format!("{pct:.1}"),
                "phase summary"
            );
        }
        tracing::info!(
            session = %self.session,
            phases = self.closed.len(),
            total_ms = total.as_millis() as u64,
            "session summary"
        );
        self.closed.clone()
    }

    fn open_elapsed(&self, name: &str) -> Option<Duration> {
        self.open
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, at)| at.elapsed())
    }
}

/// Phase names used on the client side of the pipeline.
pub mod client_phase {
    pub const ENCODE: &str = "ENCODE";
    pub const API_CALL: &str = "API_CALL";
    pub const DOWNLOAD: &str = "DOWNLOAD";
}

/// Phase names used on the server side of the pipeline.
pub mod server_phase {
    pub const INIT: &str = "INIT";
    pub const GEMINI: &str = "GEMINI";
    pub const UPLOAD: &str = "UPLOAD";
}
