//! Per-run state: phase tracking, acquired namespace, final report.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::obs::VerifyMetrics;

/// Lifecycle of one verification run.
///
/// `Init -> Created -> Seeded -> Applied -> Asserted -> TornDown`, with any
/// failure moving to `Failed` and then `TornDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Created,
    Seeded,
    Applied,
    Asserted,
    Failed,
    TornDown,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Created => "created",
            RunPhase::Seeded => "seeded",
            RunPhase::Applied => "applied",
            RunPhase::Asserted => "asserted",
            RunPhase::Failed => "failed",
            RunPhase::TornDown => "torn_down",
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct VerificationRun {
    pub namespace: Option<String>,
    /// Run-scoped role names the applied statements may create.
    pub roles: Vec<String>,
    pub tenants: Vec<Uuid>,
    phase: RunPhase,
    started: Instant,
    phase_started: Instant,
}

impl VerificationRun {
    pub fn new(tenants: Vec<Uuid>) -> Self {
        let now = Instant::now();
        Self {
            namespace: None,
            roles: Vec::new(),
            tenants,
            phase: RunPhase::Init,
            started: now,
            phase_started: now,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`, recording how long the phase that led there took.
    pub fn advance(&mut self, next: RunPhase, metrics: &VerifyMetrics) {
        metrics
            .phase_duration
            .observe(&[("phase", next.as_str())], self.phase_started.elapsed());
        tracing::debug!(from = %self.phase, to = %next, "phase");
        self.phase = next;
        self.phase_started = Instant::now();
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub namespace: String,
    pub tenants: Vec<Uuid>,
    pub fixture_tables: usize,
    pub rows_seeded: usize,
    pub statements_applied: usize,
    /// Run-scoped role names (dropped again at teardown).
    pub scoped_roles: Vec<String>,
    /// Qualified names of tables whose catalog state was checked.
    pub tables_asserted: Vec<String>,
    pub elapsed_ms: u64,
}
