//! # Orchestrator Scheduler
//!
//! Outer loop that repeatedly drives every stored request through the
//! [`LifecycleOrchestrator`] until shutdown is requested.
//!
//! ## Overview
//!
//! Each pass lists the store, spawns one task per record (bounded by a semaphore
//! sized to the batch and capped by `max_concurrent_requests`), and waits for all of
//! them or for the pass timeout. Between passes the scheduler sleeps for the pass
//! interval; the sleep wakes early on shutdown.
//!
//! ## States
//!
//! ```text
//! Idle ──▶ RunningPass ──▶ Idle ──▶ ... ──▶ Draining ──▶ Stopped
//! ```
//!
//! A record is never driven by two workers at once. When a pass times out, its
//! workers keep running detached and their records stay marked in flight, so the
//! next pass skips them until they finish.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::lifecycle::{LifecycleOrchestrator, RunOutcome};
use super::shutdown::ShutdownSignal;
use crate::config::SchedulerConfig;
use crate::logging::log_error;

const DRAIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    RunningPass,
    Draining,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::RunningPass => "running_pass",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What happened during one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub records_seen: usize,
    pub completed: usize,
    pub pending: usize,
    pub not_started: usize,
    pub gone: usize,
    pub fatal: usize,
    /// Already being driven by a worker from an earlier pass
    pub skipped_in_flight: usize,
    /// Not started because shutdown was requested first
    pub skipped_shutdown: usize,
    pub worker_failures: usize,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl PassSummary {
    fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Completed => self.completed += 1,
            RunOutcome::Pending { .. } => self.pending += 1,
            RunOutcome::NotStarted => self.not_started += 1,
            RunOutcome::Gone => self.gone += 1,
            RunOutcome::Fatal { .. } => self.fatal += 1,
        }
    }
}

/// Totals over the whole scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerSummary {
    pub passes: u64,
    pub completed: usize,
    pub fatal: usize,
    pub gone: usize,
    pub timed_out_passes: u64,
    pub failed_listings: u64,
}

impl SchedulerSummary {
    fn absorb(&mut self, pass: &PassSummary) {
        self.passes += 1;
        self.completed += pass.completed;
        self.fatal += pass.fatal;
        self.gone += pass.gone;
        if pass.timed_out {
            self.timed_out_passes += 1;
        }
    }
}

/// Removes the record from the in-flight map when the worker ends, however it ends
struct InFlightGuard {
    in_flight: Arc<DashMap<Uuid, Instant>>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.id);
    }
}

pub struct OrchestratorScheduler {
    orchestrator: Arc<LifecycleOrchestrator>,
    config: SchedulerConfig,
    shutdown: ShutdownSignal,
    state: RwLock<SchedulerState>,
    in_flight: Arc<DashMap<Uuid, Instant>>,
}

impl OrchestratorScheduler {
    pub fn new(
        orchestrator: Arc<LifecycleOrchestrator>,
        config: SchedulerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            orchestrator,
            config,
            shutdown,
            state: RwLock::new(SchedulerState::Idle),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.read()
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Number of records currently being driven by a worker
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn transition(&self, next: SchedulerState) {
        let mut state = self.state.write();
        if *state != next {
            debug!(from = %*state, to = %next, "Scheduler state change");
            *state = next;
        }
    }

    /// Run passes until shutdown, then drain in-flight workers
    #[instrument(skip(self))]
    pub async fn run(&self) -> SchedulerSummary {
        let mut totals = SchedulerSummary::default();
        info!(
            pass_interval_ms = self.config.pass_interval_ms,
            max_concurrent_requests = self.config.max_concurrent_requests,
            "🚀 Scheduler started"
        );

        while !self.shutdown.is_requested() {
            match self.run_pass().await {
                Some(summary) => totals.absorb(&summary),
                None => totals.failed_listings += 1,
            }
            if !self.shutdown.sleep(self.config.pass_interval()).await {
                break;
            }
        }

        self.transition(SchedulerState::Draining);
        self.drain().await;
        self.transition(SchedulerState::Stopped);

        info!(
            passes = totals.passes,
            completed = totals.completed,
            fatal = totals.fatal,
            "🛑 Scheduler stopped"
        );
        totals
    }

    /// One pass over the store. `None` when the store could not be listed.
    pub async fn run_pass(&self) -> Option<PassSummary> {
        self.transition(SchedulerState::RunningPass);
        let summary = self.execute_pass().await;
        self.transition(SchedulerState::Idle);
        summary
    }

    async fn execute_pass(&self) -> Option<PassSummary> {
        let started = Instant::now();
        let records = match self.orchestrator.store().list_pending().await {
            Ok(records) => records,
            Err(e) => {
                log_error("scheduler", "list_pending", &e.to_string(), None);
                return None;
            }
        };

        let mut summary = PassSummary {
            records_seen: records.len(),
            ..PassSummary::default()
        };
        if records.is_empty() {
            debug!("No stored requests");
            return Some(summary);
        }

        let permits = records.len().min(self.config.max_concurrent_requests).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut workers = Vec::with_capacity(records.len());

        for record in records {
            if self.shutdown.is_requested() {
                summary.skipped_shutdown += 1;
                continue;
            }

            let (id, kind) = (record.id, record.kind);
            match self.in_flight.entry(id) {
                Entry::Occupied(_) => {
                    debug!(request_id = %id, "Request still in flight from an earlier pass");
                    summary.skipped_in_flight += 1;
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(Instant::now());
                }
            }
            let guard = InFlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                id,
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let shutdown = self.shutdown.clone();

            workers.push(tokio::spawn(async move {
                let _guard = guard;
                let _permit = semaphore.acquire_owned().await.ok()?;
                if shutdown.is_requested() {
                    return None;
                }
                // The listing may predate a detached worker finishing this record
                Some(orchestrator.run_latest(kind, id).await)
            }));
        }

        let spawned = workers.len();
        match tokio::time::timeout(
            self.config.pass_timeout(),
            futures::future::join_all(workers),
        )
        .await
        {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Some(outcome)) => summary.record(&outcome),
                        Ok(None) => summary.skipped_shutdown += 1,
                        Err(e) => {
                            warn!(error = %e, "Request worker panicked or was cancelled");
                            summary.worker_failures += 1;
                        }
                    }
                }
            }
            Err(_) => {
                warn!(
                    workers = spawned,
                    timeout_ms = self.config.pass_timeout_ms,
                    "Pass timed out, unfinished workers keep running"
                );
                summary.timed_out = true;
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            records_seen = summary.records_seen,
            completed = summary.completed,
            pending = summary.pending,
            gone = summary.gone,
            fatal = summary.fatal,
            skipped_in_flight = summary.skipped_in_flight,
            timed_out = summary.timed_out,
            duration_ms = summary.duration_ms,
            "Pass complete"
        );
        Some(summary)
    }

    /// Wait for detached workers of a timed-out pass, bounded by the pass timeout
    async fn drain(&self) {
        let deadline = Instant::now() + self.config.pass_timeout();
        while !self.in_flight.is_empty() {
            if Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight.len(),
                    "Stopping with requests still in flight"
                );
                return;
            }
            tokio::time::sleep(DRAIN_CHECK_INTERVAL).await;
        }
    }
}
