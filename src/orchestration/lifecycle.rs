//! # Lifecycle Orchestrator
//!
//! Drives one request record through its step sequence.
//!
//! ## Overview
//!
//! Each call to [`LifecycleOrchestrator::run`] executes the action of the current
//! step, persists the resulting step change, and keeps going while the step moves.
//! It stops when a step has to wait for a later pass (the step repeats), when the
//! record reaches `End` and is cleaned up, or when the store reports a failure.
//!
//! ## Step actions
//!
//! | Step | Action | Next |
//! |---|---|---|
//! | `Startup` | nothing | unchanged |
//! | `SubmitRetry` | submit the job | accepted-notice step or poll; error; unchanged |
//! | `AcceptedIdRetry` | push the accepted notice | poll or end; unchanged |
//! | `PollRetry` | poll, then download the result | forward; error; unchanged |
//! | `ForwardRetry` | push the result | end; unchanged |
//! | `Error` | push the result or a failure notice | end; unchanged |
//! | `End` | remove record and artifacts | gone |
//!
//! ## Persistence
//!
//! Every step change is written to the store before the next action starts, so a
//! crash replays at most the last action. A store `NotFound` means the record was
//! removed concurrently and processing stops quietly; any other store failure is
//! fatal for this pass and the record keeps its last durable step.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error_classifier::{ErrorClassifier, FailureClass};
use super::notice::{write_notice, Notice};
use super::shutdown::ShutdownSignal;
use crate::config::RemoteConfig;
use crate::gateways::transfer::ACCEPTED_LABEL;
use crate::gateways::{
    DownloadOutcome, PollOutcome, RemoteServiceGateway, ResultStream, SubmitOutcome,
    TransferGateway, TransferMetadata, TransferReceipt,
};
use crate::logging::{log_error, log_request_operation};
use crate::models::{RequestKind, RequestRecord, StepChange, GENERIC_SERVER_ERROR};
use crate::state_machine::Step;
use crate::store::FileRequestStore;

/// How a single orchestrator run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Still at `Startup`; nothing was done
    NotStarted,
    /// Waiting on `step` until a later pass
    Pending { step: Step },
    /// Reached `End` and was removed from the store
    Completed,
    /// Removed concurrently by someone else
    Gone,
    /// The store failed; the record keeps its last durable step
    Fatal { reason: String },
}

/// Decision produced by a step action
#[derive(Debug, Clone, PartialEq, Eq)]
enum StepAction {
    Stay,
    Move { next: Step, code: i32 },
    /// The store gave up on the record mid-action
    Halt(RunOutcome),
}

impl From<FailureClass> for StepAction {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::TerminalError { code } => StepAction::Move {
                next: Step::Error,
                code,
            },
            FailureClass::Retryable
            | FailureClass::PersistenceFailure
            | FailureClass::IllegalTransition => StepAction::Stay,
        }
    }
}

pub struct LifecycleOrchestrator {
    store: Arc<FileRequestStore>,
    remote: Arc<dyn RemoteServiceGateway>,
    transfer: Arc<dyn TransferGateway>,
    classifier: ErrorClassifier,
    poll_retry_attempts: u32,
    poll_retry_delay: Duration,
    shutdown: ShutdownSignal,
}

impl LifecycleOrchestrator {
    pub fn new(
        store: Arc<FileRequestStore>,
        remote: Arc<dyn RemoteServiceGateway>,
        transfer: Arc<dyn TransferGateway>,
        config: &RemoteConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            store,
            remote,
            transfer,
            classifier: ErrorClassifier::new(config.submit_failure_policy),
            poll_retry_attempts: config.poll_retry_attempts.max(1),
            poll_retry_delay: config.poll_retry_delay(),
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<FileRequestStore> {
        &self.store
    }

    /// Push a freshly created record past `Startup`, then run it
    pub async fn start(&self, record: &mut RequestRecord) -> RunOutcome {
        if record.step() == Step::Startup {
            if let Err(outcome) = self.move_to(record, Step::SubmitRetry, 0).await {
                return outcome;
            }
        }
        self.run(record).await
    }

    /// Re-read a listed record and run the stored copy.
    ///
    /// A listing can be stale by the time a worker picks it up; a record removed in
    /// between is reported as gone without touching any gateway.
    pub async fn run_latest(&self, kind: RequestKind, id: Uuid) -> RunOutcome {
        match self.store.load(kind, id).await {
            Ok(mut record) => self.run(&mut record).await,
            Err(e) if e.is_not_found() => {
                debug!(request_id = %id, "Request removed since listing, skipping");
                RunOutcome::Gone
            }
            Err(e) => {
                log_error(
                    "lifecycle_orchestrator",
                    "reload_record",
                    &e.to_string(),
                    Some(&format!("request_id={id}")),
                );
                RunOutcome::Fatal {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Advance the record as far as possible in this pass
    #[instrument(skip(self, record), fields(request_id = %record.id, kind = %record.kind))]
    pub async fn run(&self, record: &mut RequestRecord) -> RunOutcome {
        loop {
            let current = record.step();
            debug!(step = %current, status = record.status(), "Running step");

            let action = match current {
                Step::Startup => return RunOutcome::NotStarted,
                Step::End => return self.finish(record).await,
                Step::SubmitRetry => self.submit(record).await,
                Step::AcceptedIdRetry => self.send_accepted_notice(record).await,
                Step::PollRetry => self.poll(record).await,
                Step::ForwardRetry => self.forward_result(record).await,
                Step::Error => self.send_failure_notice(record).await,
            };

            match action {
                StepAction::Stay => return RunOutcome::Pending { step: current },
                StepAction::Halt(outcome) => return outcome,
                StepAction::Move { next, code } => {
                    if let Err(outcome) = self.move_to(record, next, code).await {
                        return outcome;
                    }
                    if record.step() == current {
                        return RunOutcome::Pending { step: current };
                    }
                }
            }
        }
    }

    /// Remove the record and every artifact derived from it.
    ///
    /// Safe to call repeatedly: files that are already gone count as removed.
    pub async fn cleanup(&self, record: &RequestRecord) -> bool {
        self.store.remove(record).await
    }

    async fn finish(&self, record: &RequestRecord) -> RunOutcome {
        if self.cleanup(record).await {
            log_request_operation(
                "completed",
                &record.id.to_string(),
                record.kind.as_str(),
                record.step().as_str(),
                record.status(),
                None,
            );
            RunOutcome::Completed
        } else {
            warn!(request_id = %record.id, "Cleanup incomplete, will retry on next pass");
            RunOutcome::Pending { step: Step::End }
        }
    }

    /// Apply a step change and persist it before anything else happens
    async fn move_to(
        &self,
        record: &mut RequestRecord,
        next: Step,
        code: i32,
    ) -> Result<(), RunOutcome> {
        let from = record.step();
        let change = record.apply_step(next, code);
        if !change.is_changed() {
            return Ok(());
        }

        let operation = if change == StepChange::Forced {
            warn!(
                request_id = %record.id,
                from = %from,
                to = %record.step(),
                class = %FailureClass::IllegalTransition,
                "⚠️ Illegal step transition, step forced"
            );
            "step_forced"
        } else {
            "step_changed"
        };
        log_request_operation(
            operation,
            &record.id.to_string(),
            record.kind.as_str(),
            record.step().as_str(),
            record.status(),
            Some(from.as_str()),
        );

        self.persist(record, "persist_step").await
    }

    /// Write the record; `Err` carries the outcome that ends this run
    async fn persist(&self, record: &RequestRecord, operation: &str) -> Result<(), RunOutcome> {
        let Err(e) = self.store.update(record).await else {
            return Ok(());
        };
        match self.classifier.classify_store_error(&e) {
            None => {
                info!(request_id = %record.id, "Request removed concurrently, stopping");
                Err(RunOutcome::Gone)
            }
            Some(class) => {
                log_error(
                    "lifecycle_orchestrator",
                    operation,
                    &e.to_string(),
                    Some(&format!(
                        "request_id={} step={} class={class}",
                        record.id,
                        record.step()
                    )),
                );
                Err(RunOutcome::Fatal {
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn submit(&self, record: &mut RequestRecord) -> StepAction {
        let outcome = self
            .remote
            .submit(&record.context, &record.payload, &record.source_path)
            .await;

        match outcome {
            Ok(SubmitOutcome::Accepted {
                external_job_id,
                global_execution_state,
                global_execution_status,
            }) => {
                if unexpected_execution_state(global_execution_state.as_deref()) {
                    warn!(
                        request_id = %record.id,
                        external_job_id = %external_job_id,
                        global_execution_state = ?global_execution_state,
                        "Remote accepted the job but its process is not paused"
                    );
                }
                if unexpected_execution_status(global_execution_status.as_deref()) {
                    error!(
                        request_id = %record.id,
                        external_job_id = %external_job_id,
                        global_execution_status = ?global_execution_status,
                        "Remote accepted the job with a resolved execution status"
                    );
                }
                info!(
                    request_id = %record.id,
                    external_job_id = %external_job_id,
                    "✅ Job accepted by remote service"
                );
                record.mark_accepted(
                    external_job_id,
                    global_execution_state,
                    global_execution_status,
                );
                StepAction::Move {
                    next: record.step_table().after_submit(),
                    code: 0,
                }
            }
            Ok(other) => {
                let class = self
                    .classifier
                    .classify_submit(&other)
                    .unwrap_or(FailureClass::Retryable);
                debug!(request_id = %record.id, outcome = ?other, class = %class, "Submission not accepted");
                class.into()
            }
            Err(e) => {
                let class = self.classifier.classify_submit_error(&e);
                warn!(request_id = %record.id, error = %e, class = %class, "Submission call failed");
                class.into()
            }
        }
    }

    async fn send_accepted_notice(&self, record: &mut RequestRecord) -> StepAction {
        let path = self.store.accepted_notice_path(record);
        if let Err(e) = write_notice(&path, &Notice::accepted(record)).await {
            warn!(request_id = %record.id, path = %path.display(), error = %e, "Cannot write accepted notice");
            return StepAction::Stay;
        }

        match self.push(record, &path, ACCEPTED_LABEL).await {
            Ok(receipt) if receipt.acknowledged => {}
            Ok(_) => return StepAction::Stay,
            Err(outcome) => return StepAction::Halt(outcome),
        }

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Accepted notice already removed");
        }

        let next = if record.check_result_required {
            Step::PollRetry
        } else {
            Step::End
        };
        StepAction::Move { next, code: 0 }
    }

    async fn poll(&self, record: &mut RequestRecord) -> StepAction {
        for attempt in 1..=self.poll_retry_attempts {
            let outcome = self
                .remote
                .poll_status(record.kind, &record.context, &record.external_job_id)
                .await;

            match outcome {
                Ok(PollOutcome::Done) => return self.download(record).await,
                Ok(other) => {
                    let class = self
                        .classifier
                        .classify_poll(&other)
                        .unwrap_or(FailureClass::Retryable);
                    if !class.is_retryable() {
                        return class.into();
                    }
                }
                Err(e) => {
                    warn!(request_id = %record.id, error = %e, "Status poll failed");
                    return self.classifier.classify_gateway_error(&e).into();
                }
            }

            if attempt < self.poll_retry_attempts && !self.shutdown.sleep(self.poll_retry_delay).await {
                break;
            }
        }

        debug!(request_id = %record.id, external_job_id = %record.external_job_id, "Remote job not ready yet");
        StepAction::Stay
    }

    async fn download(&self, record: &mut RequestRecord) -> StepAction {
        let outcome = self
            .remote
            .download_result(record.kind, &record.context, &record.external_job_id)
            .await;

        let stream = match outcome {
            Ok(DownloadOutcome::Ready(stream)) => stream,
            Ok(other) => {
                debug!(request_id = %record.id, outcome = ?other, "Result not downloadable yet");
                return self
                    .classifier
                    .classify_download(&other)
                    .unwrap_or(FailureClass::Retryable)
                    .into();
            }
            Err(e) => {
                warn!(request_id = %record.id, error = %e, "Result download failed");
                return self.classifier.classify_gateway_error(&e).into();
            }
        };

        let path = self.store.result_artifact_path(record);
        match write_result(&path, stream).await {
            Ok(bytes) => {
                info!(request_id = %record.id, path = %path.display(), bytes, "📥 Result downloaded");
                record.result_path = Some(path);
                StepAction::Move {
                    next: Step::ForwardRetry,
                    code: 0,
                }
            }
            Err(e) => {
                error!(request_id = %record.id, path = %path.display(), error = %e, "❌ Cannot store downloaded result");
                self.classifier.classify_result_write_error(&e).into()
            }
        }
    }

    async fn forward_result(&self, record: &mut RequestRecord) -> StepAction {
        let path = record
            .result_path
            .clone()
            .unwrap_or_else(|| self.store.result_artifact_path(record));

        if !file_exists(&path).await {
            error!(request_id = %record.id, path = %path.display(), "❌ Result artifact missing, cannot forward");
            return StepAction::Move {
                next: Step::Error,
                code: GENERIC_SERVER_ERROR,
            };
        }

        let label = record.kind.result_label();
        self.push_then_end(record, &path, label).await
    }

    async fn send_failure_notice(&self, record: &mut RequestRecord) -> StepAction {
        let result_path = self.store.result_artifact_path(record);
        let path = if file_exists(&result_path).await {
            result_path
        } else {
            let error_path = self.store.error_artifact_path(record);
            if !file_exists(&error_path).await {
                if let Err(e) = write_notice(&error_path, &Notice::failure(record)).await {
                    warn!(request_id = %record.id, path = %error_path.display(), error = %e, "Cannot write failure notice");
                    return StepAction::Stay;
                }
                debug!(request_id = %record.id, path = %error_path.display(), "Failure notice synthesized");
            }
            error_path
        };

        let label = record.kind.result_failed_label();
        self.push_then_end(record, &path, label).await
    }

    async fn push_then_end(&self, record: &mut RequestRecord, path: &Path, label: &str) -> StepAction {
        match self.push(record, path, label).await {
            Ok(receipt) if receipt.acknowledged => StepAction::Move {
                next: Step::End,
                code: 0,
            },
            Ok(_) => StepAction::Stay,
            Err(outcome) => StepAction::Halt(outcome),
        }
    }

    /// Push a file and keep any new transfer id on disk whether or not it was acknowledged
    async fn push(
        &self,
        record: &mut RequestRecord,
        path: &Path,
        label: &str,
    ) -> Result<TransferReceipt, RunOutcome> {
        let metadata = TransferMetadata::for_record(record, label);
        let receipt = self
            .transfer
            .push_file(&record.partner, &record.route, path, &metadata)
            .await;

        if receipt.transfer_id.is_some() && receipt.transfer_id != record.transfer_id {
            record.transfer_id = receipt.transfer_id;
            self.persist(record, "persist_transfer_id").await?;
        }
        if receipt.acknowledged {
            info!(
                request_id = %record.id,
                partner = %record.partner,
                label = %label,
                transfer_id = ?receipt.transfer_id,
                "📤 Transfer acknowledged"
            );
        } else {
            debug!(request_id = %record.id, partner = %record.partner, label = %label, "Transfer not acknowledged");
        }
        Ok(receipt)
    }
}

/// Anything but a paused process right after acceptance
fn unexpected_execution_state(state: Option<&str>) -> bool {
    matches!(state, Some(state) if state != "PAUSE")
}

/// Anything but an unknown status right after acceptance
fn unexpected_execution_status(status: Option<&str>) -> bool {
    matches!(status, Some(status) if status != "UNKNOWN")
}

async fn file_exists(path: &Path) -> bool {
    matches!(tokio::fs::try_exists(path).await, Ok(true))
}

/// Stream the result into place through a temporary sibling
async fn write_result(path: &Path, mut stream: ResultStream) -> std::io::Result<u64> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".part");
    let temp_path = PathBuf::from(temp_name);

    let copied = async {
        let mut file = tokio::fs::File::create(&temp_path).await?;
        let bytes = tokio::io::copy(&mut stream, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok::<u64, std::io::Error>(bytes)
    }
    .await;

    match copied {
        Ok(bytes) => {
            tokio::fs::rename(&temp_path, path).await?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&temp_path).await;
            Err(e)
        }
    }
}
