//! Request submitter.
//!
//! Entry point for callers handing a new job to the relay: validates the request,
//! persists it at `Startup`, then pushes it past `Startup` and runs one orchestrator
//! pass straight away so that an available remote service sees the job without
//! waiting for the next scheduler pass.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::lifecycle::{LifecycleOrchestrator, RunOutcome};
use crate::models::{NewRequest, RequestPayload, RequestRecord};
use crate::state_machine::Step;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where the request stands after the immediate pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionReport {
    /// The remote accepted the job; the record continues on `step`
    Accepted {
        id: Uuid,
        external_job_id: String,
        step: Step,
    },
    /// Submission will be retried by the scheduler
    Retrying { id: Uuid },
    /// The remote refused the job; the failure notice is pending or sent
    Failed { id: Uuid, status: i32 },
    /// Fully processed and removed
    Completed { id: Uuid },
    /// The store failed after creation; the record waits at its last durable step
    Stalled { id: Uuid, reason: String },
}

impl SubmissionReport {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Accepted { id, .. }
            | Self::Retrying { id }
            | Self::Failed { id, .. }
            | Self::Completed { id }
            | Self::Stalled { id, .. } => *id,
        }
    }

    fn from_run(record: &RequestRecord, outcome: RunOutcome) -> Self {
        let id = record.id;
        match outcome {
            RunOutcome::Completed | RunOutcome::Gone => Self::Completed { id },
            RunOutcome::Fatal { reason } => Self::Stalled { id, reason },
            RunOutcome::NotStarted | RunOutcome::Pending { .. } => match record.step() {
                Step::Startup | Step::SubmitRetry => Self::Retrying { id },
                Step::Error => Self::Failed {
                    id,
                    status: record.status(),
                },
                step => Self::Accepted {
                    id,
                    external_job_id: record.external_job_id.clone(),
                    step,
                },
            },
        }
    }
}

pub struct RequestSubmitter {
    orchestrator: Arc<LifecycleOrchestrator>,
}

impl RequestSubmitter {
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Validate and persist a request at `Startup` without running it
    pub async fn register(&self, new_request: NewRequest) -> Result<RequestRecord, SubmissionError> {
        validate(&new_request).await?;

        let mut record = RequestRecord::new(new_request);
        let id = self.orchestrator.store().create_new(&mut record).await?;

        info!(
            request_id = %id,
            kind = %record.kind,
            partner = %record.partner,
            route = %record.route,
            "📝 Request registered"
        );
        Ok(record)
    }

    /// Register the request and run it once
    pub async fn submit(&self, new_request: NewRequest) -> Result<SubmissionReport, SubmissionError> {
        let mut record = self.register(new_request).await?;
        let outcome = self.orchestrator.start(&mut record).await;
        let report = SubmissionReport::from_run(&record, outcome);

        info!(request_id = %record.id, report = ?report, "Initial pass finished");
        Ok(report)
    }
}

/// Reject empty required fields and strings carrying control characters or markup
async fn validate(request: &NewRequest) -> Result<(), SubmissionError> {
    require_clean("partner", &request.partner)?;
    require_clean("route", &request.route)?;
    require_clean("accessContract", &request.context.access_contract)?;
    if let Some(session) = &request.context.application_session_id {
        check_sanity("applicationSessionId", session)?;
    }
    if let Some(certificate) = &request.context.personal_certificate {
        check_sanity("personalCertificate", certificate)?;
    }
    if request.source_path.as_os_str().is_empty() {
        return Err(SubmissionError::Validation(
            "sourcePath must not be empty".to_string(),
        ));
    }

    match &request.payload {
        RequestPayload::Ingest { action, .. } => {
            require_clean("action", action)?;
            let metadata = tokio::fs::metadata(&request.source_path)
                .await
                .map_err(|e| {
                    SubmissionError::Validation(format!(
                        "source file {} is not readable: {e}",
                        request.source_path.display()
                    ))
                })?;
            if !metadata.is_file() {
                return Err(SubmissionError::Validation(format!(
                    "source {} is not a regular file",
                    request.source_path.display()
                )));
            }
        }
        RequestPayload::Dip { query } => {
            if !query.is_object() {
                return Err(SubmissionError::Validation(
                    "DIP query must be a JSON object".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn require_clean(field: &str, value: &str) -> Result<(), SubmissionError> {
    if value.trim().is_empty() {
        return Err(SubmissionError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    check_sanity(field, value)
}

fn check_sanity(field: &str, value: &str) -> Result<(), SubmissionError> {
    if value.chars().any(|c| c.is_control() || c == '<' || c == '>') {
        return Err(SubmissionError::Validation(format!(
            "{field} contains forbidden characters"
        )));
    }
    Ok(())
}
