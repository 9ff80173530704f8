//! Request Record
//!
//! The durable unit of work. One record exists per submitted job, from creation at
//! `Startup` until the orchestrator deletes it after `End`.
//!
//! `step` and `status` are private: every change goes through [`RequestRecord::try_transition`]
//! or [`RequestRecord::force_step`], which keep the status marker consistent with the step
//! and stamp `last_attempt_time`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::state_machine::{
    StateMachineResult, Step, StepTable, DIP_STEP_TABLE, INGEST_STEP_TABLE,
};

/// Generic server-side failure code used when no remote code is available
pub const GENERIC_SERVER_ERROR: i32 = 500;

/// The two concrete lifecycles handled by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Submit a local package for archiving
    Ingest,
    /// Submit an export query and bring the resulting package back
    Dip,
}

impl RequestKind {
    pub fn step_table(&self) -> &'static StepTable {
        match self {
            Self::Ingest => &INGEST_STEP_TABLE,
            Self::Dip => &DIP_STEP_TABLE,
        }
    }

    /// Fixed file name prefix of persisted records of this kind
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Ingest => "IngestRequest.",
            Self::Dip => "DipRequest.",
        }
    }

    /// Transfer label attached to a forwarded result
    pub fn result_label(&self) -> &'static str {
        match self {
            Self::Ingest => "ATR",
            Self::Dip => "DIP",
        }
    }

    /// Transfer label attached to a forwarded failure notice
    pub fn result_failed_label(&self) -> &'static str {
        match self {
            Self::Ingest => "ATR_FAILED",
            Self::Dip => "DIP_FAILED",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Dip => "dip",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingest" => Ok(Self::Ingest),
            "dip" => Ok(Self::Dip),
            _ => Err(format!("Invalid request kind: {s}")),
        }
    }
}

/// Identity and access information sent with every remote call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteContext {
    pub tenant_id: i32,
    #[serde(default)]
    pub application_session_id: Option<String>,
    #[serde(default)]
    pub personal_certificate: Option<String>,
    pub access_contract: String,
}

/// Remote workflow an ingest runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestContext {
    #[default]
    DefaultWorkflow,
    HoldingScheme,
    FilingScheme,
}

/// Default workflow action for ingests
pub const DEFAULT_INGEST_ACTION: &str = "RESUME";

/// What gets submitted to the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestPayload {
    Ingest {
        context: IngestContext,
        action: String,
    },
    Dip {
        query: serde_json::Value,
    },
}

impl RequestPayload {
    pub fn ingest(context: IngestContext) -> Self {
        Self::Ingest {
            context,
            action: DEFAULT_INGEST_ACTION.to_string(),
        }
    }

    pub fn dip(query: serde_json::Value) -> Self {
        Self::Dip { query }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Ingest { .. } => RequestKind::Ingest,
            Self::Dip { .. } => RequestKind::Dip,
        }
    }
}

/// Input for creating a new record
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub context: RemoteContext,
    pub payload: RequestPayload,
    pub source_path: PathBuf,
    pub partner: String,
    pub route: String,
    /// Whether to wait for and forward the final result after acceptance
    pub check_result_required: bool,
}

/// How a step change was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepChange {
    /// Same non-error step requested again, nothing to persist
    Unchanged,
    /// Legal edge taken
    Transitioned,
    /// Edge not in the table, step assigned anyway
    Forced,
}

impl StepChange {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Store key; nil until the store assigns one
    pub id: Uuid,
    pub kind: RequestKind,
    step: Step,
    status: i32,
    /// Job id returned by the remote service, empty until accepted
    #[serde(default)]
    pub external_job_id: String,
    pub source_path: PathBuf,
    #[serde(default)]
    pub result_path: Option<PathBuf>,
    pub partner: String,
    pub route: String,
    pub created_at: DateTime<Utc>,
    pub last_attempt_time: DateTime<Utc>,
    pub check_result_required: bool,
    pub context: RemoteContext,
    pub payload: RequestPayload,
    #[serde(default)]
    pub global_execution_state: Option<String>,
    #[serde(default)]
    pub global_execution_status: Option<String>,
    /// Identifier of the last tracked transfer submitted for this record
    #[serde(default)]
    pub transfer_id: Option<i64>,
}

impl RequestRecord {
    /// Build an unsaved record at `Startup`
    pub fn new(new_request: NewRequest) -> Self {
        let kind = new_request.payload.kind();
        let now = Utc::now();
        let startup_marker = kind.step_table().marker(Step::Startup).unwrap_or(-1);
        // DIP requests always bring their package back
        let check_result_required = match kind {
            RequestKind::Ingest => new_request.check_result_required,
            RequestKind::Dip => true,
        };

        Self {
            id: Uuid::nil(),
            kind,
            step: Step::Startup,
            status: startup_marker,
            external_job_id: String::new(),
            source_path: new_request.source_path,
            result_path: None,
            partner: new_request.partner,
            route: new_request.route,
            created_at: now,
            last_attempt_time: now,
            check_result_required,
            context: new_request.context,
            payload: new_request.payload,
            global_execution_state: None,
            global_execution_status: None,
            transfer_id: None,
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn step_table(&self) -> &'static StepTable {
        self.kind.step_table()
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_nil()
    }

    /// Name of the persisted record file: `<Kind>Request.<id>.json`
    pub fn file_name(&self) -> String {
        format!("{}{}.json", self.kind.file_prefix(), self.id)
    }

    /// Transfer metadata: `"<externalJobId> <label>"`
    pub fn transfer_metadata(&self, label: &str) -> String {
        format!("{} {}", self.external_job_id, label)
    }

    /// Status to persist when moving to `next`: the step marker, or the remote code on error
    fn status_for(&self, next: Step, code: i32) -> i32 {
        if next.is_error() {
            code
        } else {
            self.step_table().marker(next).unwrap_or(code)
        }
    }

    /// Move along a legal edge.
    ///
    /// Requesting the current step again is a no-op (`Ok(false)`) except for the error
    /// step, whose status code may be refreshed.
    pub fn try_transition(&mut self, next: Step, code: i32) -> StateMachineResult<bool> {
        if self.step == next && !next.is_error() {
            return Ok(false);
        }
        self.step_table().check(self.step, next)?;
        self.status = self.status_for(next, code);
        self.step = next;
        self.last_attempt_time = Utc::now();
        Ok(true)
    }

    /// Assign a step without consulting the edge table.
    ///
    /// A step foreign to this lifecycle lands on the error step so the record stays decodable.
    pub fn force_step(&mut self, next: Step, code: i32) {
        let next = if self.step_table().contains(next) {
            next
        } else {
            Step::Error
        };
        self.status = self.status_for(next, code);
        self.step = next;
        self.last_attempt_time = Utc::now();
    }

    /// Try the legal edge first and fall back to a forced assignment
    pub fn apply_step(&mut self, next: Step, code: i32) -> StepChange {
        match self.try_transition(next, code) {
            Ok(true) => StepChange::Transitioned,
            Ok(false) => StepChange::Unchanged,
            Err(err) => {
                tracing::debug!(request_id = %self.id, error = %err, "Falling back to forced step");
                self.force_step(next, code);
                StepChange::Forced
            }
        }
    }

    /// Re-derive the step from the persisted status when they disagree.
    ///
    /// The status is authoritative on disk. Returns true when the step had to change.
    pub fn reconcile_step(&mut self) -> bool {
        let table = self.step_table();
        let expected = table.step_for_status(self.status);
        if expected == self.step {
            return false;
        }
        tracing::warn!(
            request_id = %self.id,
            kind = %self.kind,
            stored_step = %self.step,
            status = self.status,
            decoded_step = %expected,
            "⚠️ Persisted step disagrees with status, using status"
        );
        self.step = expected;
        true
    }

    /// Record the remote acceptance of the job
    pub fn mark_accepted(
        &mut self,
        external_job_id: impl Into<String>,
        global_execution_state: Option<String>,
        global_execution_status: Option<String>,
    ) {
        self.external_job_id = external_job_id.into();
        self.global_execution_state = global_execution_state;
        self.global_execution_status = global_execution_status;
    }
}
