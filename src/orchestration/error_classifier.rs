//! # Failure Classification
//!
//! Turns gateway and store outcomes into one of the failure classes the
//! orchestrator acts on.
//!
//! ## Classes
//!
//! - **Retryable**: stay on the current step and try again on a later pass
//! - **TerminalError**: the remote refused the job; move to the error step with the code
//! - **PersistenceFailure**: the store could not write; leave the record for manual recovery
//! - **IllegalTransition**: the requested edge is not in the step table; forced and logged
//!
//! ## Usage
//!
//! ```rust
//! use archive_relay::config::SubmitFailurePolicy;
//! use archive_relay::gateways::{GatewayError, SubmitOutcome};
//! use archive_relay::orchestration::error_classifier::{ErrorClassifier, FailureClass};
//!
//! let classifier = ErrorClassifier::new(SubmitFailurePolicy::Fail);
//! let error = GatewayError::Parse("truncated body".to_string());
//! assert_eq!(
//!     classifier.classify_submit_error(&error),
//!     FailureClass::TerminalError { code: 500 }
//! );
//! assert_eq!(
//!     classifier.classify_submit(&SubmitOutcome::ServiceUnavailable),
//!     Some(FailureClass::Retryable)
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SubmitFailurePolicy;
use crate::gateways::{DownloadOutcome, GatewayError, PollOutcome, SubmitOutcome};
use crate::models::GENERIC_SERVER_ERROR;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "class")]
pub enum FailureClass {
    Retryable,
    TerminalError { code: i32 },
    PersistenceFailure,
    IllegalTransition,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::TerminalError { code } => write!(f, "terminal_error({code})"),
            Self::PersistenceFailure => write!(f, "persistence_failure"),
            Self::IllegalTransition => write!(f, "illegal_transition"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier {
    submit_failure_policy: SubmitFailurePolicy,
}

impl ErrorClassifier {
    pub fn new(submit_failure_policy: SubmitFailurePolicy) -> Self {
        Self {
            submit_failure_policy,
        }
    }

    /// `None` when the job was accepted
    pub fn classify_submit(&self, outcome: &SubmitOutcome) -> Option<FailureClass> {
        match outcome {
            SubmitOutcome::Accepted { .. } => None,
            SubmitOutcome::ServiceUnavailable => Some(FailureClass::Retryable),
            SubmitOutcome::Rejected { code } => Some(FailureClass::TerminalError { code: *code }),
        }
    }

    /// Transport or parse failure of the submit call itself
    pub fn classify_submit_error(&self, error: &GatewayError) -> FailureClass {
        if matches!(error, GatewayError::Interrupted) {
            return FailureClass::Retryable;
        }
        match self.submit_failure_policy {
            SubmitFailurePolicy::Retry => FailureClass::Retryable,
            SubmitFailurePolicy::Fail => FailureClass::TerminalError {
                code: GENERIC_SERVER_ERROR,
            },
        }
    }

    /// `None` when the job is done and its result can be downloaded
    pub fn classify_poll(&self, outcome: &PollOutcome) -> Option<FailureClass> {
        match outcome {
            PollOutcome::Done => None,
            PollOutcome::NotReady => Some(FailureClass::Retryable),
            PollOutcome::Failed { code } => Some(FailureClass::TerminalError { code: *code }),
        }
    }

    /// `None` when the result stream is ready
    pub fn classify_download(&self, outcome: &DownloadOutcome) -> Option<FailureClass> {
        match outcome {
            DownloadOutcome::Ready(_) => None,
            DownloadOutcome::NotFound | DownloadOutcome::ServiceUnavailable => {
                Some(FailureClass::Retryable)
            }
            DownloadOutcome::Failed { code } => {
                Some(FailureClass::TerminalError { code: *code })
            }
        }
    }

    /// Poll and download transport failures never fail the job
    pub fn classify_gateway_error(&self, _error: &GatewayError) -> FailureClass {
        FailureClass::Retryable
    }

    /// A downloaded result that cannot be written locally fails the job
    pub fn classify_result_write_error(&self, _error: &std::io::Error) -> FailureClass {
        FailureClass::TerminalError {
            code: GENERIC_SERVER_ERROR,
        }
    }

    /// `None` when the record was removed concurrently and work on it should stop
    pub fn classify_store_error(&self, error: &StoreError) -> Option<FailureClass> {
        if error.is_not_found() {
            None
        } else {
            Some(FailureClass::PersistenceFailure)
        }
    }
}
