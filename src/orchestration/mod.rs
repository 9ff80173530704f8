//! # Orchestration
//!
//! Request lifecycle orchestration: the per-record [`LifecycleOrchestrator`], the
//! [`OrchestratorScheduler`] pass loop, failure classification, notice artifacts,
//! the shutdown signal, the request submitter and the system bootstrap.

pub mod bootstrap;
pub mod error_classifier;
pub mod lifecycle;
pub mod notice;
pub mod scheduler;
pub mod shutdown;
pub mod submitter;

pub use bootstrap::{script_transfer_gateway, RelaySystem};
pub use error_classifier::{ErrorClassifier, FailureClass};
pub use lifecycle::{LifecycleOrchestrator, RunOutcome};
pub use notice::{Notice, NoticeOutcome};
pub use scheduler::{OrchestratorScheduler, PassSummary, SchedulerState, SchedulerSummary};
pub use shutdown::ShutdownSignal;
pub use submitter::{RequestSubmitter, SubmissionError, SubmissionReport};
