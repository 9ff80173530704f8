#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Archive Relay
//!
//! Persistent request lifecycle orchestrator relaying archival jobs between a
//! file-transfer network and a remote archival service.
//!
//! ## Overview
//!
//! A caller submits a package (ingest) or an export query (DIP). The relay hands it
//! to the remote service, waits for the job to finish (across process restarts if
//! needed), downloads the result and forwards it back over the file-transfer
//! network. A job that fails still produces a failure notice for the caller.
//!
//! ## Architecture
//!
//! ```text
//! OrchestratorScheduler ──▶ FileRequestStore::list_pending
//!          │
//!          └──▶ LifecycleOrchestrator (one task per record)
//!                   ├──▶ RemoteServiceGateway  (submit / poll / download)
//!                   ├──▶ TransferGateway       (push notice or result)
//!                   └──▶ FileRequestStore      (persist every step change)
//! ```
//!
//! ## Key Features
//!
//! - **Crash Resilience**: every step change is durably written before the next action
//! - **Typed Steps**: a closed `Step` enum and per-lifecycle step tables
//! - **Failure Classification**: retryable, terminal error, persistence failure, illegal transition
//! - **Bounded Concurrency**: one worker per record per pass under a semaphore
//!
//! ## Module Organization
//!
//! - [`models`] - Request records, remote context and payloads
//! - [`state_machine`] - Steps and step tables
//! - [`store`] - File-backed request store
//! - [`gateways`] - Remote service and transfer gateway seams
//! - [`orchestration`] - Lifecycle orchestrator, scheduler, submitter, bootstrap
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup

pub mod config;
pub mod error;
pub mod gateways;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod state_machine;
pub mod store;

pub use config::{ConfigManager, RelayConfig};
pub use error::{RelayError, Result};
pub use models::{NewRequest, RequestKind, RequestRecord};
pub use orchestration::{
    LifecycleOrchestrator, OrchestratorScheduler, RelaySystem, RequestSubmitter, RunOutcome,
    ShutdownSignal,
};
pub use state_machine::Step;
pub use store::FileRequestStore;
