//! # Gateways
//!
//! Seams to the two external collaborators of the relay:
//!
//! - [`RemoteServiceGateway`]: submits jobs to the archival service, polls them and
//!   downloads their results
//! - [`TransferGateway`]: pushes a local file to a partner and reports whether the
//!   partner acknowledged it
//!
//! The wire protocols stay outside this crate. Two transfer adapters are provided:
//! [`TrackedTransferGateway`] over a submit-then-poll transfer monitor, and
//! [`ScriptTransferGateway`] which delegates to an external command.

pub mod remote;
pub mod script;
pub mod tracked;
pub mod transfer;

pub use remote::{DownloadOutcome, PollOutcome, RemoteServiceGateway, ResultStream, SubmitOutcome};
pub use script::ScriptTransferGateway;
pub use tracked::{TrackedTransferGateway, TransferState, TransferTracker};
pub use transfer::{TransferGateway, TransferMetadata, TransferReceipt};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Could not reach the collaborator
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The collaborator answered with something unusable
    #[error("Unparseable response: {0}")]
    Parse(String),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Gave up waiting because shutdown was requested
    #[error("Interrupted by shutdown")]
    Interrupted,
}
