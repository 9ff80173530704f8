use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncRead;

use super::GatewayResult;
use crate::models::{RemoteContext, RequestKind, RequestPayload};

/// Byte stream of a downloaded result
pub type ResultStream = Box<dyn AsyncRead + Send + Unpin>;

/// Answer of the remote service to a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted {
        external_job_id: String,
        global_execution_state: Option<String>,
        global_execution_status: Option<String>,
    },
    /// Temporarily unable to take the job, try again later
    ServiceUnavailable,
    /// Refused outright with the given status code
    Rejected { code: i32 },
}

/// Whether a remote job has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Done,
    NotReady,
    Failed { code: i32 },
}

pub enum DownloadOutcome {
    Ready(ResultStream),
    NotFound,
    ServiceUnavailable,
    Failed { code: i32 },
}

impl fmt::Debug for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready(<stream>)"),
            Self::NotFound => f.write_str("NotFound"),
            Self::ServiceUnavailable => f.write_str("ServiceUnavailable"),
            Self::Failed { code } => f.debug_struct("Failed").field("code", code).finish(),
        }
    }
}

/// Client of the remote archival service.
///
/// Implementations must be safe to share between workers. Errors returned here are
/// transport or parse failures; every answer the service actually gave is an outcome.
#[async_trait]
pub trait RemoteServiceGateway: Send + Sync {
    /// Submit a job. For ingests `source_path` is the package to upload; for DIP
    /// requests the query travels in `payload`.
    async fn submit(
        &self,
        context: &RemoteContext,
        payload: &RequestPayload,
        source_path: &Path,
    ) -> GatewayResult<SubmitOutcome>;

    async fn poll_status(
        &self,
        kind: RequestKind,
        context: &RemoteContext,
        external_job_id: &str,
    ) -> GatewayResult<PollOutcome>;

    async fn download_result(
        &self,
        kind: RequestKind,
        context: &RemoteContext,
        external_job_id: &str,
    ) -> GatewayResult<DownloadOutcome>;
}
