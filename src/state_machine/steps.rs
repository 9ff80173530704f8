use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a request in its processing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Created but not yet handed to the orchestrator
    Startup,
    /// Submission to the remote service pending or to be retried
    SubmitRetry,
    /// Job accepted, accepted notice not yet delivered
    AcceptedIdRetry,
    /// Waiting for the remote job to finish and its result to be downloaded
    PollRetry,
    /// Result downloaded, delivery to the partner pending
    ForwardRetry,
    /// Remote rejected the job, failure notice delivery pending
    Error,
    /// Done, record and artifacts to be removed
    End,
}

impl Step {
    /// Check if this is the terminal step (absorbing)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Check if this is the error step
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if the orchestrator has work to do for this step
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::Startup)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::SubmitRetry => "submit_retry",
            Self::AcceptedIdRetry => "accepted_id_retry",
            Self::PollRetry => "poll_retry",
            Self::ForwardRetry => "forward_retry",
            Self::Error => "error",
            Self::End => "end",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::Startup),
            "submit_retry" => Ok(Self::SubmitRetry),
            "accepted_id_retry" => Ok(Self::AcceptedIdRetry),
            "poll_retry" => Ok(Self::PollRetry),
            "forward_retry" => Ok(Self::ForwardRetry),
            "error" => Ok(Self::Error),
            "end" => Ok(Self::End),
            _ => Err(format!("Invalid step: {s}")),
        }
    }
}

/// Initial step for new requests
impl Default for Step {
    fn default() -> Self {
        Self::Startup
    }
}
