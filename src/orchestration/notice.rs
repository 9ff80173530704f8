//! Notice artifacts pushed back to partners.
//!
//! An accepted notice tells the caller that the remote service took the job; a
//! failure notice stands in for the result when the remote never produced one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::{RequestKind, RequestRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeOutcome {
    Started,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub request_id: String,
    pub kind: RequestKind,
    pub external_job_id: String,
    pub outcome: NoticeOutcome,
    pub status_code: i32,
    pub detail: String,
    pub event_time: DateTime<Utc>,
}

impl Notice {
    pub fn accepted(record: &RequestRecord) -> Self {
        Self {
            request_id: record.id.to_string(),
            kind: record.kind,
            external_job_id: record.external_job_id.clone(),
            outcome: NoticeOutcome::Started,
            status_code: record.status(),
            detail: match &record.global_execution_state {
                Some(state) => format!("Job accepted by remote service ({state})"),
                None => "Job accepted by remote service".to_string(),
            },
            event_time: Utc::now(),
        }
    }

    pub fn failure(record: &RequestRecord) -> Self {
        Self {
            request_id: record.id.to_string(),
            kind: record.kind,
            external_job_id: record.external_job_id.clone(),
            outcome: NoticeOutcome::Fatal,
            status_code: record.status(),
            detail: format!(
                "{} request failed with status {}",
                record.kind,
                record.status()
            ),
            event_time: Utc::now(),
        }
    }
}

/// Write a notice through a temporary sibling so partial files are never pushed
pub async fn write_notice(path: &Path, notice: &Notice) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(notice)?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    tokio::fs::write(&temp_path, &bytes).await?;
    tokio::fs::rename(&temp_path, path).await
}
