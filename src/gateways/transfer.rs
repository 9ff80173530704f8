use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::RequestRecord;

/// Label attached to the accepted notice transfer
pub const ACCEPTED_LABEL: &str = "ACCEPTED";

/// Descriptive data travelling with a pushed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub request_id: String,
    pub application_session_id: Option<String>,
    pub tenant_id: i32,
    /// `"<externalJobId> <label>"`
    pub file_info: String,
}

impl TransferMetadata {
    pub fn for_record(record: &RequestRecord, label: &str) -> Self {
        Self {
            request_id: record.id.to_string(),
            application_session_id: record.context.application_session_id.clone(),
            tenant_id: record.context.tenant_id,
            file_info: record.transfer_metadata(label),
        }
    }
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferReceipt {
    /// The partner fully received and acknowledged the file
    pub acknowledged: bool,
    /// Identifier assigned by the transfer network, when it has one
    pub transfer_id: Option<i64>,
}

impl TransferReceipt {
    pub fn acknowledged(transfer_id: Option<i64>) -> Self {
        Self {
            acknowledged: true,
            transfer_id,
        }
    }

    pub fn not_acknowledged(transfer_id: Option<i64>) -> Self {
        Self {
            acknowledged: false,
            transfer_id,
        }
    }
}

impl From<bool> for TransferReceipt {
    fn from(acknowledged: bool) -> Self {
        Self {
            acknowledged,
            transfer_id: None,
        }
    }
}

/// Pushes files back to partners over the file-transfer network.
///
/// A push may block while it waits for the acknowledgement. Any failure is reported
/// as "not acknowledged"; the caller retries on a later pass.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    async fn push_file(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> TransferReceipt;
}
