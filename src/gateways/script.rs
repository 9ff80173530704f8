//! Transfer gateway that delegates each push to an external command.
//!
//! The command receives, after its own arguments:
//! `partner route requestId applicationSessionId tenantId localPath fileInfo`.
//! Exit status 0 means acknowledged and stdout may carry the transfer identifier;
//! exit status 1 means not acknowledged. A command that cannot be started is retried
//! once after a short pause.

use async_trait::async_trait;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};

use super::transfer::{TransferGateway, TransferMetadata, TransferReceipt};
use super::{GatewayError, GatewayResult};

const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ScriptTransferGateway {
    program: String,
    base_args: Vec<String>,
}

impl ScriptTransferGateway {
    /// Build from a whitespace-separated command line
    pub fn new(command_line: &str) -> GatewayResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| GatewayError::Parse("empty transfer command".to_string()))?;
        Ok(Self {
            program,
            base_args: parts.collect(),
        })
    }

    fn command(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg(partner)
            .arg(route)
            .arg(&metadata.request_id)
            .arg(metadata.application_session_id.as_deref().unwrap_or(""))
            .arg(metadata.tenant_id.to_string())
            .arg(local_path)
            .arg(&metadata.file_info)
            .kill_on_drop(true);
        command
    }

    async fn run(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> std::io::Result<Output> {
        match self.command(partner, route, local_path, metadata).output().await {
            Ok(output) => Ok(output),
            Err(first) => {
                debug!(program = %self.program, error = %first, "Transfer command did not start, retrying once");
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
                self.command(partner, route, local_path, metadata)
                    .output()
                    .await
            }
        }
    }
}

#[async_trait]
impl TransferGateway for ScriptTransferGateway {
    async fn push_file(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> TransferReceipt {
        let output = match self.run(partner, route, local_path, metadata).await {
            Ok(output) => output,
            Err(e) => {
                error!(
                    program = %self.program,
                    path = %local_path.display(),
                    error = %e,
                    "❌ Transfer command could not be executed"
                );
                return TransferReceipt::not_acknowledged(None);
            }
        };

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let transfer_id = stdout.trim().parse::<i64>().ok();
                if transfer_id.is_none() {
                    warn!(program = %self.program, stdout = %stdout.trim(), "Transfer command gave no transfer id");
                }
                TransferReceipt::acknowledged(transfer_id)
            }
            Some(1) => TransferReceipt::not_acknowledged(None),
            other => {
                warn!(
                    program = %self.program,
                    exit_code = ?other,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Transfer command failed"
                );
                TransferReceipt::not_acknowledged(None)
            }
        }
    }
}
