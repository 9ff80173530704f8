//! Transfer gateway over a submit-then-poll transfer monitor.
//!
//! The tracker starts a transfer and hands back its identifier; the gateway then
//! asks for the transfer state every `ack_poll_interval_ms` until it is done or in
//! error. The wait gives up when shutdown is requested or the optional
//! acknowledgement timeout elapses.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::transfer::{TransferGateway, TransferMetadata, TransferReceipt};
use super::GatewayResult;
use crate::config::TransferConfig;
use crate::orchestration::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    InProgress,
    Done,
    InError,
}

/// Submission and state lookup on the transfer network
#[async_trait]
pub trait TransferTracker: Send + Sync {
    /// Start a transfer and return its identifier
    async fn start_transfer(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> GatewayResult<i64>;

    async fn transfer_state(&self, transfer_id: i64) -> GatewayResult<TransferState>;
}

pub struct TrackedTransferGateway<T> {
    tracker: T,
    poll_interval: Duration,
    timeout: Option<Duration>,
    shutdown: ShutdownSignal,
}

impl<T: TransferTracker> TrackedTransferGateway<T> {
    pub fn new(tracker: T, config: &TransferConfig, shutdown: ShutdownSignal) -> Self {
        Self {
            tracker,
            poll_interval: config.ack_poll_interval(),
            timeout: config.ack_timeout(),
            shutdown,
        }
    }

    async fn wait_for_completion(&self, transfer_id: i64) -> bool {
        let started = Instant::now();
        loop {
            match self.tracker.transfer_state(transfer_id).await {
                Ok(TransferState::Done) => return true,
                Ok(TransferState::InError) => {
                    warn!(transfer_id, "Transfer ended in error");
                    return false;
                }
                Ok(TransferState::InProgress) => {}
                Err(e) => {
                    warn!(transfer_id, error = %e, "Cannot read transfer state");
                    return false;
                }
            }

            if self
                .timeout
                .is_some_and(|timeout| started.elapsed() >= timeout)
            {
                warn!(transfer_id, "Gave up waiting for transfer acknowledgement");
                return false;
            }
            if !self.shutdown.sleep(self.poll_interval).await {
                debug!(transfer_id, "Transfer wait interrupted by shutdown");
                return false;
            }
        }
    }
}

#[async_trait]
impl<T: TransferTracker> TransferGateway for TrackedTransferGateway<T> {
    async fn push_file(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> TransferReceipt {
        let transfer_id = match self
            .tracker
            .start_transfer(partner, route, local_path, metadata)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    partner = %partner,
                    route = %route,
                    path = %local_path.display(),
                    error = %e,
                    "Transfer submission failed"
                );
                return TransferReceipt::not_acknowledged(None);
            }
        };

        debug!(transfer_id, partner = %partner, path = %local_path.display(), "Transfer started");

        if self.wait_for_completion(transfer_id).await {
            TransferReceipt::acknowledged(Some(transfer_id))
        } else {
            TransferReceipt::not_acknowledged(Some(transfer_id))
        }
    }
}
