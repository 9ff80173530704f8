//! Scripted gateway doubles shared by the integration tests

use archive_relay::gateways::{
    DownloadOutcome, GatewayError, GatewayResult, PollOutcome, RemoteServiceGateway,
    SubmitOutcome, TransferGateway, TransferMetadata, TransferReceipt,
};
use archive_relay::models::{RemoteContext, RequestKind, RequestPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// One scripted answer to a submit call
#[derive(Debug, Clone)]
pub enum SubmitStep {
    Outcome(SubmitOutcome),
    TransportError,
}

impl SubmitStep {
    pub fn accepted(job_id: &str) -> Self {
        Self::Outcome(SubmitOutcome::Accepted {
            external_job_id: job_id.to_string(),
            global_execution_state: Some("PROCESSING".to_string()),
            global_execution_status: Some("OK".to_string()),
        })
    }

    pub fn unavailable() -> Self {
        Self::Outcome(SubmitOutcome::ServiceUnavailable)
    }

    pub fn rejected(code: i32) -> Self {
        Self::Outcome(SubmitOutcome::Rejected { code })
    }
}

/// Remote service answering from queues, falling back to fixed defaults
pub struct ScriptedRemote {
    submits: Mutex<VecDeque<SubmitStep>>,
    submit_default: SubmitStep,
    polls: Mutex<VecDeque<PollOutcome>>,
    poll_default: PollOutcome,
    result_bytes: Vec<u8>,
    submit_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

impl ScriptedRemote {
    /// Accepts every submission with `job_id`; jobs are immediately done
    pub fn accepting(job_id: &str) -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            submit_default: SubmitStep::accepted(job_id),
            polls: Mutex::new(VecDeque::new()),
            poll_default: PollOutcome::Done,
            result_bytes: b"<ArchiveTransferReply/>".to_vec(),
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_submit_default(mut self, step: SubmitStep) -> Self {
        self.submit_default = step;
        self
    }

    pub fn with_submits(self, steps: Vec<SubmitStep>) -> Self {
        self.submits.lock().extend(steps);
        self
    }

    pub fn with_polls(self, outcomes: Vec<PollOutcome>) -> Self {
        self.polls.lock().extend(outcomes);
        self
    }

    pub fn with_poll_default(mut self, outcome: PollOutcome) -> Self {
        self.poll_default = outcome;
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn result_bytes(&self) -> &[u8] {
        &self.result_bytes
    }
}

#[async_trait]
impl RemoteServiceGateway for ScriptedRemote {
    async fn submit(
        &self,
        _context: &RemoteContext,
        _payload: &RequestPayload,
        _source_path: &Path,
    ) -> GatewayResult<SubmitOutcome> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .submits
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.submit_default.clone());
        match step {
            SubmitStep::Outcome(outcome) => Ok(outcome),
            SubmitStep::TransportError => {
                Err(GatewayError::Transport("connection reset".to_string()))
            }
        }
    }

    async fn poll_status(
        &self,
        _kind: RequestKind,
        _context: &RemoteContext,
        _external_job_id: &str,
    ) -> GatewayResult<PollOutcome> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.polls.lock().pop_front().unwrap_or(self.poll_default))
    }

    async fn download_result(
        &self,
        _kind: RequestKind,
        _context: &RemoteContext,
        _external_job_id: &str,
    ) -> GatewayResult<DownloadOutcome> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadOutcome::Ready(Box::new(std::io::Cursor::new(
            self.result_bytes.clone(),
        ))))
    }
}

/// A push seen by the recording transfer gateway
#[derive(Debug, Clone)]
pub struct PushedFile {
    pub partner: String,
    pub route: String,
    pub local_path: PathBuf,
    pub file_info: String,
    /// Whether the pushed file existed when the push was made
    pub existed: bool,
}

/// Transfer gateway recording every push and answering with a switchable flag
pub struct RecordingTransfer {
    acknowledge: AtomicBool,
    delay: Duration,
    transfer_id: Option<i64>,
    pushes: Mutex<Vec<PushedFile>>,
}

impl RecordingTransfer {
    pub fn acknowledging() -> Self {
        Self {
            acknowledge: AtomicBool::new(true),
            delay: Duration::ZERO,
            transfer_id: None,
            pushes: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing() -> Self {
        let transfer = Self::acknowledging();
        transfer.set_acknowledge(false);
        transfer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report this id on every receipt, as a tracked transfer would
    pub fn with_transfer_id(mut self, transfer_id: i64) -> Self {
        self.transfer_id = Some(transfer_id);
        self
    }

    pub fn set_acknowledge(&self, acknowledge: bool) {
        self.acknowledge.store(acknowledge, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<PushedFile> {
        self.pushes.lock().clone()
    }
}

#[async_trait]
impl TransferGateway for RecordingTransfer {
    async fn push_file(
        &self,
        partner: &str,
        route: &str,
        local_path: &Path,
        metadata: &TransferMetadata,
    ) -> TransferReceipt {
        self.pushes.lock().push(PushedFile {
            partner: partner.to_string(),
            route: route.to_string(),
            local_path: local_path.to_path_buf(),
            file_info: metadata.file_info.clone(),
            existed: local_path.exists(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        TransferReceipt {
            acknowledged: self.acknowledge.load(Ordering::SeqCst),
            transfer_id: self.transfer_id,
        }
    }
}
