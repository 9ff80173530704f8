//! Test harness wiring a temporary store to scripted gateways

use super::stubs::{RecordingTransfer, ScriptedRemote};
use archive_relay::config::RelayConfig;
use archive_relay::gateways::{RemoteServiceGateway, TransferGateway};
use archive_relay::models::{
    IngestContext, NewRequest, RemoteContext, RequestPayload, RequestRecord,
};
use archive_relay::orchestration::{
    LifecycleOrchestrator, OrchestratorScheduler, RequestSubmitter, ShutdownSignal,
};
use archive_relay::state_machine::Step;
use archive_relay::store::FileRequestStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub dir: TempDir,
    pub config: RelayConfig,
    pub store: Arc<FileRequestStore>,
    pub remote: Arc<ScriptedRemote>,
    pub transfer: Arc<RecordingTransfer>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub shutdown: ShutdownSignal,
}

/// Configuration with fast timings rooted in `dir`
pub fn test_config(dir: &Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.store.base_directory = dir.join("requests");
    config.store.removal_wait_initial_ms = 1;
    config.store.removal_wait_attempts = 3;
    config.scheduler.pass_interval_ms = 10;
    config.scheduler.pass_timeout_ms = 5_000;
    config.scheduler.max_concurrent_requests = 4;
    config.scheduler.stop_file = dir.join("relay.stop");
    config.remote.poll_retry_delay_ms = 1;
    config.transfer.ack_poll_interval_ms = 1;
    config.environment = "test".to_string();
    config
}

impl Harness {
    pub async fn new(remote: ScriptedRemote, transfer: RecordingTransfer) -> Self {
        Self::with_config(remote, transfer, |_| {}).await
    }

    pub async fn with_config(
        remote: ScriptedRemote,
        transfer: RecordingTransfer,
        adjust: impl FnOnce(&mut RelayConfig),
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        adjust(&mut config);
        config.validate().unwrap();

        let shutdown = ShutdownSignal::new(&config.scheduler.stop_file);
        let store = Arc::new(FileRequestStore::open(config.store.clone()).await.unwrap());
        let remote = Arc::new(remote);
        let transfer = Arc::new(transfer);
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            Arc::clone(&store),
            remote.clone() as Arc<dyn RemoteServiceGateway>,
            transfer.clone() as Arc<dyn TransferGateway>,
            &config.remote,
            shutdown.clone(),
        ));

        Self {
            dir,
            config,
            store,
            remote,
            transfer,
            orchestrator,
            shutdown,
        }
    }

    pub fn scheduler(&self) -> OrchestratorScheduler {
        OrchestratorScheduler::new(
            Arc::clone(&self.orchestrator),
            self.config.scheduler.clone(),
            self.shutdown.clone(),
        )
    }

    pub fn submitter(&self) -> RequestSubmitter {
        RequestSubmitter::new(Arc::clone(&self.orchestrator))
    }

    /// Ingest request whose package file exists on disk
    pub fn ingest_request(&self, check_result_required: bool) -> NewRequest {
        let source_path = self
            .dir
            .path()
            .join(format!("package-{}.zip", uuid::Uuid::new_v4()));
        std::fs::write(&source_path, b"PK-package").unwrap();
        NewRequest {
            context: remote_context(),
            payload: RequestPayload::ingest(IngestContext::DefaultWorkflow),
            source_path,
            partner: "partner-a".to_string(),
            route: "ingest-reply".to_string(),
            check_result_required,
        }
    }

    pub fn dip_request(&self) -> NewRequest {
        NewRequest {
            context: remote_context(),
            payload: RequestPayload::dip(serde_json::json!({
                "$roots": [],
                "$query": [{"$eq": {"Title": "report"}}],
                "$projection": {}
            })),
            source_path: self.dir.path().join("query.json"),
            partner: "partner-b".to_string(),
            route: "dip-reply".to_string(),
            check_result_required: true,
        }
    }

    /// Persist a new record at `Startup`
    pub async fn create(&self, new_request: NewRequest) -> RequestRecord {
        let mut record = RequestRecord::new(new_request);
        self.store.create_new(&mut record).await.unwrap();
        record
    }

    /// Persist a new record and walk it along `path`, persisting every step
    pub async fn create_at(&self, new_request: NewRequest, path: &[Step]) -> RequestRecord {
        let mut record = self.create(new_request).await;
        for step in path {
            record.try_transition(*step, 0).unwrap();
            self.store.update(&record).await.unwrap();
        }
        record
    }

    pub async fn reload(&self, record: &RequestRecord) -> RequestRecord {
        self.store.load(record.kind, record.id).await.unwrap()
    }

    pub async fn stored_ids(&self) -> Vec<uuid::Uuid> {
        self.store
            .list_pending()
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect()
    }

    /// Files currently in the work directory
    pub fn work_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.store.work_directory())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn remote_context() -> RemoteContext {
    RemoteContext {
        tenant_id: 0,
        application_session_id: Some("app-session".to_string()),
        personal_certificate: None,
        access_contract: "ContractTNR".to_string(),
    }
}
