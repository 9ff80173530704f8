//! # Relay Bootstrap
//!
//! Wires configuration, store, gateways, orchestrator, scheduler and submitter into
//! one [`RelaySystem`].
//!
//! ## Key Features
//!
//! - **Environment-Aware Configuration**: built from a loaded [`ConfigManager`]
//! - **Pluggable Gateways**: callers supply the remote and transfer clients
//! - **Graceful Shutdown**: Ctrl-C creates the stop file, so every monitor sharing it drains
//!
//! ## Usage
//!
//! ```rust,no_run
//! use archive_relay::config::ConfigManager;
//! use archive_relay::gateways::{RemoteServiceGateway, TransferGateway};
//! use archive_relay::orchestration::RelaySystem;
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     remote: Arc<dyn RemoteServiceGateway>,
//! #     transfer: Arc<dyn TransferGateway>,
//! # ) -> archive_relay::Result<()> {
//! let config = ConfigManager::load()?;
//! let system = RelaySystem::bootstrap(config, remote, transfer).await?;
//! let summary = system.run_until_stopped().await;
//! println!("completed {} requests", summary.completed);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::lifecycle::LifecycleOrchestrator;
use super::scheduler::{OrchestratorScheduler, SchedulerSummary};
use super::shutdown::ShutdownSignal;
use super::submitter::RequestSubmitter;
use crate::config::{ConfigManager, TransferConfig};
use crate::error::{RelayError, Result};
use crate::gateways::{RemoteServiceGateway, ScriptTransferGateway, TransferGateway};
use crate::store::FileRequestStore;

/// Fully wired relay
pub struct RelaySystem {
    pub config_manager: Arc<ConfigManager>,
    pub store: Arc<FileRequestStore>,
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub scheduler: Arc<OrchestratorScheduler>,
    pub submitter: RequestSubmitter,
    pub shutdown: ShutdownSignal,
}

impl RelaySystem {
    pub async fn bootstrap(
        config_manager: Arc<ConfigManager>,
        remote: Arc<dyn RemoteServiceGateway>,
        transfer: Arc<dyn TransferGateway>,
    ) -> Result<Self> {
        let config = config_manager.config();
        info!(
            environment = %config_manager.environment(),
            base_directory = %config.store.base_directory.display(),
            "🏗️ BOOTSTRAP: Building relay"
        );

        let shutdown = ShutdownSignal::new(&config.scheduler.stop_file);
        let store = Arc::new(FileRequestStore::open(config.store.clone()).await?);
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            Arc::clone(&store),
            remote,
            transfer,
            &config.remote,
            shutdown.clone(),
        ));
        let scheduler = Arc::new(OrchestratorScheduler::new(
            Arc::clone(&orchestrator),
            config.scheduler.clone(),
            shutdown.clone(),
        ));
        let submitter = RequestSubmitter::new(Arc::clone(&orchestrator));

        Ok(Self {
            config_manager,
            store,
            orchestrator,
            scheduler,
            submitter,
            shutdown,
        })
    }

    /// Build with the script transfer gateway named in `transfer.script_command`
    pub async fn bootstrap_with_script_transfer(
        config_manager: Arc<ConfigManager>,
        remote: Arc<dyn RemoteServiceGateway>,
    ) -> Result<Self> {
        let transfer = script_transfer_gateway(&config_manager.config().transfer)?;
        Self::bootstrap(config_manager, remote, transfer).await
    }

    /// Create the stop file on Ctrl-C
    pub fn install_signal_handler(&self) -> JoinHandle<()> {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Cannot listen for Ctrl-C");
                return;
            }
            info!("🛑 BOOTSTRAP: Ctrl-C received, requesting shutdown");
            if let Err(e) = shutdown.request_with_stop_file().await {
                error!(error = %e, "Cannot create stop file, stopping in-process only");
                shutdown.request();
            }
        })
    }

    /// Run the scheduler with the signal handler installed until shutdown
    pub async fn run_until_stopped(&self) -> SchedulerSummary {
        let handler = self.install_signal_handler();
        let summary = self.scheduler.run().await;
        handler.abort();
        summary
    }
}

/// Script transfer gateway from configuration
pub fn script_transfer_gateway(config: &TransferConfig) -> Result<Arc<dyn TransferGateway>> {
    let command = config.script_command.as_deref().ok_or_else(|| {
        RelayError::ConfigurationError("transfer.script_command is not set".to_string())
    })?;
    let gateway = ScriptTransferGateway::new(command)?;
    Ok(Arc::new(gateway))
}
