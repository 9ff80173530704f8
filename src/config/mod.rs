//! # Relay Configuration System
//!
//! Typed configuration for the request store, the scheduler, the remote service
//! polling policy and the transfer acknowledgement wait.
//!
//! ## Architecture
//!
//! - **Single Source of Truth**: configuration comes from `config/relay-config.yaml`
//! - **Environment Awareness**: `development`/`test`/`production` sections override the base
//! - **Explicit Validation**: zero intervals or zero concurrency are rejected at load time
//! - **Threaded, not global**: components receive the section they need in their constructor
//!
//! ## Usage
//!
//! ```rust,no_run
//! use archive_relay::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let interval = manager.config().scheduler.pass_interval();
//! let base_dir = &manager.config().store.base_directory;
//! # let _ = (interval, base_dir);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring relay-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Durable request store location and cleanup behaviour
    pub store: StoreConfig,

    /// Pass loop settings
    pub scheduler: SchedulerConfig,

    /// Remote archival service policies
    pub remote: RemoteConfig,

    /// File transfer acknowledgement settings
    pub transfer: TransferConfig,

    /// Environment name, filled in by the loader
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_directory: PathBuf,
    pub work_subdirectory: String,
    /// Bounded wait for a deleted record file to disappear
    pub removal_wait_attempts: u32,
    pub removal_wait_initial_ms: u64,
    /// Whether cleanup also removes the submitted source file
    pub delete_source_on_cleanup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("data/relay"),
            work_subdirectory: "work".to_string(),
            removal_wait_attempts: 5,
            removal_wait_initial_ms: 10,
            delete_source_on_cleanup: true,
        }
    }
}

impl StoreConfig {
    pub fn removal_wait_initial(&self) -> Duration {
        Duration::from_millis(self.removal_wait_initial_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub pass_interval_ms: u64,
    pub pass_timeout_ms: u64,
    pub max_concurrent_requests: usize,
    /// Presence of this file means "drain and stop"
    pub stop_file: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pass_interval_ms: 10_000,
            pass_timeout_ms: 300_000,
            max_concurrent_requests: 16,
            stop_file: PathBuf::from("data/relay/relay.stop"),
        }
    }
}

impl SchedulerConfig {
    pub fn pass_interval(&self) -> Duration {
        Duration::from_millis(self.pass_interval_ms)
    }

    pub fn pass_timeout(&self) -> Duration {
        Duration::from_millis(self.pass_timeout_ms)
    }
}

/// What to do when the submit call itself fails (transport or unparseable response)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitFailurePolicy {
    /// Stay on the submit step and try again on a later pass
    #[default]
    Retry,
    /// Move to the error step with a generic server error code
    Fail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// How many times a single poll step asks "is it done yet"
    pub poll_retry_attempts: u32,
    pub poll_retry_delay_ms: u64,
    pub submit_failure_policy: SubmitFailurePolicy,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            poll_retry_attempts: 3,
            poll_retry_delay_ms: 100,
            submit_failure_policy: SubmitFailurePolicy::Retry,
        }
    }
}

impl RemoteConfig {
    pub fn poll_retry_delay(&self) -> Duration {
        Duration::from_millis(self.poll_retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    pub ack_poll_interval_ms: u64,
    /// None waits until the transfer resolves or shutdown is requested
    pub ack_timeout_ms: Option<u64>,
    /// External command used by the script transfer gateway
    pub script_command: Option<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            ack_poll_interval_ms: 500,
            ack_timeout_ms: None,
            script_command: None,
        }
    }
}

impl TransferConfig {
    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }
}

impl RelayConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.store.base_directory.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "store.base_directory",
                "store configuration",
            ));
        }

        if self.store.work_subdirectory.is_empty()
            || self.store.work_subdirectory.contains(['/', '\\'])
        {
            return Err(ConfigurationError::invalid_value(
                "store.work_subdirectory",
                self.store.work_subdirectory.clone(),
                "work subdirectory must be a single non-empty path component",
            ));
        }

        if self.scheduler.pass_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.pass_interval_ms",
                "0",
                "pass interval must be greater than 0",
            ));
        }

        if self.scheduler.pass_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.pass_timeout_ms",
                "0",
                "pass timeout must be greater than 0",
            ));
        }

        if self.scheduler.max_concurrent_requests == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_concurrent_requests",
                "0",
                "concurrency must be greater than 0",
            ));
        }

        if self.scheduler.stop_file.as_os_str().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "scheduler.stop_file",
                "scheduler configuration",
            ));
        }

        if self.remote.poll_retry_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "remote.poll_retry_attempts",
                "0",
                "at least one poll attempt is required",
            ));
        }

        if self.transfer.ack_poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "transfer.ack_poll_interval_ms",
                "0",
                "acknowledgement poll interval must be greater than 0",
            ));
        }

        Ok(())
    }
}
