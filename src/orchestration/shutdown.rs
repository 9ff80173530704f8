//! # Shutdown Signal
//!
//! Cooperative stop request shared by the scheduler and every worker.
//!
//! Shutdown is requested either in-process ([`ShutdownSignal::request`]) or by
//! creating the stop file, which lets an operator (or another process watching the
//! same directory) drain the relay. Sleeps taken through [`ShutdownSignal::sleep`]
//! wake up early once shutdown is observed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// Longest slice slept before re-checking the stop file
const STOP_FILE_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug)]
struct Inner {
    stop_file: Option<PathBuf>,
    requested: AtomicBool,
    notify: Notify,
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// Signal backed by a stop file
    pub fn new(stop_file: impl Into<PathBuf>) -> Self {
        Self::build(Some(stop_file.into()))
    }

    /// Signal without a stop file, only requested in-process
    pub fn in_memory() -> Self {
        Self::build(None)
    }

    fn build(stop_file: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stop_file,
                requested: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn stop_file(&self) -> Option<&Path> {
        self.inner.stop_file.as_deref()
    }

    /// Whether shutdown was requested, in-process or through the stop file
    pub fn is_requested(&self) -> bool {
        if self.inner.requested.load(Ordering::SeqCst) {
            return true;
        }
        let stop_file_present = self
            .inner
            .stop_file
            .as_deref()
            .is_some_and(|path| path.exists());
        if stop_file_present {
            self.mark_requested();
        }
        stop_file_present
    }

    /// Request shutdown in-process
    pub fn request(&self) {
        self.mark_requested();
    }

    /// Create the stop file (when configured) and request shutdown
    pub async fn request_with_stop_file(&self) -> std::io::Result<()> {
        if let Some(path) = self.inner.stop_file.as_deref() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, b"stop\n").await?;
            info!(stop_file = %path.display(), "🛑 Stop file created");
        }
        self.mark_requested();
        Ok(())
    }

    fn mark_requested(&self) {
        if !self.inner.requested.swap(true, Ordering::SeqCst) {
            info!("🛑 Shutdown requested");
        }
        self.inner.notify.notify_waiters();
    }

    /// Sleep for `duration` unless shutdown is observed first.
    ///
    /// Returns true when the full duration elapsed, false when interrupted.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_requested() {
                return false;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            let slice = (deadline - now).min(STOP_FILE_CHECK_INTERVAL);

            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                _ = &mut notified => return false,
            }
        }
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        while self.sleep(STOP_FILE_CHECK_INTERVAL).await {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sleep_completes_without_request() {
        let signal = ShutdownSignal::in_memory();
        assert!(signal.sleep(Duration::from_millis(5)).await);
        assert!(!signal.is_requested());
    }

    #[tokio::test]
    async fn test_request_interrupts_sleep() {
        let signal = ShutdownSignal::in_memory();
        let sleeper = signal.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(30)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.request();

        let completed = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_stop_file_observed() {
        let dir = TempDir::new().unwrap();
        let stop_file = dir.path().join("relay.stop");
        let signal = ShutdownSignal::new(&stop_file);
        assert!(!signal.is_requested());

        std::fs::write(&stop_file, b"").unwrap();
        assert!(signal.is_requested());
        assert!(!signal.sleep(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_request_with_stop_file_creates_it() {
        let dir = TempDir::new().unwrap();
        let stop_file = dir.path().join("nested").join("relay.stop");
        let signal = ShutdownSignal::new(&stop_file);

        signal.request_with_stop_file().await.unwrap();
        assert!(stop_file.exists());
        assert!(signal.is_requested());
    }
}
