//! Fuzzer Watcher Service
//!
//! Owns the list of monitored campaigns and drives the poll loop: on a fixed
//! interval, every target's status file is read, parsed, and pushed into the
//! metric registry. A target that cannot be read is logged and retried on
//! the next cycle; nothing a single target does can stop the loop or disturb
//! the values already exported for its siblings.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::interval;

use crate::error::{Error, Result};
use crate::registry::MetricRegistry;
use crate::stats;
use crate::types::Target;

use super::framework::{RestartPolicy, Service, ServiceError, ServiceStatus};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the watcher service
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Interval between poll cycles
    pub poll_interval: Duration,

    /// Upper bound on a single target's status-file read
    pub read_timeout: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Watcher Service
// ============================================================================

/// Background service polling every registered campaign
///
/// The target list is fixed at construction; targets are polled sequentially
/// in registration order, each read bounded by the configured timeout so one
/// unreachable directory cannot stall the cycle indefinitely.
pub struct FuzzerWatcher {
    /// Configuration
    config: WatcherConfig,

    /// Monitored campaigns, in registration order
    targets: Vec<Target>,

    /// Registry receiving parsed values
    registry: Arc<MetricRegistry>,

    /// Current service status
    status: RwLock<ServiceStatus>,

    /// Labels whose campaign banner has already been logged
    seen_banners: RwLock<HashSet<String>>,
}

impl FuzzerWatcher {
    /// Create a watcher over the given targets
    pub fn new(config: WatcherConfig, targets: Vec<Target>, registry: Arc<MetricRegistry>) -> Self {
        Self {
            config,
            targets,
            registry,
            status: RwLock::new(ServiceStatus::Stopped),
            seen_banners: RwLock::new(HashSet::new()),
        }
    }

    /// Targets being watched
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Run one full poll cycle over all targets
    pub async fn poll_once(&self) {
        for target in &self.targets {
            self.poll_target(target).await;
        }
        self.registry.record_cycle();
    }

    /// Poll a single target; errors are consumed here and never propagate
    async fn poll_target(&self, target: &Target) {
        match self.read_stats(target).await {
            Ok(raw) => {
                let record = stats::parse(&raw);

                if let Some(banner) = record.banner() {
                    let mut seen = self.seen_banners.write();
                    if seen.insert(target.label().to_string()) {
                        tracing::info!(
                            target = %target.label(),
                            banner = %banner,
                            "Campaign identified"
                        );
                    }
                }

                self.registry.apply(target.label(), &record);
                tracing::debug!(
                    target = %target.label(),
                    fields = record.len(),
                    "Status snapshot applied"
                );
            }
            Err(e) => {
                self.registry.record_error(target.label());
                tracing::warn!(target = %target.label(), error = %e, "Poll failed");
            }
        }
    }

    /// Read a target's status file, bounded by the configured timeout
    async fn read_stats(&self, target: &Target) -> Result<Vec<u8>> {
        let path = target.stats_path();

        match tokio::time::timeout(self.config.read_timeout, tokio::fs::read(&path)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => Err(Error::source(target.label(), e)),
            Err(_) => Err(Error::SourceTimeout {
                label: target.label().to_string(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl Service for FuzzerWatcher {
    async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> std::result::Result<(), ServiceError> {
        *self.status.write() = ServiceStatus::Running;
        tracing::info!(
            targets = self.targets.len(),
            interval_secs = self.config.poll_interval.as_secs(),
            "Watcher started"
        );

        // The first tick fires immediately, so startup goes straight into a
        // poll cycle with no initial delay.
        let mut poll_interval = interval(self.config.poll_interval);

        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Watcher received shutdown signal");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!(missed = n, "Watcher broadcast receiver lagged");
                        }
                    }
                }

                _ = poll_interval.tick() => {
                    self.poll_once().await;
                }
            }
        }

        *self.status.write() = ServiceStatus::Stopped;
        tracing::info!("Watcher stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "watcher"
    }

    fn status(&self) -> ServiceStatus {
        self.status.read().clone()
    }

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::OnFailure {
            max_retries: 5,
            backoff: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_stats(dir: &Path, contents: &str) {
        std::fs::write(dir.join("fuzzer_stats"), contents).unwrap();
    }

    fn watcher_over(dirs: &[&Path]) -> FuzzerWatcher {
        let registry = MetricRegistry::shared().unwrap();
        let targets = dirs.iter().map(|d| Target::from_directory(*d)).collect();
        FuzzerWatcher::new(WatcherConfig::default(), targets, registry)
    }

    #[test]
    fn test_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_applies_parsed_values() {
        let dir = TempDir::new().unwrap();
        write_stats(dir.path(), "execs_done : 1000\nunique_crashes : 2\n");

        let watcher = watcher_over(&[dir.path()]);
        watcher.poll_once().await;

        let label = dir.path().file_name().unwrap().to_str().unwrap();
        let output = watcher.registry.encode().unwrap();
        assert!(output.contains(&format!("execs_done{{name=\"{label}\"}} 1000")));
        assert!(output.contains(&format!("unique_crashes{{name=\"{label}\"}} 2")));
        assert_eq!(watcher.registry.poll_cycles(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_isolated() {
        let good = TempDir::new().unwrap();
        let missing = TempDir::new().unwrap();
        write_stats(good.path(), "execs_done : 1000\nunique_crashes : 2\n");
        // `missing` has no fuzzer_stats file at all.

        let registry = MetricRegistry::shared().unwrap();
        let targets = vec![
            Target::with_label(good.path(), "fuzz1"),
            Target::with_label(missing.path(), "fuzz2"),
        ];
        let watcher = FuzzerWatcher::new(WatcherConfig::default(), targets, registry.clone());
        watcher.poll_once().await;

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 1000"));
        assert!(output.contains("unique_crashes{name=\"fuzz1\"} 2"));
        assert!(!output.contains("execs_done{name=\"fuzz2\"}"));
        assert!(output.contains("fuzzmon_poll_errors_total{name=\"fuzz2\"} 1"));
        assert!(!output.contains("fuzzmon_poll_errors_total{name=\"fuzz1\"}"));
    }

    #[tokio::test]
    async fn test_omitted_field_keeps_last_value() {
        let dir = TempDir::new().unwrap();
        write_stats(dir.path(), "paths_total : 10\nexecs_done : 100\n");

        let registry = MetricRegistry::shared().unwrap();
        let targets = vec![Target::with_label(dir.path(), "fuzz1")];
        let watcher = FuzzerWatcher::new(WatcherConfig::default(), targets, registry.clone());

        watcher.poll_once().await;
        write_stats(dir.path(), "execs_done : 200\n");
        watcher.poll_once().await;

        let output = registry.encode().unwrap();
        assert!(output.contains("paths_total{name=\"fuzz1\"} 10"));
        assert!(output.contains("execs_done{name=\"fuzz1\"} 200"));
    }

    #[tokio::test]
    async fn test_failed_cycle_retains_previous_values() {
        let dir = TempDir::new().unwrap();
        write_stats(dir.path(), "execs_done : 100\n");

        let registry = MetricRegistry::shared().unwrap();
        let targets = vec![Target::with_label(dir.path(), "fuzz1")];
        let watcher = FuzzerWatcher::new(WatcherConfig::default(), targets, registry.clone());

        watcher.poll_once().await;
        std::fs::remove_file(dir.path().join("fuzzer_stats")).unwrap();
        watcher.poll_once().await;

        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 100"));
        assert!(output.contains("fuzzmon_poll_errors_total{name=\"fuzz1\"} 1"));
    }

    #[tokio::test]
    async fn test_watcher_lifecycle() {
        let dir = TempDir::new().unwrap();
        write_stats(dir.path(), "execs_done : 1\n");

        let registry = MetricRegistry::shared().unwrap();
        let targets = vec![Target::with_label(dir.path(), "fuzz1")];
        let watcher = Arc::new(FuzzerWatcher::new(
            WatcherConfig::default(),
            targets,
            registry.clone(),
        ));

        let (tx, rx) = broadcast::channel(1);
        let w = watcher.clone();
        let handle = tokio::spawn(async move { w.start(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        // The first poll happens immediately on startup.
        assert!(registry.poll_cycles() >= 1);
        assert_eq!(watcher.status(), ServiceStatus::Running);

        tx.send(()).unwrap();
        let result = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(watcher.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_banner_logged_once_then_values_still_apply() {
        let dir = TempDir::new().unwrap();
        write_stats(dir.path(), "afl_banner : target-app\nexecs_done : 5\n");

        let registry = MetricRegistry::shared().unwrap();
        let targets = vec![Target::with_label(dir.path(), "fuzz1")];
        let watcher = FuzzerWatcher::new(WatcherConfig::default(), targets, registry.clone());

        watcher.poll_once().await;
        watcher.poll_once().await;

        assert!(watcher.seen_banners.read().contains("fuzz1"));
        let output = registry.encode().unwrap();
        assert!(output.contains("execs_done{name=\"fuzz1\"} 5"));
    }
}
