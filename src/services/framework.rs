//! Service Framework
//!
//! Lifecycle scaffolding for background services: a common `Service` trait,
//! status reporting, restart policies, and a manager that spawns services on
//! the runtime and fans a shutdown signal out to them over a broadcast
//! channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

// ============================================================================
// Status and Errors
// ============================================================================

/// Lifecycle state of a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not started, or cleanly stopped
    Stopped,

    /// Main loop is running
    Running,

    /// Terminated with an error
    Failed(String),
}

impl ServiceStatus {
    /// Whether the service is in its normal running state
    pub fn is_healthy(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }
}

/// Errors surfaced by service main loops
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Service could not start
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Service main loop failed
    #[error("Service failed: {0}")]
    Runtime(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Restart Policy
// ============================================================================

/// What the manager does when a service's main loop returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart
    Never,

    /// Restart on failure, up to a retry limit
    OnFailure { max_retries: u32, backoff: Duration },

    /// Always restart after failure
    Always { backoff: Duration },
}

// ============================================================================
// Service Trait
// ============================================================================

/// A long-running background service
///
/// `start` owns the service's main loop and must return promptly once the
/// shutdown receiver yields. Implementations are shared behind `Arc`, so all
/// state mutation goes through interior mutability.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    /// Run the main loop until shutdown is signalled
    async fn start(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError>;

    /// Stable service name for logs and status reports
    fn name(&self) -> &'static str;

    /// Current lifecycle state
    fn status(&self) -> ServiceStatus;

    /// Restart behavior after a failed main loop
    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::Never
    }
}

// ============================================================================
// Service Manager
// ============================================================================

/// Spawns services and coordinates their shutdown
///
/// Each registered service runs under a supervisor task that applies its
/// restart policy; `shutdown` broadcasts the stop signal and awaits every
/// supervisor.
pub struct ServiceManager {
    services: Mutex<Vec<Arc<dyn Service>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServiceManager {
    /// Create an empty manager
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            services: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Register a service; it starts on the next `start_all`
    pub fn register(&self, service: Arc<dyn Service>) {
        self.services.lock().push(service);
    }

    /// Spawn every registered service under its supervisor
    pub fn start_all(&self) {
        let services = self.services.lock().clone();
        let mut handles = self.handles.lock();

        for service in services {
            let shutdown_tx = self.shutdown_tx.clone();
            handles.push(tokio::spawn(Self::supervise(service, shutdown_tx)));
        }
    }

    /// Run one service, restarting per its policy until shutdown or give-up
    async fn supervise(service: Arc<dyn Service>, shutdown_tx: broadcast::Sender<()>) {
        let mut attempts: u32 = 0;

        loop {
            let result = service.start(shutdown_tx.subscribe()).await;

            match result {
                Ok(()) => {
                    tracing::debug!(service = service.name(), "Service stopped");
                    return;
                }
                Err(e) => {
                    attempts += 1;
                    tracing::error!(service = service.name(), error = %e, attempts, "Service failed");

                    let backoff = match service.restart_policy() {
                        RestartPolicy::Never => return,
                        RestartPolicy::OnFailure { max_retries, backoff } => {
                            if attempts > max_retries {
                                tracing::error!(
                                    service = service.name(),
                                    "Retry limit reached, giving up"
                                );
                                return;
                            }
                            backoff
                        }
                        RestartPolicy::Always { backoff } => backoff,
                    };

                    // Respect a shutdown that arrives during the backoff wait.
                    let mut shutdown = shutdown_tx.subscribe();
                    tokio::select! {
                        _ = shutdown.recv() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    /// Broadcast the stop signal and wait for all supervisors to finish
    pub async fn shutdown(&self) {
        // Fails only when nothing is listening, which is a clean state.
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Service task panicked during shutdown");
            }
        }
    }

    /// Status of every registered service
    pub fn status(&self) -> Vec<(&'static str, ServiceStatus)> {
        self.services
            .lock()
            .iter()
            .map(|s| (s.name(), s.status()))
            .collect()
    }

    /// Whether every registered service reports healthy
    pub fn is_healthy(&self) -> bool {
        self.services.lock().iter().all(|s| s.status().is_healthy())
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct TestService {
        status: RwLock<ServiceStatus>,
        starts: AtomicU32,
        fail_times: u32,
        policy: RestartPolicy,
    }

    impl TestService {
        fn new(fail_times: u32, policy: RestartPolicy) -> Self {
            Self {
                status: RwLock::new(ServiceStatus::Stopped),
                starts: AtomicU32::new(0),
                fail_times,
                policy,
            }
        }
    }

    #[async_trait::async_trait]
    impl Service for TestService {
        async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServiceError> {
            let attempt = self.starts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                return Err(ServiceError::Runtime("induced failure".to_string()));
            }

            *self.status.write() = ServiceStatus::Running;
            let _ = shutdown.recv().await;
            *self.status.write() = ServiceStatus::Stopped;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "test_service"
        }

        fn status(&self) -> ServiceStatus {
            self.status.read().clone()
        }

        fn restart_policy(&self) -> RestartPolicy {
            self.policy
        }
    }

    #[test]
    fn test_status_health() {
        assert!(ServiceStatus::Running.is_healthy());
        assert!(!ServiceStatus::Stopped.is_healthy());
        assert!(!ServiceStatus::Failed("x".to_string()).is_healthy());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let manager = ServiceManager::new();
        let service = Arc::new(TestService::new(0, RestartPolicy::Never));
        manager.register(service.clone());
        manager.start_all();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_healthy());

        manager.shutdown().await;
        assert_eq!(service.status(), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn test_restart_on_failure() {
        let manager = ServiceManager::new();
        let service = Arc::new(TestService::new(
            2,
            RestartPolicy::OnFailure {
                max_retries: 5,
                backoff: Duration::from_millis(10),
            },
        ));
        manager.register(service.clone());
        manager.start_all();

        // Two induced failures, then the third attempt runs until shutdown.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(service.starts.load(Ordering::SeqCst), 3);
        assert!(manager.is_healthy());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_never_restart_gives_up() {
        let manager = ServiceManager::new();
        let service = Arc::new(TestService::new(u32::MAX, RestartPolicy::Never));
        manager.register(service.clone());
        manager.start_all();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.starts.load(Ordering::SeqCst), 1);

        manager.shutdown().await;
    }
}
