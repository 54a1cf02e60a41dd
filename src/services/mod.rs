//! Background Services Module
//!
//! Provides the background services of the exporter and the scaffolding to
//! run them: a common service trait with broadcast-driven shutdown, restart
//! policies, and the watcher that polls campaign status files.
//!
//! # Services
//!
//! - **ServiceManager**: Coordinates lifecycle of all background services
//! - **FuzzerWatcher**: Polls campaign directories and feeds the registry

pub mod framework;
pub mod watcher;

pub use framework::{RestartPolicy, Service, ServiceError, ServiceManager, ServiceStatus};
pub use watcher::{FuzzerWatcher, WatcherConfig};
