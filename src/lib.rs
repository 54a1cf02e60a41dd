//! Prometheus exporter for AFL fuzzing campaigns
//!
//! Polls one or more campaign output directories, parses the `fuzzer_stats`
//! file each campaign rewrites periodically, and exports the recognized
//! fields as gauge series labeled by campaign name.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   read    ┌────────┐   mapping   ┌────────────────┐
//! │ FuzzerWatcher│──────────▶│ stats  │────────────▶│ MetricRegistry │
//! │  (interval)  │           │ parser │             │  (GaugeVecs)   │
//! └──────────────┘           └────────┘             └───────┬────────┘
//!                                                           │ encode
//!                                                   ┌───────▼────────┐
//!                                                   │  GET /metrics  │
//!                                                   └────────────────┘
//! ```
//!
//! The watcher is the sole writer; the HTTP serving path only reads. Each
//! series entry is independently consistent, so no coordination beyond the
//! registry's own atomics is needed.

pub mod error;
pub mod registry;
pub mod services;
pub mod stats;
pub mod types;

pub use error::{Error, Result};
pub use registry::{MetricRegistry, EXPOSITION_CONTENT_TYPE};
pub use services::{FuzzerWatcher, ServiceManager, WatcherConfig};
pub use stats::{parse, StatField, StatusRecord};
pub use types::{Target, STATS_FILE_NAME};
