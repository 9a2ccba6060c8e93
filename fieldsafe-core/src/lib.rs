//! # fieldsafe-core
//!
//! Core library for fieldsafe - offline-capable submission of safety events
//! (silent panic alerts and anonymous incident reports) from field devices.
//!
//! This library provides:
//! - Domain types for SOS alerts and reports
//! - Durable per-kind queues backed by SQLite
//! - An HTTP delivery client
//! - A connectivity signal with reconnect notifications
//! - The sync service tying them together
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fieldsafe_core::connectivity::ConnectivityMonitor;
//! use fieldsafe_core::sync::{EventSyncService, SafetyReporter};
//! use fieldsafe_core::{delivery, Config, QueueDatabase};
//!
//! # async fn run() -> fieldsafe_core::Result<()> {
//! let config = Config::load()?;
//!
//! let store = QueueDatabase::open(&Config::database_path())?;
//! store.migrate()?;
//!
//! let client = delivery::client_for(&config.endpoint)?;
//! let connectivity = ConnectivityMonitor::new(false);
//! connectivity.refresh_from(client.as_ref()).await;
//!
//! let service = Arc::new(
//!     EventSyncService::new(Arc::new(store), client, connectivity)
//!         .with_max_concurrency(config.sync.max_concurrency),
//! );
//! service.sync_if_online().await?;
//! let _watcher = service.spawn_reconnect_sync();
//!
//! let reporter = SafetyReporter::new(service, config.reporter.user_id.clone());
//! println!("{}", reporter.panic_alert(None).await?);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use store::{DurableQueueStore, MemoryQueueStore, QueueDatabase};
pub use types::*;

// Public modules
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod store;
pub mod sync;
pub mod types;
