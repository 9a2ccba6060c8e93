//! Offline-capable event submission and synchronization
//!
//! ## Architecture
//!
//! The sync layer follows a "local-first" principle:
//! - An event is either acknowledged by the server or written to its durable
//!   queue before `submit` returns
//! - Queues are replayed when connectivity comes back
//! - Network failures never reach the person pressing the panic button
//!
//! ```text
//! SafetyReporter ──submit──▶ EventSyncService ──deliver──▶ DeliveryClient
//!                                  │    ▲
//!                        append    │    │ sync on reconnect
//!                                  ▼    │
//!                          DurableQueueStore   ConnectivityMonitor
//! ```

mod reporter;
mod service;

pub use reporter::{
    SafetyReporter, REPORT_PENDING_STATUS, REPORT_SUBMITTED_STATUS, SOS_PENDING_STATUS,
    SOS_SENT_STATUS,
};
pub use service::{
    EventSyncService, QueueSyncOutcome, SubmitOutcome, SyncReport, SyncStats,
    DEFAULT_MAX_CONCURRENCY,
};
