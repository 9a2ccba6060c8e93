//! Event submission and queue replay
//!
//! [`EventSyncService`] owns both durable queues. Producers hand it events via
//! [`EventSyncService::submit`]; the queues are drained by
//! [`EventSyncService::sync`], run at startup when already online and again
//! on every reconnection.
//!
//! ## Queue semantics
//!
//! A queue is cleared only when every item in the batch read at the start of
//! the sync was delivered. If any delivery fails the whole queue is kept,
//! including items the server already accepted, and they are sent again on the
//! next sync. Requests carry an idempotency key so the receiver can drop those
//! repeats.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, StreamExt};
use tokio::task::JoinHandle;

use crate::connectivity::ConnectivityMonitor;
use crate::delivery::DeliveryClient;
use crate::error::Result;
use crate::store::DurableQueueStore;
use crate::types::{EventKind, SafetyEvent};

/// Default cap on in-flight deliveries per queue during a sync
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// What happened to a submitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server accepted it immediately; nothing was persisted
    Delivered,
    /// It is in the durable queue awaiting the next sync
    Queued,
}

/// Result of syncing one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSyncOutcome {
    pub kind: EventKind,
    /// Items read from the queue and dispatched
    pub attempted: usize,
    /// Dispatched items the server accepted
    pub delivered: usize,
    /// Dispatched items that failed
    pub failed: usize,
    /// Whether the dispatched batch was removed from the queue
    pub cleared: bool,
}

impl QueueSyncOutcome {
    fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            attempted: 0,
            delivered: 0,
            failed: 0,
            cleared: false,
        }
    }
}

/// Result of a full sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub queues: Vec<QueueSyncOutcome>,
}

impl SyncReport {
    /// Outcome for one kind, if it was synced
    pub fn outcome(&self, kind: EventKind) -> Option<&QueueSyncOutcome> {
        self.queues.iter().find(|q| q.kind == kind)
    }

    pub fn total_attempted(&self) -> usize {
        self.queues.iter().map(|q| q.attempted).sum()
    }

    pub fn total_delivered(&self) -> usize {
        self.queues.iter().map(|q| q.delivered).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.queues.iter().map(|q| q.failed).sum()
    }
}

/// Running counters for a service instance
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Events accepted by the server at submit time
    pub delivered_immediately: usize,
    /// Events written to a queue at submit time
    pub queued: usize,
    /// Completed sync passes
    pub sync_runs: usize,
    /// Queued items accepted by the server during syncs
    pub replayed: usize,
    /// Queued item deliveries that failed during syncs
    pub replay_failures: usize,
}

/// Offline-capable submission and replay of safety events
pub struct EventSyncService {
    store: Arc<dyn DurableQueueStore>,
    delivery: Arc<dyn DeliveryClient>,
    connectivity: ConnectivityMonitor,
    max_concurrency: usize,
    /// Serializes sync passes so a batch is never dispatched twice at once
    sync_lock: tokio::sync::Mutex<()>,
    stats: Mutex<SyncStats>,
}

impl EventSyncService {
    pub fn new(
        store: Arc<dyn DurableQueueStore>,
        delivery: Arc<dyn DeliveryClient>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            store,
            delivery,
            connectivity,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            sync_lock: tokio::sync::Mutex::new(()),
            stats: Mutex::new(SyncStats::default()),
        }
    }

    /// Cap in-flight deliveries per queue during a sync (minimum 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn store(&self) -> &dyn DurableQueueStore {
        self.store.as_ref()
    }

    /// Number of events waiting in a kind's queue
    pub fn pending_count(&self, kind: EventKind) -> Result<usize> {
        self.store.len(kind)
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SyncStats {
        self.lock_stats().clone()
    }

    /// Deliver an event now if online, otherwise queue it
    ///
    /// Makes at most one delivery attempt and at most one storage write.
    /// Delivery failures are absorbed by queueing; the only error returned is
    /// a failure to persist, since the event would otherwise be lost.
    pub async fn submit(&self, event: SafetyEvent) -> Result<SubmitOutcome> {
        let kind = event.kind();
        let payload = event.to_payload()?;

        if self.connectivity.is_online() {
            match self.delivery.deliver(kind, &payload).await {
                Ok(()) => {
                    self.lock_stats().delivered_immediately += 1;
                    tracing::info!(kind = %kind, "Event delivered");
                    return Ok(SubmitOutcome::Delivered);
                }
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Delivery failed, queueing event");
                }
            }
        } else {
            tracing::info!(kind = %kind, "Offline, queueing event");
        }

        self.store.append(kind, &payload)?;
        self.lock_stats().queued += 1;
        Ok(SubmitOutcome::Queued)
    }

    /// Submit on a background task
    ///
    /// Callers may drop the handle (fire-and-forget) or await it to learn
    /// when the event is safe.
    pub fn submit_detached(self: &Arc<Self>, event: SafetyEvent) -> JoinHandle<Result<SubmitOutcome>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.submit(event).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Failed to persist event");
            }
            result
        })
    }

    /// Replay both queues
    ///
    /// The queues sync independently and concurrently. An empty queue issues
    /// no requests. On a storage error the other queue still completes and
    /// the first error is returned.
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self.sync_lock.lock().await;

        tracing::debug!("Attempting to sync queued events");

        let (sos, report) = futures::join!(
            self.sync_queue(EventKind::Sos),
            self.sync_queue(EventKind::Report)
        );

        self.lock_stats().sync_runs += 1;

        Ok(SyncReport {
            queues: vec![sos?, report?],
        })
    }

    /// Startup check: sync only if already online
    pub async fn sync_if_online(&self) -> Result<SyncReport> {
        if !self.connectivity.is_online() {
            tracing::debug!("Offline at startup, skipping sync");
            return Ok(SyncReport::default());
        }
        self.sync().await
    }

    /// Sync every time connectivity comes back
    ///
    /// The task ends when all connectivity handles are dropped.
    pub fn spawn_reconnect_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let mut watcher = self.connectivity.subscribe();
        let service = Arc::clone(self);

        tokio::spawn(async move {
            while watcher.reconnected().await {
                match service.sync().await {
                    Ok(report) => {
                        tracing::info!(
                            attempted = report.total_attempted(),
                            delivered = report.total_delivered(),
                            failed = report.total_failed(),
                            "Reconnect sync finished"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reconnect sync failed");
                    }
                }
            }
            tracing::debug!("Connectivity monitor closed, reconnect sync stopped");
        })
    }

    async fn sync_queue(&self, kind: EventKind) -> Result<QueueSyncOutcome> {
        let items = self.store.read_all(kind)?;
        if items.is_empty() {
            return Ok(QueueSyncOutcome::empty(kind));
        }

        let attempted = items.len();
        tracing::info!(kind = %kind, count = attempted, "Syncing queued events");

        let results: Vec<bool> = stream::iter(items)
            .map(|item| {
                let delivery = Arc::clone(&self.delivery);
                async move {
                    match delivery.deliver(kind, &item).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::debug!(kind = %kind, error = %e, "Queued event delivery failed");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let failed = attempted - delivered;

        {
            let mut stats = self.lock_stats();
            stats.replayed += delivered;
            stats.replay_failures += failed;
        }

        if failed > 0 {
            tracing::warn!(
                kind = %kind,
                delivered,
                failed,
                "Sync incomplete, keeping whole queue; delivered items will be resent"
            );
            return Ok(QueueSyncOutcome {
                kind,
                attempted,
                delivered,
                failed,
                cleared: false,
            });
        }

        // Only the dispatched batch is removed; anything appended meanwhile stays
        let remaining = self.store.remove_front(kind, attempted)?;
        tracing::info!(kind = %kind, delivered, remaining, "Queue synced");

        Ok(QueueSyncOutcome {
            kind,
            attempted,
            delivered,
            failed,
            cleared: true,
        })
    }

    fn lock_stats(&self) -> MutexGuard<'_, SyncStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}
