//! Connectivity signal
//!
//! [`ConnectivityMonitor`] holds the current online/offline state. Whoever
//! observes the network (a health probe, an OS hook, a test) calls
//! [`ConnectivityMonitor::set_online`]. Consumers that need to react to the
//! link coming back hold a [`ReconnectWatcher`].
//!
//! A watcher wakes at most once per offline→online transition and never for
//! the state it was created in, so subscribing while already online does not
//! fire. Transitions that happen faster than the watcher polls are coalesced
//! into a single wake-up.

use std::sync::Arc;

use tokio::sync::watch;

use crate::delivery::DeliveryClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LinkState {
    online: bool,
    /// Count of offline→online transitions since creation
    reconnects: u64,
}

/// Shared handle to the device's connectivity state. Cheap to clone.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<LinkState>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(LinkState {
            online,
            reconnects: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    /// Record the observed state
    ///
    /// Returns true if this call was an offline→online transition.
    pub fn set_online(&self, online: bool) -> bool {
        let mut reconnected = false;
        self.tx.send_if_modified(|state| {
            if state.online == online {
                return false;
            }
            if online {
                state.reconnects += 1;
                reconnected = true;
            }
            state.online = online;
            true
        });

        if reconnected {
            tracing::info!("Connectivity restored");
        } else if !online {
            tracing::debug!("Connectivity state: offline");
        }
        reconnected
    }

    /// Probe the endpoint and record the result
    ///
    /// Returns the new online state.
    pub async fn refresh_from(&self, client: &dyn DeliveryClient) -> bool {
        let online = match client.health_check().await {
            Ok(online) => online,
            Err(e) => {
                tracing::debug!(error = %e, "Connectivity probe failed");
                false
            }
        };
        self.set_online(online);
        online
    }

    /// Number of offline→online transitions recorded so far
    pub fn reconnect_count(&self) -> u64 {
        self.tx.borrow().reconnects
    }

    /// Watch for future reconnections
    pub fn subscribe(&self) -> ReconnectWatcher {
        let rx = self.tx.subscribe();
        let seen = rx.borrow().reconnects;
        ReconnectWatcher { rx, seen }
    }
}

/// Receives one notification per observed reconnection.
pub struct ReconnectWatcher {
    rx: watch::Receiver<LinkState>,
    seen: u64,
}

impl ReconnectWatcher {
    /// Wait for the next offline→online transition
    ///
    /// Returns false once every [`ConnectivityMonitor`] handle is dropped.
    pub async fn reconnected(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let reconnects = self.rx.borrow_and_update().reconnects;
            if reconnects > self.seen {
                self.seen = reconnects;
                return true;
            }
        }
    }
}
