//! In-process queue store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::DurableQueueStore;
use crate::error::Result;
use crate::types::EventKind;

/// Queue store backed by a map in memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<EventKind, Vec<serde_json::Value>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key exists for the kind (an emptied queue has no key)
    pub fn has_key(&self, kind: EventKind) -> bool {
        self.lock().contains_key(&kind)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<serde_json::Value>>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DurableQueueStore for MemoryQueueStore {
    fn append(&self, kind: EventKind, item: &serde_json::Value) -> Result<()> {
        self.lock().entry(kind).or_default().push(item.clone());
        Ok(())
    }

    fn read_all(&self, kind: EventKind) -> Result<Vec<serde_json::Value>> {
        Ok(self.lock().get(&kind).cloned().unwrap_or_default())
    }

    fn clear(&self, kind: EventKind) -> Result<()> {
        self.lock().remove(&kind);
        Ok(())
    }

    fn remove_front(&self, kind: EventKind, count: usize) -> Result<usize> {
        let mut queues = self.lock();
        let Some(items) = queues.get_mut(&kind) else {
            return Ok(0);
        };

        let delivered = count.min(items.len());
        items.drain(..delivered);
        let remaining = items.len();
        if remaining == 0 {
            queues.remove(&kind);
        }
        Ok(remaining)
    }
}
