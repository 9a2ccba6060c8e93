//! Durable queue storage
//!
//! Each [`EventKind`] owns one queue: an ordered JSON array of pending event
//! payloads stored under the kind's fixed key. The sync service is the only
//! reader and writer.
//!
//! Two implementations are provided:
//! - [`QueueDatabase`]: SQLite-backed, survives process restarts
//! - [`MemoryQueueStore`]: in-process, for tests and dry runs

mod memory;
pub mod schema;
mod sqlite;

pub use memory::MemoryQueueStore;
pub use sqlite::QueueDatabase;

use crate::error::Result;
use crate::types::EventKind;

/// Key-value persistence for per-kind event queues.
///
/// Implementations must make every method atomic with respect to the others:
/// an `append` racing a `remove_front` must never lose the appended item.
pub trait DurableQueueStore: Send + Sync {
    /// Append one payload to the end of the kind's queue, creating it if needed
    fn append(&self, kind: EventKind, item: &serde_json::Value) -> Result<()>;

    /// Read the whole queue in append order
    ///
    /// A missing key reads as empty. So does a corrupted stored value, which
    /// is logged and discarded rather than returned as an error.
    fn read_all(&self, kind: EventKind) -> Result<Vec<serde_json::Value>>;

    /// Delete the kind's queue entirely
    fn clear(&self, kind: EventKind) -> Result<()>;

    /// Drop the first `count` items in a single write
    ///
    /// Deletes the key when nothing remains. Returns the number of items left.
    fn remove_front(&self, kind: EventKind, count: usize) -> Result<usize>;

    /// Number of pending items
    fn len(&self, kind: EventKind) -> Result<usize> {
        Ok(self.read_all(kind)?.len())
    }

    /// Whether the kind's queue has no pending items
    fn is_empty(&self, kind: EventKind) -> Result<bool> {
        Ok(self.len(kind)? == 0)
    }
}
