//! SQLite-backed queue store
//!
//! One row per queue key in the `queues` table; the `items` column holds the
//! JSON array of pending payloads. Every mutation is a read-modify-write
//! inside a single transaction under the connection mutex. Those
//! transactions are IMMEDIATE so a second process writing the same file
//! waits for the lock instead of failing on upgrade.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::DurableQueueStore;
use crate::error::Result;
use crate::types::EventKind;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Queue database handle (single connection)
pub struct QueueDatabase {
    conn: Mutex<Connection>,
}

impl QueueDatabase {
    /// Open or create a queue database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        // Another process (e.g. `watch`) may hold the write lock briefly
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // FULL sync: a queued SOS must survive power loss right after submit
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.lock()
    }

    /// Raw stored value for a queue, exactly as persisted
    pub fn raw_value(&self, kind: EventKind) -> Result<Option<String>> {
        let conn = self.lock();
        read_raw(&conn, kind)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied write:
        // every mutation runs in a transaction that rolls back on drop.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DurableQueueStore for QueueDatabase {
    fn append(&self, kind: EventKind, item: &serde_json::Value) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut items = load_items(&tx, kind)?;
        items.push(item.clone());
        write_items(&tx, kind, &items)?;

        tx.commit()?;
        tracing::debug!(kind = %kind, pending = items.len(), "Appended to queue");
        Ok(())
    }

    fn read_all(&self, kind: EventKind) -> Result<Vec<serde_json::Value>> {
        let conn = self.lock();
        load_items(&conn, kind)
    }

    fn clear(&self, kind: EventKind) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM queues WHERE key = ?1", params![kind.queue_key()])?;
        tracing::debug!(kind = %kind, "Cleared queue");
        Ok(())
    }

    fn remove_front(&self, kind: EventKind, count: usize) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut items = load_items(&tx, kind)?;
        let delivered = count.min(items.len());
        items.drain(..delivered);
        write_items(&tx, kind, &items)?;

        tx.commit()?;
        Ok(items.len())
    }
}

fn read_raw(conn: &Connection, kind: EventKind) -> Result<Option<String>> {
    let raw = conn
        .query_row(
            "SELECT items FROM queues WHERE key = ?1",
            params![kind.queue_key()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(raw)
}

/// Load a queue, treating a missing or corrupted value as empty
fn load_items(conn: &Connection, kind: EventKind) -> Result<Vec<serde_json::Value>> {
    let Some(raw) = read_raw(conn, kind)? else {
        return Ok(Vec::new());
    };

    match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
        Ok(items) => Ok(items),
        Err(e) => {
            tracing::warn!(
                kind = %kind,
                key = kind.queue_key(),
                error = %e,
                "Discarding unreadable queue contents"
            );
            Ok(Vec::new())
        }
    }
}

/// Persist a queue, deleting the key when it is empty
fn write_items(conn: &Connection, kind: EventKind, items: &[serde_json::Value]) -> Result<()> {
    if items.is_empty() {
        conn.execute("DELETE FROM queues WHERE key = ?1", params![kind.queue_key()])?;
        return Ok(());
    }

    let json = serde_json::to_string(items)?;
    conn.execute(
        r#"
        INSERT INTO queues (key, items, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(key) DO UPDATE SET
            items = excluded.items,
            updated_at = excluded.updated_at
        "#,
        params![kind.queue_key(), json, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_db() -> QueueDatabase {
        let db = QueueDatabase::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn test_append_preserves_order() {
        let db = test_db();
        db.append(EventKind::Report, &json!({"reportId": "a"})).unwrap();
        db.append(EventKind::Report, &json!({"reportId": "b"})).unwrap();
        db.append(EventKind::Report, &json!({"reportId": "c"})).unwrap();

        let items = db.read_all(EventKind::Report).unwrap();
        let ids: Vec<_> = items.iter().map(|i| i["reportId"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_queues_are_independent() {
        let db = test_db();
        db.append(EventKind::Sos, &json!({"userId": "u"})).unwrap();

        assert_eq!(db.len(EventKind::Sos).unwrap(), 1);
        assert!(db.is_empty(EventKind::Report).unwrap());

        db.clear(EventKind::Report).unwrap();
        assert_eq!(db.len(EventKind::Sos).unwrap(), 1);
    }

    #[test]
    fn test_stored_value_is_json_array_under_fixed_key() {
        let db = test_db();
        db.append(EventKind::Sos, &json!({"userId": "u"})).unwrap();

        let raw = db.raw_value(EventKind::Sos).unwrap().unwrap();
        assert_eq!(raw, r#"[{"userId":"u"}]"#);

        let key: String = db
            .connection()
            .query_row("SELECT key FROM queues", [], |r| r.get(0))
            .unwrap();
        assert_eq!(key, "gbv_sos_queue");
    }

    #[test]
    fn test_clear_deletes_key() {
        let db = test_db();
        db.append(EventKind::Sos, &json!({"userId": "u"})).unwrap();
        db.clear(EventKind::Sos).unwrap();

        assert!(db.raw_value(EventKind::Sos).unwrap().is_none());
        assert!(db.read_all(EventKind::Sos).unwrap().is_empty());
    }

    #[test]
    fn test_remove_front_keeps_later_items() {
        let db = test_db();
        for id in ["a", "b", "c"] {
            db.append(EventKind::Report, &json!({"reportId": id})).unwrap();
        }

        let remaining = db.remove_front(EventKind::Report, 2).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(
            db.read_all(EventKind::Report).unwrap(),
            vec![json!({"reportId": "c"})]
        );

        assert_eq!(db.remove_front(EventKind::Report, 5).unwrap(), 0);
        assert!(db.raw_value(EventKind::Report).unwrap().is_none());
    }

    #[test]
    fn test_corrupted_value_reads_as_empty() {
        let db = test_db();
        db.connection()
            .execute(
                "INSERT INTO queues (key, items, updated_at) VALUES (?1, ?2, ?3)",
                params!["gbv_report_queue", "[{not json", "2025-01-01T00:00:00Z"],
            )
            .unwrap();

        assert!(db.read_all(EventKind::Report).unwrap().is_empty());

        // Next append replaces the corrupted value
        db.append(EventKind::Report, &json!({"reportId": "fresh"})).unwrap();
        assert_eq!(
            db.read_all(EventKind::Report).unwrap(),
            vec![json!({"reportId": "fresh"})]
        );
    }

    #[test]
    fn test_non_array_value_reads_as_empty() {
        let db = test_db();
        db.connection()
            .execute(
                "INSERT INTO queues (key, items, updated_at) VALUES (?1, ?2, ?3)",
                params!["gbv_sos_queue", r#"{"userId":"u"}"#, "2025-01-01T00:00:00Z"],
            )
            .unwrap();

        assert!(db.read_all(EventKind::Sos).unwrap().is_empty());
    }

    #[test]
    fn test_location_and_key_survive_storage() {
        use crate::types::{idempotency_key, GeoPoint, SosEvent};

        let db = test_db();
        let event = SosEvent::new(
            "user-001",
            Some(GeoPoint::new(21.791206799999998, -157.858333).unwrap()),
        )
        .unwrap();
        let payload = serde_json::to_value(&event).unwrap();
        let key = idempotency_key(EventKind::Sos, &payload);

        db.append(EventKind::Sos, &payload).unwrap();
        let stored = db.read_all(EventKind::Sos).unwrap();

        assert_eq!(stored, vec![payload]);
        assert_eq!(
            stored[0]["location"]["latitude"].as_f64(),
            Some(21.791206799999998)
        );
        assert_eq!(idempotency_key(EventKind::Sos, &stored[0]), key);
    }

    #[test]
    fn test_concurrent_handles_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        QueueDatabase::open(&path).unwrap().migrate().unwrap();

        let writers: Vec<_> = (0..2)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let db = QueueDatabase::open(&path).unwrap();
                    for i in 0..25 {
                        db.append(EventKind::Sos, &json!({"userId": format!("w{writer}-{i}")}))
                            .unwrap();
                    }
                })
            })
            .collect();

        let drainer = {
            let path = path.clone();
            std::thread::spawn(move || {
                let db = QueueDatabase::open(&path).unwrap();
                let mut removed = 0;
                for _ in 0..10 {
                    let before = db.len(EventKind::Sos).unwrap();
                    let take = before.min(2);
                    db.remove_front(EventKind::Sos, take).unwrap();
                    removed += take;
                }
                removed
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let removed = drainer.join().unwrap();

        let db = QueueDatabase::open(&path).unwrap();
        assert_eq!(db.len(EventKind::Sos).unwrap() + removed, 50);
    }

    #[test]
    fn test_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/queue.db");

        {
            let db = QueueDatabase::open(&path).unwrap();
            db.migrate().unwrap();
            db.append(EventKind::Sos, &json!({"userId": "u"})).unwrap();
        }

        let db = QueueDatabase::open(&path).unwrap();
        db.migrate().unwrap();
        assert_eq!(db.len(EventKind::Sos).unwrap(), 1);
    }
}
