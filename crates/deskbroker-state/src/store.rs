//! StateStore: redb-backed assignment persistence with expiry.
//!
//! Each value is a JSON `StoredAssignment` carrying an absolute expiry.
//! redb has no native TTL, so expiry is enforced on read and lapsed
//! entries are physically removed by `purge_expired`. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::ASSIGNMENTS;
use crate::types::*;

/// Lifetime of an assignment from the moment it is written.
pub const ASSIGNMENT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The new assignment was written. `expired` is the lapsed entry it
    /// replaced, if any.
    Inserted { expired: Option<Assignment> },
    /// A live assignment already existed and was left untouched.
    Existing(Assignment),
}

/// Durable userId → assignment mapping.
///
/// Implemented by [`StateStore`]; the trait lets the scheduler run against
/// injected fakes.
pub trait AssignmentStore: Send + Sync {
    /// Live assignment for a user. Expired entries read as absent.
    fn get(&self, user_id: &str) -> StateResult<Option<Assignment>>;

    /// Write an assignment unconditionally with a fresh TTL.
    fn put(&self, user_id: &str, assignment: &Assignment) -> StateResult<()>;

    /// Write an assignment unless a live one already exists.
    fn put_if_absent(&self, user_id: &str, assignment: &Assignment) -> StateResult<PutOutcome>;

    /// Remove and return a user's record, live or expired.
    fn delete(&self, user_id: &str) -> StateResult<Option<StoredAssignment>>;

    /// All live assignments.
    fn list_all(&self) -> StateResult<Vec<(UserId, Assignment)>>;

    /// Every stored record, live or expired but not yet purged.
    fn list_records(&self) -> StateResult<Vec<(UserId, StoredAssignment)>>;

    /// Remove and return every expired record.
    fn purge_expired(&self) -> StateResult<Vec<(UserId, Assignment)>>;
}

/// Thread-safe assignment store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            ttl: ASSIGNMENT_TTL,
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            ttl: ASSIGNMENT_TTL,
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Override the assignment lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn encode(&self, assignment: &Assignment, now_ms: i64) -> StateResult<Vec<u8>> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let record = StoredAssignment {
            assignment: assignment.clone(),
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        };
        serde_json::to_vec(&record).map_err(map_err!(Serialize))
    }
}

fn decode(bytes: &[u8]) -> StateResult<StoredAssignment> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

impl AssignmentStore for StateStore {
    fn get(&self, user_id: &str) -> StateResult<Option<Assignment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        match table.get(user_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record = decode(guard.value())?;
                if record.is_expired() {
                    Ok(None)
                } else {
                    Ok(Some(record.assignment))
                }
            }
            None => Ok(None),
        }
    }

    fn put(&self, user_id: &str, assignment: &Assignment) -> StateResult<()> {
        let value = self.encode(assignment, Utc::now().timestamp_millis())?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            table
                .insert(user_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%user_id, server = %assignment.server, "assignment stored");
        Ok(())
    }

    fn put_if_absent(&self, user_id: &str, assignment: &Assignment) -> StateResult<PutOutcome> {
        let now_ms = Utc::now().timestamp_millis();
        let value = self.encode(assignment, now_ms)?;
        // redb serializes write transactions, so the check and the insert
        // are atomic with respect to other writers.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            let current = table
                .get(user_id)
                .map_err(map_err!(Read))?
                .map(|guard| decode(guard.value()))
                .transpose()?;

            match current {
                Some(record) if !record.is_expired_at(now_ms) => {
                    outcome = PutOutcome::Existing(record.assignment);
                }
                lapsed => {
                    table
                        .insert(user_id, value.as_slice())
                        .map_err(map_err!(Write))?;
                    outcome = PutOutcome::Inserted {
                        expired: lapsed.map(|r| r.assignment),
                    };
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(outcome)
    }

    fn delete(&self, user_id: &str) -> StateResult<Option<StoredAssignment>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            removed = table
                .remove(user_id)
                .map_err(map_err!(Write))?
                .map(|guard| decode(guard.value()))
                .transpose()?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%user_id, existed = removed.is_some(), "assignment deleted");
        Ok(removed)
    }

    fn list_all(&self) -> StateResult<Vec<(UserId, Assignment)>> {
        let now_ms = Utc::now().timestamp_millis();
        Ok(self
            .list_records()?
            .into_iter()
            .filter(|(_, record)| !record.is_expired_at(now_ms))
            .map(|(user_id, record)| (user_id, record.assignment))
            .collect())
    }

    fn list_records(&self) -> StateResult<Vec<(UserId, StoredAssignment)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.push((key.value().to_string(), decode(value.value())?));
        }
        Ok(results)
    }

    fn purge_expired(&self) -> StateResult<Vec<(UserId, Assignment)>> {
        let now_ms = Utc::now().timestamp_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut purged = Vec::new();
        {
            let mut table = txn.open_table(ASSIGNMENTS).map_err(map_err!(Table))?;
            // Collect first; the table can't be mutated while iterating.
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let record = decode(value.value())?;
                if record.is_expired_at(now_ms) {
                    purged.push((key.value().to_string(), record.assignment));
                }
            }
            for (user_id, _) in &purged {
                table.remove(user_id.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if !purged.is_empty() {
            debug!(count = purged.len(), "expired assignments purged");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_assignment(server: &str) -> Assignment {
        Assignment {
            server: server.to_string(),
            port: 177,
            protocol: Protocol::Xdmcp,
            desktop: DEFAULT_DESKTOP.to_string(),
            assigned_at: Utc::now(),
        }
    }

    // ── Basic CRUD ─────────────────────────────────────────────────

    #[test]
    fn assignment_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let assignment = test_assignment("desktop-1");

        store.put("u1", &assignment).unwrap();
        assert_eq!(store.get("u1").unwrap(), Some(assignment));
    }

    #[test]
    fn get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get("nobody").unwrap().is_none());
    }

    #[test]
    fn put_overwrites() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("u1", &test_assignment("desktop-1")).unwrap();
        store.put("u1", &test_assignment("desktop-2")).unwrap();

        assert_eq!(store.get("u1").unwrap().unwrap().server, "desktop-2");
    }

    #[test]
    fn delete_returns_record_once() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("u1", &test_assignment("desktop-1")).unwrap();

        let removed = store.delete("u1").unwrap().unwrap();
        assert_eq!(removed.assignment.server, "desktop-1");
        assert!(!removed.is_expired());
        assert!(store.delete("u1").unwrap().is_none());
        assert!(store.get("u1").unwrap().is_none());
    }

    #[test]
    fn list_all_returns_every_user() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("u1", &test_assignment("desktop-1")).unwrap();
        store.put("u2", &test_assignment("desktop-2")).unwrap();

        let mut users: Vec<String> = store.list_all().unwrap().into_iter().map(|(u, _)| u).collect();
        users.sort();
        assert_eq!(users, vec!["u1", "u2"]);
    }

    // ── Conditional insert ────────────────────────────────────────

    #[test]
    fn put_if_absent_inserts_when_missing() {
        let store = StateStore::open_in_memory().unwrap();
        let outcome = store.put_if_absent("u1", &test_assignment("desktop-1")).unwrap();
        assert_eq!(outcome, PutOutcome::Inserted { expired: None });
        assert!(store.get("u1").unwrap().is_some());
    }

    #[test]
    fn put_if_absent_keeps_live_entry() {
        let store = StateStore::open_in_memory().unwrap();
        let first = test_assignment("desktop-1");
        store.put("u1", &first).unwrap();

        let outcome = store.put_if_absent("u1", &test_assignment("desktop-2")).unwrap();
        assert_eq!(outcome, PutOutcome::Existing(first.clone()));
        assert_eq!(store.get("u1").unwrap(), Some(first));
    }

    // ── Expiry ────────────────────────────────────────────────────

    #[test]
    fn zero_ttl_entries_read_as_absent() {
        let store = StateStore::open_in_memory().unwrap().with_ttl(Duration::ZERO);
        store.put("u1", &test_assignment("desktop-1")).unwrap();

        assert!(store.get("u1").unwrap().is_none());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn list_records_includes_expired_entries() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("live", &test_assignment("desktop-1")).unwrap();
        store
            .clone()
            .with_ttl(Duration::ZERO)
            .put("stale", &test_assignment("desktop-2"))
            .unwrap();

        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "live");
        assert!(!records[0].1.is_expired());
        assert_eq!(records[1].0, "stale");
        assert!(records[1].1.is_expired());

        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn put_if_absent_replaces_expired_entry() {
        let store = StateStore::open_in_memory().unwrap().with_ttl(Duration::ZERO);
        store.put("u1", &test_assignment("desktop-1")).unwrap();

        let outcome = store.put_if_absent("u1", &test_assignment("desktop-2")).unwrap();
        match outcome {
            PutOutcome::Inserted { expired: Some(old) } => assert_eq!(old.server, "desktop-1"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn delete_reports_expired_record() {
        let store = StateStore::open_in_memory().unwrap().with_ttl(Duration::ZERO);
        store.put("u1", &test_assignment("desktop-1")).unwrap();

        let removed = store.delete("u1").unwrap().unwrap();
        assert!(removed.is_expired());
    }

    #[test]
    fn purge_removes_only_expired() {
        let store = StateStore::open_in_memory().unwrap();
        store.put("live", &test_assignment("desktop-1")).unwrap();

        let short = store.clone().with_ttl(Duration::ZERO);
        short.put("stale", &test_assignment("desktop-2")).unwrap();

        let purged = store.purge_expired().unwrap();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].0, "stale");
        assert_eq!(purged[0].1.server, "desktop-2");

        assert!(store.get("live").unwrap().is_some());
        assert!(store.purge_expired().unwrap().is_empty());
    }

    #[test]
    fn default_ttl_is_twelve_hours() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.ttl(), Duration::from_secs(43_200));
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("assignments.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put("u1", &test_assignment("desktop-1")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        let assignment = store.get("u1").unwrap();
        assert_eq!(assignment.map(|a| a.server), Some("desktop-1".to_string()));
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_all().unwrap().is_empty());
        assert!(store.purge_expired().unwrap().is_empty());
        assert!(store.delete("nope").unwrap().is_none());
    }
}
