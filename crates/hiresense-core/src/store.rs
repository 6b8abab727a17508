//! Session store: append-only history of finished sessions.
//!
//! `SledSessionStore` is the durable backend (keys sort by finish time), `MemorySessionStore`
//! the volatile one, and `ResilientSessionStore` puts the two together so history keeps
//! working when the disk does not.

use crate::error::StoreError;
use crate::session::SessionRecord;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_STORE_PATH: &str = "./data/hiresense/sessions";
/// Most records a history read ever returns; also the size of the in-memory mirror.
pub const HISTORY_LIMIT_MAX: usize = 200;

const PROBE_KEY: &[u8] = b"__probe__";

pub trait SessionStore: Send + Sync {
    fn append(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Up to `limit` records, most recent first.
    fn read_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError>;
}

/// Sled-backed store. Key: zero-padded finish time in UTC millis, then the session id.
pub struct SledSessionStore {
    db: sled::Db,
}

impl SledSessionStore {
    pub fn open(path: Option<impl AsRef<Path>>) -> Result<Self, StoreError> {
        let p = path
            .map(|x| x.as_ref().to_path_buf())
            .unwrap_or_else(|| Path::new(DEFAULT_STORE_PATH).to_path_buf());
        let db = sled::open(p)?;
        Ok(Self { db })
    }

    /// Write and remove a probe key to prove the backend accepts writes.
    pub fn probe(&self) -> Result<(), StoreError> {
        self.db.insert(PROBE_KEY, b"ok".as_slice())?;
        self.db.remove(PROBE_KEY)?;
        self.db.flush()?;
        Ok(())
    }

    fn key_for(record: &SessionRecord) -> String {
        let millis = record.finished_at.timestamp_millis().max(0);
        format!("{:020}_{}", millis, record.session_id)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

impl SessionStore for SledSessionStore {
    fn append(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let key = Self::key_for(record);
        let payload = serde_json::to_vec(record)?;
        self.db.insert(key.as_bytes(), payload)?;
        self.db.flush()?;
        debug!(target: "hiresense::store", %key, "session record written");
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let mut out = Vec::with_capacity(limit.min(64));
        for item in self.db.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if key.as_ref() == PROBE_KEY {
                continue;
            }
            match serde_json::from_slice::<SessionRecord>(&value) {
                Ok(record) => out.push(record),
                Err(e) => {
                    warn!(target: "hiresense::store", key = %String::from_utf8_lossy(&key), "skipping unreadable session record: {}", e)
                }
            }
        }
        Ok(out)
    }
}

/// Process-lifetime store; also the mirror behind `ResilientSessionStore`. A bounded store
/// drops its oldest records once it holds `capacity`.
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<Vec<SessionRecord>>,
    capacity: Option<usize>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        Self {
            records: RwLock::default(),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn append(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.push(record.clone());
        if let Some(capacity) = self.capacity {
            if records.len() > capacity {
                let excess = records.len() - capacity;
                records.sort_by(|a, b| a.finished_at.cmp(&b.finished_at));
                records.drain(..excess);
            }
        }
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        let mut recent: Vec<SessionRecord> = records.clone();
        // Stable sort keeps append order for records finished in the same instant.
        recent.sort_by(|a, b| a.finished_at.cmp(&b.finished_at));
        recent.reverse();
        recent.truncate(limit);
        Ok(recent)
    }
}

/// Durable when possible, memory when not. Every append is mirrored into a bounded memory
/// store; a durable failure (at startup or later) switches reads to the mirror for the rest
/// of the process.
pub struct ResilientSessionStore {
    durable: Mutex<Option<Box<dyn SessionStore>>>,
    mirror: MemorySessionStore,
    degraded: AtomicBool,
}

impl ResilientSessionStore {
    /// Open and probe sled at `path`. Never fails: a bad path yields a memory-only store.
    pub fn open(path: Option<impl AsRef<Path>>) -> Self {
        let durable = match SledSessionStore::open(path).and_then(|s| s.probe().map(|_| s)) {
            Ok(store) => {
                info!(target: "hiresense::store", records = store.len(), "session store ready (sled)");
                Some(Box::new(store) as Box<dyn SessionStore>)
            }
            Err(e) => {
                warn!(target: "hiresense::store", "durable session store unavailable ({}); history will be kept in memory only", e);
                None
            }
        };
        Self::from_parts(durable)
    }

    /// Mirror writes to `durable` until it first fails.
    pub fn with_durable(durable: Box<dyn SessionStore>) -> Self {
        Self::from_parts(Some(durable))
    }

    pub fn memory_only() -> Self {
        Self::from_parts(None)
    }

    fn from_parts(durable: Option<Box<dyn SessionStore>>) -> Self {
        let degraded = durable.is_none();
        Self {
            durable: Mutex::new(durable),
            mirror: MemorySessionStore::bounded(HISTORY_LIMIT_MAX),
            degraded: AtomicBool::new(degraded),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(target: "hiresense::store", "durable session store failed ({}); continuing with in-memory history", err);
        }
        if let Ok(mut durable) = self.durable.lock() {
            *durable = None;
        }
    }
}

impl SessionStore for ResilientSessionStore {
    fn append(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.mirror.append(record)?;
        if self.is_degraded() {
            return Ok(());
        }
        let result = match self.durable.lock() {
            Ok(durable) => match durable.as_ref() {
                Some(store) => store.append(record),
                None => Ok(()),
            },
            Err(_) => Err(StoreError::Poisoned),
        };
        if let Err(e) = result {
            self.degrade(&e);
        }
        Ok(())
    }

    fn read_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
        if !self.is_degraded() {
            let result = match self.durable.lock() {
                Ok(durable) => durable.as_ref().map(|s| s.read_recent(limit)),
                Err(_) => Some(Err(StoreError::Poisoned)),
            };
            match result {
                Some(Ok(records)) => return Ok(records),
                Some(Err(e)) => self.degrade(&e),
                None => {}
            }
        }
        self.mirror.read_recent(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EndReason, Session};
    use chrono::{Duration, Utc};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    /// Accepts `healthy_writes` appends, then fails every write.
    struct FlakyStore {
        inner: MemorySessionStore,
        healthy_writes: usize,
        writes: Arc<AtomicUsize>,
    }

    impl SessionStore for FlakyStore {
        fn append(&self, record: &SessionRecord) -> Result<(), StoreError> {
            if self.writes.fetch_add(1, Ordering::SeqCst) >= self.healthy_writes {
                return Err(StoreError::Poisoned);
            }
            self.inner.append(record)
        }

        fn read_recent(&self, limit: usize) -> Result<Vec<SessionRecord>, StoreError> {
            self.inner.read_recent(limit)
        }
    }

    fn record(name: &str, minutes_ago: i64) -> SessionRecord {
        let mut s = Session::new();
        s.candidate_name = Some(name.to_string());
        let mut r = s.to_record(EndReason::Completed);
        r.finished_at = Utc::now() - Duration::minutes(minutes_ago);
        r
    }

    #[test]
    fn sled_returns_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledSessionStore::open(Some(dir.path())).unwrap();
        store.probe().unwrap();
        store.append(&record("old", 30)).unwrap();
        store.append(&record("new", 1)).unwrap();
        store.append(&record("mid", 10)).unwrap();

        let names: Vec<_> = store
            .read_recent(10)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, ["new", "mid", "old"]);
        assert_eq!(store.read_recent(1).unwrap()[0].name, "new");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn sled_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledSessionStore::open(Some(dir.path())).unwrap();
            store.append(&record("persisted", 0)).unwrap();
        }
        let store = SledSessionStore::open(Some(dir.path())).unwrap();
        assert_eq!(store.read_recent(5).unwrap()[0].name, "persisted");
    }

    #[test]
    fn keys_sort_by_finish_time() {
        let a = SledSessionStore::key_for(&record("a", 5));
        let b = SledSessionStore::key_for(&record("b", 1));
        assert!(a < b);
    }

    #[test]
    fn memory_store_orders_and_limits() {
        let store = MemorySessionStore::new();
        store.append(&record("first", 3)).unwrap();
        store.append(&record("second", 2)).unwrap();
        store.append(&record("third", 1)).unwrap();
        let recent = store.read_recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "third");
        assert_eq!(recent[1].name, "second");
    }

    #[test]
    fn resilient_store_falls_back_to_memory_on_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"plain file").unwrap();

        let store = ResilientSessionStore::open(Some(file.join("db")));
        assert!(store.is_degraded());
        store.append(&record("volatile", 0)).unwrap();
        assert_eq!(store.read_recent(5).unwrap()[0].name, "volatile");
    }

    #[test]
    fn resilient_store_uses_sled_when_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResilientSessionStore::open(Some(dir.path()));
        assert!(!store.is_degraded());
        store.append(&record("durable", 0)).unwrap();
        drop(store);

        let reopened = SledSessionStore::open(Some(dir.path())).unwrap();
        assert_eq!(reopened.read_recent(1).unwrap()[0].name, "durable");
    }

    #[test]
    fn memory_store_bounded_drops_oldest() {
        let store = MemorySessionStore::bounded(2);
        store.append(&record("first", 3)).unwrap();
        store.append(&record("second", 2)).unwrap();
        store.append(&record("third", 1)).unwrap();
        assert_eq!(store.len(), 2);
        let names: Vec<_> = store.read_recent(10).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["third", "second"]);
    }

    #[test]
    fn resilient_mirror_is_capped_at_history_limit() {
        let store = ResilientSessionStore::memory_only();
        for i in 0..(HISTORY_LIMIT_MAX + 5) {
            store.append(&record("candidate", i as i64)).unwrap();
        }
        assert_eq!(store.read_recent(usize::MAX).unwrap().len(), HISTORY_LIMIT_MAX);
    }

    #[test]
    fn later_durable_failure_degrades_to_mirror() {
        let writes = Arc::new(AtomicUsize::new(0));
        let store = ResilientSessionStore::with_durable(Box::new(FlakyStore {
            inner: MemorySessionStore::new(),
            healthy_writes: 1,
            writes: Arc::clone(&writes),
        }));
        assert!(!store.is_degraded());

        store.append(&record("first", 2)).unwrap();
        assert!(!store.is_degraded());
        assert_eq!(store.read_recent(5).unwrap()[0].name, "first");

        store.append(&record("second", 1)).unwrap();
        assert!(store.is_degraded());
        let names: Vec<_> = store.read_recent(5).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["second", "first"]);

        store.append(&record("third", 0)).unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.read_recent(1).unwrap()[0].name, "third");
    }
}
