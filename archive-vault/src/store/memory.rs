//! In-process document store
//!
//! One watch channel per scope path holds the current record set; every
//! create or delete replaces it, and subscribers see the full set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use archive_common::{time, Error, NewRecord, Record, RecordId, Result, ScopePath};

use super::{DocumentStore, RecordSetStream};

#[derive(Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<ScopePath, watch::Sender<Vec<Record>>>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    offline: AtomicBool,
    defer_timestamps: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Leave `createdAt` unset on create until `stamp_pending` runs
    pub fn set_defer_timestamps(&self, defer: bool) {
        self.defer_timestamps.store(defer, Ordering::SeqCst);
    }

    /// Assign server timestamps to records still waiting for one
    pub fn stamp_pending(&self) {
        let scopes = self.lock_scopes();
        for sender in scopes.values() {
            sender.send_if_modified(|records| {
                let mut touched = false;
                for record in records.iter_mut().filter(|r| r.created_at.is_none()) {
                    record.created_at = Some(self.next_stamp());
                    touched = true;
                }
                touched
            });
        }
    }

    /// Current contents of a scope, in store order
    pub fn records(&self, scope: &ScopePath) -> Vec<Record> {
        self.lock_scopes()
            .get(scope)
            .map(|s| s.borrow().clone())
            .unwrap_or_default()
    }

    /// Number of open subscriptions on a scope
    pub fn listener_count(&self, scope: &ScopePath) -> usize {
        self.lock_scopes()
            .get(scope)
            .map_or(0, |s| s.receiver_count())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(Error::Transport("document store unreachable".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock_scopes(&self) -> std::sync::MutexGuard<'_, HashMap<ScopePath, watch::Sender<Vec<Record>>>> {
        self.scopes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Server clock, never moving backwards across records
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = time::now();
        let stamp = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn subscribe(&self, scope: &ScopePath) -> Result<RecordSetStream> {
        self.check_online()?;
        let rx = self
            .lock_scopes()
            .entry(scope.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe();
        debug!("Memory store listener opened on {}", scope);
        Ok(WatchStream::new(rx).map(Ok).boxed())
    }

    async fn create(&self, scope: &ScopePath, record: NewRecord) -> Result<RecordId> {
        self.check_online()?;
        let id = RecordId::generate();
        let created_at = if self.defer_timestamps.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.next_stamp())
        };
        let stored = record.into_record(id.clone(), created_at);

        self.lock_scopes()
            .entry(scope.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .send_modify(|records| records.push(stored));

        debug!("Memory store created {}", scope.document(&id));
        Ok(id)
    }

    async fn delete(&self, scope: &ScopePath, id: &RecordId) -> Result<()> {
        self.check_online()?;
        if let Some(sender) = self.lock_scopes().get(scope) {
            sender.send_if_modified(|records| {
                let before = records.len();
                records.retain(|r| &r.id != id);
                records.len() != before
            });
        }
        Ok(())
    }
}
