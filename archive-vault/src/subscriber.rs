//! Live Collection Subscriber
//!
//! Holds one standing subscription against the document store for the
//! current session. Every delivery becomes a freshly sorted [`Snapshot`]
//! published on a watch channel. Delivery errors are logged and the last
//! snapshot is kept.

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use archive_common::config::VaultConfig;
use archive_common::events::{ArchiveEvent, EventBus};
use archive_common::{Record, Result, SessionId, Snapshot};

use crate::store::DocumentStore;

/// Handle to a running listener; releasing it stops delivery
pub struct Subscription {
    session: SessionId,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Stop the listener and release the store connection
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct LiveCollection {
    store: Arc<dyn DocumentStore>,
    config: Arc<VaultConfig>,
    event_bus: EventBus,
    snapshot_tx: Arc<watch::Sender<Snapshot>>,
    /// Bumped whenever a listener starts or is released
    generation: Arc<AtomicU64>,
    listener: Mutex<Option<Subscription>>,
}

impl LiveCollection {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<VaultConfig>, event_bus: EventBus) -> Self {
        let (snapshot_tx, _) = watch::channel(Snapshot::default());
        Self {
            store,
            config,
            event_bus,
            snapshot_tx: Arc::new(snapshot_tx),
            generation: Arc::new(AtomicU64::new(0)),
            listener: Mutex::new(None),
        }
    }

    /// Start listening to `session`'s records
    ///
    /// A listener already running for the same session is kept; one for a
    /// different session is released first and the snapshot reset.
    pub async fn listen(&self, session: &SessionId) -> Result<()> {
        if self.listening_to().as_ref() == Some(session) {
            return Ok(());
        }
        self.release();

        let scope = self.config.scope_for(session);
        let mut stream = self.store.subscribe(&scope).await?;
        info!("Listening to {}", scope);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot_tx = Arc::clone(&self.snapshot_tx);
        let current = Arc::clone(&self.generation);
        let event_bus = self.event_bus.clone();
        let task = tokio::spawn(async move {
            while let Some(delivery) = stream.next().await {
                match delivery {
                    Ok(records) => {
                        if !deliver(&snapshot_tx, &current, generation, &event_bus, records) {
                            debug!("Dropped delivery from released listener");
                            break;
                        }
                    }
                    Err(e) => warn!("Store listener error: {}", e),
                }
            }
            debug!("Store listener stream ended");
        });

        let previous = self.lock_listener().replace(Subscription {
            session: session.clone(),
            task,
        });
        // A concurrent listen may have raced us; its listener is superseded
        drop(previous);
        Ok(())
    }

    /// Release the current listener (if any) and clear the snapshot
    pub fn release(&self) {
        if let Some(subscription) = self.lock_listener().take() {
            info!("Releasing listener for {}", subscription.session().short());
            self.generation.fetch_add(1, Ordering::SeqCst);
            subscription.unsubscribe();
            let event_bus = &self.event_bus;
            self.snapshot_tx.send_modify(|latest| {
                *latest = Snapshot::default();
                event_bus.emit_lossy(ArchiveEvent::SnapshotUpdated {
                    count: 0,
                    records: Vec::new(),
                    timestamp: chrono::Utc::now(),
                });
            });
        }
    }

    /// Listen to whichever session `sessions` carries, until it closes
    pub fn follow(self: &Arc<Self>, mut sessions: watch::Receiver<Option<SessionId>>) -> JoinHandle<()> {
        let collection = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let current = sessions.borrow_and_update().clone();
                match current {
                    Some(session) => {
                        if let Err(e) = collection.listen(&session).await {
                            warn!("Store listener error: {}", e);
                        }
                    }
                    None => collection.release(),
                }
                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn listening_to(&self) -> Option<SessionId> {
        self.lock_listener().as_ref().map(|s| s.session().clone())
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Publish one delivery unless its listener has been superseded
///
/// The generation check, the snapshot write and the event all happen under
/// the snapshot channel's write lock, so a release lands either entirely
/// before this delivery (dropped) or entirely after it (cleared).
fn deliver(
    snapshot_tx: &watch::Sender<Snapshot>,
    current: &AtomicU64,
    generation: u64,
    event_bus: &EventBus,
    records: Vec<Record>,
) -> bool {
    let mut pending = Some(Snapshot::ordered(records));

    snapshot_tx.send_if_modified(|latest| {
        if current.load(Ordering::SeqCst) != generation {
            return false;
        }
        let Some(snapshot) = pending.take() else {
            return false;
        };
        debug!("Snapshot with {} records", snapshot.len());
        event_bus.emit_lossy(ArchiveEvent::SnapshotUpdated {
            count: snapshot.len(),
            records: snapshot.summaries(),
            timestamp: chrono::Utc::now(),
        });
        *latest = snapshot;
        true
    })
}

impl Drop for LiveCollection {
    fn drop(&mut self) {
        if let Some(subscription) = self.lock_listener().take() {
            subscription.unsubscribe();
        }
    }
}
