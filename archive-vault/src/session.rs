//! Identity Session Manager
//!
//! Obtains an anonymous session once at startup and exposes the current
//! session id. Until a session exists the vault stays in the loading state;
//! a failed sign-in is logged and recorded, never fatal.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use archive_common::events::{ArchiveEvent, EventBus};
use archive_common::SessionId;

use crate::identity::IdentityProvider;

/// Session state as reported to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SessionStatus {
    Loading,
    Ready { session_prefix: String },
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    session_tx: watch::Sender<Option<SessionId>>,
    last_error: RwLock<Option<String>>,
    event_bus: EventBus,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, event_bus: EventBus) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            provider,
            session_tx,
            last_error: RwLock::new(None),
            event_bus,
        }
    }

    /// Request an anonymous session from the provider
    ///
    /// Returns None on failure; the error is logged and kept for diagnostics.
    pub async fn initialize(&self) -> Option<SessionId> {
        match self.provider.begin_anonymous_session().await {
            Ok(session) => {
                info!("Session established: {}", session.short());
                self.publish(Some(session.clone()));
                Some(session)
            }
            Err(e) => {
                error!("Auth error: {}", e);
                if let Ok(mut last) = self.last_error.write() {
                    *last = Some(e.to_string());
                }
                None
            }
        }
    }

    /// Forward provider session changes (replacement, sign-out) until the
    /// provider's channel closes
    pub fn follow_provider(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let mut changes = self.provider.on_session_change();
        tokio::spawn(async move {
            loop {
                let current = changes.borrow_and_update().clone();
                manager.publish(current);
                if changes.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn current(&self) -> Option<SessionId> {
        self.session_tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.session_tx.borrow().is_some()
    }

    /// Receiver for session changes, consumed by the collection, form and list
    pub fn watch(&self) -> watch::Receiver<Option<SessionId>> {
        self.session_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    pub fn status(&self) -> SessionStatus {
        match self.current() {
            Some(session) => SessionStatus::Ready {
                session_prefix: session.short(),
            },
            None => SessionStatus::Loading,
        }
    }

    fn publish(&self, session: Option<SessionId>) {
        let changed = self.session_tx.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session.clone();
                true
            }
        });
        if !changed {
            return;
        }

        let timestamp = chrono::Utc::now();
        match session {
            Some(session) => self.event_bus.emit_lossy(ArchiveEvent::SessionEstablished {
                session_prefix: session.short(),
                timestamp,
            }),
            None => {
                info!("Session cleared");
                self.event_bus
                    .emit_lossy(ArchiveEvent::SessionCleared { timestamp })
            }
        }
    }
}
