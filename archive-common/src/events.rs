//! Event types for the archive event system
//!
//! Provides the ArchiveEvent enum and the EventBus that carries it from the
//! session, collection, form and list components to SSE clients.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::record::{RecordId, RecordSummary};

/// Archive event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ArchiveEvent {
    /// Identity provider issued a session
    SessionEstablished {
        /// Abbreviated session id (`abcdefgh...`)
        session_prefix: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session was dropped by the provider
    SessionCleared {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// New complete snapshot of the session's records
    ///
    /// Carries summaries only; file payloads are fetched via download.
    SnapshotUpdated {
        count: usize,
        records: Vec<RecordSummary>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Create request confirmed by the store
    SubmissionAccepted {
        record_id: RecordId,
        file_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Submit rejected by validation or transport failure
    SubmissionRejected {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// File selection rejected (wrong type or oversize)
    FileRejected {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A record field was copied to the clipboard
    FieldCopied {
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Delete request confirmed by the store
    RecordDeleted {
        record_id: RecordId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ArchiveEvent {
    /// Event type name, used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            ArchiveEvent::SessionEstablished { .. } => "SessionEstablished",
            ArchiveEvent::SessionCleared { .. } => "SessionCleared",
            ArchiveEvent::SnapshotUpdated { .. } => "SnapshotUpdated",
            ArchiveEvent::SubmissionAccepted { .. } => "SubmissionAccepted",
            ArchiveEvent::SubmissionRejected { .. } => "SubmissionRejected",
            ArchiveEvent::FileRejected { .. } => "FileRejected",
            ArchiveEvent::FieldCopied { .. } => "FieldCopied",
            ArchiveEvent::RecordDeleted { .. } => "RecordDeleted",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
///
/// # Examples
///
/// ```
/// use archive_common::events::{ArchiveEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ArchiveEvent::SessionCleared {
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "SessionCleared");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ArchiveEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ArchiveEvent,
    ) -> Result<usize, broadcast::error::SendError<ArchiveEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ArchiveEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
