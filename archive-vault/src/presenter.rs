//! Record List Presenter
//!
//! Renders the latest snapshot and dispatches the per-record actions:
//! copy a field, download the PDF, delete after confirmation. Deletion is
//! not applied locally; the next snapshot from the collection reconciles it.

use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{error, info};

use archive_common::config::VaultConfig;
use archive_common::data_url::{self, PDF_MIME};
use archive_common::events::{ArchiveEvent, EventBus};
use archive_common::{Error, RecordId, RecordSummary, Result, SessionId};

use crate::store::DocumentStore;
use crate::subscriber::LiveCollection;

pub const EMPTY_MESSAGE: &str = "NO DATA FRAGMENTS FOUND.";
pub const DELETE_PROMPT: &str = "Delete this record from the database?";

/// Platform clipboard
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn copy(&self, text: &str) -> Result<()>;
}

/// Clipboard that keeps the last copied text in memory
///
/// The served page writes the returned text to the browser clipboard.
#[derive(Default)]
pub struct ClipboardBuffer {
    last: Mutex<Option<String>>,
}

impl ClipboardBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_copied(&self) -> Option<String> {
        self.last.lock().ok().and_then(|l| l.clone())
    }
}

#[async_trait]
impl Clipboard for ClipboardBuffer {
    async fn copy(&self, text: &str) -> Result<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| Error::Internal("clipboard lock poisoned".to_string()))?;
        *last = Some(text.to_string());
        Ok(())
    }
}

/// Delete confirmation capability
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Copyable text attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyField {
    Name,
    Email,
}

impl FromStr for CopyField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(CopyField::Name),
            "email" => Ok(CopyField::Email),
            other => Err(Error::InvalidInput(format!("field '{}' cannot be copied", other))),
        }
    }
}

/// Decoded file ready to hand to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// User declined the confirmation; nothing was sent
    Cancelled,
    /// Store acknowledged the delete
    Deleted,
}

/// List view of the current snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListView {
    pub count: usize,
    pub records: Vec<RecordSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

pub struct RecordList {
    collection: Arc<LiveCollection>,
    store: Arc<dyn DocumentStore>,
    config: Arc<VaultConfig>,
    sessions: watch::Receiver<Option<SessionId>>,
    clipboard: Arc<dyn Clipboard>,
    event_bus: EventBus,
}

impl RecordList {
    pub fn new(
        collection: Arc<LiveCollection>,
        store: Arc<dyn DocumentStore>,
        config: Arc<VaultConfig>,
        sessions: watch::Receiver<Option<SessionId>>,
        clipboard: Arc<dyn Clipboard>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            collection,
            store,
            config,
            sessions,
            clipboard,
            event_bus,
        }
    }

    pub fn view(&self) -> ListView {
        let snapshot = self.collection.snapshot();
        ListView {
            count: snapshot.len(),
            empty_message: snapshot.is_empty().then_some(EMPTY_MESSAGE),
            records: snapshot.summaries(),
        }
    }

    /// Copy a text attribute to the clipboard
    ///
    /// Returns the copied text, or None when the clipboard refused (logged).
    pub async fn copy_field(&self, id: &RecordId, field: CopyField) -> Result<Option<String>> {
        let text = {
            let snapshot = self.collection.snapshot();
            let record = snapshot
                .get(id)
                .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;
            match field {
                CopyField::Name => record.name.clone(),
                CopyField::Email => record.email.clone(),
            }
        };

        match self.clipboard.copy(&text).await {
            Ok(()) => {
                self.event_bus.emit_lossy(ArchiveEvent::FieldCopied {
                    text: text.clone(),
                    timestamp: chrono::Utc::now(),
                });
                Ok(Some(text))
            }
            Err(e) => {
                error!("Copy failed: {}", e);
                Ok(None)
            }
        }
    }

    /// Decode the stored file back into the original PDF bytes
    pub fn download(&self, id: &RecordId) -> Result<Download> {
        let snapshot = self.collection.snapshot();
        let record = snapshot
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("record {}", id)))?;

        Ok(Download {
            file_name: record.file_name.clone(),
            content_type: PDF_MIME,
            bytes: data_url::decode(&record.file_data)?,
        })
    }

    /// Delete a record after explicit confirmation
    ///
    /// The record stays listed until the collection's next snapshot drops it.
    pub async fn delete(&self, id: &RecordId, confirm: &impl Confirm) -> Result<DeleteOutcome> {
        let session = self.sessions.borrow().clone().ok_or(Error::NoSession)?;

        if !confirm.confirm(DELETE_PROMPT) {
            return Ok(DeleteOutcome::Cancelled);
        }

        let scope = self.config.scope_for(&session);
        match self.store.delete(&scope, id).await {
            Ok(()) => {
                info!("Deleted {}", scope.document(id));
                self.event_bus.emit_lossy(ArchiveEvent::RecordDeleted {
                    record_id: id.clone(),
                    timestamp: chrono::Utc::now(),
                });
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) => {
                error!("Delete error: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use archive_common::{NewRecord, Snapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct BrokenClipboard;

    #[async_trait]
    impl Clipboard for BrokenClipboard {
        async fn copy(&self, _text: &str) -> Result<()> {
            Err(Error::Internal("no clipboard".to_string()))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        collection: Arc<LiveCollection>,
        list: RecordList,
        session: SessionId,
    }

    async fn fixture_with(clipboard: Arc<dyn Clipboard>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(VaultConfig::default());
        let bus = EventBus::new(16);
        let session = SessionId::new("presenter");
        let collection = Arc::new(LiveCollection::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&config),
            bus.clone(),
        ));
        collection.listen(&session).await.unwrap();

        let (_tx, rx) = watch::channel(Some(session.clone()));
        let list = RecordList::new(
            Arc::clone(&collection),
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            config,
            rx,
            clipboard,
            bus,
        );
        Fixture {
            store,
            collection,
            list,
            session,
        }
    }

    async fn fixture() -> (Fixture, Arc<ClipboardBuffer>) {
        let buffer = Arc::new(ClipboardBuffer::new());
        let fixture = fixture_with(Arc::clone(&buffer) as Arc<dyn Clipboard>).await;
        (fixture, buffer)
    }

    async fn add(fixture: &Fixture, name: &str, bytes: &[u8]) -> RecordId {
        let scope = VaultConfig::default().scope_for(&fixture.session);
        let before = fixture.collection.snapshot().len();
        let id = fixture
            .store
            .create(
                &scope,
                NewRecord {
                    name: name.to_string(),
                    email: format!("{}@uni.edu", name.to_lowercase()),
                    file_name: format!("{}.pdf", name),
                    file_data: data_url::encode_pdf(bytes),
                },
            )
            .await
            .unwrap();
        wait_until(&fixture.collection, |s| s.len() == before + 1).await;
        id
    }

    async fn wait_until(collection: &LiveCollection, predicate: impl FnMut(&Snapshot) -> bool) {
        let mut rx = collection.watch();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("timed out")
            .expect("channel open");
    }

    #[tokio::test]
    async fn test_empty_view() {
        let (fixture, _) = fixture().await;
        let view = fixture.list.view();
        assert_eq!(view.count, 0);
        assert_eq!(view.empty_message, Some(EMPTY_MESSAGE));
    }

    #[tokio::test]
    async fn test_copy_field_does_not_alter_snapshot() {
        let (fixture, clipboard) = fixture().await;
        let id = add(&fixture, "Ann", b"%PDF").await;
        let before = fixture.collection.snapshot();

        let copied = fixture.list.copy_field(&id, CopyField::Email).await.unwrap();
        assert_eq!(copied.as_deref(), Some("ann@uni.edu"));
        assert_eq!(clipboard.last_copied().as_deref(), Some("ann@uni.edu"));
        assert_eq!(fixture.collection.snapshot(), before);

        let copied = fixture.list.copy_field(&id, CopyField::Name).await.unwrap();
        assert_eq!(copied.as_deref(), Some("Ann"));
    }

    #[tokio::test]
    async fn test_copy_unknown_record_is_not_found() {
        let (fixture, _) = fixture().await;
        let result = fixture
            .list
            .copy_field(&RecordId::new("missing"), CopyField::Name)
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_failure_is_swallowed() {
        let fixture = fixture_with(Arc::new(BrokenClipboard)).await;
        let id = add(&fixture, "Ann", b"%PDF").await;
        assert_eq!(fixture.list.copy_field(&id, CopyField::Name).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_download_reproduces_bytes() {
        let (fixture, _) = fixture().await;
        let original: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        let id = add(&fixture, "Thesis", &original).await;

        let download = fixture.list.download(&id).unwrap();
        assert_eq!(download.file_name, "Thesis.pdf");
        assert_eq!(download.content_type, "application/pdf");
        assert_eq!(download.bytes, original);
    }

    #[tokio::test]
    async fn test_delete_cancelled_sends_nothing() {
        let (fixture, _) = fixture().await;
        let id = add(&fixture, "Ann", b"%PDF").await;
        let prompts = AtomicUsize::new(0);

        let outcome = fixture
            .list
            .delete(&id, &|prompt: &str| {
                assert_eq!(prompt, DELETE_PROMPT);
                prompts.fetch_add(1, Ordering::SeqCst);
                false
            })
            .await
            .unwrap();

        assert_eq!(outcome, DeleteOutcome::Cancelled);
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.collection.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_confirmed_reconciles_via_snapshot() {
        let (fixture, _) = fixture().await;
        let id = add(&fixture, "Ann", b"%PDF").await;

        let outcome = fixture.list.delete(&id, &|_: &str| true).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);

        wait_until(&fixture.collection, |s| s.get(&id).is_none()).await;
        assert_eq!(fixture.list.view().count, 0);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_record_listed() {
        let (fixture, _) = fixture().await;
        let id = add(&fixture, "Ann", b"%PDF").await;
        fixture.store.set_offline(true);

        let result = fixture.list.delete(&id, &|_: &str| true).await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(fixture.collection.snapshot().get(&id).is_some());
    }

    #[test]
    fn test_copy_field_parse() {
        assert_eq!("name".parse::<CopyField>().unwrap(), CopyField::Name);
        assert_eq!("email".parse::<CopyField>().unwrap(), CopyField::Email);
        assert!("fileData".parse::<CopyField>().is_err());
    }
}
