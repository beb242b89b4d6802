//! Document store clients
//!
//! The store owns persistence, server-side timestamps and change delivery.
//! A subscription is a stream of complete record sets for one scope path;
//! dropping the stream releases the underlying listener.

use async_trait::async_trait;
use futures::stream::BoxStream;

use archive_common::{NewRecord, RecordId, Record, Result, ScopePath};

mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Stream of complete (unsorted) record sets, one item per change
pub type RecordSetStream = BoxStream<'static, Result<Vec<Record>>>;

/// External document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a standing subscription; the first item is the current set
    async fn subscribe(&self, scope: &ScopePath) -> Result<RecordSetStream>;

    /// Create a record; the store assigns the id and `createdAt`
    async fn create(&self, scope: &ScopePath, record: NewRecord) -> Result<RecordId>;

    async fn delete(&self, scope: &ScopePath, id: &RecordId) -> Result<()>;
}
