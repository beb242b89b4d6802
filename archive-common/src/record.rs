//! Archive record model
//!
//! A record is one archived submission: a name, an institutional email and a
//! small PDF carried as a data URL. Records are immutable once created; the
//! store assigns the identifier and the `createdAt` timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::time;

/// Store-assigned record identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier (20 hex chars, like the hosted store's auto ids)
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..20].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Provider-issued anonymous session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters followed by `...`, for display
    pub fn short(&self) -> String {
        let prefix: String = self.0.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hierarchical address of one session's record collection
///
/// `artifacts/{app_id}/users/{session}/{collection}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopePath(String);

impl ScopePath {
    pub fn for_session(app_id: &str, session: &SessionId, collection: &str) -> Self {
        Self(format!(
            "artifacts/{}/users/{}/{}",
            app_id,
            session.as_str(),
            collection
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a single record document inside this scope
    pub fn document(&self, id: &RecordId) -> String {
        format!("{}/{}", self.0, id.as_str())
    }
}

impl fmt::Display for ScopePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub file_name: String,
    /// `data:application/pdf;base64,...`
    pub file_data: String,
    /// None between the write and server-side stamping
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Ordering key: missing timestamps count as time zero
    pub fn sort_key(&self) -> i64 {
        time::epoch_millis(self.created_at.as_ref())
    }
}

/// Create request payload; `createdAt` is assigned by the store on write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub name: String,
    pub email: String,
    pub file_name: String,
    pub file_data: String,
}

impl NewRecord {
    /// Materialize the stored form of this payload
    pub fn into_record(self, id: RecordId, created_at: Option<DateTime<Utc>>) -> Record {
        Record {
            id,
            name: self.name,
            email: self.email,
            file_name: self.file_name,
            file_data: self.file_data,
            created_at,
        }
    }
}

/// Record without its file payload, for list views and events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    pub file_name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Record> for RecordSummary {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            email: record.email.clone(),
            file_name: record.file_name.clone(),
            created_at: record.created_at,
        }
    }
}

/// Complete, ordered set of records visible to a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<Record>,
}

impl Snapshot {
    /// Build a snapshot sorted by creation time, newest first
    ///
    /// The sort is stable, so records with equal keys keep store order.
    pub fn ordered(mut records: Vec<Record>) -> Self {
        records.sort_by_key(|r| std::cmp::Reverse(r.sort_key()));
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summaries(&self) -> Vec<RecordSummary> {
        self.records.iter().map(RecordSummary::from).collect()
    }
}
