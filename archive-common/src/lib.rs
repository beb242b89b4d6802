//! # Archive Common Library
//!
//! Shared code for the cyber archive vault:
//! - Record, session and scope path types
//! - Snapshot ordering
//! - Event types (ArchiveEvent enum) and the EventBus
//! - Configuration loading
//! - PDF transport encoding
//! - Timestamp helpers

pub mod config;
pub mod data_url;
pub mod error;
pub mod events;
pub mod record;
pub mod time;

pub use error::{Error, Result};
pub use record::{NewRecord, Record, RecordId, RecordSummary, ScopePath, SessionId, Snapshot};
