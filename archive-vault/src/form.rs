//! Submission Form Controller
//!
//! Owns the transient form input (name, email, pending file), validates it,
//! encodes the PDF and issues the create request. Only one submission may be
//! in flight; a second attempt is rejected, not queued.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use archive_common::config::VaultConfig;
use archive_common::data_url::{self, PDF_MIME};
use archive_common::events::{ArchiveEvent, EventBus};
use archive_common::{NewRecord, RecordId, SessionId};

use crate::store::DocumentStore;

pub const SUCCESS_NOTICE: &str = "Data Uplink Successful.";
const FILE_LABEL_CHARS: usize = 15;

/// User-facing form rejections; Display is the message shown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("No active session. Please wait for the link to initialize.")]
    NoSession,

    #[error("Incomplete information.")]
    Incomplete,

    #[error("Access denied: use a {suffix} email only.")]
    AccessDenied { suffix: String },

    #[error("System error: only PDF files are accepted.")]
    NotPdf,

    #[error("Warning: file size must not exceed {limit_kb}KB.")]
    TooLarge { limit_kb: u64 },

    #[error("An upload is already in progress.")]
    Busy,

    #[error("Connection lost. Please try again.")]
    Upload,
}

impl FormError {
    /// Validation errors never reach the backend
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FormError::Incomplete
                | FormError::AccessDenied { .. }
                | FormError::NotPdf
                | FormError::TooLarge { .. }
        )
    }
}

/// A user-selected file with its declared MIME type
#[derive(Debug, Clone)]
pub struct FileSelection {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileSelection {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
struct PendingFile {
    name: String,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct FormFields {
    name: String,
    email: String,
    file: Option<PendingFile>,
    error: Option<String>,
    notice: Option<String>,
}

/// Form state as presented to the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormState {
    pub name: String,
    pub email: String,
    pub file_name: Option<String>,
    /// Truncated file name for the picker label
    pub file_label: Option<String>,
    pub uploading: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Resets the in-flight flag on every exit path
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SubmissionForm {
    store: Arc<dyn DocumentStore>,
    config: Arc<VaultConfig>,
    sessions: watch::Receiver<Option<SessionId>>,
    event_bus: EventBus,
    fields: Mutex<FormFields>,
    in_flight: AtomicBool,
}

impl SubmissionForm {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        config: Arc<VaultConfig>,
        sessions: watch::Receiver<Option<SessionId>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            config,
            sessions,
            event_bus,
            fields: Mutex::new(FormFields::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.lock_fields().name = name.into();
    }

    pub fn set_email(&self, email: impl Into<String>) {
        self.lock_fields().email = email.into();
    }

    /// Validate a file at selection time
    ///
    /// A non-PDF or oversize file clears the pending file and sets the
    /// message immediately; a conforming file replaces the pending one.
    pub fn select_file(&self, selection: FileSelection) -> Result<(), FormError> {
        if let Some(rejection) = self.check_file(&selection.mime_type, selection.size()) {
            return Err(self.reject_file(&selection.name, &selection.mime_type, rejection));
        }

        let mut fields = self.lock_fields();
        fields.error = None;
        fields.file = Some(PendingFile {
            name: selection.name,
            bytes: selection.bytes,
        });
        Ok(())
    }

    /// Reject a selection whose content was cut off above `max_file_bytes`
    ///
    /// Same outcome as [`select_file`](Self::select_file) with an oversize
    /// file: the pending file is cleared and the message set.
    pub fn reject_oversize(&self, name: &str, mime_type: &str) -> FormError {
        let rejection = self
            .check_file(mime_type, self.config.max_file_bytes.saturating_add(1))
            .unwrap_or(FormError::TooLarge {
                limit_kb: self.config.max_file_bytes / 1024,
            });
        self.reject_file(name, mime_type, rejection)
    }

    /// Largest selection that can be accepted, in bytes
    pub fn max_file_bytes(&self) -> u64 {
        self.config.max_file_bytes
    }

    fn check_file(&self, mime_type: &str, size: u64) -> Option<FormError> {
        if mime_type != PDF_MIME {
            Some(FormError::NotPdf)
        } else if size > self.config.max_file_bytes {
            Some(FormError::TooLarge {
                limit_kb: self.config.max_file_bytes / 1024,
            })
        } else {
            None
        }
    }

    fn reject_file(&self, name: &str, mime_type: &str, rejection: FormError) -> FormError {
        info!("Rejected file {:?} ({}): {}", name, mime_type, rejection);
        {
            let mut fields = self.lock_fields();
            fields.file = None;
            fields.error = Some(rejection.to_string());
        }
        self.event_bus.emit_lossy(ArchiveEvent::FileRejected {
            message: rejection.to_string(),
            timestamp: chrono::Utc::now(),
        });
        rejection
    }

    pub fn clear_file(&self) {
        self.lock_fields().file = None;
    }

    /// Validate and submit the current form
    ///
    /// Rejections leave every field untouched, including the pending file.
    /// On success the form is cleared and the success notice set.
    pub async fn submit(&self) -> Result<RecordId, FormError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FormError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let (session, record) = match self.validate() {
            Ok(valid) => valid,
            Err(rejection) => {
                self.reject(&rejection);
                return Err(rejection);
            }
        };

        {
            let mut fields = self.lock_fields();
            fields.error = None;
            fields.notice = None;
        }

        let scope = self.config.scope_for(&session);
        let file_name = record.file_name.clone();
        match self.store.create(&scope, record).await {
            Ok(id) => {
                info!("Uploaded {} as {}", file_name, id);
                {
                    let mut fields = self.lock_fields();
                    fields.name.clear();
                    fields.email.clear();
                    fields.file = None;
                    fields.error = None;
                    fields.notice = Some(SUCCESS_NOTICE.to_string());
                }
                self.event_bus.emit_lossy(ArchiveEvent::SubmissionAccepted {
                    record_id: id.clone(),
                    file_name,
                    timestamp: chrono::Utc::now(),
                });
                Ok(id)
            }
            Err(e) => {
                error!("Upload error: {}", e);
                let failure = FormError::Upload;
                self.reject(&failure);
                Err(failure)
            }
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> FormState {
        let fields = self.lock_fields();
        let file_name = fields.file.as_ref().map(|f| f.name.clone());
        FormState {
            name: fields.name.clone(),
            email: fields.email.clone(),
            file_label: file_name.as_deref().map(file_label),
            file_name,
            uploading: self.is_uploading(),
            error: fields.error.clone(),
            notice: fields.notice.clone(),
        }
    }

    /// Preconditions in order: session, completeness, institutional email
    fn validate(&self) -> Result<(SessionId, NewRecord), FormError> {
        let session = self.sessions.borrow().clone().ok_or(FormError::NoSession)?;

        let fields = self.lock_fields();
        let file = match &fields.file {
            Some(file) if !fields.name.is_empty() && !fields.email.is_empty() => file,
            _ => return Err(FormError::Incomplete),
        };

        if !fields.email.ends_with(&self.config.email_suffix) {
            return Err(FormError::AccessDenied {
                suffix: self.config.email_suffix.clone(),
            });
        }

        Ok((
            session,
            NewRecord {
                name: fields.name.clone(),
                email: fields.email.clone(),
                file_name: file.name.clone(),
                file_data: data_url::encode_pdf(&file.bytes),
            },
        ))
    }

    fn reject(&self, rejection: &FormError) {
        {
            let mut fields = self.lock_fields();
            fields.error = Some(rejection.to_string());
            fields.notice = None;
        }
        self.event_bus.emit_lossy(ArchiveEvent::SubmissionRejected {
            message: rejection.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn lock_fields(&self) -> MutexGuard<'_, FormFields> {
        self.fields.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// First 15 characters of the file name followed by `...`
fn file_label(name: &str) -> String {
    let prefix: String = name.chars().take(FILE_LABEL_CHARS).collect();
    format!("{}...", prefix)
}
