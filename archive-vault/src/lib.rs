//! archive-vault library - single-page archive of institutional PDF submissions
//!
//! Wires the identity session, the live record collection, the submission
//! form and the record list together, and serves them over HTTP.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use archive_common::config::{Backend, VaultConfig};
use archive_common::events::EventBus;
use archive_common::Result;

pub mod api;
pub mod error;
pub mod form;
pub mod identity;
pub mod presenter;
pub mod session;
pub mod store;
pub mod subscriber;

pub use crate::error::{ApiError, ApiResult};

use crate::form::SubmissionForm;
use crate::identity::{FirebaseIdentity, IdentityProvider, MemoryIdentity};
use crate::presenter::{Clipboard, ClipboardBuffer, RecordList};
use crate::session::SessionManager;
use crate::store::{DocumentStore, FirestoreStore, MemoryStore};
use crate::subscriber::LiveCollection;

/// Events buffered per SSE client
const EVENT_BUS_CAPACITY: usize = 256;
/// Request body ceiling for every route except file selection, which
/// enforces the form's own limit
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VaultConfig>,
    pub event_bus: EventBus,
    pub session: Arc<SessionManager>,
    pub collection: Arc<LiveCollection>,
    pub form: Arc<SubmissionForm>,
    pub records: Arc<RecordList>,
}

impl AppState {
    /// Create application state around the given backends
    pub fn new(
        config: VaultConfig,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        clipboard: Arc<dyn Clipboard>,
    ) -> Self {
        let config = Arc::new(config);
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

        let session = Arc::new(SessionManager::new(identity, event_bus.clone()));
        let collection = Arc::new(LiveCollection::new(
            Arc::clone(&store),
            Arc::clone(&config),
            event_bus.clone(),
        ));
        let form = Arc::new(SubmissionForm::new(
            Arc::clone(&store),
            Arc::clone(&config),
            session.watch(),
            event_bus.clone(),
        ));
        let records = Arc::new(RecordList::new(
            Arc::clone(&collection),
            store,
            Arc::clone(&config),
            session.watch(),
            clipboard,
            event_bus.clone(),
        ));

        Self {
            config,
            event_bus,
            session,
            collection,
            form,
            records,
        }
    }

    /// Establish the session, open the listener and start the background
    /// followers
    ///
    /// A failed sign-in leaves the vault in its loading state.
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        if let Some(session) = self.session.initialize().await {
            if let Err(e) = self.collection.listen(&session).await {
                warn!("Store listener error: {}", e);
            }
        }

        vec![
            self.session.follow_provider(),
            self.collection.follow(self.session.watch()),
        ]
    }

    /// Release the live subscription
    pub fn shutdown(&self) {
        self.collection.release();
    }
}

/// Identity provider and document store for the configured backend
pub fn connect_backends(
    config: &VaultConfig,
) -> Result<(Arc<dyn IdentityProvider>, Arc<dyn DocumentStore>)> {
    match config.backend {
        Backend::Memory => {
            info!("Using in-memory backend (records are not persisted)");
            let identity: Arc<dyn IdentityProvider> = Arc::new(MemoryIdentity::new());
            let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
            Ok((identity, store))
        }
        Backend::Firestore => {
            let firebase = Arc::new(FirebaseIdentity::new(config)?);
            let store: Arc<dyn DocumentStore> =
                Arc::new(FirestoreStore::new(config, firebase.clone())?);
            info!(
                "Using hosted backend for project {}",
                config.project_id.as_deref().unwrap_or_default()
            );
            let identity: Arc<dyn IdentityProvider> = firebase;
            Ok((identity, store))
        }
    }
}

/// Default clipboard for the served page
pub fn default_clipboard() -> Arc<dyn Clipboard> {
    Arc::new(ClipboardBuffer::new())
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api_routes = Router::new()
        .route("/api/session", get(api::get_session))
        .route("/api/events", get(api::event_stream))
        .route("/api/records", get(api::list_records))
        .route("/api/records/:id", axum::routing::delete(api::delete_record))
        .route("/api/records/:id/download", get(api::download_record))
        .route("/api/records/:id/copy/:field", post(api::copy_field))
        .route("/api/form", get(api::get_form).put(api::update_form))
        .route(
            "/api/form/file",
            post(api::select_file)
                .layer(DefaultBodyLimit::disable())
                .delete(api::clear_file),
        )
        .route("/api/form/submit", post(api::submit_form));

    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .merge(api::health_routes());

    Router::new()
        .merge(api_routes)
        .merge(public)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
