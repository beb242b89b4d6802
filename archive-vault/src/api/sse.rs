//! Server-Sent Events stream
//!
//! Each client first receives the current snapshot, then every archive
//! event as it is emitted.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use archive_common::events::ArchiveEvent;

use crate::AppState;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE client connected");

    // Subscribe before reading the snapshot so no update falls in between
    let rx = state.event_bus.subscribe();
    let view = state.records.view();
    let initial = ArchiveEvent::SnapshotUpdated {
        count: view.count,
        records: view.records,
        timestamp: chrono::Utc::now(),
    };

    let updates = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    let stream = stream::once(async move { initial })
        .chain(updates)
        .filter_map(|event| async move { to_sse(&event).map(Ok) });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse(event: &ArchiveEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(e) => {
            warn!("Failed to serialize event: {}", e);
            None
        }
    }
}
