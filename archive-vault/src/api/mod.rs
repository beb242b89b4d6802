//! HTTP API handlers for archive-vault

pub mod form;
pub mod health;
pub mod records;
pub mod session;
pub mod sse;
pub mod ui;

pub use form::{clear_file, get_form, select_file, submit_form, update_form};
pub use health::health_routes;
pub use records::{copy_field, delete_record, download_record, list_records};
pub use session::get_session;
pub use sse::event_stream;
pub use ui::{serve_app_js, serve_index};
