//! Click analytics
//!
//! Turns click messages from `shortlink:click` into rows of the
//! `"eventRecord"` table owned by the API service.

mod click_handler;
mod event_record;

pub use click_handler::ClickEventHandler;
pub use event_record::{EventRecord, EventRecordStore, PostgresEventRecordStore};
