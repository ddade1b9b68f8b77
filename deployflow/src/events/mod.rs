//! Event sink system for observability.
//!
//! The pipeline executor and the canary validator report progress through an
//! [`EventSink`] handed to them at construction time.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
