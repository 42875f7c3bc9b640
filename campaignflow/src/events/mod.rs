//! Event sinks for pipeline runs.
//!
//! The orchestrator reports everything it does through an [`EventSink`].
//! Transports, run logs and test collectors are all sinks; none of them is
//! global, each run is handed the sink it should report to.

mod sink;

pub use sink::{CollectingEventSink, EventSink, FanoutEventSink, LoggingEventSink, NoOpEventSink};
