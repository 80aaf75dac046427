//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! request observer
//!     → record.rs (RequestContext + ResponseSnapshot → AccessRecord)
//!     → clock.rs (latency and timestamp)
//!     → sink.rs (tracing event, JSON line, or memory)
//!
//! logging.rs installs the subscriber that tracing events end up in.
//! ```
//!
//! # Design Decisions
//! - Field names are fixed; log pipelines key on them
//! - Sinks and clocks are injected so the observer is testable in isolation

pub mod clock;
pub mod logging;
pub mod record;
pub mod sink;

pub use clock::{Clock, SteppingClock, SystemClock};
pub use record::{AccessRecord, FieldValue, RequestContext, ResponseSnapshot};
pub use sink::{JsonSink, LogSink, MemorySink, TracingSink};
