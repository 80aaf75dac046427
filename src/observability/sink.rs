//! Destinations for access records.
//!
//! # Responsibilities
//! - Define the sink seam the observer emits through
//! - Provide a tracing-backed sink for normal operation
//! - Provide a JSON-lines sink and an in-memory sink
//!
//! # Design Decisions
//! - Sinks are injected, never global
//! - A sink owns its own synchronization; the observer adds none
//! - Write failures stay inside the sink

use std::io::{self, Write};
use std::sync::Mutex;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::observability::record::AccessRecord;

/// Target used for access log events.
pub const ACCESS_LOG_TARGET: &str = "access_log";

/// Receives one record per handled request, at informational severity.
pub trait LogSink: Send + Sync {
    fn info(&self, message: &str, record: &AccessRecord);
}

/// Emits records as `tracing` events on the `access_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn info(&self, message: &str, r: &AccessRecord) {
        tracing::info!(
            target: ACCESS_LOG_TARGET,
            time_rfc3339 = %r.time_rfc3339,
            "remoteIP" = %r.client_ip,
            remote_ip = %r.remote_ip,
            "userId" = %r.user_id,
            host = %r.host,
            uri = %r.uri,
            method = %r.method,
            path = %r.path,
            referer = %r.referer,
            user_agent = %r.user_agent,
            status = r.status,
            "uniqueId" = %r.unique_id,
            context_id = %r.context_id,
            "X-Request-ID" = %r.context_id,
            "x-request-id" = %r.context_id,
            "x-b3-sampled" = %r.b3_sampled,
            "x-b3-spanid" = %r.b3_span_id,
            "x-b3-traceid" = %r.b3_trace_id,
            error = r.error.as_deref(),
            latency = %r.latency_micros(),
            latency_human = ?r.latency,
            bytes_in = %r.bytes_in,
            bytes_out = %r.bytes_out,
            "{}",
            message
        );
    }
}

/// Writes one JSON object per record, one record per line.
pub struct JsonSink<W> {
    writer: Mutex<W>,
}

impl JsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct JsonLine<'a> {
    message: &'a str,
    record: &'a AccessRecord,
}

impl Serialize for JsonLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.record.fields();
        let mut map = serializer.serialize_map(Some(fields.len() + 2))?;
        map.serialize_entry("level", "info")?;
        map.serialize_entry("msg", self.message)?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<W: Write + Send> LogSink for JsonSink<W> {
    fn info(&self, message: &str, record: &AccessRecord) {
        let mut line = match serde_json::to_vec(&JsonLine { message, record }) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode access record");
                return;
            }
        };
        line.push(b'\n');

        let mut writer = self.writer.lock().expect("json sink mutex poisoned");
        if let Err(e) = writer.write_all(&line).and_then(|_| writer.flush()) {
            tracing::warn!(error = %e, "Failed to write access record");
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(String, AccessRecord)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AccessRecord> {
        self.entries
            .lock()
            .expect("memory sink mutex poisoned")
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("memory sink mutex poisoned")
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemorySink {
    fn info(&self, message: &str, record: &AccessRecord) {
        self.entries
            .lock()
            .expect("memory sink mutex poisoned")
            .push((message.to_string(), record.clone()));
    }
}
