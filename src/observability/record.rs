//! Access record assembly.
//!
//! # Responsibilities
//! - Capture the request view before the inner handler consumes the request
//! - Capture the response view after the inner handler returns
//! - Apply field fallbacks and expose the record as ordered, typed pairs
//!
//! # Design Decisions
//! - Header lookups that miss resolve to documented defaults, never errors
//! - Non-UTF-8 and empty header values count as absent
//! - Field names are part of the log contract and are reproduced verbatim

use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::http::header::{self, AsHeaderName};
use axum::http::{HeaderMap, HeaderName, Request, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use http_body::Body as HttpBody;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::http::attributes::RequestAttributesExt;

/// Apache `mod_unique_id` style request identifier.
pub const UNIQUE_ID: HeaderName = HeaderName::from_static("unique_id");
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_B3_SAMPLED: HeaderName = HeaderName::from_static("x-b3-sampled");
pub const X_B3_SPANID: HeaderName = HeaderName::from_static("x-b3-spanid");
pub const X_B3_TRACEID: HeaderName = HeaderName::from_static("x-b3-traceid");

/// Message attached to every access record.
pub const HANDLED_REQUEST: &str = "Handled request";

/// Read-only view of the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub method: String,
    pub host: String,
    pub uri: String,
    pub path: String,
    /// Directly connected peer, if the server recorded connect info.
    pub peer_ip: Option<IpAddr>,
    pub forwarded_for: Option<String>,
    pub user_id: Option<String>,
    pub content_length: Option<String>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub unique_id: Option<String>,
    pub request_id: Option<String>,
    pub b3_sampled: Option<String>,
    pub b3_span_id: Option<String>,
    pub b3_trace_id: Option<String>,
}

impl RequestContext {
    /// Capture everything the record needs from a request.
    pub fn capture<B>(request: &Request<B>) -> Self {
        let headers = request.headers();
        let uri = request.uri();

        let host = header_value(headers, header::HOST)
            .or_else(|| uri.authority().map(|a| a.to_string()))
            .unwrap_or_default();

        let peer_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Self {
            method: request.method().to_string(),
            host,
            uri: uri
                .path_and_query()
                .map(|pq| pq.to_string())
                .unwrap_or_else(|| "/".to_string()),
            path: uri.path().to_string(),
            peer_ip,
            forwarded_for: header_value(headers, X_FORWARDED_FOR),
            user_id: request.attributes().and_then(|attrs| attrs.user_id()),
            content_length: header_value(headers, header::CONTENT_LENGTH),
            referer: header_value(headers, header::REFERER),
            user_agent: header_value(headers, header::USER_AGENT),
            unique_id: header_value(headers, UNIQUE_ID),
            request_id: header_value(headers, X_REQUEST_ID),
            b3_sampled: header_value(headers, X_B3_SAMPLED),
            b3_span_id: header_value(headers, X_B3_SPANID),
            b3_trace_id: header_value(headers, X_B3_TRACEID),
        }
    }
}

/// Read-only view of the outbound response after the handler returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub bytes_out: u64,
}

impl ResponseSnapshot {
    /// Byte count comes from the body's exact size, then `Content-Length`.
    /// Streaming bodies of unknown length count as zero.
    pub fn capture<B: HttpBody>(response: &Response<B>) -> Self {
        let bytes_out = response
            .body()
            .size_hint()
            .exact()
            .or_else(|| {
                header_value(response.headers(), header::CONTENT_LENGTH)
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(0);

        Self {
            status: response.status().as_u16(),
            bytes_out,
        }
    }
}

fn header_value<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// One structured access log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
    pub time_rfc3339: String,
    /// `X-Forwarded-For` if present, else the peer address.
    pub client_ip: String,
    pub remote_ip: String,
    pub user_id: String,
    pub host: String,
    pub uri: String,
    pub method: String,
    pub path: String,
    pub referer: String,
    pub user_agent: String,
    pub status: u16,
    pub unique_id: String,
    pub context_id: String,
    pub b3_sampled: String,
    pub b3_span_id: String,
    pub b3_trace_id: String,
    pub error: Option<String>,
    pub latency: Duration,
    pub bytes_in: String,
    pub bytes_out: u64,
}

impl AccessRecord {
    pub fn assemble(
        request: RequestContext,
        response: ResponseSnapshot,
        error: Option<String>,
        latency: Duration,
        emitted_at: DateTime<Utc>,
    ) -> Self {
        let remote_ip = request
            .peer_ip
            .map(|ip| ip.to_string())
            .unwrap_or_default();
        let client_ip = request.forwarded_for.unwrap_or_else(|| remote_ip.clone());
        let path = if request.path.is_empty() {
            "/".to_string()
        } else {
            request.path
        };

        Self {
            time_rfc3339: emitted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            client_ip,
            remote_ip,
            user_id: request.user_id.unwrap_or_default(),
            host: request.host,
            uri: request.uri,
            method: request.method,
            path,
            referer: request.referer.unwrap_or_default(),
            user_agent: request.user_agent.unwrap_or_default(),
            status: response.status,
            unique_id: request.unique_id.unwrap_or_default(),
            context_id: request.request_id.unwrap_or_default(),
            b3_sampled: request.b3_sampled.unwrap_or_default(),
            b3_span_id: request.b3_span_id.unwrap_or_default(),
            b3_trace_id: request.b3_trace_id.unwrap_or_default(),
            error,
            latency,
            bytes_in: request.content_length.unwrap_or_else(|| "0".to_string()),
            bytes_out: response.bytes_out,
        }
    }

    /// Latency in whole microseconds, as decimal text.
    pub fn latency_micros(&self) -> String {
        self.latency.as_micros().to_string()
    }

    pub fn latency_human(&self) -> String {
        format!("{:?}", self.latency)
    }

    /// The record as ordered `(name, value)` pairs.
    pub fn fields(&self) -> Vec<(&'static str, FieldValue<'_>)> {
        use FieldValue::{Str, Uint};

        vec![
            ("time_rfc3339", Str(Cow::Borrowed(&self.time_rfc3339))),
            ("remoteIP", Str(Cow::Borrowed(&self.client_ip))),
            ("remote_ip", Str(Cow::Borrowed(&self.remote_ip))),
            ("userId", Str(Cow::Borrowed(&self.user_id))),
            ("host", Str(Cow::Borrowed(&self.host))),
            ("uri", Str(Cow::Borrowed(&self.uri))),
            ("method", Str(Cow::Borrowed(&self.method))),
            ("path", Str(Cow::Borrowed(&self.path))),
            ("referer", Str(Cow::Borrowed(&self.referer))),
            ("user_agent", Str(Cow::Borrowed(&self.user_agent))),
            ("status", Uint(u64::from(self.status))),
            ("uniqueId", Str(Cow::Borrowed(&self.unique_id))),
            ("context_id", Str(Cow::Borrowed(&self.context_id))),
            ("X-Request-ID", Str(Cow::Borrowed(&self.context_id))),
            ("x-request-id", Str(Cow::Borrowed(&self.context_id))),
            ("x-b3-sampled", Str(Cow::Borrowed(&self.b3_sampled))),
            ("x-b3-spanid", Str(Cow::Borrowed(&self.b3_span_id))),
            ("x-b3-traceid", Str(Cow::Borrowed(&self.b3_trace_id))),
            ("error", FieldValue::Error(self.error.as_deref())),
            ("latency", Str(Cow::Owned(self.latency_micros()))),
            ("latency_human", FieldValue::Duration(self.latency)),
            ("bytes_in", Str(Cow::Borrowed(&self.bytes_in))),
            ("bytes_out", Str(Cow::Owned(self.bytes_out.to_string()))),
        ]
    }

    /// Look up a single field by its log name.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        self.fields()
            .into_iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// Typed value of a record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Str(Cow<'a, str>),
    Uint(u64),
    Duration(Duration),
    /// Handler error, `None` when the handler succeeded.
    Error(Option<&'a str>),
}

impl std::fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Uint(n) => write!(f, "{}", n),
            FieldValue::Duration(d) => write!(f, "{:?}", d),
            FieldValue::Error(e) => f.write_str(e.unwrap_or_default()),
        }
    }
}

impl Serialize for FieldValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Uint(n) => serializer.serialize_u64(*n),
            FieldValue::Duration(d) => serializer.collect_str(&format_args!("{:?}", d)),
            FieldValue::Error(Some(e)) => serializer.serialize_str(e),
            FieldValue::Error(None) => serializer.serialize_none(),
        }
    }
}

impl Serialize for AccessRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (name, value) in &fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
