//! Intercepted traffic and debugger replacement records
//!
//! These are the plain records exchanged between the HTTP integration layer
//! and the debugger engine:
//! - [`InterceptedRequest`] / [`InterceptedResponse`] describe captured traffic
//! - [`DebugReplacementResponse`] / [`DebugReplacementRequest`] carry the
//!   decisions produced by rules or by the attached debugger client

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use thiserror::Error;
use uuid::Uuid;

/// Captured headers: name -> every value sent under that name, in order
pub type Headers = BTreeMap<String, Vec<String>>;

/// Errors raised while interpreting exchange records
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Invalid base64 body: {0}")]
    InvalidBody(#[from] base64::DecodeError),
}

/// A request captured by the HTTP integration layer
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    message_id: String,
    request_id: String,
    url: String,
    method: String,
    headers: Headers,
    body: Vec<u8>,
    timestamp: DateTime<Utc>,
}

impl InterceptedRequest {
    /// Capture a new request. Every captured message gets its own message id,
    /// while `request_id` ties the request to its eventual response.
    pub fn new(request_id: impl Into<String>, url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            url: url.into(),
            method: method.into(),
            headers: Headers::new(),
            body: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Append a header value
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Stream the captured body into `sink`
    pub fn write_body<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.body)?;
        sink.flush()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Network timing metrics of a response, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTimings {
    pub write_time: u32,
    pub read_time: u32,
    pub wait_time: u32,
}

/// A response captured by the HTTP integration layer
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    message_id: String,
    request_id: String,
    status_code: u16,
    status_line: String,
    http_version: String,
    headers: Headers,
    body: Vec<u8>,
    timestamp: DateTime<Utc>,
    timings: ResponseTimings,
}

impl InterceptedResponse {
    pub fn new(request_id: impl Into<String>, status_code: u16, status_line: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            request_id: request_id.into(),
            status_code,
            status_line: status_line.into(),
            http_version: "http/1.1".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
            timestamp: Utc::now(),
            timings: ResponseTimings::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = version.into();
        self
    }

    pub fn with_timings(mut self, timings: ResponseTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write_body<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_all(&self.body)?;
        sink.flush()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn timings(&self) -> ResponseTimings {
        self.timings
    }
}

/// Response handed back to the HTTP layer instead of (or in place of) the
/// real one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReplacementResponse {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_headers")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_mime_type: Option<String>,
}

impl DebugReplacementResponse {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            headers: None,
            encoded_body: None,
            body_mime_type: None,
        }
    }

    /// Decode the base64 body. A missing body decodes to an empty one.
    pub fn decoded_body(&self) -> Result<Vec<u8>, ExchangeError> {
        decode_body(self.encoded_body.as_deref())
    }

    /// Headers to apply, including a `Content-Type` derived from the body
    /// mime type when none was given explicitly
    pub fn effective_headers(&self) -> HashMap<String, String> {
        effective_headers(self.headers.as_ref(), self.body_mime_type.as_deref())
    }
}

/// Request sent to the network instead of the captured one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReplacementRequest {
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "scalar_headers")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_mime_type: Option<String>,
}

impl DebugReplacementRequest {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: None,
            encoded_body: None,
            body_mime_type: None,
        }
    }

    pub fn decoded_body(&self) -> Result<Vec<u8>, ExchangeError> {
        decode_body(self.encoded_body.as_deref())
    }

    pub fn effective_headers(&self) -> HashMap<String, String> {
        effective_headers(self.headers.as_ref(), self.body_mime_type.as_deref())
    }
}

/// Encode a raw body the way replacement records carry it
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

fn decode_body(encoded: Option<&str>) -> Result<Vec<u8>, ExchangeError> {
    match encoded {
        Some(body) if !body.is_empty() => Ok(STANDARD.decode(body)?),
        _ => Ok(Vec::new()),
    }
}

/// Header value as a debugger client may send it. Non-string scalars are
/// taken by their textual form.
#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderValue {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Flag(bool),
}

impl HeaderValue {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Integer(n) => n.to_string(),
            Self::Unsigned(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Flag(b) => b.to_string(),
        }
    }
}

fn scalar_headers<'de, D>(deserializer: D) -> Result<Option<HashMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, HeaderValue>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|headers| {
        headers
            .into_iter()
            .map(|(name, value)| (name, value.into_text()))
            .collect()
    }))
}

fn effective_headers(
    headers: Option<&HashMap<String, String>>,
    body_mime_type: Option<&str>,
) -> HashMap<String, String> {
    let mut merged = headers.cloned().unwrap_or_default();

    if let Some(mime) = body_mime_type.filter(|m| !m.is_empty()) {
        let has_content_type = merged.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            merged.insert("Content-Type".to_string(), mime.to_string());
        }
    }

    merged
}
