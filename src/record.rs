//! The cached response unit: headers (including three synthetic bookkeeping
//! fields), body bytes, and the subtype that distinguishes it from sibling
//! representations of the same URL.

use std::time::SystemTime;

use crate::{date, headers::HeaderMap, subtype::Subtype};

/// Header name under which the request dispatch instant is stored.
pub const REQUEST_TIME: &str = "_request_time";
/// Header name under which the response-fully-received instant is stored.
pub const RESPONSE_TIME: &str = "_response_time";
/// Header name under which the original status code is stored.
pub const STATUS_CODE: &str = "_status_code";

/// A cached HTTP response for one `(url, subtype)` pair.
#[derive(Debug, Clone)]
pub struct Record {
    /// The exact request URL used as the cache key.
    pub url: String,
    /// The `Vary` fingerprint distinguishing this representation.
    pub subtype: Subtype,
    /// Response headers, plus [`REQUEST_TIME`], [`RESPONSE_TIME`], and
    /// [`STATUS_CODE`].
    pub headers: HeaderMap,
    /// The response body.
    pub content: Vec<u8>,
    /// Whether this record is visible. A durable store may retain disabled
    /// (tombstoned) records; only the first matching enabled record is
    /// ever returned to a caller.
    pub enabled: bool,
}

impl Record {
    /// Stamps [`REQUEST_TIME`] on `headers` as an RFC 1123 wire date.
    pub fn set_request_time(headers: &mut HeaderMap, at: SystemTime) {
        headers.insert(REQUEST_TIME, date::format(at));
    }

    /// Stamps [`RESPONSE_TIME`] on `headers` as an RFC 1123 wire date.
    pub fn set_response_time(headers: &mut HeaderMap, at: SystemTime) {
        headers.insert(RESPONSE_TIME, date::format(at));
    }

    /// Stamps [`STATUS_CODE`] on `headers` as a decimal string.
    pub fn set_status_code(headers: &mut HeaderMap, status: u16) {
        headers.insert(STATUS_CODE, status.to_string());
    }

    /// Reads [`REQUEST_TIME`] back out, parsing the wire date.
    pub fn request_time(headers: &HeaderMap) -> Option<SystemTime> {
        headers.get(REQUEST_TIME).and_then(date::parse)
    }

    /// Reads [`RESPONSE_TIME`] back out, parsing the wire date.
    pub fn response_time(headers: &HeaderMap) -> Option<SystemTime> {
        headers.get(RESPONSE_TIME).and_then(date::parse)
    }

    /// Reads [`STATUS_CODE`] back out, defaulting to `200` when absent or
    /// unparseable — the same default the original implementation used
    /// when replaying a response built before this field existed.
    pub fn status_code(headers: &HeaderMap) -> u16 {
        headers.get(STATUS_CODE).and_then(|s| s.parse().ok()).unwrap_or(200)
    }
}
