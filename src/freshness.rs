//! RFC 2616 §13.2.3 / §13.2.4 age and freshness-lifetime arithmetic.
//!
//! All time differences are computed in whole seconds; subsecond
//! components are truncated by [`crate::date`]'s wire-date precision.

use std::time::SystemTime;

use crate::{
    headers::HeaderMap,
    record::{self},
};

fn diff_secs(a: SystemTime, b: SystemTime) -> i64 {
    match a.duration_since(b) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Computes `current_age` for a cached record's headers at instant `now`.
///
/// Returns `None` if the mandatory `Date` header is absent or unparseable,
/// per spec: an entry without a usable `Date` is simply not usable for
/// freshness purposes.
pub fn current_age(headers: &HeaderMap, now: SystemTime) -> Option<i64> {
    let date = headers.get("date").and_then(crate::date::parse)?;
    let request_time = record::Record::request_time(headers)?;
    let response_time = record::Record::response_time(headers)?;

    let age_value: i64 =
        headers.get("age").and_then(|v| v.parse().ok()).unwrap_or(0);

    let apparent_age = diff_secs(response_time, date).max(0);
    let corrected_received_age = apparent_age.max(age_value);
    let response_delay = diff_secs(response_time, request_time);
    let corrected_initial_age = corrected_received_age + response_delay;
    let resident_time = diff_secs(now, response_time);
    Some(corrected_initial_age + resident_time)
}

/// Parses `max-age=N` out of a `Cache-Control` header value.
pub fn max_age(cache_control: &str) -> Option<i64> {
    cache_control.split(',').find_map(|directive| {
        let directive = directive.trim();
        let rest = directive
            .strip_prefix("max-age")
            .or_else(|| directive.strip_prefix("Max-Age"))?;
        let rest = rest.trim_start();
        let digits = rest.strip_prefix('=')?.trim_start();
        let digits: String =
            digits.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    })
}

/// Returns true iff `cache_control` contains the `no-cache` directive.
pub fn has_no_cache(cache_control: &str) -> bool {
    cache_control
        .split(',')
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-cache"))
}

/// Computes `freshness_lifetime` from a cached record's headers: `max-age`
/// takes priority over `Expires`. Returns `None` if neither is usable.
pub fn freshness_lifetime(headers: &HeaderMap) -> Option<i64> {
    if let Some(cc) = headers.get("cache-control") {
        if let Some(n) = max_age(cc) {
            return Some(n);
        }
    }
    let date = headers.get("date").and_then(crate::date::parse)?;
    let expires = headers.get("expires").and_then(crate::date::parse)?;
    Some(diff_secs(expires, date))
}

/// Returns `Some(true)` if the record is fresh, `Some(false)` if stale, or
/// `None` if freshness cannot be determined (no usable `Date`, and neither
/// `max-age` nor `Expires`).
pub fn is_fresh(headers: &HeaderMap, now: SystemTime) -> Option<bool> {
    let age = current_age(headers, now)?;
    let lifetime = freshness_lifetime(headers)?;
    Some(lifetime > age)
}
