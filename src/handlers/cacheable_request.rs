//! The primary cache handler: consults `Cache-Control`/`Expires` freshness
//! on the request side, and `Vary`-driven subtype construction plus
//! `Cache-Control`/`Expires` presence on the response side.

use std::{collections::HashMap, time::SystemTime};

use crate::{
    error::Result,
    freshness,
    headers::HeaderMap,
    pipeline::{RequestParts, ResponseParts},
    subtype::Subtype,
};

use super::{Handler, HandlerId, Verdict};

/// Decides fetch/purge on requests and store on responses, per RFC 2616
/// §13.2/§13.4/§14.44.
///
/// `vary_from_request` controls where `handle_response` reads the values
/// for a `Vary`-derived subtype's header pairs. The original implementation
/// reads them from the *response* headers, which only coincidentally
/// matches the request when the origin echoes the varying header back —
/// RFC 2616 §14.44 specifies the *selecting request*'s headers instead. The
/// default (`false`) preserves the source's behavior; set `true` to read
/// from the request.
#[derive(Debug, Clone)]
pub struct CacheableRequest {
    vary_from_request: bool,
}

impl CacheableRequest {
    /// Creates a handler. `vary_from_request = false` reproduces the
    /// original (response-header) behavior; `true` reads the selecting
    /// request's headers instead, per RFC 2616 §14.44.
    pub fn new(vary_from_request: bool) -> Self {
        Self { vary_from_request }
    }
}

impl Default for CacheableRequest {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Handler for CacheableRequest {
    fn id(&self) -> HandlerId {
        HandlerId::CacheableRequest
    }

    fn handle_request(
        &self,
        req: &mut dyn RequestParts,
        subtypes: Option<&HashMap<Subtype, HeaderMap>>,
        now: SystemTime,
    ) -> Result<Option<Verdict>> {
        let Some(subtypes) = subtypes else { return Ok(None) };

        let fallback = subtypes.get(&Subtype::None);
        let matched = subtypes.iter().find(|(subtype, _)| {
            !matches!(subtype, Subtype::None)
                && subtype.matches_request_headers(req.headers())
        });

        let (subtype, cached_headers) = match matched.or_else(|| {
            fallback.map(|headers| (&Subtype::None, headers))
        }) {
            Some(pair) => pair,
            None => return Ok(None),
        };

        if let Some(cc) = cached_headers.get("cache-control") {
            if freshness::has_no_cache(cc) {
                return Ok(None);
            }
        }

        if freshness::freshness_lifetime(cached_headers).is_none() {
            return Ok(None);
        }

        let url = req.full_url().to_string();
        let subtype = subtype.clone();
        match freshness::is_fresh(cached_headers, now) {
            None => Ok(None),
            Some(true) => Ok(Some(Verdict::Fetch { url, subtype })),
            Some(false) => Ok(Some(Verdict::Purge { url, subtype })),
        }
    }

    fn handle_response(
        &self,
        resp: &dyn ResponseParts,
        now: SystemTime,
    ) -> Result<Option<Verdict>> {
        if !matches!(resp.request_method(), "GET" | "HEAD") || resp.status_code() >= 500
        {
            return Ok(None);
        }

        if let Some(cc) = resp.headers().get("cache-control") {
            if freshness::has_no_cache(cc) {
                return Ok(None);
            }
        }

        let has_max_age = resp
            .headers()
            .get("cache-control")
            .and_then(freshness::max_age)
            .is_some();
        let expires_raw = resp.headers().get("expires").map(str::to_string);
        if !has_max_age && expires_raw.is_none() {
            return Ok(None);
        }

        let vary = resp.headers().get("vary").map(str::trim).map(str::to_string);
        let subtype = match vary.as_deref() {
            Some("*") => return Ok(None),
            Some(names) if !names.is_empty() => {
                let source = if self.vary_from_request {
                    resp.request_headers()
                } else {
                    resp.headers()
                };
                let mut pairs = Vec::new();
                for name in names.split(',') {
                    let name = name.trim().to_ascii_lowercase();
                    match source.get(&name) {
                        Some(value) => pairs.push((name, value.to_string())),
                        None => return Ok(None),
                    }
                }
                Subtype::from_pairs(pairs)
            }
            _ => Subtype::None,
        };

        if let Some(expires) = expires_raw.as_deref() {
            match crate::date::parse(expires) {
                Some(expires) if expires <= now => return Ok(None),
                _ => {}
            }
        }

        Ok(Some(Verdict::Store { url: resp.url().to_string(), subtype }))
    }
}
