//! Sequences the two built-in [`Handler`]s around a [`Storage`] backend:
//! the pre-send half decides whether a request can be answered from cache
//! or must go to the transport, the response half decides whether an
//! incoming response should be persisted or (on a `304`) replaced with the
//! cached body.

use std::{
    collections::HashSet,
    sync::Arc,
    time::SystemTime,
};

use crate::{
    error::{CacheError, Result},
    handlers::{CacheableRequest, EtagValidator, Handler, HandlerId, Verdict},
    headers::HeaderMap,
    record,
    storage::{ContentReader, RecordWriter, Storage},
};

/// The fields this crate reads or writes on a host's outgoing request type.
pub trait RequestParts {
    /// The exact URL used as the cache key.
    fn full_url(&self) -> &str;
    /// The HTTP method, e.g. `"GET"`.
    fn method(&self) -> &str;
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn config(&self) -> &RequestConfig;
}

/// The fields this crate reads or writes on a host's incoming response
/// type. `request_method`/`request_headers` give access to the originating
/// request, mirroring the source's `resp.request` reference.
pub trait ResponseParts {
    fn url(&self) -> &str;
    fn status_code(&self) -> u16;
    fn headers(&self) -> &HeaderMap;
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn request_method(&self) -> &str;
    fn request_headers(&self) -> &HeaderMap;
}

/// Per-request cache configuration, attached to a [`RequestParts`]
/// implementor.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Handlers to bypass for this request, by identity.
    pub skip: HashSet<HandlerId>,
}

/// A response synthesized entirely from storage.
pub struct CachedResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub content: ContentReader,
}

/// What the pipeline decided to do with an outgoing request.
pub enum PreSendOutcome {
    /// Proceed to the transport. `request_time` must be passed back into
    /// [`Pipeline::response`] so the eventual response can be stamped with
    /// an accurate response delay.
    Continue { request_time: SystemTime },
    /// Skip the transport entirely; serve this response.
    ServeFromCache(CachedResponse),
}

/// What the pipeline decided to do with an incoming response.
pub enum ResponseOutcome {
    /// No handler had an opinion, or `Date` was missing/unparseable.
    Unchanged,
    /// Persist the response as it streams to the caller. Wrap the
    /// response's body reader in [`crate::tee::Tee`] with this writer.
    Store(Box<dyn RecordWriter>),
    /// Revalidation succeeded (`304`); replace the live response with this
    /// cached one and mark it `from_cache`.
    Fetched(CachedResponse),
}

/// Sequences [`CacheableRequest`] then [`EtagValidator`] around a
/// [`Storage`] backend.
pub struct Pipeline {
    storage: Arc<dyn Storage>,
    handlers: Vec<Box<dyn Handler>>,
}

impl Pipeline {
    /// Builds a pipeline with the source-compatible `vary_from_request =
    /// false` default (see [`CacheableRequest`]).
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_vary_from_request(storage, false)
    }

    /// Builds a pipeline with an explicit choice for
    /// [`CacheableRequest::new`]'s `vary_from_request` flag.
    pub fn with_vary_from_request(
        storage: Arc<dyn Storage>,
        vary_from_request: bool,
    ) -> Self {
        Self {
            storage,
            handlers: vec![
                Box::new(CacheableRequest::new(vary_from_request)),
                Box::new(EtagValidator),
            ],
        }
    }

    /// Gathers every enabled subtype's headers for `url`. A storage error at
    /// any point here is treated as a cache miss for that subtype (or the
    /// whole URL), per spec.md's "storage errors are treated as cache miss
    /// on read" — it never aborts the caller's request.
    fn gather_subtypes(
        &self,
        url: &str,
    ) -> Option<std::collections::HashMap<crate::subtype::Subtype, HeaderMap>> {
        let subtypes = match self.storage.get_record_subtypes(url) {
            Ok(subtypes) => subtypes?,
            Err(e) => {
                log::warn!("storage error listing subtypes for {url}: {e}");
                return None;
            }
        };
        let mut map = std::collections::HashMap::new();
        for subtype in subtypes {
            match self.storage.get_record_headers(url, &subtype) {
                Ok(Some(headers)) => {
                    map.insert(subtype, headers);
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!(
                        "storage error reading headers for {url} ({subtype:?}): {e}"
                    );
                }
            }
        }
        Some(map)
    }

    /// Runs the pre-send half of the pipeline. Call before dispatching
    /// `req` to the transport. `now` is the clock reading freshness is
    /// evaluated against and the instant stamped as `_request_time` when
    /// the request proceeds to the transport — passed in explicitly the
    /// way `http-cache-semantics::CachePolicy::before_request` takes its
    /// clock, so a caller can replay historical scenarios deterministically
    /// instead of this pipeline reading the wall clock itself.
    pub fn pre_send(
        &self,
        req: &mut dyn RequestParts,
        now: SystemTime,
    ) -> Result<PreSendOutcome> {
        let subtypes = self.gather_subtypes(req.full_url());
        let skip = req.config().skip.clone();

        let mut outcome = None;
        for handler in &self.handlers {
            if skip.contains(&handler.id()) {
                continue;
            }
            let Some(verdict) = handler.handle_request(req, subtypes.as_ref(), now)?
            else {
                continue;
            };
            log::debug!(
                "handler {:?} matched request for {}: {:?}",
                handler.id(),
                req.full_url(),
                verdict
            );
            match verdict {
                Verdict::Request => {}
                Verdict::Fetch { url, subtype } => {
                    match self.storage.get_record(&url, &subtype) {
                        Ok(Some((headers, content))) => {
                            let status_code = record::Record::status_code(&headers);
                            outcome = Some(PreSendOutcome::ServeFromCache(
                                CachedResponse { status_code, headers, content },
                            ));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::warn!(
                                "storage error fetching {url} on request path: {e}; treating as a cache miss"
                            );
                        }
                    }
                }
                Verdict::Purge { url, subtype } => {
                    if let Err(e) = self.storage.purge_record(&url, &subtype) {
                        log::warn!("storage error purging {url}: {e}");
                    }
                }
                Verdict::Store { .. } => {
                    return Err(CacheError::BadVerdict {
                        handler: "handle_request",
                        detail: "returned a Store verdict".to_string(),
                    })
                }
            }
            break;
        }

        Ok(outcome.unwrap_or(PreSendOutcome::Continue { request_time: now }))
    }

    /// Runs the response half of the pipeline. `already_from_cache` must be
    /// `true` only for a response [`Pipeline::pre_send`] itself synthesized
    /// — re-running handlers on it would be meaningless. `now` is the
    /// instant the response was fully received (or the store decision was
    /// made); it is both the clock `CacheableRequest::handle_response`
    /// evaluates `Expires` against and the value stamped as
    /// `_response_time` on a stored record.
    pub fn response(
        &self,
        resp: &dyn ResponseParts,
        request_time: SystemTime,
        now: SystemTime,
        already_from_cache: bool,
    ) -> Result<ResponseOutcome> {
        if already_from_cache {
            return Ok(ResponseOutcome::Unchanged);
        }
        let Some(date) = resp.headers().get("date") else {
            return Ok(ResponseOutcome::Unchanged);
        };
        if crate::date::parse(date).is_none() {
            return Ok(ResponseOutcome::Unchanged);
        }

        for handler in &self.handlers {
            let Some(verdict) = handler.handle_response(resp, now)? else { continue };
            log::debug!(
                "handler {:?} matched response for {}: {:?}",
                handler.id(),
                resp.url(),
                verdict
            );
            return match verdict {
                Verdict::Store { url, subtype } => {
                    let mut headers = resp.headers().clone();
                    record::Record::set_request_time(&mut headers, request_time);
                    record::Record::set_response_time(&mut headers, now);
                    record::Record::set_status_code(&mut headers, resp.status_code());
                    match self.storage.new_record(&url, subtype, headers) {
                        Ok(writer) => Ok(ResponseOutcome::Store(writer)),
                        Err(e) => {
                            log::warn!(
                                "storage error opening a record for {url}: {e}; \
                                 the live response is delivered uncached"
                            );
                            Ok(ResponseOutcome::Unchanged)
                        }
                    }
                }
                Verdict::Fetch { url, subtype } => {
                    match self.storage.get_record(&url, &subtype) {
                        Ok(Some((headers, content))) => {
                            let status_code = record::Record::status_code(&headers);
                            Ok(ResponseOutcome::Fetched(CachedResponse {
                                status_code,
                                headers,
                                content,
                            }))
                        }
                        Ok(None) => {
                            log::warn!(
                                "handler {:?} emitted fetch for {} but no record was found",
                                handler.id(),
                                url
                            );
                            Ok(ResponseOutcome::Unchanged)
                        }
                        Err(e) => {
                            log::warn!(
                                "storage error fetching {url} on response path: {e}; treating as a cache miss"
                            );
                            Ok(ResponseOutcome::Unchanged)
                        }
                    }
                }
                Verdict::Request | Verdict::Purge { .. } => Err(CacheError::BadVerdict {
                    handler: "handle_response",
                    detail: "returned a Request or Purge verdict".to_string(),
                }),
            };
        }
        Ok(ResponseOutcome::Unchanged)
    }
}
