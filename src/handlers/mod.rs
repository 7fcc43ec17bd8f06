//! The decision logic run by the [`crate::pipeline::Pipeline`]: a fixed,
//! ordered pair of handlers, each able to classify a request or response
//! into a [`Verdict`].

pub mod cacheable_request;
pub mod etag_validator;

use std::{collections::HashMap, time::SystemTime};

pub use cacheable_request::CacheableRequest;
pub use etag_validator::EtagValidator;

use crate::{
    error::Result,
    headers::HeaderMap,
    pipeline::{RequestParts, ResponseParts},
    subtype::Subtype,
};

/// Identifies one of the two built-in handlers, for use in
/// [`crate::pipeline::RequestConfig::skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerId {
    CacheableRequest,
    EtagValidator,
}

/// The classification a handler assigns to a request or response. Returned
/// wrapped in `Option`; `None` means "this handler has no opinion, try the
/// next one".
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// The request was mutated in place (e.g. an `If-None-Match` header was
    /// attached) and should be sent as modified.
    Request,
    /// Serve a synthesized response from storage instead of contacting the
    /// transport.
    Fetch { url: String, subtype: Subtype },
    /// The cached record at `(url, subtype)` is stale; remove it and
    /// proceed with the request as normal.
    Purge { url: String, subtype: Subtype },
    /// Persist the in-flight response at `(url, subtype)`.
    Store { url: String, subtype: Subtype },
}

/// A cache decision handler, run in a fixed order by the pipeline.
///
/// `handle_request` receives every enabled subtype known for the request's
/// URL, headers included (`None` if the URL is unknown to storage).
/// `handle_response` is consulted after a live response has `Date` parsed
/// successfully. Both take an explicit `now`, the same way the teacher's
/// `http-cache-semantics::CachePolicy::before_request` takes its clock as a
/// parameter rather than reading it internally — this keeps freshness
/// decisions deterministic and testable against historical dates instead of
/// tying them to the wall clock at the moment the handler runs.
pub trait Handler: std::fmt::Debug + Send + Sync {
    fn id(&self) -> HandlerId;

    fn handle_request(
        &self,
        req: &mut dyn RequestParts,
        subtypes: Option<&HashMap<Subtype, HeaderMap>>,
        now: SystemTime,
    ) -> Result<Option<Verdict>>;

    fn handle_response(
        &self,
        resp: &dyn ResponseParts,
        now: SystemTime,
    ) -> Result<Option<Verdict>>;
}
