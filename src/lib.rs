//! `http-cache-core` implements the freshness and validation rules of
//! RFC 2616 §13-§14 that govern when a cached HTTP response may be reused,
//! revalidated, or refetched, together with the durable storage layer that
//! backs it.
//!
//! This crate is the core of a client-side response cache: it classifies
//! outgoing requests and incoming responses into cache decisions and
//! persists/retrieves cached representations, but it does not perform HTTP
//! transport itself. A host integration (an adapter over `reqwest`, `surf`,
//! `ureq`, or similar — mirroring the teacher's `http-cache-reqwest` /
//! `http-cache-surf` crates) implements [`pipeline::RequestParts`] and
//! [`pipeline::ResponseParts`] over its own request/response types and
//! drives a [`pipeline::Pipeline`] around its transport calls.
//!
//! # Layout
//!
//! - [`date`] — RFC 1123 / RFC 850 / asctime wire date codec.
//! - [`headers`] — case-insensitive header map.
//! - [`subtype`] — the `Vary` fingerprint distinguishing representations of
//!   one URL.
//! - [`record`] — the cached-response unit and its synthetic bookkeeping
//!   headers.
//! - [`freshness`] — RFC 2616 §13.2.3/§13.2.4 age and freshness-lifetime
//!   arithmetic.
//! - [`storage`] — the [`storage::Storage`] contract plus
//!   [`storage::MemoryStore`] and [`storage::FileSystemStore`].
//! - [`tee`] — the streaming body/storage mirror.
//! - [`handlers`] — the two built-in decision handlers,
//!   [`handlers::CacheableRequest`] and [`handlers::EtagValidator`].
//! - [`pipeline`] — sequences the handlers around a [`storage::Storage`]
//!   backend.

pub mod date;
pub mod error;
pub mod freshness;
pub mod handlers;
pub mod headers;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod subtype;
pub mod tee;

pub use error::{CacheError, Result};
pub use handlers::{CacheableRequest, EtagValidator, Handler, HandlerId, Verdict};
pub use headers::HeaderMap;
pub use pipeline::{
    CachedResponse, Pipeline, PreSendOutcome, RequestConfig, RequestParts,
    ResponseOutcome, ResponseParts,
};
pub use record::Record;
pub use storage::{ContentReader, FileSystemStore, MemoryStore, RecordWriter, Storage};
pub use subtype::Subtype;
pub use tee::Tee;
