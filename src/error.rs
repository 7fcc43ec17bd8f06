use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A generic error for the cache core.
///
/// No variant of this type is ever surfaced to the HTTP caller directly;
/// the pipeline (see [`crate::pipeline`]) downgrades every storage error to
/// a cache miss before it reaches a live request or response.
#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    /// The backing medium for a storage implementation was unreachable or
    /// returned an unexpected I/O failure.
    #[error("storage I/O error: {0}")]
    #[diagnostic(code(http_cache_core::io))]
    Io(#[from] std::io::Error),

    /// A record's headers-json or subtype-json could not be parsed.
    #[error("malformed cache record: {0}")]
    #[diagnostic(code(http_cache_core::malformed_record))]
    Json(#[from] serde_json::Error),

    /// The on-disk index file for a URL was missing a line a record
    /// requires (enabled byte, subtype line, or headers line).
    #[error("truncated index file at {path}")]
    #[diagnostic(code(http_cache_core::truncated_index))]
    TruncatedIndex {
        /// Path of the offending index file.
        path: String,
    },

    /// The URL passed as a cache key failed to parse as a URL.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::invalid_url))]
    InvalidUrl(#[from] url::ParseError),

    /// A handler returned a verdict the pipeline contract forbids (for
    /// example, a `Store` verdict from a handler not permitted to store).
    /// This indicates a bug in a `Handler` implementation, not bad input.
    #[error("handler {handler} returned a malformed verdict: {detail}")]
    #[diagnostic(code(http_cache_core::bad_verdict))]
    BadVerdict {
        /// Name of the offending handler.
        handler: &'static str,
        /// What about the verdict was invalid.
        detail: String,
    },
}
