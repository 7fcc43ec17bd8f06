//! The storage abstraction: a contract for a per-URL, per-subtype record
//! store, plus the two concrete backends this crate ships.

pub mod fs;
pub mod memory;

use std::io::Read;

use crate::{error::Result, headers::HeaderMap, subtype::Subtype};

pub use fs::FileSystemStore;
pub use memory::MemoryStore;

/// Validates that `url` parses as a URL, returning [`CacheError::InvalidUrl`]
/// if not. The cache key itself remains the exact request URL string (per
/// spec), but every concrete [`Storage`] implementation runs new/looked-up
/// keys through this check first, the way `http-cache-types`'s request-key
/// handling validates with the `url` crate before ever hashing.
pub fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url)?;
    Ok(())
}

/// A reader over a record's content, returned by [`Storage::get_record`]
/// and [`Storage::get_record_content`].
pub type ContentReader = Box<dyn Read + Send>;

/// An open record accumulating bytes written between [`Storage::new_record`]
/// and `close`.
///
/// Writing before `close` is cumulative and order-preserving. If `close` is
/// never called the record must not become visible — a dropped writer
/// discards whatever was buffered.
pub trait RecordWriter: Send {
    /// Appends `chunk` to the record being written.
    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Finalizes the record, making it visible and superseding any prior
    /// enabled record with the same `(url, subtype)`.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A per-URL, per-subtype record store.
///
/// Implementations must tolerate concurrent `new_record`/`get_record`/
/// `purge_record` calls on different URLs without corrupting state, and
/// must serialize concurrent mutation of the *same* URL such that the last
/// `close` to complete wins (superseding earlier enabled records sharing
/// that `(url, subtype)`).
pub trait Storage: std::fmt::Debug + Send + Sync {
    /// Opens a new record for `(url, subtype)`. The record is not visible
    /// to readers until the returned writer's `close` is called.
    fn new_record(
        &self,
        url: &str,
        subtype: Subtype,
        headers: HeaderMap,
    ) -> Result<Box<dyn RecordWriter>>;

    /// Returns the headers and a content reader for the enabled record at
    /// `(url, subtype)`, or `None` if no such enabled record exists.
    fn get_record(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<(HeaderMap, ContentReader)>>;

    /// Headers-only accessor, independent of content size.
    fn get_record_headers(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<HeaderMap>>;

    /// Content-only accessor, independent of header size.
    fn get_record_content(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<ContentReader>>;

    /// All enabled subtypes known for `url`, or `None` if `url` is
    /// entirely unknown to the store. A known URL with zero enabled
    /// records returns `Some(vec![])`.
    fn get_record_subtypes(&self, url: &str) -> Result<Option<Vec<Subtype>>>;

    /// Tombstones the enabled record at `(url, subtype)`, if any. Returns
    /// whether a record was disabled. Idempotent: a second call on an
    /// already-purged subtype returns `false`.
    fn purge_record(&self, url: &str, subtype: &Subtype) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_rejects_non_urls() {
        assert!(validate_url("http://example.com/a").is_ok());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn concrete_stores_reject_malformed_url_on_new_record() {
        use crate::subtype::Subtype;

        let memory = MemoryStore::default();
        assert!(memory
            .new_record("not a url", Subtype::None, HeaderMap::new())
            .is_err());

        let dir = tempfile::tempdir().unwrap();
        let fs_store = FileSystemStore::new(dir.path(), None).unwrap();
        assert!(fs_store
            .new_record("not a url", Subtype::None, HeaderMap::new())
            .is_err());
    }
}
