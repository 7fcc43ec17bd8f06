//! Reference [`Storage`] implementation: a concurrent map from `md5(url)`
//! to an ordered list of records, with content buffered in memory.

use std::{
    io::Cursor,
    sync::Arc,
    time::SystemTime,
};

use dashmap::DashMap;

use crate::{
    error::Result,
    headers::HeaderMap,
    subtype::Subtype,
};

use super::{validate_url, ContentReader, RecordWriter, Storage};

fn url_key(url: &str) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(url.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone)]
struct StoredRecord {
    subtype: Subtype,
    headers: HeaderMap,
    content: Vec<u8>,
    enabled: bool,
}

#[derive(Debug)]
struct UrlEntry {
    #[allow(dead_code)] // kept for parity with the source's `timestamp` field
    created_at: SystemTime,
    records: Vec<StoredRecord>,
}

#[derive(Debug)]
struct Inner {
    /// Reserved for a future eviction policy; this store is unbounded.
    #[allow(dead_code)]
    max_size: Option<u64>,
    buffer: DashMap<[u8; 16], UrlEntry>,
}

/// An in-memory [`Storage`] backed by a [`DashMap`], keyed by the MD5
/// digest of the request URL.
///
/// `max_size` is accepted and stored but never consulted: there is no
/// eviction component in this crate (see spec.md §9's Open Questions).
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store. `max_size` is a hint reserved for a future
    /// eviction policy and has no effect today.
    pub fn new(max_size: Option<u64>) -> Self {
        Self { inner: Arc::new(Inner { max_size, buffer: DashMap::new() }) }
    }

    fn finish_write(
        &self,
        url: String,
        subtype: Subtype,
        headers: HeaderMap,
        content: Vec<u8>,
    ) {
        let key = url_key(&url);
        let mut entry = self.inner.buffer.entry(key).or_insert_with(|| {
            UrlEntry { created_at: SystemTime::now(), records: Vec::new() }
        });
        for record in entry.records.iter_mut() {
            if record.enabled && record.subtype == subtype {
                record.enabled = false;
            }
        }
        entry.records.push(StoredRecord {
            subtype,
            headers,
            content,
            enabled: true,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(None)
    }
}

struct MemoryWriter {
    store: MemoryStore,
    url: String,
    subtype: Subtype,
    headers: HeaderMap,
    buffer: Vec<u8>,
}

impl RecordWriter for MemoryWriter {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.store.finish_write(self.url, self.subtype, self.headers, self.buffer);
        Ok(())
    }
}

impl Storage for MemoryStore {
    fn new_record(
        &self,
        url: &str,
        subtype: Subtype,
        headers: HeaderMap,
    ) -> Result<Box<dyn RecordWriter>> {
        validate_url(url)?;
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            url: url.to_string(),
            subtype,
            headers,
            buffer: Vec::new(),
        }))
    }

    fn get_record(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<(HeaderMap, ContentReader)>> {
        validate_url(url)?;
        let key = url_key(url);
        let found = self.inner.buffer.get(&key).and_then(|entry| {
            entry
                .records
                .iter()
                .find(|r| r.enabled && &r.subtype == subtype)
                .map(|r| (r.headers.clone(), r.content.clone()))
        });
        Ok(found.map(|(headers, content)| {
            (headers, Box::new(Cursor::new(content)) as ContentReader)
        }))
    }

    fn get_record_headers(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<HeaderMap>> {
        validate_url(url)?;
        let key = url_key(url);
        Ok(self.inner.buffer.get(&key).and_then(|entry| {
            entry
                .records
                .iter()
                .find(|r| r.enabled && &r.subtype == subtype)
                .map(|r| r.headers.clone())
        }))
    }

    fn get_record_content(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<ContentReader>> {
        validate_url(url)?;
        let key = url_key(url);
        Ok(self.inner.buffer.get(&key).and_then(|entry| {
            entry
                .records
                .iter()
                .find(|r| r.enabled && &r.subtype == subtype)
                .map(|r| {
                    Box::new(Cursor::new(r.content.clone())) as ContentReader
                })
        }))
    }

    fn get_record_subtypes(&self, url: &str) -> Result<Option<Vec<Subtype>>> {
        validate_url(url)?;
        let key = url_key(url);
        Ok(self.inner.buffer.get(&key).map(|entry| {
            entry
                .records
                .iter()
                .filter(|r| r.enabled)
                .map(|r| r.subtype.clone())
                .collect()
        }))
    }

    fn purge_record(&self, url: &str, subtype: &Subtype) -> Result<bool> {
        validate_url(url)?;
        let key = url_key(url);
        Ok(match self.inner.buffer.get_mut(&key) {
            Some(mut entry) => {
                let mut purged = false;
                for record in entry.records.iter_mut() {
                    if record.enabled && &record.subtype == subtype {
                        record.enabled = false;
                        purged = true;
                    }
                }
                purged
            }
            None => false,
        })
    }
}
