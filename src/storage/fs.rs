//! A durable [`Storage`] backed by per-URL append-only index files and
//! sidecar content files, sharded two levels deep under `base_dir`.
//!
//! For a URL whose MD5 digest hex-encodes to `md5hex` (32 hex chars), with
//! `aa = md5hex[0..2]` and `aabbb = md5hex[0..5]`:
//!
//! ```text
//! base_dir/aa/aabbb/md5hex            index file
//! base_dir/aa/aabbb/md5hex:smd5hex    content file (smd5hex = md5(subtype json))
//! ```
//!
//! The index file's optional first line is `# <url>` (skipped by readers).
//! Every record after it is exactly three lines: an `0`/`1` enabled byte, the
//! canonical subtype JSON, and the headers JSON (with `_request_time` /
//! `_response_time` written as ISO-8601, matching the original format).
//! Inserting a record tombstones any existing enabled record of the same
//! subtype by overwriting its enabled byte in place, then appends the new
//! record at EOF — the file is otherwise append-only.

use std::{
    fs,
    io::{self, BufRead, BufReader, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use dashmap::DashMap;

use crate::{
    date,
    error::{CacheError, Result},
    headers::HeaderMap,
    record,
    subtype::Subtype,
};

use super::{validate_url, ContentReader, RecordWriter, Storage};

fn md5_hex(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Rewrites the synthetic time headers between their in-memory RFC 1123
/// form and the ISO-8601 form this store writes to disk.
fn with_times_reformatted(
    headers: &HeaderMap,
    to_iso: bool,
) -> Result<HeaderMap> {
    let mut out = headers.clone();
    for name in [record::REQUEST_TIME, record::RESPONSE_TIME] {
        let Some(value) = headers.get(name) else { continue };
        let instant = if to_iso {
            date::parse(value)
        } else {
            date::parse_iso8601(value)
        };
        let Some(instant) = instant else { continue };
        let rendered =
            if to_iso { date::format_iso8601(instant) } else { date::format(instant) };
        out.insert(name, rendered);
    }
    Ok(out)
}

struct IndexRecord {
    enabled_byte_offset: u64,
    enabled: bool,
    subtype: Subtype,
    headers: HeaderMap,
}

/// A durable [`Storage`] rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    base_dir: PathBuf,
    /// Reserved for a future eviction policy; this store is unbounded.
    #[allow(dead_code)]
    max_size: Option<u64>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FileSystemStore {
    /// Opens (creating if necessary) a store rooted at `base_dir`.
    /// `max_size` is a hint reserved for a future eviction policy and has no
    /// effect today.
    pub fn new(base_dir: impl Into<PathBuf>, max_size: Option<u64>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, max_size, locks: Arc::new(DashMap::new()) })
    }

    fn shard_dir(&self, hash_hex: &str) -> PathBuf {
        self.base_dir.join(&hash_hex[0..2]).join(&hash_hex[0..5])
    }

    fn index_path(&self, hash_hex: &str) -> PathBuf {
        self.shard_dir(hash_hex).join(hash_hex)
    }

    fn content_path(&self, hash_hex: &str, subtype: &Subtype) -> PathBuf {
        let smd5 = md5_hex(subtype.canonical_string().as_bytes());
        self.shard_dir(hash_hex).join(format!("{hash_hex}:{smd5}"))
    }

    fn url_lock(&self, hash_hex: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(hash_hex.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reads every physical record in the index, in file order, folding
    /// on-disk ISO-8601 times back to the crate's RFC 1123 convention.
    fn read_index(&self, hash_hex: &str) -> Result<Vec<IndexRecord>> {
        let path = self.index_path(hash_hex);
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        let mut offset: u64 = 0;
        let mut reader = BufReader::new(&mut file);
        loop {
            let mut enabled_line = String::new();
            let n = reader.read_line(&mut enabled_line)?;
            if n == 0 {
                break;
            }
            if enabled_line.starts_with('#') {
                offset += n as u64;
                continue;
            }
            let enabled_byte_offset = offset;
            offset += n as u64;

            let mut subtype_line = String::new();
            let n2 = reader.read_line(&mut subtype_line)?;
            if n2 == 0 {
                return Err(CacheError::TruncatedIndex {
                    path: path.display().to_string(),
                });
            }
            offset += n2 as u64;

            let mut headers_line = String::new();
            let n3 = reader.read_line(&mut headers_line)?;
            if n3 == 0 {
                return Err(CacheError::TruncatedIndex {
                    path: path.display().to_string(),
                });
            }
            offset += n3 as u64;

            let enabled = match enabled_line.trim_end() {
                "0" => false,
                "1" => true,
                other => {
                    return Err(CacheError::TruncatedIndex {
                        path: format!(
                            "{} (expected 0/1, found {other:?})",
                            path.display()
                        ),
                    })
                }
            };
            let subtype: Subtype = serde_json::from_str(subtype_line.trim_end())?;
            let on_disk_headers: HeaderMap =
                serde_json::from_str(headers_line.trim_end())?;
            let headers = with_times_reformatted(&on_disk_headers, false)?;

            records.push(IndexRecord { enabled_byte_offset, enabled, subtype, headers });
        }
        Ok(records)
    }

    fn enabled_record(
        &self,
        hash_hex: &str,
        subtype: &Subtype,
    ) -> Result<Option<IndexRecord>> {
        Ok(self
            .read_index(hash_hex)?
            .into_iter()
            .find(|r| r.enabled && &r.subtype == subtype))
    }

    /// Tombstones every enabled record matching `subtype`, then appends a
    /// fresh enabled record for it. `headers` must already carry ISO-8601
    /// synthetic times.
    fn insert_record(
        &self,
        hash_hex: &str,
        url: &str,
        subtype: &Subtype,
        headers_on_disk: &HeaderMap,
    ) -> Result<()> {
        let dir = self.shard_dir(hash_hex);
        fs::create_dir_all(&dir)?;
        let path = self.index_path(hash_hex);
        let is_new = !path.exists();

        let mut file =
            fs::OpenOptions::new().create(true).read(true).write(true).open(&path)?;
        if is_new {
            writeln!(file, "# {url}")?;
        }

        for record in self.read_index(hash_hex)?.into_iter().filter(|r| r.enabled) {
            if &record.subtype == subtype {
                file.seek(SeekFrom::Start(record.enabled_byte_offset))?;
                file.write_all(b"0")?;
            }
        }

        file.seek(SeekFrom::End(0))?;
        writeln!(file, "1")?;
        writeln!(file, "{}", subtype.canonical_string())?;
        writeln!(file, "{}", serde_json::to_string(headers_on_disk)?)?;
        Ok(())
    }
}

struct FsWriter {
    store: FileSystemStore,
    url: String,
    url_hash: String,
    subtype: Subtype,
    headers: HeaderMap,
    tmp: tempfile::NamedTempFile,
}

impl RecordWriter for FsWriter {
    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.tmp.write_all(chunk)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let final_path = self.store.content_path(&self.url_hash, &self.subtype);
        self.tmp.persist(&final_path).map_err(|e| e.error)?;

        let lock = self.store.url_lock(&self.url_hash);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let on_disk = with_times_reformatted(&self.headers, true)?;
        self.store.insert_record(&self.url_hash, &self.url, &self.subtype, &on_disk)
    }
}

impl Storage for FileSystemStore {
    fn new_record(
        &self,
        url: &str,
        subtype: Subtype,
        headers: HeaderMap,
    ) -> Result<Box<dyn RecordWriter>> {
        validate_url(url)?;
        let url_hash = md5_hex(url.as_bytes());
        let dir = self.shard_dir(&url_hash);
        fs::create_dir_all(&dir)?;
        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        Ok(Box::new(FsWriter {
            store: self.clone(),
            url: url.to_string(),
            url_hash,
            subtype,
            headers,
            tmp,
        }))
    }

    fn get_record(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<(HeaderMap, ContentReader)>> {
        validate_url(url)?;
        let hash_hex = md5_hex(url.as_bytes());
        let lock = self.url_lock(&hash_hex);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        match self.enabled_record(&hash_hex, subtype)? {
            None => Ok(None),
            Some(record) => {
                let file = fs::File::open(self.content_path(&hash_hex, subtype))?;
                Ok(Some((record.headers, Box::new(file) as ContentReader)))
            }
        }
    }

    fn get_record_headers(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<HeaderMap>> {
        validate_url(url)?;
        let hash_hex = md5_hex(url.as_bytes());
        let lock = self.url_lock(&hash_hex);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(self.enabled_record(&hash_hex, subtype)?.map(|r| r.headers))
    }

    fn get_record_content(
        &self,
        url: &str,
        subtype: &Subtype,
    ) -> Result<Option<ContentReader>> {
        validate_url(url)?;
        let hash_hex = md5_hex(url.as_bytes());
        let lock = self.url_lock(&hash_hex);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        match self.enabled_record(&hash_hex, subtype)? {
            None => Ok(None),
            Some(_) => {
                let file = fs::File::open(self.content_path(&hash_hex, subtype))?;
                Ok(Some(Box::new(file) as ContentReader))
            }
        }
    }

    fn get_record_subtypes(&self, url: &str) -> Result<Option<Vec<Subtype>>> {
        validate_url(url)?;
        let hash_hex = md5_hex(url.as_bytes());
        if !self.index_path(&hash_hex).exists() {
            return Ok(None);
        }
        let lock = self.url_lock(&hash_hex);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(Some(
            self.read_index(&hash_hex)?
                .into_iter()
                .filter(|r| r.enabled)
                .map(|r| r.subtype)
                .collect(),
        ))
    }

    fn purge_record(&self, url: &str, subtype: &Subtype) -> Result<bool> {
        validate_url(url)?;
        let hash_hex = md5_hex(url.as_bytes());
        let lock = self.url_lock(&hash_hex);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let path = self.index_path(&hash_hex);
        if !path.exists() {
            return Ok(false);
        }
        let records = self.read_index(&hash_hex)?;
        let mut file = fs::OpenOptions::new().write(true).open(&path)?;
        let mut purged = false;
        for record in records {
            if record.enabled && &record.subtype == subtype {
                file.seek(SeekFrom::Start(record.enabled_byte_offset))?;
                file.write_all(b"0")?;
                purged = true;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn store() -> (tempfile::TempDir, FileSystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), None).unwrap();
        (dir, store)
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let (_dir, store) = store();
        let mut w =
            store.new_record("http://x/a", Subtype::None, HeaderMap::new()).unwrap();
        w.write(b"hello, ").unwrap();
        w.write(b"world").unwrap();
        w.close().unwrap();

        let (_, mut reader) =
            store.get_record("http://x/a", &Subtype::None).unwrap().unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello, world");
    }

    #[test]
    fn new_record_tombstones_prior_same_subtype_in_place() {
        let (_dir, store) = store();
        for body in ["v1", "v2"] {
            let mut w = store
                .new_record("http://x/a", Subtype::None, HeaderMap::new())
                .unwrap();
            w.write(body.as_bytes()).unwrap();
            w.close().unwrap();
        }
        let hash_hex = md5_hex(b"http://x/a");
        let records = store.read_index(&hash_hex).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].enabled);
        assert!(records[1].enabled);

        let (_, mut reader) =
            store.get_record("http://x/a", &Subtype::None).unwrap().unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "v2");
    }

    #[test]
    fn purge_is_idempotent_and_durable_across_reopen() {
        let (dir, store) = store();
        let mut w =
            store.new_record("http://x/a", Subtype::None, HeaderMap::new()).unwrap();
        w.write(b"body").unwrap();
        w.close().unwrap();

        assert!(store.purge_record("http://x/a", &Subtype::None).unwrap());
        assert!(!store.purge_record("http://x/a", &Subtype::None).unwrap());

        let reopened = FileSystemStore::new(dir.path(), None).unwrap();
        assert!(reopened
            .get_record("http://x/a", &Subtype::None)
            .unwrap()
            .is_none());
        assert_eq!(reopened.get_record_subtypes("http://x/a").unwrap(), Some(vec![]));
    }

    #[test]
    fn unknown_url_returns_none_for_subtypes() {
        let (_dir, store) = store();
        assert!(store.get_record_subtypes("http://x/unknown").unwrap().is_none());
    }

    #[test]
    fn distinct_vary_subtypes_coexist() {
        let (_dir, store) = store();
        let en = Subtype::from_pairs([("accept-language", "en")]);
        let fr = Subtype::from_pairs([("accept-language", "fr")]);
        for (subtype, body) in [(en.clone(), "english"), (fr.clone(), "french")] {
            let mut w =
                store.new_record("http://x/a", subtype, HeaderMap::new()).unwrap();
            w.write(body.as_bytes()).unwrap();
            w.close().unwrap();
        }
        let subtypes = store.get_record_subtypes("http://x/a").unwrap().unwrap();
        assert_eq!(subtypes.len(), 2);

        let (_, mut reader) = store.get_record("http://x/a", &en).unwrap().unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "english");
    }

    #[test]
    fn abandoned_writer_leaves_no_visible_record() {
        let (_dir, store) = store();
        let w =
            store.new_record("http://x/a", Subtype::None, HeaderMap::new()).unwrap();
        drop(w);
        assert!(store.get_record_subtypes("http://x/a").unwrap().is_none());
    }

    #[test]
    fn synthetic_times_round_trip_through_iso8601_on_disk() {
        let (_dir, store) = store();
        let mut headers = HeaderMap::new();
        let t = date::parse("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        record::Record::set_request_time(&mut headers, t);
        record::Record::set_response_time(&mut headers, t);

        let mut w = store.new_record("http://x/a", Subtype::None, headers).unwrap();
        w.write(b"body").unwrap();
        w.close().unwrap();

        let stored = store.get_record_headers("http://x/a", &Subtype::None).unwrap().unwrap();
        assert_eq!(record::Record::request_time(&stored), Some(t));
        assert_eq!(record::Record::response_time(&stored), Some(t));

        let hash_hex = md5_hex(b"http://x/a");
        let raw = fs::read_to_string(store.index_path(&hash_hex)).unwrap();
        assert!(raw.contains("1994-11-06T08:49:37Z"));
    }
}
