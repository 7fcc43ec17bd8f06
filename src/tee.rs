//! A reader that mirrors every byte it yields into a [`RecordWriter`], so a
//! response body can be replayed to the caller and persisted to storage in
//! the same pass, without buffering the whole body first.

use std::io::{self, Read};

use crate::storage::RecordWriter;

/// Wraps an inner [`Read`], forwarding bytes to a [`RecordWriter`] as they
/// are read. The writer is closed exactly once, when the inner reader first
/// reports EOF. If the tee is dropped before EOF — the caller abandoned the
/// response partway through — the writer is dropped unclosed, and per
/// [`RecordWriter::close`]'s contract the partial record never becomes
/// visible.
pub struct Tee<R> {
    inner: R,
    writer: Option<Box<dyn RecordWriter>>,
}

impl<R: Read> Tee<R> {
    /// Creates a tee over `inner`, mirroring its output into `writer`.
    pub fn new(inner: R, writer: Box<dyn RecordWriter>) -> Self {
        Self { inner, writer: Some(writer) }
    }
}

impl<R: Read> Read for Tee<R> {
    /// Mirrors `inner`'s bytes into the writer. A storage failure on
    /// `write`/`close` abandons the writer silently — dropped rather than
    /// closed, so the partial record never becomes visible — and the bytes
    /// already read from `inner` are still returned to the caller; the live
    /// response must reach the caller intact even when storage can't keep up.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if let Some(writer) = self.writer.take() {
                if let Err(e) = writer.close() {
                    log::warn!("storage error closing a cache record, abandoning it: {e}");
                }
            }
            return Ok(0);
        }
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.write(&buf[..n]) {
                log::warn!("storage error writing a cache record, abandoning it: {e}");
                self.writer = None;
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        headers::HeaderMap,
        storage::{MemoryStore, Storage},
        subtype::Subtype,
    };
    use std::io::Cursor;

    #[test]
    fn mirrors_full_body_on_complete_read() {
        let store = MemoryStore::default();
        let writer =
            store.new_record("http://x/a", Subtype::None, HeaderMap::new()).unwrap();
        let mut tee = Tee::new(Cursor::new(b"response body".to_vec()), writer);

        let mut out = Vec::new();
        tee.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"response body");

        let stored = store.get_record_subtypes("http://x/a").unwrap();
        assert_eq!(stored, Some(vec![Subtype::None]));
    }

    #[test]
    fn abandoned_mid_read_never_becomes_visible() {
        let store = MemoryStore::default();
        let writer =
            store.new_record("http://x/a", Subtype::None, HeaderMap::new()).unwrap();
        let mut tee = Tee::new(Cursor::new(b"response body".to_vec()), writer);

        let mut buf = [0u8; 4];
        tee.read(&mut buf).unwrap();
        drop(tee);

        assert_eq!(store.get_record_subtypes("http://x/a").unwrap(), None);
    }

    /// A [`RecordWriter`] whose `write`/`close` always fail, standing in
    /// for an unreachable or full backing medium.
    struct FailingWriter;

    impl RecordWriter for FailingWriter {
        fn write(&mut self, _chunk: &[u8]) -> crate::error::Result<()> {
            Err(crate::error::CacheError::TruncatedIndex { path: "fake".to_string() })
        }
        fn close(self: Box<Self>) -> crate::error::Result<()> {
            Err(crate::error::CacheError::TruncatedIndex { path: "fake".to_string() })
        }
    }

    #[test]
    fn write_failure_is_abandoned_silently_and_body_still_delivered() {
        let mut tee =
            Tee::new(Cursor::new(b"response body".to_vec()), Box::new(FailingWriter));

        let mut out = Vec::new();
        tee.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"response body", "the live response must still reach the caller");
    }

    #[test]
    fn close_failure_at_eof_is_abandoned_silently() {
        let mut tee = Tee::new(Cursor::new(Vec::<u8>::new()), Box::new(FailingWriter));

        let mut out = Vec::new();
        let result = tee.read_to_end(&mut out);
        assert!(result.is_ok(), "a close failure must not surface as an io::Error");
    }
}
