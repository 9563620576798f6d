use std::{
    io::{self, Read, Seek, SeekFrom},
    time::Instant,
};

use tracing::{error, info, span, Level};

use crate::{
    adapters::ObjectStore,
    mem::MemFile,
    model::fs::{FileInfo, FsError},
};

/// Read session over a local copy of an object.
///
/// The whole object is fetched when the session opens; reads and seeks
/// after that never touch the store, so later changes to the remote object
/// are not visible through an open session.
#[derive(Debug)]
pub struct ReadFile {
    info: FileInfo,
    buffer: MemFile,
}

impl ReadFile {
    /// Fetches `key` into memory. A missing object comes back as
    /// [`FsError::NotFound`] before anything else is requested.
    pub(crate) fn open(
        store: &dyn ObjectStore,
        key: &str,
        deadline: Option<Instant>,
    ) -> Result<Self, FsError> {
        let span = span!(Level::INFO, "read_open", context = "read_open");
        let _e = span.enter();
        info!(key = key, "called");

        let mut source = store.open_reader(key, deadline)?;

        // Attributes are mandatory; the source is dropped, and closed, on failure.
        let attrs = store.attributes(key, deadline).map_err(|err| {
            error!(error_message=%err, error_group="attributes", key = key);
            err
        })?;

        let mut buffer = MemFile::create(key);
        let copied = io::copy(&mut source, &mut buffer);
        drop(source);

        let bytes = copied.map_err(|err| {
            let err = FsError::from(err);
            error!(error_message=%err, error_group="copy_from_source", key = key);
            err
        })?;
        buffer.close()?;
        buffer.open()?;

        info!(key = key, bytes = bytes, "materialized");

        Ok(Self {
            info: attrs.into(),
            buffer,
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Metadata captured when the session opened.
    pub fn stat(&self) -> FileInfo {
        self.info.clone()
    }

    /// Releases the local copy. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), FsError> {
        if self.buffer.is_open() {
            self.buffer.close()?;
        }
        Ok(())
    }
}

impl Read for ReadFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buffer.read(buf)
    }
}

impl Seek for ReadFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MemoryStore, Op};

    #[test]
    fn test_open_reads_whole_object() {
        let store = MemoryStore::new();
        store.insert("a/b.txt", b"hello").unwrap();

        let mut file = ReadFile::open(&store, "a/b.txt", None).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();

        assert_eq!(out, "hello");
        assert_eq!(file.name(), "a/b.txt");
        assert_eq!(file.stat().size, 5);
        assert!(!file.stat().is_dir);
    }

    #[test]
    fn test_seek_is_local() {
        let store = MemoryStore::new();
        store.insert("file", b"0123456789").unwrap();
        let mut file = ReadFile::open(&store, "file", None).unwrap();

        let cases = vec![
            (SeekFrom::Start(4), "456"),
            (SeekFrom::End(-2), "89"),
            (SeekFrom::Start(0), "012"),
            (SeekFrom::Current(4), "789"),
        ];

        for (seek, expected) in cases {
            file.seek(seek).unwrap();
            let mut out = vec![0u8; expected.len()];
            file.read_exact(&mut out).unwrap();
            assert_eq!(out, expected.as_bytes(), "failed for case: {:?}", seek);
        }

        assert_eq!(store.calls(Op::OpenReader), 1);
    }

    #[test]
    fn test_content_is_a_snapshot() {
        let store = MemoryStore::new();
        store.insert("file", b"before").unwrap();
        let mut file = ReadFile::open(&store, "file", None).unwrap();

        store.insert("file", b"after the change").unwrap();

        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "before");
        assert_eq!(file.stat().size, 6);
    }

    #[test]
    fn test_missing_object_skips_attributes() {
        let store = MemoryStore::new();

        let err = ReadFile::open(&store, "nope", None).unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.calls(Op::Attributes), 0);
    }

    #[test]
    fn test_attribute_failure_fails_open() {
        let store = MemoryStore::new();
        store.insert("file", b"data").unwrap();
        store.fail_next(Op::Attributes, 1).unwrap();

        let err = ReadFile::open(&store, "file", None).unwrap_err();

        assert!(matches!(err, FsError::Store { .. }));
    }

    #[test]
    fn test_reader_failure_propagates() {
        let store = MemoryStore::new();
        store.insert("file", b"data").unwrap();
        store.fail_next(Op::OpenReader, 1).unwrap();

        let err = ReadFile::open(&store, "file", None).unwrap_err();

        assert!(matches!(err, FsError::Store { .. }));
        assert_eq!(store.calls(Op::Attributes), 0);
    }

    #[test]
    fn test_copy_failure_fails_open() {
        let store = MemoryStore::new();
        store.insert("file", b"0123456789").unwrap();
        store.fail_next(Op::SourceRead, 1).unwrap();

        let err = ReadFile::open(&store, "file", None).unwrap_err();

        assert!(!err.is_not_found());
        assert!(matches!(err, FsError::Store { .. }), "unexpected error: {}", err);
        assert_eq!(store.calls(Op::Attributes), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let store = MemoryStore::new();
        store.insert("file", b"data").unwrap();
        let mut file = ReadFile::open(&store, "file", None).unwrap();

        file.close().unwrap();
        file.close().unwrap();

        assert!(file.read(&mut [0u8; 4]).is_err());
    }
}
