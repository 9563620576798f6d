use std::{
    io::{self, Seek, SeekFrom, Write},
    time::Duration,
};

use tracing::{error, info, span, warn, Level};

use crate::{
    adapters::ObjectSink,
    mem::MemFile,
    model::fs::{FileInfo, FsError},
    util::poll::deadline_from,
};

enum Session {
    Open(Box<dyn ObjectSink>),
    Flushed,
    Failed(FsError),
}

/// Write session: collects writes in a local buffer and hands the whole
/// content to the store sink once, on [`close`](WriteFile::close).
pub struct WriteFile {
    buffer: MemFile,
    session: Session,
    timeout: Option<Duration>,
}

impl WriteFile {
    pub(crate) fn new(key: &str, sink: Box<dyn ObjectSink>, timeout: Option<Duration>) -> Self {
        Self {
            buffer: MemFile::create(key),
            session: Session::Open(sink),
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.buffer.name()
    }

    /// Size of what has been buffered so far; nothing is in the store yet.
    pub fn stat(&self) -> FileInfo {
        FileInfo {
            name: self.name().to_string(),
            size: self.buffer.len(),
            modified_time: None,
            is_dir: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.session, Session::Open(_))
    }

    /// Flushes the buffer to the store.
    ///
    /// Only the first call does any work. Later calls repeat its outcome:
    /// `Ok(())` after a real flush, the original error after a failed one.
    /// A copy failure is returned even if the sink closes cleanly afterwards,
    /// and a sink close failure is returned when it is the only failure.
    pub fn close(&mut self) -> Result<(), FsError> {
        let span = span!(Level::INFO, "write_close", context = "write_close");
        let _e = span.enter();

        let sink = match std::mem::replace(&mut self.session, Session::Flushed) {
            Session::Open(sink) => sink,
            Session::Flushed => {
                info!(key = self.name(), "already closed");
                return Ok(());
            }
            Session::Failed(err) => {
                warn!(error_message=%err, key = self.name(), "already closed after a failed flush");
                self.session = Session::Failed(err.clone());
                return Err(err);
            }
        };
        info!(key = self.name(), size = self.buffer.len(), "called");

        let flushed = self.flush_to(sink);
        if let Err(err) = &flushed {
            self.session = Session::Failed(err.clone());
        }
        flushed
    }

    fn flush_to(&mut self, mut sink: Box<dyn ObjectSink>) -> Result<(), FsError> {
        if let Err(err) = self.buffer.close().and_then(|_| self.buffer.open()) {
            error!(error_message=%err, error_group="buffer_reopen", key = self.name());
            // Dropping the sink abandons the upload without committing anything.
            drop(sink);
            return Err(err);
        }

        let copied = io::copy(&mut self.buffer, &mut sink).map_err(FsError::from);
        if let Err(err) = self.buffer.close() {
            warn!(error_message=%err, error_group="buffer_close", key = self.name());
        }

        let closed = sink.close(deadline_from(self.timeout));

        match (copied, closed) {
            (Err(copy_err), Err(close_err)) => {
                error!(error_message=%copy_err, error_group="copy_to_sink", key = self.name());
                error!(error_message=%close_err, error_group="sink_close", key = self.name());
                Err(copy_err)
            }
            (Err(copy_err), Ok(())) => {
                error!(error_message=%copy_err, error_group="copy_to_sink", key = self.name());
                Err(copy_err)
            }
            (Ok(_), Err(close_err)) => {
                error!(error_message=%close_err, error_group="sink_close", key = self.name());
                Err(close_err)
            }
            (Ok(bytes), Ok(())) => {
                info!(key = self.name(), bytes = bytes, "flushed");
                Ok(())
            }
        }
    }
}

impl Write for WriteFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }
}

impl Seek for WriteFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.buffer.seek(pos)
    }
}

impl Drop for WriteFile {
    fn drop(&mut self) {
        if let Session::Open(_) = self.session {
            warn!(
                key = self.name(),
                size = self.buffer.len(),
                "write session dropped without close, buffered data discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        mock::{MemoryStore, Op},
        ObjectStore,
    };

    fn write_file(store: &MemoryStore, key: &str) -> WriteFile {
        WriteFile::new(key, store.open_writer(key).unwrap(), None)
    }

    #[test]
    fn test_nothing_reaches_store_before_close() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "a/b.txt");

        file.write_all(b"hello").unwrap();

        assert_eq!(store.contents("a/b.txt"), None);
        assert_eq!(store.calls(Op::SinkWrite), 0);
        assert_eq!(file.stat().size, 5);

        file.close().unwrap();
        assert_eq!(store.contents("a/b.txt"), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_seek_and_overwrite_before_close() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");

        file.write_all(b"hello world").unwrap();
        file.seek(SeekFrom::Start(6)).unwrap();
        file.write_all(b"WORLD").unwrap();
        file.close().unwrap();

        assert_eq!(store.contents("file"), Some(b"hello WORLD".to_vec()));
    }

    #[test]
    fn test_empty_file() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "empty");

        file.close().unwrap();

        assert_eq!(store.contents("empty"), Some(Vec::new()));
    }

    #[test]
    fn test_second_close_does_not_reflush() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");
        file.write_all(b"once").unwrap();

        file.close().unwrap();
        file.close().unwrap();

        assert!(file.is_closed());
        assert_eq!(store.calls(Op::SinkClose), 1);
        assert_eq!(store.contents("file"), Some(b"once".to_vec()));
    }

    #[test]
    fn test_second_close_repeats_failure() {
        let cases = vec![Op::SinkWrite, Op::SinkClose];

        for op in cases {
            let store = MemoryStore::new();
            let mut file = write_file(&store, "file");
            file.write_all(b"lost").unwrap();
            store.fail_next(op, 1).unwrap();

            let first = file.close().unwrap_err();
            let second = file.close().unwrap_err();

            assert!(file.is_closed(), "failed on closed for case: {:?}", op);
            assert_eq!(first.to_string(), second.to_string(), "failed on error for case: {:?}", op);
            assert_eq!(store.calls(Op::SinkClose), 1, "failed on calls for case: {:?}", op);
            assert_eq!(store.contents("file"), None, "failed on contents for case: {:?}", op);
        }
    }

    #[test]
    fn test_write_after_close_fails() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");
        file.close().unwrap();

        let err: FsError = file.write(b"late").unwrap_err().into();
        assert!(matches!(err, FsError::Buffer { .. }));
    }

    #[test]
    fn test_copy_failure_still_closes_sink() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");
        file.write_all(b"payload").unwrap();
        store.fail_next(Op::SinkWrite, 1).unwrap();

        let err = file.close().unwrap_err();

        assert!(matches!(err, FsError::Store { .. }));
        assert_eq!(store.calls(Op::SinkClose), 1);
    }

    #[test]
    fn test_copy_failure_wins_over_close_failure() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");
        file.write_all(b"payload").unwrap();
        store.fail_next(Op::SinkWrite, 1).unwrap();
        store.fail_next(Op::SinkClose, 1).unwrap();

        let err = file.close().unwrap_err();

        assert!(err.to_string().contains("SinkWrite"), "unexpected error: {}", err);
        assert_eq!(store.contents("file"), None);
    }

    #[test]
    fn test_sink_close_failure_is_reported() {
        let store = MemoryStore::new();
        let mut file = write_file(&store, "file");
        file.write_all(b"payload").unwrap();
        store.fail_next(Op::SinkClose, 1).unwrap();

        let err = file.close().unwrap_err();

        assert!(err.to_string().contains("SinkClose"), "unexpected error: {}", err);
        assert_eq!(store.contents("file"), None);
    }

    #[test]
    fn test_independent_sessions() {
        let store = MemoryStore::new();
        let mut first = write_file(&store, "one");
        let mut second = write_file(&store, "two");

        first.write_all(b"first").unwrap();
        second.write_all(b"second").unwrap();
        first.write_all(b"!").unwrap();

        second.close().unwrap();
        first.close().unwrap();

        assert_eq!(store.contents("one"), Some(b"first!".to_vec()));
        assert_eq!(store.contents("two"), Some(b"second".to_vec()));
    }

    #[test]
    fn test_drop_without_close_discards() {
        let store = MemoryStore::new();
        {
            let mut file = write_file(&store, "file");
            file.write_all(b"lost").unwrap();
        }

        assert_eq!(store.contents("file"), None);
        assert_eq!(store.calls(Op::SinkClose), 0);
    }
}
