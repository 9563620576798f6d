use std::{
    collections::{BTreeMap, HashMap},
    io::{self, Cursor, Read, Write},
    ops::Bound,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant, SystemTime},
};

use crate::{
    adapters::{ListPage, ObjectAttrs, ObjectSink, ObjectStore, SignMethod},
    model::fs::FsError,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Attributes,
    Delete,
    OpenWriter,
    SinkWrite,
    SinkClose,
    OpenReader,
    SourceRead,
    List,
    SignUrl,
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    modified_time: SystemTime,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, StoredObject>,
    failures: HashMap<Op, usize>,
    calls: HashMap<Op, usize>,
}

impl State {
    /// Counts the call and consumes an injected failure, if one is armed.
    fn enter(&mut self, op: Op, key: &str) -> Result<(), FsError> {
        *self.calls.entry(op).or_default() += 1;

        if self.take_failure(op) {
            return Err(FsError::store(format!("injected {:?} failure at: {}", op, key)));
        }

        Ok(())
    }

    fn take_failure(&mut self, op: Op) -> bool {
        match self.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Bucket held in process memory. Cloning shares the same bucket.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> Result<MutexGuard<'_, State>, FsError> {
    state
        .lock()
        .map_err(|err| FsError::store(format!("failed to acquire store guard, {}", err)))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts an object directly, bypassing the sink protocol.
    pub fn insert(&self, key: &str, data: &[u8]) -> Result<(), FsError> {
        let mut state = lock(&self.state)?;
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                modified_time: SystemTime::now(),
            },
        );
        Ok(())
    }

    pub fn contents(&self, key: &str) -> Option<Vec<u8>> {
        let state = lock(&self.state).ok()?;
        state.objects.get(key).map(|obj| obj.data.clone())
    }

    /// Makes the next `times` calls of `op` fail with a store error.
    pub fn fail_next(&self, op: Op, times: usize) -> Result<(), FsError> {
        let mut state = lock(&self.state)?;
        state.failures.insert(op, times);
        Ok(())
    }

    pub fn calls(&self, op: Op) -> usize {
        lock(&self.state)
            .map(|state| state.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ObjectStore for MemoryStore {
    fn attributes(&self, key: &str, _deadline: Option<Instant>) -> Result<ObjectAttrs, FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::Attributes, key)?;

        let obj = state
            .objects
            .get(key)
            .ok_or_else(|| FsError::not_found(key))?;

        Ok(ObjectAttrs {
            key: key.to_string(),
            size: obj.data.len() as u64,
            modified_time: Some(obj.modified_time),
            content_type: Some("application/octet-stream".to_string()),
        })
    }

    fn delete(&self, key: &str, _deadline: Option<Instant>) -> Result<(), FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::Delete, key)?;

        state
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(key))
    }

    fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectSink>, FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::OpenWriter, key)?;

        Ok(Box::new(MemorySink {
            state: Arc::clone(&self.state),
            key: key.to_string(),
            body: Vec::new(),
        }))
    }

    fn open_reader(
        &self,
        key: &str,
        _deadline: Option<Instant>,
    ) -> Result<Box<dyn Read + Send>, FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::OpenReader, key)?;

        let obj = state
            .objects
            .get(key)
            .ok_or_else(|| FsError::not_found(key))?;
        let data = obj.data.clone();

        if state.take_failure(Op::SourceRead) {
            let half = data.len() / 2;
            return Ok(Box::new(BrokenSource {
                key: key.to_string(),
                inner: Cursor::new(data[..half].to_vec()),
            }));
        }

        Ok(Box::new(Cursor::new(data)))
    }

    fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        max_results: Option<usize>,
        _deadline: Option<Instant>,
    ) -> Result<ListPage, FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::List, prefix)?;

        let start = match cursor {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        let mut matching = state
            .objects
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectAttrs {
                key: key.clone(),
                size: obj.data.len() as u64,
                modified_time: Some(obj.modified_time),
                content_type: Some("application/octet-stream".to_string()),
            });

        let mut page = ListPage::default();
        match max_results {
            None => page.objects.extend(matching),
            Some(max) => {
                page.objects.extend(matching.by_ref().take(max));
                if matching.next().is_some() {
                    page.next_cursor = page.objects.last().map(|obj| obj.key.clone());
                }
            }
        }

        Ok(page)
    }

    fn sign_url(
        &self,
        key: &str,
        identity: &str,
        _private_key: &[u8],
        method: SignMethod,
        expiry: Duration,
        _deadline: Option<Instant>,
    ) -> Result<String, FsError> {
        let mut state = lock(&self.state)?;
        state.enter(Op::SignUrl, key)?;

        Ok(format!(
            "mem:///{}?method={:?}&identity={}&expires={}",
            key,
            method,
            identity,
            expiry.as_secs()
        ))
    }
}

/// Source that yields the first half of an object, then fails.
struct BrokenSource {
    key: String,
    inner: Cursor<Vec<u8>>,
}

impl Read for BrokenSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(FsError::store(format!("injected SourceRead failure at: {}", self.key)).into()),
            n => Ok(n),
        }
    }
}

struct MemorySink {
    state: Arc<Mutex<State>>,
    key: String,
    body: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.state)?.enter(Op::SinkWrite, &self.key)?;
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ObjectSink for MemorySink {
    fn close(self: Box<Self>, _deadline: Option<Instant>) -> Result<(), FsError> {
        let MemorySink { state, key, body } = *self;
        let mut guard = lock(&state)?;
        guard.enter(Op::SinkClose, &key)?;

        guard.objects.insert(
            key,
            StoredObject {
                data: body,
                modified_time: SystemTime::now(),
            },
        );
        Ok(())
    }
}
