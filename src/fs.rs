use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{error, info, span, warn, Level};

use crate::{
    adapters::{ObjectStore, SignMethod},
    files::{Directory, ReadFile, WriteFile},
    model::fs::{FileInfo, FsError, Result},
    util::{object, poll::deadline_from},
};

pub const DEFAULT_NAME: &str = "bucketfs";
pub const DEFAULT_SIGNED_URL_EXPIRY: Duration = Duration::from_secs(15 * 60);

/// Operations an object store can actually back.
pub trait Filesystem {
    fn name(&self) -> &str;

    /// New write session; nothing reaches the store until the session closes.
    fn create(&self, path: &str) -> Result<WriteFile>;

    /// Opens an object for reading, or a directory when no object has this
    /// exact name.
    fn open(&self, path: &str) -> Result<Handle>;

    fn open_with_flags(&self, path: &str, flags: OpenFlags) -> Result<Handle>;

    fn stat(&self, path: &str) -> Result<FileInfo>;

    fn remove(&self, path: &str) -> Result<()>;

    fn signed_url(&self, path: &str, identity: &str, private_key: &[u8]) -> Result<String>;
}

/// Hierarchy and permission operations with no object-store equivalent.
/// Implementations fail with [`FsError::Unsupported`].
pub trait UnsupportedOps {
    fn mkdir(&self, path: &str) -> Result<()>;

    fn mkdir_all(&self, path: &str) -> Result<()>;

    fn remove_all(&self, path: &str) -> Result<()>;

    fn rename(&self, from: &str, to: &str) -> Result<()>;

    fn chmod(&self, path: &str, mode: u32) -> Result<()>;

    fn chtimes(&self, path: &str, atime: SystemTime, mtime: SystemTime) -> Result<()>;
}

/// How a path should be opened. Only "read and nothing else" opens for
/// reading; every other combination, including none at all, starts a write
/// session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    pub fn write_create() -> Self {
        Self {
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    fn is_read_only(&self) -> bool {
        self.read && !(self.write || self.create || self.truncate || self.append)
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Whatever `open` produced for a path.
pub enum Handle {
    File(ReadFile),
    Directory(Directory),
    Writer(WriteFile),
}

impl Handle {
    pub fn name(&self) -> &str {
        match self {
            Handle::File(f) => f.name(),
            Handle::Directory(d) => d.name(),
            Handle::Writer(w) => w.name(),
        }
    }

    pub fn stat(&self) -> FileInfo {
        match self {
            Handle::File(f) => f.stat(),
            Handle::Directory(d) => d.stat(),
            Handle::Writer(w) => w.stat(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Handle::Directory(_))
    }

    pub fn close(&mut self) -> Result<()> {
        match self {
            Handle::File(f) => f.close(),
            Handle::Directory(_) => Ok(()),
            Handle::Writer(w) => w.close(),
        }
    }

    pub fn readdir(&mut self, count: i64) -> Result<Vec<FileInfo>> {
        match self {
            Handle::Directory(d) => d.readdir(count),
            other => Err(FsError::NotADirectory {
                path: other.name().to_string(),
            }),
        }
    }

    pub fn readdirnames(&mut self, count: i64) -> Result<Vec<String>> {
        match self {
            Handle::Directory(d) => d.readdirnames(count),
            other => Err(FsError::NotADirectory {
                path: other.name().to_string(),
            }),
        }
    }

    pub fn into_directory(self) -> Option<Directory> {
        match self {
            Handle::Directory(d) => Some(d),
            _ => None,
        }
    }

    fn unsupported(&self, op: &'static str) -> io::Error {
        warn!(key = self.name(), op = op, "unsupported on this handle");
        FsError::Unsupported { op }.into()
    }
}

impl Read for Handle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Handle::File(f) => f.read(buf),
            _ => Err(self.unsupported("read")),
        }
    }
}

impl Write for Handle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Handle::Writer(w) => w.write(buf),
            _ => Err(self.unsupported("write")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Handle::Writer(w) => w.flush(),
            _ => Ok(()),
        }
    }
}

impl Seek for Handle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Handle::File(f) => f.seek(pos),
            Handle::Writer(w) => w.seek(pos),
            Handle::Directory(_) => Err(self.unsupported("seek")),
        }
    }
}

/// Hierarchical filesystem over a flat bucket.
///
/// Configuration is fixed at construction. Sessions returned from here are
/// independent of each other and of the facade.
pub struct ObjectFs {
    store: Arc<dyn ObjectStore>,
    name: String,
    timeout: Option<Duration>,
    signed_url_method: SignMethod,
    signed_url_expiry: Duration,
}

impl ObjectFs {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            name: DEFAULT_NAME.to_string(),
            timeout: None,
            signed_url_method: SignMethod::Get,
            signed_url_expiry: DEFAULT_SIGNED_URL_EXPIRY,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Upper bound for every individual store call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_signed_url(mut self, method: SignMethod, expiry: Duration) -> Self {
        self.signed_url_method = method;
        self.signed_url_expiry = expiry;
        self
    }
}

impl Filesystem for ObjectFs {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, path: &str) -> Result<WriteFile> {
        let span = span!(Level::INFO, "create", context = "create");
        let _e = span.enter();
        info!(path = path, "called");

        let key = object::object_key(path);
        let sink = self.store.open_writer(key).map_err(|err| {
            error!(error_message=%err, error_group="open_writer", key = key);
            err
        })?;

        Ok(WriteFile::new(key, sink, self.timeout))
    }

    fn open(&self, path: &str) -> Result<Handle> {
        let span = span!(Level::INFO, "open", context = "open");
        let _e = span.enter();
        info!(path = path, "called");

        let key = object::object_key(path);
        if key.is_empty() {
            // No object can have an empty key; the bucket root is always a directory.
            return Ok(Handle::Directory(Directory::new(
                path,
                Arc::clone(&self.store),
                self.timeout,
            )));
        }

        match ReadFile::open(self.store.as_ref(), key, deadline_from(self.timeout)) {
            Ok(file) => Ok(Handle::File(file)),
            Err(err) if err.is_not_found() => {
                info!(path = path, "no object, treating as directory");
                Ok(Handle::Directory(Directory::new(
                    path,
                    Arc::clone(&self.store),
                    self.timeout,
                )))
            }
            Err(err) => {
                error!(error_message=%err, error_group="open_reader", key = key);
                Err(err)
            }
        }
    }

    fn open_with_flags(&self, path: &str, flags: OpenFlags) -> Result<Handle> {
        if flags.is_read_only() {
            return self.open(path);
        }

        if flags.is_empty() {
            warn!(path = path, "no open flags given, opening for write");
        }

        self.create(path).map(Handle::Writer)
    }

    fn stat(&self, path: &str) -> Result<FileInfo> {
        let span = span!(Level::INFO, "stat", context = "stat");
        let _e = span.enter();
        info!(path = path, "called");

        let key = object::object_key(path);
        let attrs = self
            .store
            .attributes(key, deadline_from(self.timeout))
            .map_err(|err| {
                if !err.is_not_found() {
                    error!(error_message=%err, error_group="attributes", key = key);
                }
                err
            })?;

        Ok(attrs.into())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let span = span!(Level::INFO, "remove", context = "remove");
        let _e = span.enter();
        info!(path = path, "called");

        let key = object::object_key(path);
        self.store
            .delete(key, deadline_from(self.timeout))
            .map_err(|err| {
                error!(error_message=%err, error_group="delete_object", key = key);
                err
            })
    }

    fn signed_url(&self, path: &str, identity: &str, private_key: &[u8]) -> Result<String> {
        let span = span!(Level::INFO, "signed_url", context = "signed_url");
        let _e = span.enter();
        info!(path = path, identity = identity, "called");

        let key = object::object_key(path);
        self.store
            .sign_url(
                key,
                identity,
                private_key,
                self.signed_url_method,
                self.signed_url_expiry,
                deadline_from(self.timeout),
            )
            .map_err(|err| {
                error!(error_message=%err, error_group="sign_url", key = key);
                err
            })
    }
}

impl UnsupportedOps for ObjectFs {
    fn mkdir(&self, _path: &str) -> Result<()> {
        Err(FsError::Unsupported { op: "mkdir" })
    }

    fn mkdir_all(&self, _path: &str) -> Result<()> {
        Err(FsError::Unsupported { op: "mkdir_all" })
    }

    fn remove_all(&self, _path: &str) -> Result<()> {
        Err(FsError::Unsupported { op: "remove_all" })
    }

    fn rename(&self, _from: &str, _to: &str) -> Result<()> {
        Err(FsError::Unsupported { op: "rename" })
    }

    fn chmod(&self, _path: &str, _mode: u32) -> Result<()> {
        Err(FsError::Unsupported { op: "chmod" })
    }

    fn chtimes(&self, _path: &str, _atime: SystemTime, _mtime: SystemTime) -> Result<()> {
        Err(FsError::Unsupported { op: "chtimes" })
    }
}
