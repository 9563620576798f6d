use std::{
    io::{Read, Write},
    time::{Duration, Instant, SystemTime},
};

use crate::model::fs::{FileInfo, FsError};

pub mod gcs;
pub mod mock;
pub mod s3;

/// Attributes a store reports for a single object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAttrs {
    pub key: String,
    pub size: u64,
    pub modified_time: Option<SystemTime>,
    pub content_type: Option<String>,
}

impl From<ObjectAttrs> for FileInfo {
    fn from(attrs: ObjectAttrs) -> Self {
        FileInfo {
            name: attrs.key,
            size: attrs.size,
            modified_time: attrs.modified_time,
            is_dir: false,
        }
    }
}

/// One page of a prefix listing. `next_cursor` is opaque and only
/// meaningful to the store that produced it.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectAttrs>,
    pub next_cursor: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignMethod {
    Get,
    Put,
}

/// Write end of a single object upload. Nothing is visible in the store
/// until `close` succeeds; dropping an unclosed sink abandons the upload.
pub trait ObjectSink: Write + Send {
    fn close(self: Box<Self>, deadline: Option<Instant>) -> Result<(), FsError>;
}

/// The operations the filesystem layer needs from a bucket client.
///
/// Every call that talks to the network takes an optional deadline. Errors
/// are never retried here; an absent object is reported as
/// [`FsError::NotFound`] so callers can tell it apart from other failures.
pub trait ObjectStore: Send + Sync {
    fn attributes(&self, key: &str, deadline: Option<Instant>) -> Result<ObjectAttrs, FsError>;

    /// Removes `key`; an absent key is [`FsError::NotFound`] on every backend.
    fn delete(&self, key: &str, deadline: Option<Instant>) -> Result<(), FsError>;

    fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectSink>, FsError>;

    fn open_reader(
        &self,
        key: &str,
        deadline: Option<Instant>,
    ) -> Result<Box<dyn Read + Send>, FsError>;

    /// Lists objects under `prefix`. With `max_results` unset the store
    /// returns everything left after `cursor` and no further cursor.
    fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        max_results: Option<usize>,
        deadline: Option<Instant>,
    ) -> Result<ListPage, FsError>;

    fn sign_url(
        &self,
        key: &str,
        identity: &str,
        private_key: &[u8],
        method: SignMethod,
        expiry: Duration,
        deadline: Option<Instant>,
    ) -> Result<String, FsError>;
}
