use std::{sync::Arc, time::Duration};

use tracing::{error, info, span, Level};

use crate::{
    adapters::ObjectStore,
    model::fs::{FileInfo, FsError},
    util::{object, poll::deadline_from},
};

/// Opaque continuation token handed out by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One batch of directory entries and the cursor for the next batch.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub entries: Vec<FileInfo>,
    pub next: Option<Cursor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Progress {
    Unread,
    Reading,
    Exhausted,
}

/// A directory synthesized from every object under a key prefix.
///
/// Entries are the objects themselves, with their full keys as names;
/// deeper keys are not folded into subdirectories.
pub struct Directory {
    name: String,
    prefix: String,
    store: Arc<dyn ObjectStore>,
    timeout: Option<Duration>,
    cursor: Option<Cursor>,
    progress: Progress,
}

impl Directory {
    pub(crate) fn new(path: &str, store: Arc<dyn ObjectStore>, timeout: Option<Duration>) -> Self {
        Self {
            name: path.to_string(),
            prefix: object::dir_prefix(path),
            store,
            timeout,
            cursor: None,
            progress: Progress::Unread,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stat(&self) -> FileInfo {
        FileInfo::directory(&self.name)
    }

    /// Fetches one page starting at `cursor` without touching this
    /// directory's own position. `count <= 0` asks for every remaining entry.
    ///
    /// Any store failure is reported as [`FsError::NotFound`].
    pub fn list_page(&self, count: i64, cursor: Option<&Cursor>) -> Result<Page, FsError> {
        let span = span!(Level::INFO, "list_page", context = "list_page");
        let _e = span.enter();
        info!(prefix = %self.prefix, count = count, cursor = ?cursor, "called");

        let max_results = if count > 0 { Some(count as usize) } else { None };

        let listed = self
            .store
            .list(
                &self.prefix,
                cursor.map(Cursor::as_str),
                max_results,
                deadline_from(self.timeout),
            )
            .map_err(|err| {
                error!(error_message=%err, error_group="list_objects", prefix = %self.prefix);
                FsError::not_found(&self.name)
            })?;

        Ok(Page {
            entries: listed.objects.into_iter().map(FileInfo::from).collect(),
            next: listed.next_cursor.map(Cursor),
        })
    }

    /// Reads the next batch, remembering where the listing stopped.
    ///
    /// A first read that finds nothing means no object lives under this
    /// path, so it fails with [`FsError::NotFound`]. Once the store stops
    /// returning a cursor every further call yields an empty batch.
    pub fn readdir(&mut self, count: i64) -> Result<Vec<FileInfo>, FsError> {
        if self.progress == Progress::Exhausted {
            return Ok(Vec::new());
        }

        let page = self.list_page(count, self.cursor.as_ref())?;

        if self.progress == Progress::Unread && page.entries.is_empty() && page.next.is_none() {
            self.progress = Progress::Exhausted;
            return Err(FsError::not_found(&self.name));
        }

        self.progress = if page.next.is_some() {
            Progress::Reading
        } else {
            Progress::Exhausted
        };
        self.cursor = page.next;

        Ok(page.entries)
    }

    pub fn readdirnames(&mut self, count: i64) -> Result<Vec<String>, FsError> {
        Ok(self
            .readdir(count)?
            .into_iter()
            .map(|info| info.name)
            .collect())
    }
}
