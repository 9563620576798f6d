//! Hierarchical, seekable file access on top of a flat object store bucket.
//!
//! [`fs::ObjectFs`] is the entry point. Files are whole objects: reads copy
//! the object into memory when opened, writes are buffered in memory and
//! uploaded once on close. Directories do not exist in the bucket; a path
//! with no object behind it is treated as a directory whose entries come
//! from a prefix listing.

pub mod adapters;
pub mod files;
pub mod fs;
pub mod mem;
pub mod model;
pub mod util;

pub use fs::{Filesystem, Handle, ObjectFs, OpenFlags, UnsupportedOps};
pub use model::fs::{FileInfo, FsError, Result};
