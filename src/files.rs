//! Open-file sessions handed out by the filesystem facade.

pub mod directory;
pub mod reader;
pub mod writer;

pub use directory::{Cursor, Directory, Page};
pub use reader::ReadFile;
pub use writer::WriteFile;
