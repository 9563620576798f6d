//! In-memory seekable scratch file.
//!
//! Object streams are one-shot; `MemFile` gives a session something it can
//! write, rewind and seek. A file goes through explicit phases: `create`
//! opens it for writing, `close` ends the phase, `open` starts a read phase
//! at offset zero. Data lives only as long as the value.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::model::fs::FsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
}

#[derive(Debug)]
pub struct MemFile {
    name: String,
    data: Vec<u8>,
    pos: u64,
    mode: Option<Mode>,
}

impl MemFile {
    /// Empty file, open for writing.
    pub fn create(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Vec::new(),
            pos: 0,
            mode: Some(Mode::Write),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    pub fn close(&mut self) -> Result<(), FsError> {
        if self.mode.take().is_none() {
            return Err(FsError::buffer(format!("{} is already closed", self.name)));
        }
        Ok(())
    }

    /// Reopens a closed file for reading from the start.
    pub fn open(&mut self) -> Result<(), FsError> {
        if self.mode.is_some() {
            return Err(FsError::buffer(format!("{} is already open", self.name)));
        }
        self.mode = Some(Mode::Read);
        self.pos = 0;
        Ok(())
    }

    fn check_open(&self) -> io::Result<Mode> {
        self.mode
            .ok_or_else(|| FsError::buffer(format!("{} is closed", self.name)).into())
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_open()?;

        let start = (self.pos as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;

        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.check_open()? != Mode::Write {
            return Err(FsError::buffer(format!("{} is open for reading", self.name)).into());
        }

        let range = usize::try_from(self.pos)
            .ok()
            .and_then(|start| start.checked_add(buf.len()).map(|end| (start, end)));
        let (start, end) = match range {
            Some(range) => range,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("write at offset {} overflows {}", self.pos, self.name),
                ))
            }
        };
        if end > self.data.len() {
            self.data
                .try_reserve(end - self.data.len())
                .map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("cannot grow {} to {} bytes, {}", self.name, end, err),
                    )
                })?;
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.pos = end as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_open().map(|_| ())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.check_open()?;

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.pos.checked_add_signed(offset),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
