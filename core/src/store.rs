//! Backing Store Module
//!
//! Byte-offset access to the local resource behind a transfer. Outgoing
//! transfers read from it, incoming transfers write to it.

use crate::config::TransferConfig;
use crate::transfer::Direction;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// An open resource exclusively owned by one transfer.
pub trait Resource: Send {
    /// Read up to `max_len` bytes at `offset`.
    ///
    /// Returns fewer bytes (possibly none) at end of file. Only genuine
    /// I/O failures are errors.
    fn read_at(&mut self, offset: u64, max_len: usize) -> io::Result<Vec<u8>>;

    /// Write all of `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Release the resource. Called exactly once by the owning transfer.
    fn close(&mut self) -> io::Result<()>;
}

/// Opens resources for transfers.
pub trait BackingStore: Send {
    fn open(&self, direction: Direction, locator: &Path) -> io::Result<Box<dyn Resource>>;
}

/// Plain filesystem backing store
#[derive(Debug, Clone)]
pub struct FileStore {
    create_parent_dirs: bool,
}

impl FileStore {
    pub fn new() -> Self {
        FileStore {
            create_parent_dirs: true,
        }
    }

    pub fn with_parent_dirs(create_parent_dirs: bool) -> Self {
        FileStore { create_parent_dirs }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::with_parent_dirs(config.create_parent_dirs)
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BackingStore for FileStore {
    fn open(&self, direction: Direction, locator: &Path) -> io::Result<Box<dyn Resource>> {
        let file = match direction {
            Direction::Outgoing => File::open(locator)?,
            Direction::Incoming => {
                if self.create_parent_dirs {
                    if let Some(parent) = locator.parent() {
                        if !parent.as_os_str().is_empty() && !parent.exists() {
                            fs::create_dir_all(parent)?;
                        }
                    }
                }
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(locator)?
            }
        };

        tracing::debug!("Opened {:?} resource at {}", direction, locator.display());

        Ok(Box::new(FileResource {
            direction,
            path: locator.to_path_buf(),
            file: Some(file),
        }))
    }
}

/// File handle restricted to one direction
pub struct FileResource {
    direction: Direction,
    path: PathBuf,
    file: Option<File>,
}

impl FileResource {
    fn file_for(&mut self, direction: Direction) -> io::Result<&mut File> {
        if self.direction != direction {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("resource opened for {:?} access", self.direction),
            ));
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "resource already closed"))
    }
}

impl Resource for FileResource {
    fn read_at(&mut self, offset: u64, max_len: usize) -> io::Result<Vec<u8>> {
        let file = self.file_for(Direction::Outgoing)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; max_len];
        let mut filled = 0;
        while filled < max_len {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        buffer.truncate(filled);
        Ok(buffer)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        let file = self.file_for(Direction::Incoming)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn close(&mut self) -> io::Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        if self.direction == Direction::Incoming {
            file.flush()?;
            file.sync_all()?;
        }
        tracing::debug!("Closed resource at {}", self.path.display());
        Ok(())
    }
}
