use super::{check_access, device_len, BlockNumber, BlockStorage, BLOCK_SIZE};
use crate::error::{Result, StoreError};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

pub struct FileBlockEmulator {
    /// The file must be a fixed-size file some exact multiple of the size of a block.
    fd: File,
    /// The total number of blocks available in the file store.
    block_count: usize,
}

/// Emulates block disk/flash storage in userspace using a file as block storage.
/// Block `i` lives at byte offset `i * BLOCK_SIZE` of the file.
impl FileBlockEmulator {
    /// Opens the disk at `path`, creating it when missing. Shorthand for
    /// [`FileBlockEmulatorBuilder`].
    pub fn open_disk<P: AsRef<Path>>(path: P, nblocks: usize) -> Result<Self> {
        FileBlockEmulatorBuilder::new(path)
            .with_block_count(nblocks)
            .build()
    }

    /// Returns ownership of the underlying file descriptor to the caller.
    pub fn into_file(self) -> File {
        self.fd
    }

    fn seek_to(&mut self, blocknr: BlockNumber) -> Result<()> {
        self.fd
            .seek(SeekFrom::Start((blocknr * BLOCK_SIZE) as u64))?;
        Ok(())
    }
}

impl BlockStorage for FileBlockEmulator {
    fn block_count(&self) -> usize {
        self.block_count
    }

    /// Regions of the file that were never written, or that lie past a truncated
    /// end, read back as zeroes.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<()> {
        check_access(blocknr, self.block_count, buf.len())?;
        self.seek_to(blocknr)?;

        // Limit the read to just the block specified.
        let mut fixed_reader = (&mut self.fd).take(BLOCK_SIZE as u64);
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match fixed_reader.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < BLOCK_SIZE {
            debug!("short read on block {} ({} bytes), zero filling", blocknr, filled);
            buf[filled..].fill(0);
        }
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
        check_access(blocknr, self.block_count, buf.len())?;
        self.seek_to(blocknr)?;
        self.fd.write_all(buf)?;
        Ok(())
    }

    fn sync_disk(&mut self) -> Result<()> {
        self.fd.sync_all()?;
        Ok(())
    }
}

pub struct FileBlockEmulatorBuilder {
    path: PathBuf,
    block_count: usize,
}

impl FileBlockEmulatorBuilder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileBlockEmulatorBuilder {
            path: path.as_ref().to_path_buf(),
            block_count: 0,
        }
    }

    /// Sets the number of desired blocks in the block store device.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// An existing file is used as is and must already be exactly
    /// `block_count * BLOCK_SIZE` bytes. A missing file is created and extended to
    /// that size without writing any data.
    pub fn build(self) -> Result<FileBlockEmulator> {
        let expected = device_len(self.block_count)? as u64;

        let fd = if self.path.exists() {
            let fd = OpenOptions::new().read(true).write(true).open(&self.path)?;
            let actual = fd.metadata()?.len();
            if actual != expected {
                return Err(StoreError::SizeMismatch { expected, actual });
            }
            info!("Opened existing disk {} ({} blocks).", self.path.display(), self.block_count);
            fd
        } else {
            let fd = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&self.path)?;
            fd.set_len(expected)?;
            info!("Created disk {} ({} blocks).", self.path.display(), self.block_count);
            fd
        };

        Ok(FileBlockEmulator {
            fd,
            block_count: self.block_count,
        })
    }
}
