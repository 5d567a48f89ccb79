//! A small block based file store. Files are split across fixed 4k blocks of a
//! [`BlockStorage`] device, tracked by a bitmap allocator, and verified against a
//! SHA-256 digest of every block on the way back out.
//!
//! ```no_run
//! use blockstore::{BlockStore, FileBlockEmulator, FileId};
//!
//! let dev = FileBlockEmulator::open_disk("disk.bin", 100)?;
//! let mut store = BlockStore::create(dev);
//!
//! let id = FileId::new_v4();
//! store.save(id, b"hello")?;
//! assert_eq!(store.read(id)?, b"hello".to_vec());
//! store.delete(id)?;
//! # Ok::<(), blockstore::StoreError>(())
//! ```
mod alloc;
mod error;
mod fs;
pub mod io;
mod ledger;
mod node;
mod shared;

pub use crate::alloc::{BlockAllocator, State};
pub use crate::error::{Result, StoreError};
pub use crate::fs::BlockStore;
pub use crate::io::{
    BlockNumber, BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder, MemoryBlockDevice,
    BLOCK_SIZE,
};
pub use crate::ledger::{Digest, IntegrityLedger};
pub use crate::node::{FileId, Inode};
pub use crate::shared::SharedBlockStore;
