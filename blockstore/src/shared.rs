use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::fs::BlockStore;
use crate::io::BlockStorage;
use crate::node::FileId;

/// A cloneable handle to one [`BlockStore`] behind a single lock. Every operation holds the
/// lock for its whole duration, so the allocation map, digests and file table are always
/// seen in step with each other.
pub struct SharedBlockStore<T: BlockStorage> {
    inner: Arc<Mutex<BlockStore<T>>>,
}

impl<T: BlockStorage> Clone for SharedBlockStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: BlockStorage> SharedBlockStore<T> {
    pub fn new(store: BlockStore<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Takes the lock for a sequence of operations that must not interleave with others.
    ///
    /// A poisoned lock is reclaimed. The device is only written from `save`, which hands its
    /// blocks and digests back while unwinding, so a panicking device cannot leave a block
    /// marked used without a file behind it.
    pub fn lock(&self) -> MutexGuard<'_, BlockStore<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn save(&self, id: FileId, content: &[u8]) -> Result<()> {
        self.lock().save(id, content)
    }

    pub fn read(&self, id: FileId) -> Result<Vec<u8>> {
        self.lock().read(id)
    }

    pub fn delete(&self, id: FileId) -> Result<()> {
        self.lock().delete(id)
    }

    pub fn used_block_count(&self) -> usize {
        self.lock().used_block_count()
    }
}
