use crate::alloc::BlockAllocator;
use crate::error::{Result, StoreError};
use crate::io::{BlockNumber, BlockStorage, BLOCK_SIZE};
use crate::ledger::IntegrityLedger;
use crate::node::{blocks_for, FileId, FileTable, Inode};

use log::{debug, info, warn};

/// Flat file store over a block device. Files are named by id, cut into blocks on save and
/// stitched back together on read, with every block checked against the digest taken when
/// it was written.
///
/// The allocation map, digests and file table live in memory only; reopening a device
/// yields an empty store.
pub struct BlockStore<T: BlockStorage> {
    dev: T,
    allocator: BlockAllocator,
    ledger: IntegrityLedger,
    files: FileTable,
}

impl<T: BlockStorage> BlockStore<T> {
    /// Builds an empty store that may use every block of `dev`.
    pub fn create(dev: T) -> Self {
        let capacity = dev.block_count();
        info!("Creating block store over {} blocks.", capacity);
        BlockStore {
            dev,
            allocator: BlockAllocator::new(capacity),
            ledger: IntegrityLedger::new(),
            files: FileTable::new(),
        }
    }

    /// Writes `content` to freshly allocated blocks and files it under `id`.
    ///
    /// Saving over an existing id replaces its descriptor but does not free the blocks the
    /// old descriptor pointed at; `delete` the id first to reclaim them. If a write fails, or
    /// the device panics, the blocks taken by this call are released again.
    pub fn save(&mut self, id: FileId, content: &[u8]) -> Result<()> {
        let size = content.len() as u64;
        let blocks = self.allocator.allocate(blocks_for(size))?;

        let mut pending = PendingBlocks {
            allocator: &mut self.allocator,
            ledger: &mut self.ledger,
            blocks,
        };
        Self::write_blocks(&mut self.dev, &mut *pending.ledger, &pending.blocks, content)?;
        let blocks = pending.commit();

        debug!("Saved {} bytes of {} to blocks {:?}.", size, id, blocks);
        if let Some(old) = self.files.insert(id, Inode::new(blocks, size)) {
            warn!(
                "File {} overwritten; blocks {:?} remain allocated.",
                id,
                old.blocks()
            );
        }
        Ok(())
    }

    fn write_blocks(
        dev: &mut T,
        ledger: &mut IntegrityLedger,
        blocks: &[BlockNumber],
        content: &[u8],
    ) -> Result<()> {
        let mut block_buffer = vec![0; BLOCK_SIZE];
        for (chunk, &blocknr) in content.chunks(BLOCK_SIZE).zip(blocks) {
            // Only the final chunk can be short; pad it out with zeroes.
            block_buffer[..chunk.len()].copy_from_slice(chunk);
            block_buffer[chunk.len()..].fill(0);

            dev.write_block(blocknr, &block_buffer)?;
            ledger.record(blocknr, &block_buffer);
        }
        Ok(())
    }

    /// Reads back the bytes saved under `id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `CorruptionDetected` as soon as a block no longer
    /// matches its digest.
    pub fn read(&mut self, id: FileId) -> Result<Vec<u8>> {
        let node = self.files.get(&id).ok_or(StoreError::NotFound(id))?;

        let mut content = vec![0; node.size() as usize];
        let mut block_buffer = vec![0; BLOCK_SIZE];
        let last = node.blocks().len().saturating_sub(1);
        for (i, &blocknr) in node.blocks().iter().enumerate() {
            self.dev.read_block(blocknr, &mut block_buffer)?;
            if !self.ledger.verify(blocknr, &block_buffer) {
                warn!("Block {} of file {} failed verification.", blocknr, id);
                return Err(StoreError::CorruptionDetected { block: blocknr });
            }

            let len = if i == last {
                node.last_block_len()
            } else {
                BLOCK_SIZE
            };
            let start = i * BLOCK_SIZE;
            content[start..start + len].copy_from_slice(&block_buffer[..len]);
        }
        Ok(content)
    }

    /// Drops `id` and returns its blocks to the free pool.
    pub fn delete(&mut self, id: FileId) -> Result<()> {
        let node = self.files.remove(&id).ok_or(StoreError::NotFound(id))?;
        self.allocator.release(node.blocks())?;
        for &blocknr in node.blocks() {
            self.ledger.forget(blocknr);
        }
        debug!("Deleted {}, freed blocks {:?}.", id, node.blocks());
        Ok(())
    }

    /// Number of blocks currently allocated.
    pub fn used_block_count(&self) -> usize {
        self.allocator.used_count()
    }

    pub fn free_block_count(&self) -> usize {
        self.allocator.free_count()
    }

    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    pub fn contains(&self, id: FileId) -> bool {
        self.files.contains(&id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn inode(&self, id: FileId) -> Option<&Inode> {
        self.files.get(&id)
    }

    pub fn files(&self) -> impl Iterator<Item = (&FileId, &Inode)> {
        self.files.iter()
    }

    pub fn device(&self) -> &T {
        &self.dev
    }

    /// Direct access to the device. Writes made here bypass the digest ledger, so blocks
    /// touched this way will fail verification on the next read.
    pub fn device_mut(&mut self) -> &mut T {
        &mut self.dev
    }

    pub fn into_device(self) -> T {
        self.dev
    }

    /// Flushes the device.
    pub fn sync(&mut self) -> Result<()> {
        self.dev.sync_disk()
    }
}

/// Blocks allocated for a save that has not been filed yet. Unless committed, dropping it
/// (on an error return or while unwinding) forgets their digests and frees them.
struct PendingBlocks<'a> {
    allocator: &'a mut BlockAllocator,
    ledger: &'a mut IntegrityLedger,
    blocks: Vec<BlockNumber>,
}

impl PendingBlocks<'_> {
    fn commit(mut self) -> Vec<BlockNumber> {
        std::mem::take(&mut self.blocks)
    }
}

impl Drop for PendingBlocks<'_> {
    fn drop(&mut self) {
        if self.blocks.is_empty() {
            return;
        }
        for &blocknr in self.blocks.iter() {
            self.ledger.forget(blocknr);
        }
        if self.allocator.release(&self.blocks).is_ok() {
            debug!("Rolled back blocks {:?}.", self.blocks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::State;
    use crate::io::MemoryBlockDevice;
    use std::collections::HashSet;

    fn create_test_store(blocks: usize) -> BlockStore<MemoryBlockDevice> {
        BlockStore::create(MemoryBlockDevice::new(blocks).unwrap())
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Fails every write once `writes_left` runs out.
    struct FailingDevice {
        inner: MemoryBlockDevice,
        writes_left: usize,
    }

    impl BlockStorage for FailingDevice {
        fn block_count(&self) -> usize {
            self.inner.block_count()
        }

        fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<()> {
            self.inner.read_block(blocknr, buf)
        }

        fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
            if self.writes_left == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "write failed").into());
            }
            self.writes_left -= 1;
            self.inner.write_block(blocknr, buf)
        }

        fn sync_disk(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Panics on the write after `writes_left` runs out.
    struct PanickingDevice {
        inner: MemoryBlockDevice,
        writes_left: usize,
    }

    impl BlockStorage for PanickingDevice {
        fn block_count(&self) -> usize {
            self.inner.block_count()
        }

        fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<()> {
            self.inner.read_block(blocknr, buf)
        }

        fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
            assert!(self.writes_left > 0, "device lost power");
            self.writes_left -= 1;
            self.inner.write_block(blocknr, buf)
        }

        fn sync_disk(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn five_thousand_bytes_take_two_blocks() {
        let mut store = create_test_store(4);
        let id = FileId::new_v4();
        let content = patterned(5000);

        store.save(id, &content).unwrap();
        assert_eq!(store.used_block_count(), 2);
        assert_eq!(store.inode(id).unwrap().blocks(), &[0, 1]);
        assert_eq!(store.read(id).unwrap(), content);

        store.delete(id).unwrap();
        assert_eq!(store.used_block_count(), 0);
    }

    #[test]
    fn final_block_is_zero_padded_on_device() {
        let mut store = create_test_store(4);
        let id = FileId::new_v4();
        store.save(id, &[0xAA; 5000]).unwrap();

        let mut buf = vec![0xFF; BLOCK_SIZE];
        store.device_mut().read_block(1, &mut buf).unwrap();
        assert!(buf[..904].iter().all(|&b| b == 0xAA));
        assert!(buf[904..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_file_uses_no_blocks() {
        let mut store = create_test_store(4);
        let id = FileId::new_v4();

        store.save(id, &[]).unwrap();
        assert_eq!(store.used_block_count(), 0);
        assert!(store.contains(id));
        assert_eq!(store.read(id).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn exact_block_multiples_read_back_whole() {
        let mut store = create_test_store(8);
        let one = FileId::new_v4();
        let three = FileId::new_v4();
        let content_one = patterned(BLOCK_SIZE);
        let content_three = patterned(3 * BLOCK_SIZE);

        store.save(one, &content_one).unwrap();
        store.save(three, &content_three).unwrap();

        assert_eq!(store.read(one).unwrap(), content_one);
        assert_eq!(store.read(three).unwrap(), content_three);
        assert_eq!(store.used_block_count(), 4);
    }

    #[test]
    fn tampered_block_is_detected() {
        let mut store = create_test_store(4);
        let id = FileId::new_v4();
        store.save(id, &patterned(6000)).unwrap();

        let second = store.inode(id).unwrap().blocks()[1];
        let mut buf = vec![0; BLOCK_SIZE];
        store.device_mut().read_block(second, &mut buf).unwrap();
        buf[10] ^= 0xFF;
        store.device_mut().write_block(second, &buf).unwrap();

        match store.read(id) {
            Err(StoreError::CorruptionDetected { block }) => assert_eq!(block, second),
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn tampering_with_padding_is_detected() {
        let mut store = create_test_store(2);
        let id = FileId::new_v4();
        store.save(id, b"short").unwrap();

        let mut buf = vec![0; BLOCK_SIZE];
        store.device_mut().read_block(0, &mut buf).unwrap();
        buf[BLOCK_SIZE - 1] = 1;
        store.device_mut().write_block(0, &buf).unwrap();

        assert!(matches!(
            store.read(id),
            Err(StoreError::CorruptionDetected { block: 0 })
        ));
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let mut store = create_test_store(2);
        let id = FileId::new_v4();

        assert!(matches!(store.read(id), Err(StoreError::NotFound(missing)) if missing == id));
        assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn deleted_file_is_gone() {
        let mut store = create_test_store(2);
        let id = FileId::new_v4();
        store.save(id, b"hello").unwrap();
        store.delete(id).unwrap();

        assert!(!store.contains(id));
        assert!(matches!(store.read(id), Err(StoreError::NotFound(_))));
        assert!(store.ledger.is_empty());
    }

    #[test]
    fn exhaustion_leaves_existing_files_alone() {
        let mut store = create_test_store(4);
        let kept = FileId::new_v4();
        let content = patterned(2 * BLOCK_SIZE + 1);
        store.save(kept, &content).unwrap();
        assert_eq!(store.used_block_count(), 3);

        let rejected = FileId::new_v4();
        match store.save(rejected, &patterned(2 * BLOCK_SIZE)) {
            Err(StoreError::InsufficientSpace {
                requested: 2,
                available: 1,
            }) => (),
            other => panic!("expected insufficient space, got {:?}", other),
        }

        assert!(!store.contains(rejected));
        assert_eq!(store.used_block_count(), 3);
        assert_eq!(store.read(kept).unwrap(), content);
    }

    #[test]
    fn failed_write_returns_blocks() {
        let dev = FailingDevice {
            inner: MemoryBlockDevice::new(4).unwrap(),
            writes_left: 1,
        };
        let mut store = BlockStore::create(dev);
        let id = FileId::new_v4();

        assert!(matches!(
            store.save(id, &patterned(3 * BLOCK_SIZE)),
            Err(StoreError::Io(_))
        ));
        assert_eq!(store.used_block_count(), 0);
        assert!(store.ledger.is_empty());
        assert!(!store.contains(id));
    }

    #[test]
    fn resaving_an_id_keeps_old_blocks_allocated() {
        let mut store = create_test_store(4);
        let id = FileId::new_v4();
        store.save(id, &patterned(BLOCK_SIZE)).unwrap();
        store.save(id, b"replacement").unwrap();

        assert_eq!(store.read(id).unwrap(), b"replacement".to_vec());
        assert_eq!(store.inode(id).unwrap().blocks(), &[1]);
        assert_eq!(store.used_block_count(), 2);
        assert_eq!(store.allocator.state(0).unwrap(), State::Used);

        store.delete(id).unwrap();
        assert_eq!(store.used_block_count(), 1);
    }

    #[test]
    fn freed_blocks_are_reused_first() {
        let mut store = create_test_store(8);
        let a = FileId::new_v4();
        let b = FileId::new_v4();
        let c = FileId::new_v4();
        store.save(a, &patterned(2 * BLOCK_SIZE)).unwrap();
        store.save(b, &patterned(BLOCK_SIZE)).unwrap();
        store.delete(a).unwrap();

        store.save(c, &patterned(3 * BLOCK_SIZE)).unwrap();
        assert_eq!(store.inode(c).unwrap().blocks(), &[0, 1, 3]);
        assert_eq!(store.read(c).unwrap(), patterned(3 * BLOCK_SIZE));
    }

    #[test]
    fn live_files_never_share_blocks() {
        let mut store = create_test_store(16);
        let ids: Vec<FileId> = (0..6).map(|_| FileId::new_v4()).collect();
        for (i, &id) in ids.iter().enumerate() {
            store.save(id, &patterned(i * 3000 + 1)).unwrap();
        }
        store.delete(ids[1]).unwrap();
        store.delete(ids[4]).unwrap();
        store.save(FileId::new_v4(), &patterned(9000)).unwrap();

        let mut seen = HashSet::new();
        let mut total = 0;
        for (_, node) in store.files() {
            for &blocknr in node.blocks() {
                assert!(seen.insert(blocknr), "block {} shared", blocknr);
                assert!(store.ledger.contains(blocknr));
            }
            total += node.blocks().len();
        }
        assert_eq!(store.used_block_count(), total);
        assert_eq!(store.ledger.len(), total);
    }

    #[test]
    fn panicking_write_returns_blocks() {
        let dev = PanickingDevice {
            inner: MemoryBlockDevice::new(4).unwrap(),
            writes_left: 1,
        };
        let mut store = BlockStore::create(dev);
        let id = FileId::new_v4();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.save(id, &patterned(3 * BLOCK_SIZE))
        }));
        assert!(result.is_err());
        assert_eq!(store.used_block_count(), 0);
        assert!(store.ledger.is_empty());
        assert!(!store.contains(id));

        store.dev.writes_left = 4;
        store.save(id, &patterned(3 * BLOCK_SIZE)).unwrap();
        assert_eq!(store.inode(id).unwrap().blocks(), &[0, 1, 2]);
    }
}
