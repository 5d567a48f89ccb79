use super::{check_access, device_len, BlockNumber, BlockStorage, BLOCK_SIZE};
use crate::error::Result;

/// A block device held entirely in memory. Contents start zeroed and are lost on drop.
pub struct MemoryBlockDevice {
    data: Vec<u8>,
    block_count: usize,
}

impl MemoryBlockDevice {
    /// # Errors
    ///
    /// `InvalidArgument` for a zero block count or one whose byte size overflows.
    pub fn new(block_count: usize) -> Result<Self> {
        Ok(MemoryBlockDevice {
            data: vec![0; device_len(block_count)?],
            block_count,
        })
    }

    fn range(blocknr: BlockNumber) -> std::ops::Range<usize> {
        let start = blocknr * BLOCK_SIZE;
        start..start + BLOCK_SIZE
    }
}

impl BlockStorage for MemoryBlockDevice {
    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<()> {
        check_access(blocknr, self.block_count, buf.len())?;
        buf.copy_from_slice(&self.data[Self::range(blocknr)]);
        Ok(())
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
        check_access(blocknr, self.block_count, buf.len())?;
        self.data[Self::range(blocknr)].copy_from_slice(buf);
        Ok(())
    }

    fn sync_disk(&mut self) -> Result<()> {
        Ok(())
    }
}
