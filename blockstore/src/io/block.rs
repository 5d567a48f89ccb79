use crate::error::Result;

/// 4k is a common block size for file systems. Disks commonly are composed of
/// 512 byte blocks mapping each file system block to 8 hard disk blocks.
pub const BLOCK_SIZE: usize = 4096;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// A fixed geometry device addressed in whole blocks. Implementations validate the
/// block number and buffer length before touching the medium.
pub trait BlockStorage {
    /// The total number of blocks the device holds. Never changes after construction.
    fn block_count(&self) -> usize;

    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// `OutOfRange` for a block past the end of the device, `InvalidArgument` if
    /// `buf` is not exactly `BLOCK_SIZE` bytes.
    fn read_block(&mut self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<()>;

    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// `OutOfRange` for a block past the end of the device, `InvalidArgument` if
    /// `buf` is not exactly `BLOCK_SIZE` bytes.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()>;

    /// Flush any buffered disk IO from memory. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> Result<()>;
}

/// Total bytes backing a device of `block_count` blocks. Zero blocks, or more than the
/// address space can hold, is an `InvalidArgument`.
pub(crate) fn device_len(block_count: usize) -> Result<usize> {
    use crate::error::StoreError;

    if block_count == 0 {
        return Err(StoreError::InvalidArgument(
            "block count must be greater than zero".to_string(),
        ));
    }
    block_count.checked_mul(BLOCK_SIZE).ok_or_else(|| {
        StoreError::InvalidArgument(format!("{} blocks overflow the device size", block_count))
    })
}

/// Shared argument checks for device implementations.
pub(crate) fn check_access(blocknr: BlockNumber, block_count: usize, buf_len: usize) -> Result<()> {
    use crate::error::StoreError;

    if blocknr >= block_count {
        return Err(StoreError::OutOfRange {
            block: blocknr,
            block_count,
        });
    }
    if buf_len != BLOCK_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "buffer must be exactly {} bytes, got {}",
            BLOCK_SIZE, buf_len
        )));
    }
    Ok(())
}
