use crate::error::{Result, StoreError};
use crate::io::BlockNumber;
use log::debug;
use std::collections::HashSet;

#[derive(Debug, PartialEq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block, packed into 64 bit words. A set bit marks the block as used.
#[derive(Debug, Clone)]
pub struct Bitmap {
    bitmap: Vec<u64>,
    /// Number of addressable bits. The tail of the last word is never set.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, blocknr: BlockNumber) -> State {
        assert!(blocknr < self.len, "bit {} outside bitmap of {}", blocknr, self.len);
        // Grab of the u64 containing the significant bit.
        let outer_offset = self.bitmap[blocknr / 64];

        let inner_offset = blocknr % 64;
        match (outer_offset >> inner_offset) & 0b01 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, blocknr: BlockNumber) {
        assert!(blocknr < self.len, "bit {} outside bitmap of {}", blocknr, self.len);
        self.bitmap[blocknr / 64] |= 0b01_u64 << (blocknr % 64);
    }

    pub fn set_free(&mut self, blocknr: BlockNumber) {
        assert!(blocknr < self.len, "bit {} outside bitmap of {}", blocknr, self.len);
        self.bitmap[blocknr / 64] &= !(0b01_u64 << (blocknr % 64));
    }

    /// Population count of the map.
    pub fn count_used(&self) -> usize {
        self.bitmap.iter().map(|word| word.count_ones() as usize).sum()
    }
}

/// Next-fit scan over a bitmap. Each call to the iterator reserves the first free block at or
/// after the marker and leaves the marker on the block it just handed out, so consecutive
/// calls pack a request into the run directly following the previous grant.
///
/// The marker stays on the returned block rather than moving past it. That block is already
/// reserved, so the next scan from the same position skips it.
pub struct NextAvailableAllocation<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: usize,
    bitmap: &'a mut Bitmap,
}

impl<'a> NextAvailableAllocation<'a> {
    pub fn new(bitmap: &'a mut Bitmap) -> Self {
        Self { marker: 0, bitmap }
    }
}

impl<'a> Iterator for NextAvailableAllocation<'a> {
    type Item = BlockNumber;

    fn next(&mut self) -> Option<Self::Item> {
        for i in self.marker..self.bitmap.len() {
            if let State::Free = self.bitmap.get(i) {
                self.bitmap.set_reserved(i);
                self.marker = i;
                return Some(i);
            }
        }
        None
    }
}

/// Hands out and reclaims data blocks. Capacity is fixed at construction.
pub struct BlockAllocator {
    bitmap: Bitmap,
}

impl BlockAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            bitmap: Bitmap::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.bitmap.len()
    }

    pub fn used_count(&self) -> usize {
        self.bitmap.count_used()
    }

    pub fn free_count(&self) -> usize {
        self.capacity() - self.used_count()
    }

    pub fn state(&self, blocknr: BlockNumber) -> Result<State> {
        self.check_range(blocknr)?;
        Ok(self.bitmap.get(blocknr))
    }

    fn check_range(&self, blocknr: BlockNumber) -> Result<()> {
        if blocknr >= self.capacity() {
            return Err(StoreError::OutOfRange {
                block: blocknr,
                block_count: self.capacity(),
            });
        }
        Ok(())
    }

    /// Reserves `n` free blocks, returned in allocation order. Either every block is granted
    /// or none is: a request that runs off the end of the bitmap releases whatever it had
    /// already reserved before failing.
    pub fn allocate(&mut self, n: usize) -> Result<Vec<BlockNumber>> {
        let available = self.free_count();
        let granted: Vec<BlockNumber> = NextAvailableAllocation::new(&mut self.bitmap)
            .take(n)
            .collect();

        if granted.len() < n {
            for &blocknr in granted.iter() {
                self.bitmap.set_free(blocknr);
            }
            return Err(StoreError::InsufficientSpace {
                requested: n,
                available,
            });
        }

        debug!("Allocated blocks {:?}.", granted);
        Ok(granted)
    }

    /// Returns blocks to the free pool.
    ///
    /// # Panics
    ///
    /// Releasing a block that is not currently allocated, or the same block twice in one
    /// call, means the caller's bookkeeping is broken and panics. Every block is checked
    /// before any bit is cleared, so the map is untouched when that happens.
    pub fn release(&mut self, blocks: &[BlockNumber]) -> Result<()> {
        for &blocknr in blocks {
            self.check_range(blocknr)?;
        }

        let mut seen = HashSet::with_capacity(blocks.len());
        for &blocknr in blocks {
            assert!(seen.insert(blocknr), "block {} released twice", blocknr);
            assert_eq!(
                self.bitmap.get(blocknr),
                State::Used,
                "released block {} was not allocated",
                blocknr
            );
        }

        for &blocknr in blocks {
            self.bitmap.set_free(blocknr);
        }
        debug!("Released blocks {:?}.", blocks);
        Ok(())
    }
}
