use crate::io::BlockNumber;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;

/// SHA-256 of a full block as it was written, padding included.
pub type Digest = [u8; 32];

pub fn digest(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Remembers what every allocated block should hash to.
#[derive(Debug, Default)]
pub struct IntegrityLedger {
    digests: HashMap<BlockNumber, Digest>,
}

impl IntegrityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the digest of `data` for `blocknr`, replacing any earlier one.
    pub fn record(&mut self, blocknr: BlockNumber, data: &[u8]) {
        self.digests.insert(blocknr, digest(data));
    }

    /// True when `data` hashes to the digest recorded for `blocknr`. A block with no
    /// recorded digest never verifies.
    pub fn verify(&self, blocknr: BlockNumber, data: &[u8]) -> bool {
        match self.digests.get(&blocknr) {
            Some(expected) => *expected == digest(data),
            None => false,
        }
    }

    pub fn forget(&mut self, blocknr: BlockNumber) {
        self.digests.remove(&blocknr);
    }

    pub fn contains(&self, blocknr: BlockNumber) -> bool {
        self.digests.contains_key(&blocknr)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}
