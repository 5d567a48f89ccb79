use std::collections::HashMap;

use crate::io::{BlockNumber, BLOCK_SIZE};

/// Opaque, globally unique name of a stored file.
pub type FileId = uuid::Uuid;

/// Everything needed to put a file back together: where its bytes live and how many of
/// them there are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
  /// Data blocks in file order. The first block holds bytes `0..BLOCK_SIZE`.
  blocks: Vec<BlockNumber>,
  /// The total size of the file in bytes.
  size: u64,
}

impl Inode {
  pub fn new(blocks: Vec<BlockNumber>, size: u64) -> Self {
    debug_assert_eq!(blocks.len(), blocks_for(size));
    Self { blocks, size }
  }

  pub fn blocks(&self) -> &[BlockNumber] {
    &self.blocks
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  /// Bytes of the final block that belong to the file. A file whose size is an exact
  /// multiple of the block size fills its last block completely; an empty file has no
  /// last block and reports 0.
  pub fn last_block_len(&self) -> usize {
    if self.size == 0 {
      return 0;
    }
    match (self.size % BLOCK_SIZE as u64) as usize {
      0 => BLOCK_SIZE,
      rem => rem,
    }
  }
}

/// Number of blocks needed to hold `size` bytes.
pub fn blocks_for(size: u64) -> usize {
  ((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as usize
}

#[derive(Debug, Default)]
pub struct FileTable {
  nodes: HashMap<FileId, Inode>,
}

impl FileTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Stores `node` under `id`, handing back whatever was there before.
  pub fn insert(&mut self, id: FileId, node: Inode) -> Option<Inode> {
    self.nodes.insert(id, node)
  }

  pub fn get(&self, id: &FileId) -> Option<&Inode> {
    self.nodes.get(id)
  }

  pub fn remove(&mut self, id: &FileId) -> Option<Inode> {
    self.nodes.remove(id)
  }

  pub fn contains(&self, id: &FileId) -> bool {
    self.nodes.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&FileId, &Inode)> {
    self.nodes.iter()
  }
}
