use crate::io::BlockNumber;
use crate::node::FileId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("block {block} out of range, device holds {block_count} blocks")]
    OutOfRange {
        block: BlockNumber,
        block_count: usize,
    },
    #[error("backing medium is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("requested {requested} blocks but only {available} are free")]
    InsufficientSpace { requested: usize, available: usize },
    #[error("digest mismatch reading block {block}")]
    CorruptionDetected { block: BlockNumber },
    #[error("found no file with id {0}")]
    NotFound(FileId),
    #[error("block device i/o failed")]
    Io(#[from] std::io::Error),
}
