mod block;
mod diskemu;
mod memory;

pub use block::{BlockNumber, BlockStorage, BLOCK_SIZE};
pub(crate) use block::{check_access, device_len};
pub use diskemu::{FileBlockEmulator, FileBlockEmulatorBuilder};
pub use memory::MemoryBlockDevice;
