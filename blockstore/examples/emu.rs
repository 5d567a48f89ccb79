use blockstore::{self, BlockStore, FileBlockEmulator, FileId};

pub fn main() -> Result<(), blockstore::StoreError> {
    let dir = tempfile::tempdir()?;
    let dev = FileBlockEmulator::open_disk(dir.path().join("disk.bin"), 100)?;

    // Save a file a little over one block long, read it back, then free it.
    let mut store = BlockStore::create(dev);
    let id = FileId::new_v4();
    let content = vec![0x2a; 5000];

    store.save(id, &content)?;
    println!("{} stored in blocks {:?}", id, store.inode(id).map(|node| node.blocks()));
    assert_eq!(store.read(id)?, content);

    store.delete(id)?;
    println!("{} of {} blocks in use", store.used_block_count(), store.capacity());
    Ok(())
}
