use std::mem;

use chalk_fs::layout::{DirEntry, DiskInode, IndirectSector, SuperBlock};
use chalk_fs::layout::{DIRECT_COUNT, INDIRECT2_CAP, INDIRECT_COUNT, MAX_FILE_SIZE};
use chalk_fs::SECTOR_SIZE;

#[test]
fn layout() {
    assert_eq!(SECTOR_SIZE, mem::size_of::<DiskInode>());
    assert_eq!(SECTOR_SIZE, mem::size_of::<IndirectSector>());
    assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
    assert!(mem::size_of::<SuperBlock>() <= SECTOR_SIZE);
}

#[test]
fn capacity() {
    assert_eq!(DIRECT_COUNT, 123);
    assert_eq!(INDIRECT_COUNT, 128);
    assert_eq!(INDIRECT2_CAP, 123 + 128 + 128 * 128);
    assert_eq!(MAX_FILE_SIZE, INDIRECT2_CAP * SECTOR_SIZE);
}
