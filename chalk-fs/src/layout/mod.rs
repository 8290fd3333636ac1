//! # 磁盘数据结构层
//!
//! chalk-fs 的磁盘布局：
//! 超级块 | 空闲位图 | 根目录索引节点 | 索引节点与数据扇区
//!
//! 索引节点记录与目录项的字段顺序是磁盘可观察的，
//! 跨实现兼容时必须保持不变。

mod super_block;
pub use super_block::SuperBlock;

mod disk_inode;
pub use disk_inode::{DiskInode, IndirectSector};
pub use disk_inode::{DIRECT_COUNT, INDIRECT1_CAP, INDIRECT2_CAP, INDIRECT_COUNT, MAX_FILE_SIZE};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, NAME_MAX_LEN};
