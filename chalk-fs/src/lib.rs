//! # chalk-fs
//!
//! 面向教学内核的小型磁盘文件系统，自下而上分为：
//! 写回式缓冲区层、空闲位图层、索引节点层与文件系统门面。
//!
//! 多个内核线程可以并发读写共享扇区；
//! 磁盘 I/O 期间释放全局锁，靠条件变量同步各层状态。

/* chalk-fs 的整体架构，自上而下 */

// 文件系统门面：挂载、格式化、按路径创建/打开/删除
mod filesys;
pub use filesys::FileSys;

// 文件句柄层：带读写位置的打开文件
mod file;
pub use file::File;
pub use file::{Stat, StatKind};

// 目录层：名字到索引节点扇区的映射
mod dir;

// 索引节点层：打开表、三级块索引、扩展与延迟回收
mod inode;

// 空闲位图层：扇区的分配与释放
mod free_map;

// 缓冲区层：内存上的磁盘扇区缓存
mod buffer_cache;
pub use buffer_cache::BufferCache;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;

mod error;
pub use error::{FsError, Result};

pub use block_dev::BlockDevice;
pub use block_dev::SECTOR_SIZE;

/// 扇区号，指向底层块设备中的一个扇区
pub type SectorId = u32;

/// 内存中表示“无扇区”的哨兵值；
/// 磁盘上的“未分配”一律用 0 表示（扇区 0 恒为超级块）
pub const INVALID_SECTOR: SectorId = SectorId::MAX;

/// 单个文件的最大字节数
pub use layout::MAX_FILE_SIZE;

type DataSector = [u8; SECTOR_SIZE];

/// 容纳 `len` 字节需要的数据扇区数
#[inline]
pub(crate) fn bytes_to_sectors(len: usize) -> usize {
    len.div_ceil(SECTOR_SIZE)
}
