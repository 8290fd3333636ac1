use core::mem;
use core::{ptr, slice};

use crate::SectorId;

/// 超级块的魔数
const MAGIC: u32 = 0x43484c4b;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位空闲位图与根目录
#[derive(Debug, Clone)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据扇区数
    pub sector_count: u32,
    /// 空闲位图占据扇区数，紧跟在超级块之后
    pub free_map_sectors: u32,
    /// 根目录索引节点所在扇区
    pub root_dir_sector: SectorId,
}

impl SuperBlock {
    pub fn new(sector_count: u32, free_map_sectors: u32, root_dir_sector: SectorId) -> Self {
        Self {
            magic: MAGIC,
            sector_count,
            free_map_sectors,
            root_dir_sector,
        }
    }

    /// 读盘前的占位值，内容由缓冲区层覆盖
    pub fn zeroed() -> Self {
        Self {
            magic: 0,
            sector_count: 0,
            free_map_sectors: 0,
            root_dir_sector: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), mem::size_of::<Self>()) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), mem::size_of::<Self>()) }
    }
}
