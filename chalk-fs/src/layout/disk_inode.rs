//! 磁盘索引节点与间接索引扇区
//!
//! 三级块索引：
//! - 直接：记录内嵌 [`DIRECT_COUNT`] 个数据扇区号
//! - 一级：`s_indirect` 指向一个间接扇区，内含 [`INDIRECT_COUNT`] 个数据扇区号
//! - 二级：`d_indirect` 指向一个间接扇区，内含 [`INDIRECT_COUNT`] 个一级间接扇区号
//!
//! 扇区号字段为 0 表示未分配；扇区 0 恒为超级块，不会与真实扇区冲突。

use core::mem;
use core::{ptr, slice};

use crate::SectorId;
use crate::SECTOR_SIZE;

/// 索引节点记录的魔数，用于损坏检测
const MAGIC: u32 = 0x494e4f44;

/// 记录内嵌的直接索引数量
pub const DIRECT_COUNT: usize = 123;
/// 间接索引扇区的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 用上一级索引时的编号容量
pub const INDIRECT1_CAP: usize = DIRECT_COUNT + INDIRECT_COUNT;
/// 用上二级索引时的编号容量
pub const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT_COUNT * INDIRECT_COUNT;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = INDIRECT2_CAP * SECTOR_SIZE;

/// 磁盘索引节点记录，恰好占据一个扇区。
///
/// 字段顺序是磁盘格式的一部分，不可调整。
#[repr(C)]
pub struct DiskInode {
    /// 文件长度（字节），非负
    length: i32,
    /// 是否为目录，以32位字段存储
    is_dir: u32,
    /// 直接索引的数据扇区号
    pub direct: [SectorId; DIRECT_COUNT],
    /// 指向一级间接扇区
    pub s_indirect: SectorId,
    /// 指向二级间接扇区
    pub d_indirect: SectorId,
    /// 魔数
    magic: u32,
}

impl DiskInode {
    /// 构造全新的记录，所有索引均未分配
    pub fn new(length: usize, is_dir: bool) -> Self {
        debug_assert!(length <= MAX_FILE_SIZE);
        Self {
            length: length as i32,
            is_dir: is_dir as u32,
            direct: [0; DIRECT_COUNT],
            s_indirect: 0,
            d_indirect: 0,
            magic: MAGIC,
        }
    }

    /// 读盘前的占位记录，魔数为零，内容由缓冲区层覆盖
    pub fn zeroed() -> Self {
        Self {
            length: 0,
            is_dir: 0,
            direct: [0; DIRECT_COUNT],
            s_indirect: 0,
            d_indirect: 0,
            magic: 0,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.length >= 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length as usize
    }

    #[inline]
    pub fn set_length(&mut self, length: usize) {
        debug_assert!(length <= MAX_FILE_SIZE);
        self.length = length as i32;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

/// 间接索引扇区：整个扇区连续存储扇区号
#[repr(transparent)]
pub struct IndirectSector(pub [SectorId; INDIRECT_COUNT]);

impl IndirectSector {
    #[inline]
    pub fn zeroed() -> Self {
        Self([0; INDIRECT_COUNT])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), SECTOR_SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), SECTOR_SIZE) }
    }
}

// 布局守恒：记录必须恰好占满一个扇区
const _: () = assert!(mem::size_of::<DiskInode>() == SECTOR_SIZE);
const _: () = assert!(mem::size_of::<IndirectSector>() == SECTOR_SIZE);
