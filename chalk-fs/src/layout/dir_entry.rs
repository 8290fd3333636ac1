use core::{ptr, slice};

use crate::SectorId;

/// 文件名的最大字节数
pub const NAME_MAX_LEN: usize = 27;

/// 目录项：名字到索引节点扇区的映射。
///
/// 目录的内容就是一串定长目录项，通过普通的文件读写访问；
/// 名字全零表示空槽位。
#[derive(Debug, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inode_sector: SectorId,
}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    /// `name` 长度不得超过 [`NAME_MAX_LEN`]，由目录层检查
    #[inline]
    pub fn new(name: &str, inode_sector: SectorId) -> Self {
        let bytes = name.as_bytes();
        debug_assert!(!bytes.is_empty() && bytes.len() <= NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self { name, inode_sector }
    }

    /// 空槽位
    #[inline]
    pub fn empty() -> Self {
        Self {
            name: [0; NAME_MAX_LEN + 1],
            inode_sector: 0,
        }
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap();
        core::str::from_utf8(&self.name[..len]).unwrap()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn inode_sector(&self) -> SectorId {
        self.inode_sector
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}
