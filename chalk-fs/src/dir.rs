//! # 目录层
//!
//! 目录的内容是一串定长目录项，复用索引节点层的普通文件读写；
//! 追加新项越过末尾时自然触发文件扩展。

use std::sync::Arc;

use crate::inode::Inode;
use crate::layout::{DirEntry, NAME_MAX_LEN};
use crate::FsError;
use crate::Result;
use crate::SectorId;

/// 打开的目录，持有底层索引节点的一次打开
pub(crate) struct Dir {
    inode: Arc<Inode>,
}

impl Dir {
    /// `inode` 的打开计数由调用方递增，关闭交给 [`Dir`] 的析构
    pub fn new(inode: Arc<Inode>) -> Self {
        debug_assert!(inode.is_dir());
        Self { inode }
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// 按名字查找目录项，返回其索引节点所在扇区
    pub fn lookup(&self, name: &str) -> Option<SectorId> {
        self.entry_at(name).map(|(entry, _)| entry.inode_sector())
    }

    /// 登记 `name -> inode_sector`。优先复用空槽位，没有就追加。
    pub fn add(&self, name: &str, inode_sector: SectorId) -> Result<()> {
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(FsError::NameTooLong);
        }
        if self.lookup(name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let offset = self.free_slot().unwrap_or_else(|| self.inode.length());
        let entry = DirEntry::new(name, inode_sector);
        if self.inode.write_at(offset, entry.as_bytes()) != DirEntry::SIZE {
            // 目录扩展失败
            return Err(FsError::NoSpace);
        }
        Ok(())
    }

    /// 摘除名为 `name` 的目录项，返回其索引节点所在扇区
    pub fn remove(&self, name: &str) -> Option<SectorId> {
        let (entry, offset) = self.entry_at(name)?;
        let wiped = DirEntry::empty();
        assert_eq!(self.inode.write_at(offset, wiped.as_bytes()), DirEntry::SIZE);
        Some(entry.inode_sector())
    }

    /// 目录中是否已无任何项
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// 按登记顺序列出所有目录项
    pub fn entries(&self) -> Vec<DirEntry> {
        let mut entries = Vec::new();
        let mut entry = DirEntry::empty();

        for offset in (0..self.inode.length()).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut()),
                DirEntry::SIZE
            );
            if !entry.is_empty() {
                entries.push(entry.clone());
            }
        }
        entries
    }

    /// 名为 `name` 的目录项及其字节偏移
    fn entry_at(&self, name: &str) -> Option<(DirEntry, usize)> {
        let mut entry = DirEntry::empty();

        for offset in (0..self.inode.length()).step_by(DirEntry::SIZE) {
            assert_eq!(
                self.inode.read_at(offset, entry.as_bytes_mut()),
                DirEntry::SIZE
            );
            if !entry.is_empty() && entry.name() == name {
                return Some((entry, offset));
            }
        }
        None
    }

    /// 第一个空槽位的字节偏移
    fn free_slot(&self) -> Option<usize> {
        let mut entry = DirEntry::empty();

        (0..self.inode.length())
            .step_by(DirEntry::SIZE)
            .find(|&offset| {
                assert_eq!(
                    self.inode.read_at(offset, entry.as_bytes_mut()),
                    DirEntry::SIZE
                );
                entry.is_empty()
            })
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        self.inode.close();
    }
}
