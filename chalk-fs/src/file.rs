//! # 文件句柄层
//!
//! 每次按路径打开得到一个独立的句柄，各自维护读写位置；
//! 同一索引节点上的多个句柄共享文件内容。
//!
//! 句柄析构时关闭对索引节点的这次打开，
//! 被移除文件的扇区回收也由最后一个句柄的析构触发。

use core::fmt;
use std::sync::Arc;

use enumflags2::bitflags;

use crate::inode::Inode;
use crate::SectorId;

/// 打开的文件或目录
pub struct File {
    inode: Arc<Inode>,
    /// 文件内的读写位置，可越过文件末尾
    pos: usize,
    /// 本句柄是否正在拒绝写入
    denying: bool,
}

/// 文件元信息
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    /// 索引节点所在扇区，文件的稳定标识
    pub inode: u64,
    /// 文件长度（字节）
    pub size: u64,
    pub kind: StatKind,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    FILE = 0o100000,
}

impl File {
    pub(crate) fn new(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            pos: 0,
            denying: false,
        }
    }

    /// 从当前位置读出数据填充 `buf` 并前移位置。
    /// 返回实际读到的字节数，位置在文件末尾之后时为 0。
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let bytes_read = self.inode.read_at(self.pos, buf);
        self.pos += bytes_read;
        bytes_read
    }

    /// 把 `buf` 写入当前位置并前移位置，越过文件末尾时扩展文件。
    /// 返回实际写入的字节数，写拒绝生效时为 0。
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let bytes_written = self.inode.write_at(self.pos, buf);
        self.pos += bytes_written;
        bytes_written
    }

    /// 移动读写位置。`pos` 可以越过当前文件末尾，
    /// 后续读取返回 0，后续写入先扩展文件。
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// 最近一次设置（或前移）后的读写位置
    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// 文件当前长度（字节）
    #[inline]
    pub fn size(&self) -> usize {
        self.inode.length()
    }

    /// 索引节点所在扇区
    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.inode.inumber()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.inode.is_dir()
    }

    pub fn stat(&self) -> Stat {
        Stat {
            inode: self.inumber() as u64,
            size: self.size() as u64,
            kind: if self.is_dir() {
                StatKind::DIR
            } else {
                StatKind::FILE
            },
        }
    }

    /// 禁止对底层文件的写入，每个句柄至多生效一次。
    /// 供加载器保护运行中的可执行映像。
    pub fn deny_write(&mut self) {
        if !self.denying {
            self.denying = true;
            self.inode.deny_write();
        }
    }

    /// 撤销本句柄的写拒绝
    pub fn allow_write(&mut self) {
        if self.denying {
            self.denying = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
        self.inode.close();
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("inode", &self.inode.inumber())
            .field("pos", &self.pos)
            .finish()
    }
}
