//! 端到端测试：全部跑在内存块设备上

mod cache;
mod dirs;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use block_dev::MemDisk;
use chalk_fs::{BlockDevice, FileSys};

/// 统计底层设备真实 I/O 次数的包装，用于观察缓冲区的读写合并
pub struct CountingDisk {
    inner: MemDisk,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl CountingDisk {
    pub fn new(sector_count: usize) -> Self {
        Self {
            inner: MemDisk::new(sector_count),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl BlockDevice for CountingDisk {
    fn read_block(&self, sector: usize, buf: &mut [u8]) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_block(sector, buf);
    }

    fn write_block(&self, sector: usize, buf: &[u8]) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_block(sector, buf);
    }

    fn sector_count(&self) -> usize {
        self.inner.sector_count()
    }
}

/// 在全新内存盘上格式化一个文件系统
pub fn fresh_fs(sector_count: usize) -> FileSys {
    FileSys::format(Arc::new(MemDisk::new(sector_count)))
}

/// 行为确定的伪随机字节流，让读回校验不依赖时序
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed.wrapping_mul(2862933555777941757).wrapping_add(3037000493))
    }

    pub fn next_byte(&mut self) -> u8 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 56) as u8
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        buf.iter_mut().for_each(|byte| *byte = self.next_byte());
    }
}
