//! # 空闲位图层
//!
//! 覆盖整个设备的扇区分配位图。位图常驻内存，短临界区用自旋锁保护；
//! 持久化到保留扇区（紧跟超级块）则显式经过缓冲区层。
//!
//! 每一位指示一个扇区，置位表示已分配。

use log::debug;
use spin::Mutex;

use crate::BufferCache;
use crate::FsError;
use crate::Result;
use crate::SectorId;
use crate::SECTOR_SIZE;

/// 一个扇区能容纳的位数
const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;
/// 一个扇区能容纳的位组数
const WORDS_PER_SECTOR: usize = SECTOR_SIZE / 8;

/// 扇区分配位图
pub struct FreeMap {
    bits: Mutex<Bitmap>,
    /// 位图在磁盘上的起始扇区
    start_sector: SectorId,
    /// 位图占据扇区数
    sector_count: u32,
}

struct Bitmap {
    /// 64位一组的位，低位在前
    words: Vec<u64>,
    /// 可用位数，之后的填充位恒为1
    len: usize,
}

impl FreeMap {
    /// 位图覆盖 `device_sectors` 个扇区时自身占据的扇区数
    pub fn sectors_for(device_sectors: usize) -> u32 {
        device_sectors.div_ceil(BITS_PER_SECTOR) as u32
    }

    /// 构建全新位图：超级块与位图自身的保留扇区直接标为已分配
    pub fn format(device_sectors: usize, start_sector: SectorId) -> Self {
        let sector_count = Self::sectors_for(device_sectors);
        let mut bitmap = Bitmap::new(device_sectors);
        for sector in 0..(start_sector + sector_count) as usize {
            bitmap.set(sector);
        }
        Self {
            bits: Mutex::new(bitmap),
            start_sector,
            sector_count,
        }
    }

    /// 从保留扇区读回位图
    pub fn load(cache: &BufferCache, device_sectors: usize, start_sector: SectorId) -> Self {
        let sector_count = Self::sectors_for(device_sectors);
        let mut bitmap = Bitmap::new(device_sectors);

        let mut buf = [0u8; SECTOR_SIZE];
        for index in 0..sector_count {
            cache.read(start_sector + index, 0, &mut buf);
            for (word_index, chunk) in buf.chunks_exact(8).enumerate() {
                let at = index as usize * WORDS_PER_SECTOR + word_index;
                if at < bitmap.words.len() {
                    bitmap.words[at] = u64::from_le_bytes(chunk.try_into().unwrap());
                }
            }
        }
        // 末尾填充位必须保持置位，避免分配出越界扇区
        bitmap.seal_tail();

        Self {
            bits: Mutex::new(bitmap),
            start_sector,
            sector_count,
        }
    }

    /// 把位图写入保留扇区。整扇区盲写，不触发读盘。
    pub fn persist(&self, cache: &BufferCache) {
        let bits = self.bits.lock();
        let mut buf = [0u8; SECTOR_SIZE];
        for index in 0..self.sector_count {
            for (word_index, chunk) in buf.chunks_exact_mut(8).enumerate() {
                let at = index as usize * WORDS_PER_SECTOR + word_index;
                let word = bits.words.get(at).copied().unwrap_or(0);
                chunk.copy_from_slice(&word.to_le_bytes());
            }
            cache.write(self.start_sector + index, 0, &buf);
        }
        debug!("free map persisted to sectors {}..={}", self.start_sector, self.start_sector + self.sector_count - 1);
    }

    /// 分配 `n` 个连续扇区，返回首扇区号
    pub fn allocate(&self, n: usize) -> Result<SectorId> {
        debug_assert!(n > 0);
        let mut bits = self.bits.lock();
        let first = bits.find_clear_run(n).ok_or(FsError::NoSpace)?;
        for sector in first..first + n {
            bits.set(sector);
        }
        Ok(first as SectorId)
    }

    /// 释放从 `first` 起的 `n` 个扇区
    pub fn release(&self, first: SectorId, n: usize) {
        let mut bits = self.bits.lock();
        for sector in first as usize..first as usize + n {
            bits.clear(sector);
        }
    }

    /// 当前空闲扇区数
    pub fn free_count(&self) -> usize {
        let bits = self.bits.lock();
        let set: usize = bits.words.iter().map(|word| word.count_ones() as usize).sum();
        // 填充位恒为1，不算已分配
        bits.len - (set - bits.padding_bits())
    }

    /// `sector` 是否已分配
    pub fn is_used(&self, sector: SectorId) -> bool {
        self.bits.lock().test(sector as usize)
    }
}

impl Bitmap {
    fn new(len: usize) -> Self {
        let mut bitmap = Self {
            words: vec![0; len.div_ceil(64)],
            len,
        };
        bitmap.seal_tail();
        bitmap
    }

    /// 把末尾填充位全部置1
    fn seal_tail(&mut self) {
        let tail = self.len % 64;
        if tail != 0 {
            *self.words.last_mut().unwrap() |= !0u64 << tail;
        }
    }

    fn padding_bits(&self) -> usize {
        self.words.len() * 64 - self.len
    }

    #[inline]
    fn test(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    fn set(&mut self, index: usize) {
        debug_assert!(index < self.len);
        self.words[index / 64] |= 1 << (index % 64);
    }

    fn clear(&mut self, index: usize) {
        debug_assert!(index < self.len);
        // 释放未分配的扇区说明上层记账已坏
        assert_ne!(self.words[index / 64] & (1 << (index % 64)), 0, "double free of sector {index}");
        self.words[index / 64] &= !(1 << (index % 64));
    }

    /// 寻找 `n` 个连续清零位，返回首位下标
    fn find_clear_run(&self, n: usize) -> Option<usize> {
        if n == 1 {
            // 单扇区快速路径：逐组找还有0的位组
            return self.words.iter().enumerate().find_map(|(group, &word)| {
                (word != u64::MAX).then(|| group * 64 + word.trailing_ones() as usize)
            });
        }

        let mut run = 0;
        for index in 0..self.len {
            if self.test(index) {
                run = 0;
            } else {
                run += 1;
                if run == n {
                    return Some(index + 1 - n);
                }
            }
        }
        None
    }
}
