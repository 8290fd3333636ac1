//! # 缓冲区层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟
//! 定容缓冲区，把即将操作的扇区复制到内存中，合并对块设备的读写。
//! 采用写回策略：脏扇区只在被驱逐或显式 [`BufferCache::flush`] 时落盘。
//!
//! 整个缓冲区由一把全局锁保护；磁盘 I/O 期间释放该锁，
//! 靠槽位上的 `ready` 标志与条件变量让其它线程
//! 要么等待该槽位，要么换一个槽位继续，从而不被一次 I/O 拖住。
//!
//! 驱逐策略是跳过未就绪槽位的 LRU：命中会把槽位提到队首，
//! 受害者取队尾最近的就绪槽位。

use std::sync::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;

use log::trace;

use crate::BlockDevice;
use crate::DataSector;
use crate::SectorId;
use crate::INVALID_SECTOR;
use crate::SECTOR_SIZE;

/// 缓冲区槽位数
const SLOT_COUNT: usize = 64;

/// 一个槽位：缓存的扇区及其元数据
struct Slot {
    /// 缓存的扇区号，空槽位为 [`INVALID_SECTOR`]
    sector: SectorId,
    /// 内存内容比磁盘新
    dirty: bool,
    /// false 表示该槽位正处于读盘或写盘途中
    ready: bool,
    /// 缓存的数据
    data: DataSector,
}

struct CacheState {
    slots: Vec<Slot>,
    /// LRU 顺序的槽位下标，队首最近使用
    lru: Vec<usize>,
    /// 就绪槽位数，与 `slots` 中 `ready == true` 的个数恒等
    num_ready: usize,
    /// 命中次数，每次外部调用至多计一次
    num_hits: u64,
    /// 访问次数，每次外部调用恰计一次
    num_accesses: u64,
}

/// 写回式扇区缓存
pub struct BufferCache {
    device: Arc<dyn BlockDevice>,
    state: Mutex<CacheState>,
    /// 对应槽位的 I/O 完成通知
    until_ready: [Condvar; SLOT_COUNT],
    /// 任意槽位回到就绪的通知
    until_one_ready: Condvar,
}

impl BufferCache {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        let slots = (0..SLOT_COUNT)
            .map(|_| Slot {
                sector: INVALID_SECTOR,
                dirty: false,
                ready: true,
                data: [0; SECTOR_SIZE],
            })
            .collect();

        Self {
            device,
            state: Mutex::new(CacheState {
                slots,
                lru: (0..SLOT_COUNT).collect(),
                num_ready: SLOT_COUNT,
                num_hits: 0,
                num_accesses: 0,
            }),
            until_ready: core::array::from_fn(|_| Condvar::new()),
            until_one_ready: Condvar::new(),
        }
    }

    /// 把 `sector` 缓存内容中 `offset` 起的字节复制进 `buf`。
    ///
    /// 要求 `offset + buf.len() <= SECTOR_SIZE`。
    pub fn read(&self, sector: SectorId, offset: usize, buf: &mut [u8]) {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        let state = self.state.lock().unwrap();
        let (state, index) = self.access(state, sector, false);
        buf.copy_from_slice(&state.slots[index].data[offset..offset + buf.len()]);
    }

    /// 把 `buf` 复制进 `sector` 缓存内容中 `offset` 起的位置并标脏。
    ///
    /// 覆盖整个扇区的写是“盲写”：扇区不在缓存时直接占用槽位，
    /// 不先从磁盘读入。要求 `offset + buf.len() <= SECTOR_SIZE`。
    pub fn write(&self, sector: SectorId, offset: usize, buf: &[u8]) {
        assert!(offset + buf.len() <= SECTOR_SIZE);
        let blind = buf.len() == SECTOR_SIZE;
        let state = self.state.lock().unwrap();
        let (mut state, index) = self.access(state, sector, blind);
        let slot = &mut state.slots[index];
        slot.data[offset..offset + buf.len()].copy_from_slice(buf);
        slot.dirty = true;
    }

    /// 写回所有脏槽位，返回时全部已持久化
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        let mut written = 0u32;
        // clean 期间放锁，其它槽位可能变脏，故每轮重新扫描
        loop {
            let Some(index) = (0..SLOT_COUNT).find(|&i| {
                let slot = &state.slots[i];
                slot.dirty && slot.ready
            }) else {
                // 不就绪的槽位正被别的线程清洗或换入，等它完成再确认
                if state.slots.iter().any(|slot| !slot.ready) {
                    state = self.until_one_ready.wait(state).unwrap();
                    continue;
                }
                break;
            };
            state = self.clean(state, index);
            written += 1;
        }
        trace!("bufcache flush: {written} sectors written back");
    }

    /// 写回并清空全部槽位，只用于测试钩子
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(index) = (0..SLOT_COUNT).find(|&i| {
                let slot = &state.slots[i];
                slot.dirty && slot.ready
            }) {
                state = self.clean(state, index);
                continue;
            }
            if state.num_ready < SLOT_COUNT {
                state = self.until_one_ready.wait(state).unwrap();
                continue;
            }
            break;
        }
        for slot in &mut state.slots {
            slot.sector = INVALID_SECTOR;
            debug_assert!(slot.ready && !slot.dirty);
        }
    }

    #[inline]
    pub fn hit_count(&self) -> u64 {
        self.state.lock().unwrap().num_hits
    }

    #[inline]
    pub fn access_count(&self) -> u64 {
        self.state.lock().unwrap().num_accesses
    }

    pub fn reset_stats(&self) {
        let mut state = self.state.lock().unwrap();
        state.num_hits = 0;
        state.num_accesses = 0;
    }
}

impl BufferCache {
    /// 找到（必要时换入）缓存 `sector` 的槽位并提为最近使用。
    ///
    /// 命中只在第一轮循环就找到就绪匹配时计数；
    /// 之后任何慢路径（等待、清洗、换入）都不再算命中。
    fn access<'a>(
        &'a self,
        mut state: MutexGuard<'a, CacheState>,
        sector: SectorId,
        blind: bool,
    ) -> (MutexGuard<'a, CacheState>, usize) {
        debug_assert_ne!(sector, INVALID_SECTOR);
        debug_assert!((sector as usize) < self.device.sector_count());

        state.num_accesses += 1;
        let mut is_hit = true;
        loop {
            if let Some(index) = state.find(sector) {
                if !state.slots[index].ready {
                    // 别的线程正为这个扇区做 I/O，等它完成
                    is_hit = false;
                    state = self.until_ready[index].wait(state).unwrap();
                    continue;
                }
                if is_hit {
                    state.num_hits += 1;
                }
                state.promote(index);
                return (state, index);
            }

            is_hit = false;
            match state.eviction_candidate() {
                None => {
                    // 所有槽位都在 I/O 途中
                    state = self.until_one_ready.wait(state).unwrap();
                }
                Some(victim) if state.slots[victim].dirty => {
                    state = self.clean(state, victim);
                }
                Some(victim) if blind => {
                    // 整扇区覆盖写无需读盘，原地改名即可，
                    // 下一轮扫描就会命中这个槽位
                    trace!(
                        "bufcache: blind rename slot {victim} {} -> {sector}",
                        state.slots[victim].sector
                    );
                    state.slots[victim].sector = sector;
                }
                Some(victim) => {
                    state = self.replace(state, victim, sector);
                }
            }
        }
    }

    /// 把脏槽位写回磁盘。写盘期间放开全局锁，靠 `ready == false`
    /// 阻止其它线程命中或驱逐该槽位。
    fn clean<'a>(
        &'a self,
        mut state: MutexGuard<'a, CacheState>,
        index: usize,
    ) -> MutexGuard<'a, CacheState> {
        let slot = &mut state.slots[index];
        debug_assert!(slot.dirty && slot.ready);
        slot.ready = false;
        state.num_ready -= 1;
        let sector = state.slots[index].sector;
        let data = state.slots[index].data;
        drop(state);

        trace!("bufcache: write back sector {sector}");
        self.device.write_block(sector as usize, &data);

        let mut state = self.state.lock().unwrap();
        let slot = &mut state.slots[index];
        slot.dirty = false;
        slot.ready = true;
        state.num_ready += 1;
        self.until_ready[index].notify_all();
        self.until_one_ready.notify_all();
        state
    }

    /// 把干净槽位换成 `new_sector` 并从磁盘读入。
    /// 放锁前就改写扇区号，让并发查找能发现并等待它。
    fn replace<'a>(
        &'a self,
        mut state: MutexGuard<'a, CacheState>,
        index: usize,
        new_sector: SectorId,
    ) -> MutexGuard<'a, CacheState> {
        let slot = &mut state.slots[index];
        debug_assert!(!slot.dirty && slot.ready);
        slot.sector = new_sector;
        slot.ready = false;
        state.num_ready -= 1;
        drop(state);

        trace!("bufcache: fault in sector {new_sector}");
        let mut data = [0; SECTOR_SIZE];
        self.device.read_block(new_sector as usize, &mut data);

        let mut state = self.state.lock().unwrap();
        let slot = &mut state.slots[index];
        slot.data = data;
        slot.ready = true;
        state.num_ready += 1;
        self.until_ready[index].notify_all();
        self.until_one_ready.notify_all();
        state
    }
}

impl CacheState {
    /// 缓存着 `sector` 的槽位
    fn find(&self, sector: SectorId) -> Option<usize> {
        self.slots.iter().position(|slot| slot.sector == sector)
    }

    /// 提到 LRU 队首
    fn promote(&mut self, index: usize) {
        let pos = self.lru.iter().position(|&i| i == index).unwrap();
        self.lru.remove(pos);
        self.lru.insert(0, index);
    }

    /// 驱逐受害者：LRU 队尾最近的就绪槽位。
    /// 未就绪槽位的状态机属于正在做 I/O 的线程，跳过。
    fn eviction_candidate(&self) -> Option<usize> {
        if self.num_ready == 0 {
            return None;
        }
        self.lru
            .iter()
            .rev()
            .copied()
            .find(|&index| self.slots[index].ready)
    }
}
