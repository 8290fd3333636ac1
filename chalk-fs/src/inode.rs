//! # 索引节点层
//!
//! 磁盘索引节点记录经由缓冲区层读写；内存索引节点按所在扇区
//! 登记在打开表中，同一扇区再次打开得到同一个对象，
//! 这也是写拒绝计数有意义的前提。
//!
//! 写越过文件末尾触发扩展：同一时刻至多一个扩展者，
//! 读者要么看到扩展前的长度，要么等扩展完成；
//! 分配失败时本次声明的扇区全部回滚。
//!
//! 已移除的索引节点在最后一次关闭时回收全部扇区。

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, Weak};

use log::debug;

use crate::bytes_to_sectors;
use crate::layout::{DiskInode, IndirectSector};
use crate::layout::{DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_SIZE};
use crate::free_map::FreeMap;
use crate::BufferCache;
use crate::FsError;
use crate::Result;
use crate::SectorId;
use crate::SECTOR_SIZE;

/// 进程级打开表，键为索引节点所在扇区
pub(crate) struct OpenInodes {
    table: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

/// 内存中的打开索引节点
pub(crate) struct Inode {
    /// 磁盘记录所在扇区，也是索引节点的稳定标识
    sector: SectorId,
    cache: Arc<BufferCache>,
    free_map: Arc<FreeMap>,
    /// 打开表的回引用，最后一次关闭时自表中摘除
    open_inodes: Weak<OpenInodes>,
    state: Mutex<InodeState>,
    /// 扩展结束的通知，读者靠它避开正在变化的长度
    until_not_extending: Condvar,
    /// 在途写入清零的通知，写拒绝靠它等待写者退场
    until_no_writers: Condvar,
}

struct InodeState {
    /// 打开计数
    open_cnt: usize,
    /// 0 表示允许写入
    deny_write_cnt: usize,
    /// 在途写入数
    writers: usize,
    /// 已从目录摘除，最后一次关闭时回收
    removed: bool,
    /// 有写者正在扩展文件
    extending: bool,
}

impl OpenInodes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            table: Mutex::new(BTreeMap::new()),
        })
    }

    /// 打开 `sector` 上的索引节点。
    /// 已打开则复用同一对象并递增打开计数。
    pub fn open(
        self: &Arc<Self>,
        sector: SectorId,
        cache: &Arc<BufferCache>,
        free_map: &Arc<FreeMap>,
    ) -> Arc<Inode> {
        let mut table = self.table.lock().unwrap();
        if let Some(inode) = table.get(&sector) {
            inode.state.lock().unwrap().open_cnt += 1;
            return inode.clone();
        }

        let inode = Arc::new(Inode {
            sector,
            cache: cache.clone(),
            free_map: free_map.clone(),
            open_inodes: Arc::downgrade(self),
            state: Mutex::new(InodeState {
                open_cnt: 1,
                deny_write_cnt: 0,
                writers: 0,
                removed: false,
                extending: false,
            }),
            until_not_extending: Condvar::new(),
            until_no_writers: Condvar::new(),
        });
        table.insert(sector, inode.clone());
        inode
    }

    /// 仍在打开表中的索引节点数（观测用）
    #[allow(dead_code)]
    pub fn open_count(&self) -> usize {
        self.table.lock().unwrap().len()
    }
}

impl Inode {
    /// 索引节点所在扇区
    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.sector
    }

    pub fn is_dir(&self) -> bool {
        self.read_record().is_dir()
    }

    /// 文件当前长度（字节）
    pub fn length(&self) -> usize {
        self.read_record().length()
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().unwrap().removed
    }

    /// 标记待删除；扇区回收推迟到最后一次关闭
    pub fn remove(&self) {
        self.state.lock().unwrap().removed = true;
    }

    /// 关闭一次打开。最后一次关闭把索引节点摘出打开表；
    /// 若已标记移除，还回收全部数据扇区与记录本身所在的扇区。
    pub fn close(&self) {
        let removed = if let Some(open_inodes) = self.open_inodes.upgrade() {
            let mut table = open_inodes.table.lock().unwrap();
            let mut state = self.state.lock().unwrap();
            debug_assert!(state.open_cnt > 0);
            state.open_cnt -= 1;
            if state.open_cnt > 0 {
                return;
            }
            table.remove(&self.sector);
            state.removed
        } else {
            // 文件系统已卸载，仅递减计数
            let mut state = self.state.lock().unwrap();
            state.open_cnt -= 1;
            return;
        };

        if removed {
            debug!("inode {}: reclaiming sectors at last close", self.sector);
            let record = self.read_record();
            release_extent(&self.cache, &self.free_map, &record);
            self.free_map.release(self.sector, 1);
        }
    }

    /// 禁止写入。等到在途写入退场后方可生效，
    /// 供加载器保护运行中的可执行映像。
    pub fn deny_write(&self) {
        let mut state = self.state.lock().unwrap();
        while state.writers > 0 {
            state = self.until_no_writers.wait(state).unwrap();
        }
        state.deny_write_cnt += 1;
        assert!(state.deny_write_cnt <= state.open_cnt);
    }

    /// 撤销一次 [`Inode::deny_write`]
    pub fn allow_write(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.deny_write_cnt > 0);
        assert!(state.deny_write_cnt <= state.open_cnt);
        state.deny_write_cnt -= 1;
    }

    /// 从字节偏移 `offset` 读出数据填充 `buf`，
    /// 返回实际读到的字节数，到文件末尾时可小于 `buf.len()`。
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        // 扩展途中的长度还没定，等它稳定再取
        {
            let mut state = self.state.lock().unwrap();
            while state.extending {
                state = self.until_not_extending.wait(state).unwrap();
            }
        }

        let mut offset = offset;
        let mut bytes_read = 0;
        while bytes_read < buf.len() {
            let record = self.read_record();
            let Some(sector) = byte_to_sector(&self.cache, &record, offset) else {
                break;
            };

            // 文件内剩余、扇区内剩余，取小者
            let sector_offset = offset % SECTOR_SIZE;
            let inode_left = record.length() - offset;
            let sector_left = SECTOR_SIZE - sector_offset;
            let chunk = (buf.len() - bytes_read).min(inode_left).min(sector_left);

            self.cache
                .read(sector, sector_offset, &mut buf[bytes_read..bytes_read + chunk]);

            offset += chunk;
            bytes_read += chunk;
        }
        bytes_read
    }

    /// 把 `buf` 写入字节偏移 `offset` 处，越过文件末尾时先扩展。
    /// 返回实际写入的字节数；写拒绝生效或扩展失败时为 0。
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        // 空写既不登记写者也不触发扩展
        let Some(end) = offset.checked_add(buf.len()).filter(|_| !buf.is_empty()) else {
            return 0;
        };

        {
            let mut state = self.state.lock().unwrap();
            if state.deny_write_cnt > 0 {
                return 0;
            }
            state.writers += 1;
        }

        if end > self.length() && !self.extend_to(end) {
            self.finish_write();
            return 0;
        }

        let mut offset = offset;
        let mut bytes_written = 0;
        while bytes_written < buf.len() {
            let record = self.read_record();
            let Some(sector) = byte_to_sector(&self.cache, &record, offset) else {
                break;
            };

            let sector_offset = offset % SECTOR_SIZE;
            let inode_left = record.length() - offset;
            let sector_left = SECTOR_SIZE - sector_offset;
            let chunk = (buf.len() - bytes_written).min(inode_left).min(sector_left);

            // 恰好整扇区的块走盲写，缓冲区层不会为它读盘
            self.cache
                .write(sector, sector_offset, &buf[bytes_written..bytes_written + chunk]);

            offset += chunk;
            bytes_written += chunk;
        }

        self.finish_write();
        bytes_written
    }
}

impl Inode {
    /// 读入磁盘记录；魔数不符说明索引节点已损坏，直接终止
    fn read_record(&self) -> DiskInode {
        let mut record = DiskInode::zeroed();
        self.cache.read(self.sector, 0, record.as_bytes_mut());
        assert!(record.is_valid(), "corrupted inode record at sector {}", self.sector);
        record
    }

    /// 把文件扩展到 `new_length` 字节。
    ///
    /// 同一时刻至多一个扩展者；分配与记录落盘期间不持有
    /// 索引节点锁，靠 `extending` 标志挡住读者。
    fn extend_to(&self, new_length: usize) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            while state.extending {
                state = self.until_not_extending.wait(state).unwrap();
            }
            state.extending = true;
        }

        // 前一个扩展者可能已经覆盖了目标长度，重新核对
        let mut record = self.read_record();
        let mut ok = true;
        if new_length > record.length() {
            match allocate_extent(&self.cache, &self.free_map, &mut record, new_length) {
                Ok(()) => {
                    record.set_length(new_length);
                    self.cache.write(self.sector, 0, record.as_bytes());
                }
                Err(err) => {
                    debug!("inode {}: extension to {new_length} failed: {err}", self.sector);
                    ok = false;
                }
            }
        }

        self.state.lock().unwrap().extending = false;
        self.until_not_extending.notify_all();
        ok
    }

    /// 写者退场，必要时唤醒等待中的写拒绝
    fn finish_write(&self) {
        let mut state = self.state.lock().unwrap();
        state.writers -= 1;
        if state.writers == 0 {
            self.until_no_writers.notify_all();
        }
    }
}

/// 初始化一个 `length` 字节的索引节点并把记录写入 `sector`。
/// 任何分配失败都会整体回滚并报告失败，不留部分效果。
pub(crate) fn create(
    cache: &BufferCache,
    free_map: &FreeMap,
    sector: SectorId,
    length: usize,
    is_dir: bool,
) -> Result<()> {
    let mut record = DiskInode::new(0, is_dir);
    allocate_extent(cache, free_map, &mut record, length)?;
    record.set_length(length);
    cache.write(sector, 0, record.as_bytes());
    Ok(())
}

/// 字节偏移 `offset` 归属的数据扇区；越过文件末尾时为 `None`
fn byte_to_sector(cache: &BufferCache, record: &DiskInode, offset: usize) -> Option<SectorId> {
    if offset >= record.length() {
        return None;
    }

    let block_index = offset / SECTOR_SIZE;
    let sector = if block_index < DIRECT_COUNT {
        record.direct[block_index]
    } else if block_index < DIRECT_COUNT + INDIRECT_COUNT {
        // 剔去直接索引的部分
        let single = read_table(cache, record.s_indirect);
        single.0[block_index - DIRECT_COUNT]
    } else {
        // 剔去直接与一级索引的部分
        let index = block_index - DIRECT_COUNT - INDIRECT_COUNT;
        let outer = read_table(cache, record.d_indirect);
        let inner = read_table(cache, outer.0[index / INDIRECT_COUNT]);
        inner.0[index % INDIRECT_COUNT]
    };
    debug_assert_ne!(sector, 0, "unallocated sector inside file extent");
    Some(sector)
}

/// 为容纳 `new_length` 字节补齐缺失的数据扇区与索引扇区。
///
/// 本次调用声明的扇区都登记在撤销表里，失败时逐个归还；
/// 索引扇区的内容只在全部分配成功后才落盘，
/// 因此失败路径不会在磁盘上留下悬空的扇区号。
fn allocate_extent(
    cache: &BufferCache,
    free_map: &FreeMap,
    record: &mut DiskInode,
    new_length: usize,
) -> Result<()> {
    if new_length > MAX_FILE_SIZE {
        return Err(FsError::TooLarge);
    }

    let mut claimed: Vec<SectorId> = Vec::new();
    match fill_tiers(cache, free_map, record, bytes_to_sectors(new_length), &mut claimed) {
        Ok(()) => Ok(()),
        Err(err) => {
            for &sector in claimed.iter().rev() {
                free_map.release(sector, 1);
            }
            Err(err)
        }
    }
}

fn fill_tiers(
    cache: &BufferCache,
    free_map: &FreeMap,
    record: &mut DiskInode,
    total: usize,
    claimed: &mut Vec<SectorId>,
) -> Result<()> {
    /* 直接索引 */
    for index in 0..total.min(DIRECT_COUNT) {
        claim_data(cache, free_map, &mut record.direct[index], claimed)?;
    }
    if total <= DIRECT_COUNT {
        return Ok(());
    }
    let remaining = total - DIRECT_COUNT;

    // 索引扇区的新内容先攒在内存里，成功后统一落盘
    let mut table_writes: Vec<(SectorId, IndirectSector)> = Vec::new();

    /* 一级索引 */
    let mut single = claim_table(cache, free_map, &mut record.s_indirect, claimed)?;
    for index in 0..remaining.min(INDIRECT_COUNT) {
        claim_data(cache, free_map, &mut single.0[index], claimed)?;
    }
    table_writes.push((record.s_indirect, single));

    /* 二级索引 */
    if remaining > INDIRECT_COUNT {
        let remaining = remaining - INDIRECT_COUNT;
        let mut outer = claim_table(cache, free_map, &mut record.d_indirect, claimed)?;

        for group in 0..remaining.div_ceil(INDIRECT_COUNT) {
            let mut inner = claim_table(cache, free_map, &mut outer.0[group], claimed)?;
            let count = (remaining - group * INDIRECT_COUNT).min(INDIRECT_COUNT);
            for index in 0..count {
                claim_data(cache, free_map, &mut inner.0[index], claimed)?;
            }
            table_writes.push((outer.0[group], inner));
        }
        table_writes.push((record.d_indirect, outer));
    }

    for (sector, table) in &table_writes {
        cache.write(*sector, 0, table.as_bytes());
    }
    Ok(())
}

/// 数据扇区号为 0 时在此分配一个，内容清零（整扇区盲写不触发读盘）
fn claim_data(
    cache: &BufferCache,
    free_map: &FreeMap,
    word: &mut SectorId,
    claimed: &mut Vec<SectorId>,
) -> Result<()> {
    if *word != 0 {
        return Ok(());
    }
    let sector = free_map.allocate(1)?;
    claimed.push(sector);
    cache.write(sector, 0, &[0u8; SECTOR_SIZE]);
    *word = sector;
    Ok(())
}

/// 索引扇区号为 0 时分配一个并返回空表，否则读入现有内容
fn claim_table(
    cache: &BufferCache,
    free_map: &FreeMap,
    word: &mut SectorId,
    claimed: &mut Vec<SectorId>,
) -> Result<IndirectSector> {
    if *word != 0 {
        return Ok(read_table(cache, *word));
    }
    let sector = free_map.allocate(1)?;
    claimed.push(sector);
    *word = sector;
    Ok(IndirectSector::zeroed())
}

fn read_table(cache: &BufferCache, sector: SectorId) -> IndirectSector {
    debug_assert_ne!(sector, 0);
    let mut table = IndirectSector::zeroed();
    cache.read(sector, 0, table.as_bytes_mut());
    table
}

/// 分配器的镜像：归还索引范围内所有可达的数据扇区与索引扇区。
/// 记录所在的扇区由调用方归还。
fn release_extent(cache: &BufferCache, free_map: &FreeMap, record: &DiskInode) {
    let total = bytes_to_sectors(record.length());

    for index in 0..total.min(DIRECT_COUNT) {
        free_map.release(record.direct[index], 1);
    }
    if total <= DIRECT_COUNT {
        return;
    }
    let remaining = total - DIRECT_COUNT;

    let single = read_table(cache, record.s_indirect);
    for index in 0..remaining.min(INDIRECT_COUNT) {
        free_map.release(single.0[index], 1);
    }
    free_map.release(record.s_indirect, 1);
    if remaining <= INDIRECT_COUNT {
        return;
    }
    let remaining = remaining - INDIRECT_COUNT;

    let outer = read_table(cache, record.d_indirect);
    for group in 0..remaining.div_ceil(INDIRECT_COUNT) {
        let inner = read_table(cache, outer.0[group]);
        let count = (remaining - group * INDIRECT_COUNT).min(INDIRECT_COUNT);
        for index in 0..count {
            free_map.release(inner.0[index], 1);
        }
        free_map.release(outer.0[group], 1);
    }
    free_map.release(record.d_indirect, 1);
}
