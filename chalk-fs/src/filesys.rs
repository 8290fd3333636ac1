//! # 文件系统门面
//!
//! 持有一次挂载的全部状态：块设备上的缓冲区、空闲位图与打开表。
//! 按路径的创建、打开、删除都在这里拆分路径并经目录层落到索引节点层。
//!
//! 卸载（析构）把空闲位图与所有脏扇区写回设备。

use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::dir::Dir;
use crate::free_map::FreeMap;
use crate::inode::{self, Inode, OpenInodes};
use crate::layout::{DirEntry, SuperBlock};
use crate::BlockDevice;
use crate::BufferCache;
use crate::File;
use crate::FsError;
use crate::Result;
use crate::SectorId;
use crate::SECTOR_SIZE;

/// 超级块所在扇区
const SUPER_BLOCK_SECTOR: SectorId = 0;
/// 空闲位图的起始扇区
const FREE_MAP_START: SectorId = 1;
/// 新目录预留的目录项数
const DIR_PREALLOC_ENTRIES: usize = 16;

/// 一次挂载的文件系统
pub struct FileSys {
    cache: Arc<BufferCache>,
    free_map: Arc<FreeMap>,
    open_inodes: Arc<OpenInodes>,
    root_dir_sector: SectorId,
    /// 串行化目录内容的改动，防止并发创建抢占同一个空槽位
    namespace: Mutex<()>,
}

impl FileSys {
    /// 在空白设备上建立文件系统并挂载。
    /// 设备小到放不下根目录属于配置错误，直接终止。
    pub fn format(device: Arc<dyn BlockDevice>) -> Self {
        let sector_count = device.sector_count();
        info!("formatting file system over {sector_count} sectors");

        let cache = Arc::new(BufferCache::new(device));
        let free_map = Arc::new(FreeMap::format(sector_count, FREE_MAP_START));

        let root_dir_sector = free_map
            .allocate(1)
            .expect("device too small for the free map");
        inode::create(
            &cache,
            &free_map,
            root_dir_sector,
            DirEntry::SIZE * DIR_PREALLOC_ENTRIES,
            true,
        )
        .expect("root directory creation failed");

        cache.write(SUPER_BLOCK_SECTOR, 0, &[0u8; SECTOR_SIZE]);
        let super_block = SuperBlock::new(
            sector_count as u32,
            FreeMap::sectors_for(sector_count),
            root_dir_sector,
        );
        cache.write(SUPER_BLOCK_SECTOR, 0, super_block.as_bytes());

        free_map.persist(&cache);
        cache.flush();

        Self {
            cache,
            free_map,
            open_inodes: OpenInodes::new(),
            root_dir_sector,
            namespace: Mutex::new(()),
        }
    }

    /// 挂载已格式化的设备。超级块校验失败直接终止。
    pub fn mount(device: Arc<dyn BlockDevice>) -> Self {
        let sector_count = device.sector_count();
        let cache = Arc::new(BufferCache::new(device));

        let mut super_block = SuperBlock::zeroed();
        cache.read(SUPER_BLOCK_SECTOR, 0, super_block.as_bytes_mut());
        assert!(super_block.is_valid(), "not a chalk-fs image");
        assert_eq!(
            super_block.sector_count as usize, sector_count,
            "image does not match device size"
        );

        let free_map = Arc::new(FreeMap::load(&cache, sector_count, FREE_MAP_START));
        info!(
            "mounted file system: {sector_count} sectors, root directory at sector {}",
            super_block.root_dir_sector
        );

        Self {
            cache,
            free_map,
            open_inodes: OpenInodes::new(),
            root_dir_sector: super_block.root_dir_sector,
            namespace: Mutex::new(()),
        }
    }

    /// 创建普通文件，初始长度 `size` 字节（内容全零）
    pub fn create(&self, path: &str, size: usize) -> Result<()> {
        self.create_at(path, size, false)
    }

    /// 创建目录
    pub fn mkdir(&self, path: &str) -> Result<()> {
        self.create_at(path, DirEntry::SIZE * DIR_PREALLOC_ENTRIES, true)
    }

    /// 按路径打开文件。以斜杠结尾（或就是根）表示打开目录本身。
    pub fn open(&self, path: &str) -> Result<File> {
        let (parents, name) = split_path(path);
        let dir = self.open_dir(&parents)?;

        let inode = if name.is_empty() {
            self.open_inode(dir.inode().inumber())
        } else {
            let sector = dir.lookup(name).ok_or(FsError::NotFound)?;
            self.open_inode(sector)
        };

        if inode.is_removed() {
            inode.close();
            return Err(FsError::NotFound);
        }
        Ok(File::new(inode))
    }

    /// 把文件或空目录从其父目录摘除。
    /// 扇区回收推迟到最后一个打开者关闭；已打开的句柄仍然可用。
    pub fn remove(&self, path: &str) -> Result<()> {
        let (parents, name) = split_path(path);
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }

        let _namespace = self.namespace.lock().unwrap();
        let dir = self.open_dir(&parents)?;
        let sector = dir.lookup(name).ok_or(FsError::NotFound)?;
        let inode = self.open_inode(sector);

        if inode.is_dir() {
            let target = Dir::new(inode);
            if !target.is_empty() {
                return Err(FsError::DirectoryNotEmpty);
            }
            dir.remove(name);
            target.inode().remove();
        } else {
            dir.remove(name);
            inode.remove();
            inode.close();
        }
        debug!("unlinked {path:?}");
        Ok(())
    }

    /// 目录下所有项的名字
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let (parents, name) = split_path(path);
        let mut components = parents;
        if !name.is_empty() {
            components.push(name);
        }
        let dir = self.open_dir(&components)?;
        Ok(dir.entries().iter().map(|entry| entry.name().to_string()).collect())
    }

    /// 把空闲位图与所有脏扇区写回设备
    pub fn flush(&self) {
        self.free_map.persist(&self.cache);
        self.cache.flush();
    }

    /// 当前空闲扇区数（观测用）
    pub fn free_sectors(&self) -> usize {
        self.free_map.free_count()
    }

    /* 缓冲区观测与测试钩子 */

    #[inline]
    pub fn cache_hit_count(&self) -> u64 {
        self.cache.hit_count()
    }

    #[inline]
    pub fn cache_access_count(&self) -> u64 {
        self.cache.access_count()
    }

    #[inline]
    pub fn reset_cache_stats(&self) {
        self.cache.reset_stats();
    }

    /// 写回并清空整个缓冲区
    #[inline]
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }
}

impl FileSys {
    fn create_at(&self, path: &str, size: usize, is_dir: bool) -> Result<()> {
        let (parents, name) = split_path(path);
        if name.is_empty() {
            return Err(FsError::InvalidPath);
        }

        let _namespace = self.namespace.lock().unwrap();
        let dir = self.open_dir(&parents)?;
        if dir.lookup(name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let home = self.free_map.allocate(1)?;
        if let Err(err) = inode::create(&self.cache, &self.free_map, home, size, is_dir) {
            self.free_map.release(home, 1);
            return Err(err);
        }
        if let Err(err) = dir.add(name, home) {
            // 目录登记失败，刚建好的索引节点连同数据整体回收
            let inode = self.open_inode(home);
            inode.remove();
            inode.close();
            return Err(err);
        }

        debug!("created {path:?}: sector {home}, {size} bytes, dir: {is_dir}");
        Ok(())
    }

    /// 从根目录沿 `components` 逐级下行
    fn open_dir(&self, components: &[&str]) -> Result<Dir> {
        let mut dir = Dir::new(self.open_inode(self.root_dir_sector));
        for component in components {
            let sector = dir.lookup(component).ok_or(FsError::NotFound)?;
            let inode = self.open_inode(sector);
            if !inode.is_dir() {
                inode.close();
                return Err(FsError::NotADirectory);
            }
            dir = Dir::new(inode);
        }
        Ok(dir)
    }

    #[inline]
    fn open_inode(&self, sector: SectorId) -> Arc<Inode> {
        self.open_inodes.open(sector, &self.cache, &self.free_map)
    }
}

impl Drop for FileSys {
    fn drop(&mut self) {
        self.flush();
    }
}

/// 把路径拆成父目录组件与最后一段；
/// 最后一段为空表示“目录本身”，中间的空组件忽略
fn split_path(path: &str) -> (Vec<&str>, &str) {
    let mut components: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let name = components.pop().unwrap();
    components.retain(|component| !component.is_empty());
    (components, name)
}
