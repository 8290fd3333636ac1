//! 缓冲区层的观测行为：盲写、命中统计、LRU 驱逐、读写合并

use std::sync::Arc;

use chalk_fs::{BlockDevice, BufferCache, FileSys, SECTOR_SIZE};

use super::{fresh_fs, CountingDisk, Lcg};

#[test]
fn blind_write_skips_device_read() {
    let device = Arc::new(CountingDisk::new(256));
    let cache = BufferCache::new(device.clone());

    // 整扇区覆盖写不触发读盘
    let payload = [0xA5u8; SECTOR_SIZE];
    cache.write(7, 0, &payload);
    assert_eq!(device.reads(), 0);

    // 写回前就能读到新内容
    let mut back = [0u8; SECTOR_SIZE];
    cache.read(7, 0, &mut back);
    assert_eq!(back, payload);
    assert_eq!(device.reads(), 0);
    assert_eq!(device.writes(), 0);

    cache.flush();
    assert_eq!(device.writes(), 1);

    // 部分写必须先把扇区读进来
    cache.write(9, 0, &payload[..8]);
    assert_eq!(device.reads(), 1);
}

#[test]
fn hit_and_access_accounting() {
    let device = Arc::new(CountingDisk::new(64));
    let cache = BufferCache::new(device);
    let mut buf = [0u8; 16];

    // 冷读：计访问不计命中
    cache.read(3, 0, &mut buf);
    assert_eq!(cache.access_count(), 1);
    assert_eq!(cache.hit_count(), 0);

    // 再读同一扇区：命中
    cache.read(3, 4, &mut buf);
    assert_eq!(cache.access_count(), 2);
    assert_eq!(cache.hit_count(), 1);

    assert!(cache.hit_count() <= cache.access_count());

    cache.reset_stats();
    assert_eq!(cache.access_count(), 0);
    assert_eq!(cache.hit_count(), 0);
}

#[test]
fn lru_evicts_rearmost_and_promotes_hits() {
    let device = Arc::new(CountingDisk::new(256));
    let cache = BufferCache::new(device.clone());
    let payload = [1u8; SECTOR_SIZE];
    let mut buf = [0u8; 4];

    // 64 次盲写填满所有槽位
    for sector in 1..=64 {
        cache.write(sector, 0, &payload);
    }
    // 把扇区 1 提到队首，队尾成为扇区 2
    cache.read(1, 0, &mut buf);

    let reads_before = device.reads();
    cache.write(65, 0, &payload);

    // 扇区 1 仍在缓存，扇区 2 已被驱逐
    cache.read(1, 0, &mut buf);
    assert_eq!(device.reads(), reads_before);
    cache.read(2, 0, &mut buf);
    assert_eq!(device.reads(), reads_before + 1);
}

#[test]
fn byte_writes_coalesce() {
    // 64 KiB 文件逐字节写入：访问数与命中数之差远小于字节数
    let fs = fresh_fs(1024);
    fs.create("coalesce", 64 * 1024).unwrap();
    let mut file = fs.open("coalesce").unwrap();
    fs.reset_cache_stats();

    let mut random = Lcg::new(11);
    for _ in 0..64 * 1024 {
        assert_eq!(file.write(&[random.next_byte()]), 1);
    }

    let misses = fs.cache_access_count() - fs.cache_hit_count();
    assert!(misses < 1024, "coalescing failed: {misses} cache misses");
}

#[test]
fn sequential_reread_is_warmer() {
    // 比缓存小的文件：第二遍顺序读的命中率严格高于第一遍冷读
    let fs = fresh_fs(1024);
    fs.create("warm", 0).unwrap();
    let mut file = fs.open("warm").unwrap();

    let mut data = vec![0u8; 16 * 1024];
    Lcg::new(5).fill(&mut data);
    assert_eq!(file.write(&data), data.len());

    fs.invalidate_cache();

    let mut back = vec![0u8; data.len()];
    let cold = read_pass(&fs, &mut file, &mut back);
    assert_eq!(back, data);
    let warm = read_pass(&fs, &mut file, &mut back);
    assert!(warm > cold, "warm pass {warm} not above cold pass {cold}");
}

/// 从头读完整个文件，返回本遍的命中率
fn read_pass(fs: &FileSys, file: &mut chalk_fs::File, buf: &mut [u8]) -> f64 {
    fs.reset_cache_stats();
    file.seek(0);
    assert_eq!(file.read(buf), buf.len());
    fs.cache_hit_count() as f64 / fs.cache_access_count() as f64
}

#[test]
fn full_sector_writes_feed_cold_read() {
    // 只经过整扇区盲写的文件：写入期间没有为数据扇区读盘，
    // 冷读时的读盘次数也只比数据扇区数多出常数个元数据扇区
    let device = Arc::new(CountingDisk::new(1024));
    let fs = FileSys::format(device.clone());
    fs.create("blind", 0).unwrap();
    let mut file = fs.open("blind").unwrap();

    let mut data = vec![0u8; 32 * SECTOR_SIZE];
    Lcg::new(23).fill(&mut data);

    let reads_before = device.reads();
    assert_eq!(file.write(&data), data.len());
    let reads_during_write = device.reads() - reads_before;
    assert!(
        reads_during_write <= 4,
        "blind write path read {reads_during_write} sectors"
    );

    fs.invalidate_cache();

    let reads_before = device.reads();
    let mut back = vec![0u8; data.len()];
    file.seek(0);
    assert_eq!(file.read(&mut back), back.len());
    assert_eq!(back, data);
    assert!(device.reads() - reads_before <= 32 + 10);
}

#[test]
fn flush_persists_every_dirty_sector() {
    let device = Arc::new(CountingDisk::new(256));
    let cache = BufferCache::new(device.clone());
    let payload = [9u8; SECTOR_SIZE];

    for sector in 10..20 {
        cache.write(sector, 0, &payload);
    }
    let writes_before = device.writes();
    cache.flush();
    assert_eq!(device.writes() - writes_before, 10);

    // 再次冲刷没有脏扇区可写
    cache.flush();
    assert_eq!(device.writes() - writes_before, 10);

    // 设备上能读到内容
    let mut raw = [0u8; SECTOR_SIZE];
    device.read_block(10, &mut raw);
    assert_eq!(raw, payload);
}
