//! 宿主侧适配：把一个普通文件当作块设备使用，
//! 以便在开发机上制作、检查 chalk-fs 镜像。

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use chalk_fs::BlockDevice;
use chalk_fs::SECTOR_SIZE;

pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_block(&self, sector: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(file.read(buf).unwrap(), SECTOR_SIZE, "not a complete sector!");
    }

    fn write_block(&self, sector: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }

    fn sector_count(&self) -> usize {
        let file = self.0.lock().unwrap();
        file.metadata().unwrap().len() as usize / SECTOR_SIZE
    }
}
