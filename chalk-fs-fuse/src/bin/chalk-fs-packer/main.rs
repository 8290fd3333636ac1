mod cli;

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use chalk_fs::FileSys;
use chalk_fs::SECTOR_SIZE;
use chalk_fs_fuse::BlockFile;
use clap::Parser;
use cli::Cli;
use log::info;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let block_file = Arc::new(BlockFile(Mutex::new({
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&cli.out)?;
        fd.set_len((cli.sectors * SECTOR_SIZE) as u64)?;
        fd
    })));

    let fs = FileSys::format(block_file);

    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .expect("source file name is not UTF-8");
        let data = fs::read(entry.path())?;

        info!("packing {name:?}: {} bytes", data.len());
        fs.create(&name, 0)
            .unwrap_or_else(|err| panic!("creating {name:?} failed: {err}"));
        let mut file = fs.open(&name).unwrap();
        assert_eq!(file.write(&data), data.len(), "short write for {name:?}");
    }

    if cli.list {
        for name in fs.list("/").unwrap() {
            let file = fs.open(&name).unwrap();
            println!("{:>10}  {}", file.size(), name);
        }
    }

    // FileSys 析构会把位图与脏扇区写回镜像
    Ok(())
}
