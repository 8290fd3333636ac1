//! 目录层与路径解析

use chalk_fs::FsError;

use super::fresh_fs;

#[test]
fn nested_create_and_list() {
    let fs = fresh_fs(512);
    fs.mkdir("sub").unwrap();
    fs.mkdir("/sub/inner").unwrap();
    fs.create("/sub/inner/a.txt", 0).unwrap();
    fs.create("top", 0).unwrap();

    let mut root = fs.list("/").unwrap();
    root.sort();
    assert_eq!(root, ["sub", "top"]);
    assert_eq!(fs.list("/sub").unwrap(), ["inner"]);
    assert_eq!(fs.list("/sub/inner").unwrap(), ["a.txt"]);

    let mut file = fs.open("/sub/inner/a.txt").unwrap();
    assert_eq!(file.write(b"deep"), 4);
}

#[test]
fn trailing_slash_opens_directory_itself() {
    let fs = fresh_fs(512);
    fs.mkdir("sub").unwrap();

    let root = fs.open("/").unwrap();
    assert!(root.is_dir());

    let sub = fs.open("sub/").unwrap();
    assert!(sub.is_dir());

    // 目录也可以按普通名字打开
    let sub_plain = fs.open("sub").unwrap();
    assert_eq!(sub.inumber(), sub_plain.inumber());
}

#[test]
fn lookup_failures() {
    let fs = fresh_fs(512);
    fs.create("file", 0).unwrap();

    assert_eq!(fs.open("missing").unwrap_err(), FsError::NotFound);
    assert_eq!(fs.create("/missing/x", 0).unwrap_err(), FsError::NotFound);
    // 中间组件不是目录
    assert_eq!(fs.create("/file/x", 0).unwrap_err(), FsError::NotADirectory);
    assert_eq!(fs.open("/file/x").unwrap_err(), FsError::NotADirectory);
}

#[test]
fn create_rejects_bad_names() {
    let fs = fresh_fs(512);
    fs.create("taken", 0).unwrap();

    assert_eq!(fs.create("taken", 0).unwrap_err(), FsError::AlreadyExists);
    assert_eq!(fs.mkdir("taken").unwrap_err(), FsError::AlreadyExists);
    assert_eq!(fs.create("/", 0).unwrap_err(), FsError::InvalidPath);
    assert_eq!(
        fs.create("a234567890123456789012345678", 0).unwrap_err(),
        FsError::NameTooLong
    );
    // 27 字节恰好可用
    fs.create("a23456789012345678901234567", 0).unwrap();
}

#[test]
fn remove_directory_only_when_empty() {
    let fs = fresh_fs(512);
    fs.mkdir("sub").unwrap();
    fs.create("/sub/a", 0).unwrap();

    assert_eq!(fs.remove("sub").unwrap_err(), FsError::DirectoryNotEmpty);

    fs.remove("/sub/a").unwrap();
    fs.remove("sub").unwrap();
    assert!(fs.list("/").unwrap().is_empty());
    assert_eq!(fs.open("sub").unwrap_err(), FsError::NotFound);
}

#[test]
fn removed_tree_reclaims_sectors() {
    let fs = fresh_fs(512);
    let free_baseline = fs.free_sectors();

    fs.mkdir("sub").unwrap();
    fs.create("/sub/a", 4000).unwrap();
    assert!(fs.free_sectors() < free_baseline);

    fs.remove("/sub/a").unwrap();
    fs.remove("sub").unwrap();
    assert_eq!(fs.free_sectors(), free_baseline);
}

#[test]
fn root_cannot_be_removed() {
    let fs = fresh_fs(512);
    assert_eq!(fs.remove("/").unwrap_err(), FsError::InvalidPath);
}

#[test]
fn slot_reuse_keeps_directory_compact() {
    let fs = fresh_fs(512);
    let size_of_root = |fs: &chalk_fs::FileSys| fs.open("/").unwrap().size();

    for round in 0..3 {
        // 同一批名字反复建删，目录不应该无限增长
        for index in 0..8 {
            fs.create(&format!("tmp{index}"), 0).unwrap();
        }
        let grown = size_of_root(&fs);
        for index in 0..8 {
            fs.remove(&format!("tmp{index}")).unwrap();
        }
        if round == 0 {
            assert!(grown >= 8 * 32);
        } else {
            // 后续轮次复用空槽位
            assert_eq!(grown, size_of_root(&fs));
        }
    }
}
