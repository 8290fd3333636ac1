use core::fmt;

pub type Result<T> = core::result::Result<T, FsError>;

/// 文件系统错误。
///
/// 写拒绝的写入与越过文件末尾的读取不算错误，表现为 0 字节结果；
/// 设备 I/O 失败与索引节点损坏是致命错误，直接 panic。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotFound,
    AlreadyExists,
    /// 空闲位图耗尽，调用方已回滚所有部分分配
    NoSpace,
    /// 超过单文件最大长度
    TooLarge,
    NotADirectory,
    IsADirectory,
    DirectoryNotEmpty,
    NameTooLong,
    InvalidPath,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "already exists",
            Self::NoSpace => "no space left on device",
            Self::TooLarge => "file too large",
            Self::NotADirectory => "not a directory",
            Self::IsADirectory => "is a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::NameTooLong => "name too long",
            Self::InvalidPath => "invalid path",
        };
        f.write_str(text)
    }
}

impl std::error::Error for FsError {}
