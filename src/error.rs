use onlyerror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum KvfsError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("prefix `{prefix}` is longer than {max} bytes")]
    PrefixTooLong { prefix: String, max: usize },
    #[error("name `{name}` is longer than {max} bytes")]
    NameTooLong { name: String, max: usize },
    #[error("filesystem is not mounted")]
    NotMounted,
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} is not a regular file")]
    IsADirectory(String),
    #[error("{0} is not a directory")]
    NotADirectory(String),
    #[error("corrupt {what} record: {reason}")]
    CorruptRecord { what: &'static str, reason: String },
    #[error("i/o error: {0}")]
    Io(String),
    #[error("write ending at {end} exceeds the maximum file size {max}")]
    FileTooLarge { end: u64, max: u64 },
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("bad configuration: {0}")]
    Config(String),
}

impl KvfsError {
    /// Conventional errno for adapters that speak POSIX.
    pub fn errno(&self) -> i32 {
        match self {
            KvfsError::InvalidArgument(_) => 22, // EINVAL
            KvfsError::PrefixTooLong { .. } => 7, // E2BIG
            KvfsError::NameTooLong { .. } => 36, // ENAMETOOLONG
            KvfsError::NotMounted => 19,         // ENODEV
            KvfsError::NotFound(_) => 2,         // ENOENT
            KvfsError::AlreadyExists(_) => 17,   // EEXIST
            KvfsError::IsADirectory(_) => 21,    // EISDIR
            KvfsError::NotADirectory(_) => 20,   // ENOTDIR
            KvfsError::CorruptRecord { .. } | KvfsError::Io(_) => 5, // EIO
            KvfsError::FileTooLarge { .. } => 27, // EFBIG
            KvfsError::ResourceExhausted(_) => 12, // ENOMEM
            KvfsError::Config(_) => 22,
        }
    }
}

impl From<StoreError> for KvfsError {
    fn from(e: StoreError) -> Self {
        KvfsError::Io(e.to_string())
    }
}

pub type KvfsResult<T> = Result<T, KvfsError>;
