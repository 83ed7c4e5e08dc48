use std::io;
use thiserror::Error;

use super::replacer::ReplacementStrategy;
use super::PageId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Page does not exist: page_id={0}")]
    NonExistingPage(PageId),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Buffer pool is full")]
    BufferPoolFull,

    #[error("Buffer pool capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error("Replacement strategy {0:?} is not implemented")]
    UnsupportedStrategy(ReplacementStrategy),
}

pub type StorageResult<T> = Result<T, StorageError>;
