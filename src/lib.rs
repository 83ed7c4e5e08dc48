pub mod storage;

pub use storage::{
    BufferPool, PageFile, PageHandle, PageId, ReplacementStrategy, StorageError, StorageResult,
    NO_PAGE, PAGE_SIZE,
};
