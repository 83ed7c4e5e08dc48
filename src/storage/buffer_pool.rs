use std::path::Path;

use log::{debug, trace};

use super::error::{StorageError, StorageResult};
use super::page_file::PageFile;
use super::replacer::{ReplacementStrategy, Replacer};
use super::{PageId, NO_PAGE, PAGE_SIZE};

/// One buffer slot. The payload is allocated once at pool init and reused
/// for every page that passes through the frame.
struct Frame {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    dirty: bool,
    pin_count: u32,
}

impl Frame {
    fn empty() -> Self {
        Frame {
            page_id: NO_PAGE,
            data: Box::new([0u8; PAGE_SIZE]),
            dirty: false,
            pin_count: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.page_id == NO_PAGE
    }

    fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }
}

/// Acquisition token returned by [`BufferPool::pin`].
///
/// The token is not `Copy`: it is given back to the pool on
/// [`BufferPool::unpin`]. While the caller holds it, the page stays
/// resident; data is reached through [`BufferPool::page`] and
/// [`BufferPool::page_mut`], so views are bounded by the pool borrow.
#[derive(Debug, PartialEq, Eq)]
pub struct PageHandle {
    page_id: PageId,
}

impl PageHandle {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

/// A fixed-size page cache over one open [`PageFile`].
///
/// Pages are made resident by `pin` and released by `unpin`; residency is
/// reference counted, and a pinned frame is never chosen as an eviction
/// victim. Dirty frames are written back on eviction, on `force_page` /
/// `force_flush`, and at shutdown.
pub struct BufferPool {
    file: PageFile,
    frames: Vec<Frame>,
    strategy: ReplacementStrategy,
    replacer: Replacer,
    read_io: u64,
    write_io: u64,
}

impl BufferPool {
    /// Open `path` and build a pool of `capacity` empty frames using the
    /// given replacement strategy.
    pub fn init<P: AsRef<Path>>(
        path: P,
        capacity: usize,
        strategy: ReplacementStrategy,
    ) -> StorageResult<BufferPool> {
        if capacity == 0 {
            return Err(StorageError::InvalidCapacity(capacity));
        }
        let replacer = match strategy {
            ReplacementStrategy::Fifo => Replacer::fifo(),
            ReplacementStrategy::Lru => Replacer::lru(capacity),
            other => return Err(StorageError::UnsupportedStrategy(other)),
        };

        let file = PageFile::open(path)?;
        let frames = (0..capacity).map(|_| Frame::empty()).collect();

        debug!(
            "buffer pool over {} with {} frames ({:?})",
            file.name(),
            capacity,
            strategy
        );

        Ok(BufferPool {
            file,
            frames,
            strategy,
            replacer,
            read_io: 0,
            write_io: 0,
        })
    }

    /// Make `page_id` resident and take a pin on it.
    ///
    /// Pinning a page beyond the end of the file grows the file with zero
    /// pages first. Fails with [`StorageError::BufferPoolFull`] when every
    /// frame is pinned.
    pub fn pin(&mut self, page_id: PageId) -> StorageResult<PageHandle> {
        if page_id < 0 {
            return Err(StorageError::NonExistingPage(page_id));
        }

        // Hit: bump the pin count and touch the replacement order
        if let Some(idx) = self.find_frame(page_id) {
            self.frames[idx].pin_count += 1;
            self.replacer.record_hit(page_id);
            return Ok(PageHandle { page_id });
        }

        // Miss: lowest-index empty frame, else evict a victim
        let idx = match self.frames.iter().position(|f| f.is_empty()) {
            Some(idx) => idx,
            None => self.evict_victim()?,
        };

        if page_id >= self.file.total_pages() {
            self.file.ensure_capacity(page_id + 1)?;
        }
        self.file.read_page(page_id, &mut self.frames[idx].data)?;
        self.read_io += 1;

        let frame = &mut self.frames[idx];
        frame.page_id = page_id;
        frame.dirty = false;
        frame.pin_count = 1;
        self.replacer.record_load(page_id, idx);

        Ok(PageHandle { page_id })
    }

    /// Give back a pin taken with [`BufferPool::pin`].
    pub fn unpin(&mut self, handle: PageHandle) -> StorageResult<()> {
        let idx = self
            .find_frame(handle.page_id)
            .ok_or(StorageError::NonExistingPage(handle.page_id))?;
        let frame = &mut self.frames[idx];
        if frame.pin_count == 0 {
            return Err(StorageError::NonExistingPage(handle.page_id));
        }
        frame.pin_count -= 1;
        Ok(())
    }

    /// Record that the page behind `handle` owes a write to disk.
    pub fn mark_dirty(&mut self, handle: &PageHandle) -> StorageResult<()> {
        let idx = self
            .find_frame(handle.page_id)
            .ok_or(StorageError::NonExistingPage(handle.page_id))?;
        self.frames[idx].dirty = true;
        Ok(())
    }

    /// Write the page behind `handle` to disk now and clear its dirty flag.
    pub fn force_page(&mut self, handle: &PageHandle) -> StorageResult<()> {
        let idx = self
            .find_frame(handle.page_id)
            .ok_or(StorageError::NonExistingPage(handle.page_id))?;
        self.file.write_page(handle.page_id, &self.frames[idx].data)?;
        self.write_io += 1;
        self.frames[idx].dirty = false;
        Ok(())
    }

    /// Write back every dirty, unpinned frame and clear its dirty flag.
    pub fn force_flush(&mut self) -> StorageResult<()> {
        for idx in 0..self.frames.len() {
            let f = &self.frames[idx];
            if f.is_empty() || !f.dirty || f.is_pinned() {
                continue;
            }
            let page_id = f.page_id;
            self.file.write_page(page_id, &self.frames[idx].data)?;
            self.write_io += 1;
            self.frames[idx].dirty = false;
        }
        Ok(())
    }

    /// Flush all dirty frames, sync the file, and destroy the pool.
    ///
    /// Dirty frames are written back regardless of pin count.
    pub fn shutdown(mut self) -> StorageResult<()> {
        debug!("shutting down buffer pool over {}", self.file.name());
        self.flush_all_dirty()?;
        self.file.sync()?;
        Ok(())
    }

    /// Read-only view of the page behind `handle`, valid while the pool
    /// is not mutated.
    pub fn page(&self, handle: &PageHandle) -> StorageResult<&[u8; PAGE_SIZE]> {
        let idx = self
            .find_frame(handle.page_id)
            .ok_or(StorageError::NonExistingPage(handle.page_id))?;
        Ok(&self.frames[idx].data)
    }

    /// Mutable view of the page behind `handle`. The frame is marked
    /// dirty: mutable access implies a write owed to disk.
    pub fn page_mut(&mut self, handle: &PageHandle) -> StorageResult<&mut [u8; PAGE_SIZE]> {
        let idx = self
            .find_frame(handle.page_id)
            .ok_or(StorageError::NonExistingPage(handle.page_id))?;
        let frame = &mut self.frames[idx];
        frame.dirty = true;
        Ok(&mut frame.data)
    }

    /// Resident page id of every frame, in frame index order; empty slots
    /// report [`NO_PAGE`].
    pub fn frame_contents(&self) -> Vec<PageId> {
        self.frames.iter().map(|f| f.page_id).collect()
    }

    /// Dirty flag of every frame, in frame index order.
    pub fn dirty_flags(&self) -> Vec<bool> {
        self.frames.iter().map(|f| f.dirty).collect()
    }

    /// Pin count of every frame, in frame index order.
    pub fn fix_counts(&self) -> Vec<u32> {
        self.frames.iter().map(|f| f.pin_count).collect()
    }

    /// Pages read from disk since init.
    pub fn num_read_io(&self) -> u64 {
        self.read_io
    }

    /// Pages written to disk since init.
    pub fn num_write_io(&self) -> u64 {
        self.write_io
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn strategy(&self) -> ReplacementStrategy {
        self.strategy
    }

    /// The page file this pool caches.
    pub fn page_file(&self) -> &PageFile {
        &self.file
    }

    fn find_frame(&self, page_id: PageId) -> Option<usize> {
        self.frames.iter().position(|f| f.page_id == page_id)
    }

    /// Free a frame by evicting the replacement policy's victim, writing
    /// it back first when dirty. The replacement state and the frame are
    /// only touched once the write-back has succeeded.
    fn evict_victim(&mut self) -> StorageResult<usize> {
        let idx = self
            .replacer
            .peek_victim(|i| self.frames[i].is_pinned())
            .ok_or(StorageError::BufferPoolFull)?;

        let victim_pid = self.frames[idx].page_id;
        if self.frames[idx].dirty {
            self.file.write_page(victim_pid, &self.frames[idx].data)?;
            self.write_io += 1;
        }
        trace!("evicted page {} from frame {}", victim_pid, idx);

        self.replacer.remove(victim_pid, idx);
        let frame = &mut self.frames[idx];
        frame.page_id = NO_PAGE;
        frame.dirty = false;
        Ok(idx)
    }

    fn flush_all_dirty(&mut self) -> StorageResult<()> {
        for idx in 0..self.frames.len() {
            let f = &self.frames[idx];
            if f.is_empty() || !f.dirty {
                continue;
            }
            let page_id = f.page_id;
            self.file.write_page(page_id, &self.frames[idx].data)?;
            self.write_io += 1;
            self.frames[idx].dirty = false;
        }
        Ok(())
    }
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        // Best-effort write-back for pools dropped without shutdown
        let _ = self.flush_all_dirty();
    }
}
