use std::collections::VecDeque;
use std::num::NonZeroUsize;

use lru::LruCache;

use super::PageId;

/// Victim selection policy for the buffer pool.
///
/// Only `Fifo` and `Lru` are implemented; the remaining identifiers are
/// reserved and rejected at pool init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementStrategy {
    Fifo,
    Lru,
    Clock,
    Lfu,
    LruK,
}

/// Replacement bookkeeping behind the frame table.
///
/// The victim scan is split in two: `peek_victim` finds the next evictable
/// frame without touching any state, and `remove` drops the chosen entry
/// once its write-back has succeeded. A failed eviction therefore leaves
/// the ordering exactly as it was.
pub(crate) enum Replacer {
    /// Frame indices in order of first load. Pins, unpins, and hits never
    /// reorder the queue; pinned entries skipped by a scan keep their slot.
    Fifo(VecDeque<usize>),
    /// Resident pages in recency order, keyed by page id, valued by frame
    /// index. Hits touch the entry; the scan walks from the LRU end.
    Lru(LruCache<PageId, usize>),
}

impl Replacer {
    pub fn fifo() -> Self {
        Replacer::Fifo(VecDeque::new())
    }

    pub fn lru(capacity: usize) -> Self {
        // capacity is validated by BufferPool::init
        Replacer::Lru(LruCache::new(NonZeroUsize::new(capacity).unwrap()))
    }

    /// Record that `page_id` was loaded into frame `frame_idx`.
    pub fn record_load(&mut self, page_id: PageId, frame_idx: usize) {
        match self {
            Replacer::Fifo(queue) => queue.push_back(frame_idx),
            Replacer::Lru(cache) => {
                cache.put(page_id, frame_idx);
            }
        }
    }

    /// Record a buffer hit on a resident page. Only LRU reorders on access.
    pub fn record_hit(&mut self, page_id: PageId) {
        match self {
            Replacer::Fifo(_) => {}
            Replacer::Lru(cache) => {
                cache.get(&page_id);
            }
        }
    }

    /// Find the frame the policy would evict next, skipping pinned frames.
    /// Does not modify the replacement state.
    pub fn peek_victim<F>(&self, is_pinned: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        match self {
            Replacer::Fifo(queue) => queue.iter().copied().find(|&idx| !is_pinned(idx)),
            Replacer::Lru(cache) => cache
                .iter()
                .rev()
                .find(|&(_, &idx)| !is_pinned(idx))
                .map(|(_, &idx)| idx),
        }
    }

    /// Drop the entry for an evicted frame.
    pub fn remove(&mut self, page_id: PageId, frame_idx: usize) {
        match self {
            Replacer::Fifo(queue) => {
                if let Some(pos) = queue.iter().position(|&idx| idx == frame_idx) {
                    queue.remove(pos);
                }
            }
            Replacer::Lru(cache) => {
                cache.pop(&page_id);
            }
        }
    }
}
