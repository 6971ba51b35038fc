//! Per-core ready heap.
//!
//! Every outstanding activation is one job in a binary max-heap. The sort
//! key of a job concatenates its priority and its rank:
//!
//! ```text
//!  31            16 15             0
//! +----------------+----------------+
//! |    priority    |      rank      |
//! +----------------+----------------+
//! ```
//!
//! Ranks come from one wrapping 16-bit counter per priority level. The
//! counter starts at the top of the rank window and is post-decremented on
//! every insertion, so a job queued earlier carries a larger rank and wins
//! the tie against jobs of equal priority, which yields FIFO order inside a
//! priority band. Starting at the top also makes raw keys of freshly queued
//! jobs sort below a same-level ceiling key and below the key an earlier
//! same-level job was dispatched with, which the rescheduling decision
//! relies on when it compares the heap front against the running process.
//!
//! Because the counter wraps, raw ranks are not comparable. The comparator
//! first re-expresses each rank relative to the current counter value of its
//! priority level (`(rank - tail) & RANK_MASK`), which turns the counter
//! into a sliding window: comparisons stay correct across a full wrap as
//! long as fewer than `RANK_MASK + 1` jobs of one level are live at once.
//! The subtraction must wrap at the rank width.
//!
//! The heap array is 1-indexed; slot 0 is not a job, its `key` field holds
//! the current size.

use super::proc::{ProcId, INVALID_PROC_ID};

/// Bits the priority field is shifted by inside a key.
pub const PRIORITY_SHIFT: u32 = 16;
/// Mask extracting the rank field of a key.
pub const RANK_MASK: u32 = 0xFFFF;
/// Mask extracting the priority field of a key.
pub const PRIORITY_MASK: u32 = 0xFFFF_0000;
/// Number of distinct priority levels. Level 0 is the idle level.
pub const PRIO_LEVELS: usize = 32;
/// Highest configurable priority.
pub const MAX_PRIO: u16 = (PRIO_LEVELS - 1) as u16;
/// Largest number of jobs one core may have queued at once.
pub const MAX_READY_ENTRIES: usize = 64;

const READY_LIST_SIZE: usize = MAX_READY_ENTRIES + 1;

/// First rank drawn at every priority level.
const INITIAL_TAIL: u16 = RANK_MASK as u16;

/// Build a key from a priority and a rank.
#[inline]
pub const fn make_key(prio: u16, rank: u16) -> u32 {
    ((prio as u32) << PRIORITY_SHIFT) | (rank as u32)
}

/// Priority field of a key.
#[inline]
pub const fn prio_of(key: u32) -> u16 {
    (key >> PRIORITY_SHIFT) as u16
}

/// Key representing the ceiling of a resource.
///
/// The rank field is saturated so the elevated process dominates every
/// queued job of the same priority level. At most one process per level may
/// hold a resource elevated to that level at any time; the generator
/// guarantees this by construction of the ceilings.
#[inline]
pub const fn ceiling_key(prio: u16) -> u32 {
    ((prio as u32) << PRIORITY_SHIFT) | RANK_MASK
}

/// One queued activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapEntry {
    /// Packed (priority, rank) sort key
    pub key: u32,
    /// Process this activation belongs to
    pub id: ProcId,
}

const FREE_ENTRY: HeapEntry = HeapEntry {
    key: 0,
    id: INVALID_PROC_ID,
};

/// Ready heap of one core, rank counters included.
pub struct ReadyHeap {
    /// 1-indexed job array; `entries[0].key` is the size
    entries: [HeapEntry; READY_LIST_SIZE],
    /// Per-priority rank counters
    tails: [u16; PRIO_LEVELS],
}

impl ReadyHeap {
    pub const fn new() -> Self {
        Self {
            entries: [FREE_ENTRY; READY_LIST_SIZE],
            tails: [INITIAL_TAIL; PRIO_LEVELS],
        }
    }

    /// Number of queued jobs.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries[0].key as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest-priority job, without removing it.
    #[inline]
    pub fn front(&self) -> HeapEntry {
        debug_assert!(!self.is_empty());
        self.entries[1]
    }

    /// Queue a brand new activation of a process at its configured
    /// priority. Draws a fresh rank from the level's counter and returns
    /// the key the job was queued with.
    pub fn put_new(&mut self, id: ProcId, prio: u16) -> u32 {
        let level = usize::from(prio);
        debug_assert!(level < PRIO_LEVELS);
        let rank = self.tails[level];
        self.tails[level] = rank.wrapping_sub(1);
        let key = make_key(prio, rank);
        log::trace!("ready: queue new job of proc {} key {:#010x}", id.0, key);
        self.push(HeapEntry { key, id });
        key
    }

    /// Re-queue a preempted process under its current dynamic priority.
    ///
    /// The key is the one the process was dispatched with (rank included,
    /// possibly elevated by a resource ceiling); no fresh rank is drawn, so
    /// the process keeps its place relative to its original arrival.
    pub fn put_preempted(&mut self, id: ProcId, key: u32) {
        log::trace!(
            "ready: queue preempted proc {} key {:#010x}",
            id.0,
            key
        );
        self.push(HeapEntry { key, id });
    }

    /// Remove and return the highest-priority job.
    pub fn remove_front(&mut self) -> HeapEntry {
        let size = self.len();
        debug_assert!(size >= 1);
        let front = self.entries[1];
        self.entries[1] = self.entries[size];
        self.entries[size] = FREE_ENTRY;
        self.entries[0].key = (size - 1) as u32;
        self.bubble_down(1);
        front
    }

    /// Purge every job of `id`, keeping the order of the others.
    ///
    /// Used when an OS application terminates: all queued activations of a
    /// killed process disappear at once. Matches are compacted from the end
    /// first, then the heap shape is rebuilt bottom-up; a single
    /// replace-and-sift per match cannot restore the shape when the swapped
    /// leaf outranks the parent of the hole.
    #[cfg(feature = "os_applications")]
    pub fn remove_all(&mut self, id: ProcId) {
        let mut size = self.len();
        let mut index = 1;
        while index <= size {
            if self.entries[index].id == id {
                self.entries[index] = self.entries[size];
                self.entries[size] = FREE_ENTRY;
                size -= 1;
            } else {
                index += 1;
            }
        }
        self.entries[0].key = size as u32;
        let mut parent = size / 2;
        while parent >= 1 {
            self.bubble_down(parent);
            parent -= 1;
        }
    }

    fn push(&mut self, entry: HeapEntry) {
        let index = self.len() + 1;
        debug_assert!(index < READY_LIST_SIZE);
        self.entries[index] = entry;
        self.entries[0].key = index as u32;
        self.bubble_up(index);
    }

    /// Key of a job with its rank re-expressed in the sliding window of its
    /// priority level.
    #[inline]
    fn window_key(&self, entry: &HeapEntry) -> u32 {
        let level = usize::from(prio_of(entry.key));
        (entry.key & PRIORITY_MASK)
            | (entry.key.wrapping_sub(u32::from(self.tails[level])) & RANK_MASK)
    }

    /// Whether `a` sorts below `b`.
    #[inline]
    fn less(&self, a: &HeapEntry, b: &HeapEntry) -> bool {
        self.window_key(a) < self.window_key(b)
    }

    fn bubble_up(&mut self, mut index: usize) {
        let mut parent = index >> 1;
        while index > 1 && self.less(&self.entries[parent], &self.entries[index]) {
            self.entries.swap(parent, index);
            index = parent;
            parent >>= 1;
        }
    }

    fn bubble_down(&mut self, mut index: usize) {
        let size = self.len();
        loop {
            let mut child = index << 1;
            if child > size {
                break;
            }
            let right = child + 1;
            if right <= size && self.less(&self.entries[child], &self.entries[right]) {
                child = right;
            }
            if self.less(&self.entries[index], &self.entries[child]) {
                self.entries.swap(index, child);
                index = child;
            } else {
                break;
            }
        }
    }

    /// Dump the queued jobs at trace level.
    pub fn trace_jobs(&self) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        log::trace!("ready: {} job(s)", self.len());
        for entry in &self.entries[1..=self.len()] {
            log::trace!(
                "ready:   prio {} rank {} proc {}",
                prio_of(entry.key),
                entry.key & RANK_MASK,
                entry.id.0
            );
        }
    }

    /// Number of queued jobs belonging to `id`.
    #[cfg(test)]
    pub(crate) fn count_of(&self, id: ProcId) -> usize {
        self.entries[1..=self.len()]
            .iter()
            .filter(|e| e.id == id)
            .count()
    }

    /// Verify the heap shape and the stored size.
    #[cfg(test)]
    pub(crate) fn assert_well_formed(&self) {
        let size = self.len();
        assert!(size < READY_LIST_SIZE);
        for index in 2..=size {
            let parent = index / 2;
            assert!(
                !self.less(&self.entries[parent], &self.entries[index]),
                "job at {index} outranks its parent"
            );
        }
        for entry in &self.entries[1..=size] {
            assert!(entry.id.is_valid());
        }
    }
}

impl Default for ReadyHeap {
    fn default() -> Self {
        Self::new()
    }
}
