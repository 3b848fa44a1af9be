//! Deferred disposal of removed slots.
//!
//! When a snapshot swap removes a slot, the audio thread may still be halfway
//! through a block that uses the old snapshot. The removed slot (and the old
//! snapshot itself, so its `Vec` is never freed on the audio thread) goes into
//! the [`DisposalQueue`] together with a *fence*: the number of blocks the
//! audio thread had started at the moment of the swap. The entry is released
//! once the audio thread has completed that many blocks and nothing else holds
//! a reference.
//!
//! ```text
//! audio:    begin(N) ── load snapshot ── process ── end(N) ── begin(N+1) ...
//! control:              swap ── fence = started (= N) ──── drain: completed >= N ✓
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::ChainSnapshot;
use super::slot::PluginSlot;

/// Block counters shared between the audio thread and disposal.
#[derive(Debug, Default)]
pub struct BlockClock {
    started: AtomicU64,
    completed: AtomicU64,
}

impl BlockClock {
    /// A clock at block zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a block (audio thread). Returns the block number.
    #[inline]
    pub fn begin_block(&self) -> u64 {
        self.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark `block` as finished (audio thread).
    #[inline]
    pub fn end_block(&self, block: u64) {
        self.completed.store(block, Ordering::SeqCst);
    }

    /// Blocks started so far.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Blocks completed so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

struct Retired {
    fence: u64,
    snapshot: Option<Arc<ChainSnapshot>>,
    slots: Vec<Arc<PluginSlot>>,
}

/// Queue of slots and snapshots waiting to be freed off the audio thread.
pub struct DisposalQueue {
    clock: Arc<BlockClock>,
    pending: Mutex<Vec<Retired>>,
    disposed: AtomicU64,
}

impl std::fmt::Debug for DisposalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalQueue")
            .field("pending", &self.pending_count())
            .field("disposed", &self.disposed_count())
            .finish()
    }
}

impl DisposalQueue {
    /// A queue fenced by `clock`.
    pub fn new(clock: Arc<BlockClock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(Vec::new()),
            disposed: AtomicU64::new(0),
        }
    }

    /// The block clock this queue is fenced by.
    pub fn clock(&self) -> &Arc<BlockClock> {
        &self.clock
    }

    /// Queue a replaced snapshot and the slots it no longer shares with the
    /// new one. Must be called after the swap that retired them.
    pub fn retire(&self, snapshot: Option<Arc<ChainSnapshot>>, slots: Vec<Arc<PluginSlot>>) {
        let fence = self.clock.started();
        #[cfg(feature = "tracing")]
        if !slots.is_empty() {
            let ids: Vec<i32> = slots.iter().map(|s| s.instance_id()).collect();
            tracing::debug!("disposal: retired slots {ids:?} behind block {fence}");
        }
        self.pending.lock().push(Retired {
            fence,
            snapshot,
            slots,
        });
    }

    /// Dispose everything the audio thread can no longer reach.
    ///
    /// Call from a control-thread timer. Returns the number of slots disposed.
    pub fn drain(&self) -> usize {
        let completed = self.clock.completed();
        let mut ready = Vec::new();
        {
            let mut pending = self.pending.lock();
            let mut i = 0;
            while i < pending.len() {
                let entry = &mut pending[i];
                if completed < entry.fence {
                    i += 1;
                    continue;
                }
                if entry
                    .snapshot
                    .as_ref()
                    .is_some_and(|s| Arc::strong_count(s) == 1)
                {
                    entry.snapshot = None;
                }
                if entry.snapshot.is_some() {
                    i += 1;
                    continue;
                }
                let (free, held): (Vec<_>, Vec<_>) = entry
                    .slots
                    .drain(..)
                    .partition(|s| Arc::strong_count(s) == 1);
                entry.slots = held;
                ready.extend(free);
                if entry.slots.is_empty() {
                    pending.swap_remove(i);
                } else {
                    i += 1;
                }
            }
        }

        let count = ready.len();
        for slot in ready {
            slot.dispose();
        }
        self.disposed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Entries still waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Instance IDs of slots still waiting, in retirement order.
    pub fn pending_instance_ids(&self) -> Vec<i32> {
        self.pending
            .lock()
            .iter()
            .flat_map(|r| r.slots.iter().map(|s| s.instance_id()))
            .collect()
    }

    /// Slots disposed so far.
    pub fn disposed_count(&self) -> u64 {
        self.disposed.load(Ordering::Relaxed)
    }
}

impl Drop for DisposalQueue {
    fn drop(&mut self) {
        for entry in self.pending.get_mut().drain(..) {
            for slot in entry.slots {
                slot.dispose();
            }
        }
    }
}
