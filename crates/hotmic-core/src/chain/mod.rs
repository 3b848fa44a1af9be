//! Per-channel plugin chains with copy-on-write snapshots.
//!
//! [`PluginChain`] holds an immutable [`ChainSnapshot`] behind an `ArcSwap`.
//! The audio thread loads the snapshot once per block and walks it; the
//! control thread builds a complete replacement and swaps it in with
//! [`PluginChain::replace_all`]. A block therefore always sees one whole
//! snapshot. Slots that leave the chain go to the [`DisposalQueue`].

mod disposal;
mod slot;

pub use disposal::{BlockClock, DisposalQueue};
pub use slot::{PluginSlot, SlotOutcome};

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::plugin::ProcessContext;

/// One position in a chain snapshot.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    /// The slot at this position.
    pub slot: Arc<PluginSlot>,
    /// Bypass overlay from the slot's container.
    pub container_bypassed: bool,
}

impl ChainEntry {
    /// An entry without container bypass.
    pub fn new(slot: Arc<PluginSlot>) -> Self {
        Self {
            slot,
            container_bypassed: false,
        }
    }

    /// Effective bypass: the slot's own flag or its container's.
    pub fn is_bypassed(&self) -> bool {
        self.container_bypassed || self.slot.is_bypassed()
    }
}

/// An immutable, ordered view of a channel's slots.
///
/// `None` entries are gaps left by edits that have not been compacted; they
/// are skipped during processing.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    entries: Vec<Option<ChainEntry>>,
}

impl ChainSnapshot {
    /// Build a snapshot from positioned entries.
    pub fn new(entries: Vec<Option<ChainEntry>>) -> Self {
        Self { entries }
    }

    /// Build a gap-free snapshot with no container bypass.
    pub fn from_slots(slots: Vec<Arc<PluginSlot>>) -> Self {
        Self {
            entries: slots.into_iter().map(|s| Some(ChainEntry::new(s))).collect(),
        }
    }

    /// Positions, including gaps.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no positions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of occupied positions.
    pub fn slot_count(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// All positions.
    pub fn entries(&self) -> &[Option<ChainEntry>] {
        &self.entries
    }

    /// Occupied entries in order.
    pub fn iter(&self) -> impl Iterator<Item = &ChainEntry> {
        self.entries.iter().flatten()
    }

    /// Occupied slots in order.
    pub fn slots(&self) -> impl Iterator<Item = &Arc<PluginSlot>> {
        self.iter().map(|e| &e.slot)
    }

    /// Position and entry of `instance_id`.
    pub fn find(&self, instance_id: i32) -> Option<(usize, &ChainEntry)> {
        self.entries.iter().enumerate().find_map(|(i, e)| {
            e.as_ref()
                .filter(|e| e.slot.instance_id() == instance_id)
                .map(|e| (i, e))
        })
    }

    /// Instance IDs in order.
    pub fn instance_ids(&self) -> Vec<i32> {
        self.slots().map(|s| s.instance_id()).collect()
    }

    /// Sum of latencies of slots that are not bypassed.
    pub fn latency_samples(&self) -> usize {
        self.iter()
            .filter(|e| !e.is_bypassed())
            .map(|e| e.slot.latency_samples())
            .sum()
    }

    /// Whether a non-bypassed output send is present.
    pub fn has_active_output(&self) -> bool {
        self.iter()
            .any(|e| e.slot.capabilities().output_send && !e.is_bypassed())
    }
}

/// Per-block processing tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainRun {
    /// Occupied positions in the snapshot this block used.
    pub slots: usize,
    /// Slots that ran.
    pub processed: usize,
    /// Slots that faulted and were bypassed for the block.
    pub faulted: usize,
    /// Slots skipped because of lock contention.
    pub contended: usize,
}

impl ChainRun {
    fn record(&mut self, outcome: SlotOutcome) {
        self.slots += 1;
        match outcome {
            SlotOutcome::Processed => self.processed += 1,
            SlotOutcome::Faulted => self.faulted += 1,
            SlotOutcome::Contended => self.contended += 1,
            SlotOutcome::Bypassed => {}
        }
    }
}

/// A channel's live plugin chain.
pub struct PluginChain {
    snapshot: ArcSwap<ChainSnapshot>,
    disposal: Arc<DisposalQueue>,
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("instance_ids", &self.get_snapshot().instance_ids())
            .finish_non_exhaustive()
    }
}

impl PluginChain {
    /// An empty chain that retires removed slots into `disposal`.
    pub fn new(disposal: Arc<DisposalQueue>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(ChainSnapshot::default()),
            disposal,
        }
    }

    /// The disposal queue this chain retires into.
    pub fn disposal(&self) -> &Arc<DisposalQueue> {
        &self.disposal
    }

    /// Lock-free view of the installed snapshot. Safe mid-block.
    #[inline]
    pub fn get_snapshot(&self) -> Guard<Arc<ChainSnapshot>> {
        self.snapshot.load()
    }

    /// Owned handle to the installed snapshot.
    pub fn snapshot(&self) -> Arc<ChainSnapshot> {
        self.snapshot.load_full()
    }

    /// Atomically install `entries`.
    ///
    /// Slots of the previous snapshot that are absent from the new one, and
    /// the previous snapshot itself, are handed to deferred disposal.
    /// Returns the instance IDs that left the chain.
    pub fn replace_all(&self, entries: Vec<Option<ChainEntry>>) -> Vec<i32> {
        let next = Arc::new(ChainSnapshot::new(entries));
        let previous = self.snapshot.swap(Arc::clone(&next));
        let removed: Vec<Arc<PluginSlot>> = previous
            .slots()
            .filter(|old| !next.slots().any(|new| Arc::ptr_eq(old, new)))
            .cloned()
            .collect();
        let ids = removed.iter().map(|s| s.instance_id()).collect();
        self.disposal.retire(Some(previous), removed);
        ids
    }

    /// Atomically clear the chain and hand every slot to the caller.
    ///
    /// The caller owns the returned slots: re-install them or dispose them.
    pub fn detach_all(&self) -> Vec<Arc<PluginSlot>> {
        let previous = self
            .snapshot
            .swap(Arc::new(ChainSnapshot::default()));
        let slots = previous.slots().cloned().collect();
        self.disposal.retire(Some(previous), Vec::new());
        slots
    }

    /// Find a slot by instance ID.
    pub fn try_get_slot_by_id(&self, instance_id: i32) -> Option<Arc<PluginSlot>> {
        self.get_snapshot()
            .find(instance_id)
            .map(|(_, e)| Arc::clone(&e.slot))
    }

    /// Append a slot (construction path, copy-on-write).
    pub fn add_slot(&self, slot: Arc<PluginSlot>) {
        let mut entries = self.get_snapshot().entries().to_vec();
        entries.push(Some(ChainEntry::new(slot)));
        self.replace_all(entries);
    }

    /// Number of occupied positions.
    pub fn count(&self) -> usize {
        self.get_snapshot().slot_count()
    }

    /// Run every non-bypassed slot in order, in place (audio thread).
    #[inline]
    pub fn process(&self, buffer: &mut [f32], ctx: &mut ProcessContext<'_>) -> ChainRun {
        self.run(buffer, ctx, None)
    }

    /// Like [`process`](Self::process), and hand `on_split` a read-only view
    /// of the block right after position `split_index`.
    ///
    /// If `split_index` is past the end, `on_split` sees the final block. The
    /// view is immutable and released before the next slot runs, so the tap
    /// can never alter the continuing signal.
    #[inline]
    pub fn process_with_split(
        &self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
        split_index: usize,
        on_split: &mut dyn FnMut(&[f32]),
    ) -> ChainRun {
        self.run(buffer, ctx, Some((split_index, on_split)))
    }

    fn run(
        &self,
        buffer: &mut [f32],
        ctx: &mut ProcessContext<'_>,
        mut split: Option<(usize, &mut dyn FnMut(&[f32]))>,
    ) -> ChainRun {
        let snapshot = self.snapshot.load();
        let mut run = ChainRun::default();
        for (position, entry) in snapshot.entries().iter().enumerate() {
            if let Some(entry) = entry {
                let outcome = entry
                    .slot
                    .process(buffer, ctx, entry.container_bypassed);
                run.record(outcome);
            }
            if let Some((index, on_split)) = split.as_mut() {
                if *index == position {
                    on_split(buffer);
                }
            }
        }
        if let Some((index, on_split)) = split.as_mut() {
            if *index >= snapshot.len() {
                on_split(buffer);
            }
        }
        run
    }
}
