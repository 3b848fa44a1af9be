//! Cross-channel routing: dependency ordering and routing plugins.
//!
//! Channels can depend on each other within one block: a bus input reads
//! another channel's output, a copy-to-channel plugin feeds a target channel,
//! a merge sums several channels. [`RoutingContext`] turns those dependencies
//! into a processing order so every source is processed before its consumers.
//!
//! The order is computed on the control thread and published as an immutable
//! [`RoutingPlan`] through an `ArcSwap`, the same compile-then-swap pattern the
//! chain snapshots use. The audio thread only loads the current plan.
//!
//! # State machine
//!
//! ```text
//!   mark_stale()        rebuild() starts        rebuild() installs
//! Valid ───────► Stale ──────────────► Rebuilding ──────────────► Valid
//!                  ▲                        │ mark_stale() meanwhile
//!                  └────────────────────────┘
//! ```
//!
//! While not `Valid`, the audio thread keeps using the last installed plan and
//! counts the block in [`RoutingContext::stale_blocks`].

mod buses;
mod plugins;
mod ports;

pub use buses::BusBuffers;
pub use plugins::{BusInput, ChannelMerge, CopyToChannel, InputSource, OutputSend};
pub use ports::{MAX_ROUTING_PORTS, NO_CHANNEL, RoutingPorts, RoutingRole, remap_channel};

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use arc_swap::{ArcSwap, Guard};
use thiserror::Error;

use crate::chain::ChainSnapshot;

/// Routing failures surfaced to the control side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The dependency graph contains a cycle through these channels.
    #[error("routing cycle between channels {channels:?}")]
    Cycle {
        /// Channels left unordered by the topological sort, ascending.
        channels: Vec<usize>,
    },
}

/// Lifecycle of the routing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoutingState {
    /// Topology changed since the last rebuild.
    Stale = 0,
    /// A rebuild is in progress.
    Rebuilding = 1,
    /// The installed plan matches the topology.
    Valid = 2,
}

impl RoutingState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => RoutingState::Stale,
            1 => RoutingState::Rebuilding,
            _ => RoutingState::Valid,
        }
    }
}

/// An immutable processing order.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingPlan {
    /// Number of channels ordered.
    pub channel_count: usize,
    /// Engine sample rate.
    pub sample_rate: f32,
    /// Engine block size.
    pub block_size: usize,
    /// Channel indices in processing order. Always a permutation of
    /// `0..channel_count`.
    pub processing_order: Vec<usize>,
    /// Set when a cycle forced the declaration-order fallback.
    pub diagnostic: Option<RoutingError>,
    /// Increments on every rebuild.
    pub generation: u64,
}

impl RoutingPlan {
    /// A plan processing channels in declaration order.
    pub fn declaration_order(channel_count: usize, sample_rate: f32, block_size: usize) -> Self {
        Self {
            channel_count,
            sample_rate,
            block_size,
            processing_order: (0..channel_count).collect(),
            diagnostic: None,
            generation: 0,
        }
    }

    /// Position of `channel` in the processing order.
    pub fn position(&self, channel: usize) -> Option<usize> {
        self.processing_order.iter().position(|&c| c == channel)
    }
}

/// Kahn's algorithm over channel dependency edges `(source, consumer)`.
///
/// Ready channels are taken lowest index first, so the result is
/// deterministic. Edges naming channels outside `0..channel_count` are
/// ignored.
///
/// # Errors
///
/// Returns [`RoutingError::Cycle`] listing the channels that could not be
/// ordered.
pub fn topological_order(
    channel_count: usize,
    edges: &[(usize, usize)],
) -> Result<Vec<usize>, RoutingError> {
    let (sorted, leftover) = kahn_sort(channel_count, edges);
    if leftover.is_empty() {
        Ok(sorted)
    } else {
        Err(RoutingError::Cycle { channels: leftover })
    }
}

/// Like [`topological_order`], but never fails: channels caught in a cycle
/// are appended in declaration (ascending index) order after everything that
/// could be ordered.
pub fn order_with_fallback(
    channel_count: usize,
    edges: &[(usize, usize)],
) -> (Vec<usize>, Option<RoutingError>) {
    let (mut sorted, leftover) = kahn_sort(channel_count, edges);
    if leftover.is_empty() {
        (sorted, None)
    } else {
        sorted.extend_from_slice(&leftover);
        (sorted, Some(RoutingError::Cycle { channels: leftover }))
    }
}

fn kahn_sort(channel_count: usize, edges: &[(usize, usize)]) -> (Vec<usize>, Vec<usize>) {
    let mut in_degree = vec![0u32; channel_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); channel_count];
    for &(from, to) in edges {
        if from < channel_count && to < channel_count {
            outgoing[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..channel_count)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut sorted = Vec::with_capacity(channel_count);

    while let Some(Reverse(idx)) = ready.pop() {
        sorted.push(idx);
        for &to in &outgoing[idx] {
            in_degree[to] -= 1;
            if in_degree[to] == 0 {
                ready.push(Reverse(to));
            }
        }
    }

    let leftover = (0..channel_count).filter(|&i| in_degree[i] > 0).collect();
    (sorted, leftover)
}

/// DFS reachability over `(source, consumer)` edges.
pub fn can_reach(edges: &[(usize, usize)], from: usize, to: usize) -> bool {
    let mut visited = Vec::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if visited.contains(&current) {
            continue;
        }
        visited.push(current);
        stack.extend(edges.iter().filter(|e| e.0 == current).map(|e| e.1));
    }
    false
}

/// Returns the first edge in `added` that would close a cycle when combined
/// with `existing`.
pub fn find_cycle_edge(
    existing: &[(usize, usize)],
    added: &[(usize, usize)],
) -> Option<(usize, usize)> {
    let mut all = existing.to_vec();
    for &(from, to) in added {
        if from != to && can_reach(&all, to, from) {
            return Some((from, to));
        }
        all.push((from, to));
    }
    None
}

/// Collect dependency edges from every channel's chain snapshot.
///
/// `snapshots[i]` is channel `i`'s chain.
pub fn collect_edges<'a>(
    snapshots: impl IntoIterator<Item = &'a ChainSnapshot>,
) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for (owner, snapshot) in snapshots.into_iter().enumerate() {
        for slot in snapshot.slots() {
            if let Some(ports) = &slot.capabilities().routing {
                edges.extend(ports.edges(owner));
            }
        }
    }
    edges
}

/// Holder of the current [`RoutingPlan`] and its [`RoutingState`].
#[derive(Debug)]
pub struct RoutingContext {
    state: AtomicU8,
    plan: ArcSwap<RoutingPlan>,
    generation: AtomicU64,
    stale_blocks: AtomicU64,
}

impl RoutingContext {
    /// A valid context with no channels.
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            state: AtomicU8::new(RoutingState::Valid as u8),
            plan: ArcSwap::from_pointee(RoutingPlan::declaration_order(
                0,
                sample_rate,
                block_size,
            )),
            generation: AtomicU64::new(0),
            stale_blocks: AtomicU64::new(0),
        }
    }

    /// Current state.
    pub fn state(&self) -> RoutingState {
        RoutingState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Flag that topology changed and the plan must be rebuilt.
    pub fn mark_stale(&self) {
        self.state
            .store(RoutingState::Stale as u8, Ordering::Release);
    }

    /// Lock-free view of the installed plan (audio thread).
    #[inline]
    pub fn current(&self) -> Guard<Arc<RoutingPlan>> {
        self.plan.load()
    }

    /// Owned handle to the installed plan.
    pub fn plan(&self) -> Arc<RoutingPlan> {
        self.plan.load_full()
    }

    /// Called by the audio thread once per block.
    #[inline]
    pub fn note_block(&self) {
        if self.state() != RoutingState::Valid {
            self.stale_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Blocks processed while the plan was not `Valid`.
    pub fn stale_blocks(&self) -> u64 {
        self.stale_blocks.load(Ordering::Relaxed)
    }

    /// Recompute the order and install it atomically.
    ///
    /// A cycle does not fail the rebuild: the plan falls back to declaration
    /// order for the affected channels and carries the cycle in
    /// [`RoutingPlan::diagnostic`].
    pub fn rebuild(
        &self,
        channel_count: usize,
        sample_rate: f32,
        block_size: usize,
        edges: &[(usize, usize)],
    ) -> Arc<RoutingPlan> {
        self.state
            .store(RoutingState::Rebuilding as u8, Ordering::Release);

        let (processing_order, diagnostic) = order_with_fallback(channel_count, edges);

        #[cfg(feature = "tracing")]
        match &diagnostic {
            Some(err) => tracing::warn!(%err, ?processing_order, "routing fell back to declaration order"),
            None => tracing::debug!(?processing_order, "routing rebuilt"),
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let plan = Arc::new(RoutingPlan {
            channel_count,
            sample_rate,
            block_size,
            processing_order,
            diagnostic,
            generation,
        });
        self.plan.store(Arc::clone(&plan));

        let settled = self.state.compare_exchange(
            RoutingState::Rebuilding as u8,
            RoutingState::Valid as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if settled.is_err() {
            #[cfg(feature = "tracing")]
            tracing::debug!(generation, "routing marked stale during rebuild");
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- ordering ---

    #[test]
    fn test_order_without_edges_is_declaration_order() {
        assert_eq!(topological_order(3, &[]), Ok(vec![0, 1, 2]));
    }

    #[test]
    fn test_source_before_consumer() {
        // 0 reads from 2, 2 reads from 1
        let order = topological_order(3, &[(2, 0), (1, 2)]).unwrap();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_merge_waits_for_all_sources() {
        let order = topological_order(4, &[(1, 0), (3, 0), (2, 0)]).unwrap();
        assert_eq!(order.last(), Some(&0));
    }

    #[test]
    fn test_cycle_reported() {
        let err = topological_order(3, &[(0, 1), (1, 0)]).unwrap_err();
        assert_eq!(err, RoutingError::Cycle { channels: vec![0, 1] });
    }

    #[test]
    fn test_fallback_appends_cycle_in_declaration_order() {
        let (order, diag) = order_with_fallback(4, &[(2, 1), (1, 2), (3, 0)]);
        assert_eq!(order, vec![3, 0, 1, 2]);
        assert!(diag.is_some());
    }

    #[test]
    fn test_out_of_range_edges_ignored() {
        assert_eq!(topological_order(2, &[(5, 0), (1, 9)]), Ok(vec![0, 1]));
    }

    // --- reachability ---

    #[test]
    fn test_can_reach() {
        let edges = [(0, 1), (1, 2)];
        assert!(can_reach(&edges, 0, 2));
        assert!(!can_reach(&edges, 2, 0));
    }

    #[test]
    fn test_find_cycle_edge() {
        let existing = [(0, 1), (1, 2)];
        assert_eq!(find_cycle_edge(&existing, &[(2, 0)]), Some((2, 0)));
        assert_eq!(find_cycle_edge(&existing, &[(0, 2)]), None);
        assert_eq!(find_cycle_edge(&existing, &[(3, 3)]), None);
    }

    // --- state machine ---

    #[test]
    fn test_rebuild_transitions_to_valid() {
        let ctx = RoutingContext::new(48000.0, 256);
        ctx.mark_stale();
        assert_eq!(ctx.state(), RoutingState::Stale);
        let plan = ctx.rebuild(2, 48000.0, 256, &[(1, 0)]);
        assert_eq!(ctx.state(), RoutingState::Valid);
        assert_eq!(plan.processing_order, vec![1, 0]);
        assert_eq!(plan.generation, 1);
        assert_eq!(ctx.plan().processing_order, vec![1, 0]);
    }

    #[test]
    fn test_stale_blocks_counted() {
        let ctx = RoutingContext::new(48000.0, 256);
        ctx.note_block();
        assert_eq!(ctx.stale_blocks(), 0);
        ctx.mark_stale();
        ctx.note_block();
        ctx.note_block();
        assert_eq!(ctx.stale_blocks(), 2);
    }

    #[test]
    fn test_cycle_plan_carries_diagnostic() {
        let ctx = RoutingContext::new(48000.0, 256);
        let plan = ctx.rebuild(2, 48000.0, 256, &[(0, 1), (1, 0)]);
        assert_eq!(plan.processing_order, vec![0, 1]);
        assert!(matches!(plan.diagnostic, Some(RoutingError::Cycle { .. })));
        assert_eq!(ctx.state(), RoutingState::Valid);
    }
}
