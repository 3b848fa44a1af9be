//! Channel references shared between a routing plugin and the control side.

use std::sync::atomic::{AtomicI32, Ordering};

/// Maximum channel references one routing plugin can hold.
pub const MAX_ROUTING_PORTS: usize = 8;

/// Stored value for an unused port.
pub const NO_CHANNEL: i32 = -1;

/// Direction of the dependency a routing plugin creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingRole {
    /// The owning channel reads the referenced channels (bus input, merge).
    ReadsFrom,
    /// The referenced channels read the owning channel (copy-to-channel).
    FeedsInto,
}

/// Atomic channel references of one routing plugin.
///
/// The plugin reads the ports on the audio thread every block. The control
/// thread reads them to compute the processing order and rewrites them in
/// place when a channel is deleted.
#[derive(Debug)]
pub struct RoutingPorts {
    role: RoutingRole,
    channels: [AtomicI32; MAX_ROUTING_PORTS],
}

impl RoutingPorts {
    /// Create ports with the given initial channels. Extra entries are ignored.
    pub fn new(role: RoutingRole, initial: &[Option<usize>]) -> Self {
        let ports = Self {
            role,
            channels: std::array::from_fn(|_| AtomicI32::new(NO_CHANNEL)),
        };
        for (i, ch) in initial.iter().enumerate().take(MAX_ROUTING_PORTS) {
            ports.set(i, *ch);
        }
        ports
    }

    /// Dependency direction.
    pub fn role(&self) -> RoutingRole {
        self.role
    }

    /// Channel referenced by port `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<usize> {
        let raw = self.channels.get(index)?.load(Ordering::Acquire);
        usize::try_from(raw).ok()
    }

    /// Point port `index` at `channel` (or clear it with `None`).
    pub fn set(&self, index: usize, channel: Option<usize>) {
        if let Some(slot) = self.channels.get(index) {
            let raw = channel.map_or(NO_CHANNEL, |c| c as i32);
            slot.store(raw, Ordering::Release);
        }
    }

    /// All referenced channels in port order.
    pub fn channels(&self) -> Vec<usize> {
        (0..MAX_ROUTING_PORTS).filter_map(|i| self.get(i)).collect()
    }

    /// Dependency edges `(source, consumer)` for a plugin living on `owner`.
    ///
    /// Self references are not edges.
    pub fn edges(&self, owner: usize) -> Vec<(usize, usize)> {
        self.channels()
            .into_iter()
            .filter(|&ch| ch != owner)
            .map(|ch| match self.role {
                RoutingRole::ReadsFrom => (ch, owner),
                RoutingRole::FeedsInto => (owner, ch),
            })
            .collect()
    }

    /// Edges this plugin would have if port `index` pointed at `channel`.
    pub fn edges_with(&self, owner: usize, index: usize, channel: Option<usize>) -> Vec<(usize, usize)> {
        (0..MAX_ROUTING_PORTS)
            .filter_map(|i| if i == index { channel } else { self.get(i) })
            .filter(|&ch| ch != owner)
            .map(|ch| match self.role {
                RoutingRole::ReadsFrom => (ch, owner),
                RoutingRole::FeedsInto => (owner, ch),
            })
            .collect()
    }

    /// Rewrite references after channel `removed` was deleted.
    ///
    /// A reference to the deleted channel moves to the first remaining
    /// channel (index 0); references above it shift down by one. Returns
    /// `true` if any port changed.
    pub fn remap_removed(&self, removed: usize) -> bool {
        let mut changed = false;
        for i in 0..MAX_ROUTING_PORTS {
            let Some(ch) = self.get(i) else { continue };
            let remapped = remap_channel(ch, removed);
            if remapped != ch {
                self.set(i, Some(remapped));
                changed = true;
            }
        }
        changed
    }
}

/// Channel index after channel `removed` is deleted.
#[inline]
pub fn remap_channel(channel: usize, removed: usize) -> usize {
    use std::cmp::Ordering::{Equal, Greater, Less};
    match channel.cmp(&removed) {
        Less => channel,
        Equal => 0,
        Greater => channel - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_channels() {
        let ports = RoutingPorts::new(RoutingRole::ReadsFrom, &[Some(2), None, Some(0)]);
        assert_eq!(ports.get(0), Some(2));
        assert_eq!(ports.get(1), None);
        assert_eq!(ports.channels(), vec![2, 0]);
        assert_eq!(ports.get(MAX_ROUTING_PORTS), None);
    }

    #[test]
    fn test_edges_follow_role() {
        let reads = RoutingPorts::new(RoutingRole::ReadsFrom, &[Some(0), Some(1)]);
        assert_eq!(reads.edges(2), vec![(0, 2), (1, 2)]);

        let feeds = RoutingPorts::new(RoutingRole::FeedsInto, &[Some(3)]);
        assert_eq!(feeds.edges(1), vec![(1, 3)]);
    }

    #[test]
    fn test_edges_with_replaced_port() {
        let ports = RoutingPorts::new(RoutingRole::ReadsFrom, &[Some(0), Some(1)]);
        assert_eq!(ports.edges_with(2, 1, Some(3)), vec![(0, 2), (3, 2)]);
        assert_eq!(ports.edges_with(2, 0, None), vec![(1, 2)]);
        assert_eq!(ports.channels(), vec![0, 1]);
    }

    #[test]
    fn test_self_reference_is_not_an_edge() {
        let ports = RoutingPorts::new(RoutingRole::ReadsFrom, &[Some(1)]);
        assert!(ports.edges(1).is_empty());
    }

    #[test]
    fn test_remap_channel() {
        assert_eq!(remap_channel(0, 2), 0);
        assert_eq!(remap_channel(2, 2), 0);
        assert_eq!(remap_channel(3, 2), 2);
    }

    #[test]
    fn test_remap_removed() {
        let ports = RoutingPorts::new(RoutingRole::ReadsFrom, &[Some(0), Some(1), Some(3)]);
        assert!(ports.remap_removed(1));
        assert_eq!(ports.channels(), vec![0, 0, 2]);
        assert!(!ports.remap_removed(5));
    }
}
