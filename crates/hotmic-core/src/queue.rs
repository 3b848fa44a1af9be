//! Control-to-audio parameter and command queue.
//!
//! The control thread enqueues [`ParameterChange`]s; the audio thread drains
//! them once at the start of every block, so a change is always applied at a
//! block boundary and never mid-block.
//!
//! The transport is a bounded `crossbeam_channel` (array flavour, lock-free on
//! both ends). When it is full, changes go to a producer-side overflow list in
//! which a newer change for the same key replaces the older one. While the
//! overflow holds anything, every new change goes through it too, so changes
//! reach the audio thread in the order they were enqueued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use thiserror::Error;

use crate::plugin::PluginCommand;

/// Default transport capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default overflow list capacity.
pub const DEFAULT_OVERFLOW_CAPACITY: usize = 4096;

/// What a [`ParameterChange`] targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    /// Channel input gain in dB.
    InputGainDb,
    /// Channel output gain in dB.
    OutputGainDb,
    /// Channel mute (`value >= 0.5` mutes).
    Mute,
    /// Channel solo (`value >= 0.5` solos).
    Solo,
    /// A plugin parameter by index.
    PluginParameter,
    /// A plugin's own bypass flag.
    PluginBypass,
    /// A discrete plugin command.
    PluginCommand,
}

/// One control-plane change, consumed exactly once by the audio thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterChange {
    /// Target channel.
    pub channel: usize,
    /// What to change.
    pub kind: ParameterKind,
    /// Target plugin, `0` for channel-level changes.
    pub plugin_instance_id: i32,
    /// Parameter index for [`ParameterKind::PluginParameter`].
    pub parameter_index: usize,
    /// New value.
    pub value: f32,
    /// Command for [`ParameterKind::PluginCommand`].
    pub command: PluginCommand,
}

/// Coalescing key: changes with equal keys supersede each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeKey {
    channel: usize,
    plugin_instance_id: i32,
    kind: ParameterKind,
    parameter_index: usize,
}

fn flag(on: bool) -> f32 {
    if on { 1.0 } else { 0.0 }
}

impl ParameterChange {
    fn channel_level(channel: usize, kind: ParameterKind, value: f32) -> Self {
        Self {
            channel,
            kind,
            plugin_instance_id: 0,
            parameter_index: 0,
            value,
            command: PluginCommand::None,
        }
    }

    /// Set a channel's input gain.
    pub fn input_gain_db(channel: usize, db: f32) -> Self {
        Self::channel_level(channel, ParameterKind::InputGainDb, db)
    }

    /// Set a channel's output gain.
    pub fn output_gain_db(channel: usize, db: f32) -> Self {
        Self::channel_level(channel, ParameterKind::OutputGainDb, db)
    }

    /// Mute or unmute a channel.
    pub fn mute(channel: usize, muted: bool) -> Self {
        Self::channel_level(channel, ParameterKind::Mute, flag(muted))
    }

    /// Solo or unsolo a channel.
    pub fn solo(channel: usize, soloed: bool) -> Self {
        Self::channel_level(channel, ParameterKind::Solo, flag(soloed))
    }

    /// Set a plugin parameter.
    pub fn plugin_parameter(channel: usize, instance_id: i32, index: usize, value: f32) -> Self {
        Self {
            channel,
            kind: ParameterKind::PluginParameter,
            plugin_instance_id: instance_id,
            parameter_index: index,
            value,
            command: PluginCommand::None,
        }
    }

    /// Set a plugin's bypass flag.
    pub fn plugin_bypass(channel: usize, instance_id: i32, bypassed: bool) -> Self {
        Self {
            channel,
            kind: ParameterKind::PluginBypass,
            plugin_instance_id: instance_id,
            parameter_index: 0,
            value: flag(bypassed),
            command: PluginCommand::None,
        }
    }

    /// Send a command to a plugin.
    pub fn plugin_command(channel: usize, instance_id: i32, command: PluginCommand) -> Self {
        Self {
            channel,
            kind: ParameterKind::PluginCommand,
            plugin_instance_id: instance_id,
            parameter_index: 0,
            value: 0.0,
            command,
        }
    }

    /// `value` read as a boolean.
    #[inline]
    pub fn is_on(&self) -> bool {
        self.value >= 0.5
    }

    /// Coalescing key. Commands are discrete events and never coalesce.
    pub fn key(&self) -> Option<ChangeKey> {
        if self.kind == ParameterKind::PluginCommand {
            return None;
        }
        Some(ChangeKey {
            channel: self.channel,
            plugin_instance_id: self.plugin_instance_id,
            kind: self.kind,
            parameter_index: self.parameter_index,
        })
    }
}

/// Why a change could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Transport and overflow are both full.
    #[error("parameter queue full ({pending} changes waiting)")]
    Full {
        /// Changes waiting in the overflow list.
        pending: usize,
    },
    /// The audio side has been dropped.
    #[error("parameter queue disconnected")]
    Disconnected,
}

/// How an accepted change was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Sent straight to the audio thread.
    Sent,
    /// Parked in the overflow list.
    Deferred,
    /// Replaced an older parked change with the same key.
    Coalesced,
}

/// Control-thread end of the queue.
#[derive(Debug)]
pub struct ParameterSender {
    tx: Sender<ParameterChange>,
    overflow: Mutex<VecDeque<ParameterChange>>,
    overflow_capacity: usize,
    coalesced: AtomicU64,
    dropped: AtomicU64,
}

/// Audio-thread end of the queue.
#[derive(Debug)]
pub struct ParameterReceiver {
    rx: Receiver<ParameterChange>,
    capacity: usize,
}

/// Create a queue with `capacity` transport slots and room for
/// `overflow_capacity` parked changes.
pub fn parameter_queue(
    capacity: usize,
    overflow_capacity: usize,
) -> (ParameterSender, ParameterReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    (
        ParameterSender {
            tx,
            overflow: Mutex::new(VecDeque::with_capacity(overflow_capacity)),
            overflow_capacity,
            coalesced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        },
        ParameterReceiver { rx, capacity },
    )
}

impl ParameterSender {
    /// Queue a change (control thread, never blocks on the audio thread).
    ///
    /// # Errors
    ///
    /// [`QueueError::Full`] when the overflow list is full and the change
    /// cannot replace a parked one; [`QueueError::Disconnected`] when the
    /// audio side is gone.
    pub fn enqueue(&self, change: ParameterChange) -> Result<Enqueued, QueueError> {
        let mut overflow = self.overflow.lock();
        self.flush_locked(&mut overflow)?;

        if overflow.is_empty() {
            match self.tx.try_send(change) {
                Ok(()) => return Ok(Enqueued::Sent),
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
                Err(TrySendError::Full(_)) => {}
            }
        }

        if let Some(key) = change.key() {
            if let Some(pos) = overflow.iter().position(|c| c.key() == Some(key)) {
                overflow.remove(pos);
                overflow.push_back(change);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                return Ok(Enqueued::Coalesced);
            }
        }

        if overflow.len() >= self.overflow_capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            tracing::warn!(?change, "parameter queue full, change dropped");
            return Err(QueueError::Full {
                pending: overflow.len(),
            });
        }
        overflow.push_back(change);
        Ok(Enqueued::Deferred)
    }

    /// Move parked changes into the transport while it has room.
    ///
    /// Returns the number still parked.
    ///
    /// # Errors
    ///
    /// [`QueueError::Disconnected`] when the audio side is gone.
    pub fn flush(&self) -> Result<usize, QueueError> {
        let mut overflow = self.overflow.lock();
        self.flush_locked(&mut overflow)?;
        Ok(overflow.len())
    }

    fn flush_locked(&self, overflow: &mut VecDeque<ParameterChange>) -> Result<(), QueueError> {
        while let Some(change) = overflow.pop_front() {
            match self.tx.try_send(change) {
                Ok(()) => {}
                Err(TrySendError::Full(change)) => {
                    overflow.push_front(change);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => return Err(QueueError::Disconnected),
            }
        }
        Ok(())
    }

    /// Changes parked in the overflow list.
    pub fn pending_overflow(&self) -> usize {
        self.overflow.lock().len()
    }

    /// Changes superseded by a newer change with the same key.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    /// Changes rejected because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ParameterReceiver {
    /// Hand every queued change to `apply`, in order (audio thread).
    ///
    /// Takes at most one transport's worth of changes so a producer that keeps
    /// enqueueing cannot stall the block. Returns the number drained.
    #[inline]
    pub fn drain(&self, mut apply: impl FnMut(ParameterChange)) -> usize {
        let mut n = 0;
        while n < self.capacity {
            match self.rx.try_recv() {
                Ok(change) => {
                    apply(change);
                    n += 1;
                }
                Err(_) => break,
            }
        }
        n
    }

    /// Changes waiting in the transport.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the transport is empty.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_all(rx: &ParameterReceiver) -> Vec<ParameterChange> {
        let mut out = Vec::new();
        rx.drain(|c| out.push(c));
        out
    }

    #[test]
    fn test_fifo_when_not_full() {
        let (tx, rx) = parameter_queue(8, 8);
        tx.enqueue(ParameterChange::input_gain_db(0, -3.0)).unwrap();
        tx.enqueue(ParameterChange::mute(1, true)).unwrap();
        let got = drain_all(&rx);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].kind, ParameterKind::InputGainDb);
        assert!(got[1].is_on());
    }

    #[test]
    fn test_overflow_coalesces_same_key() {
        let (tx, rx) = parameter_queue(1, 8);
        assert_eq!(
            tx.enqueue(ParameterChange::plugin_parameter(0, 1, 0, 0.1)),
            Ok(Enqueued::Sent)
        );
        assert_eq!(
            tx.enqueue(ParameterChange::plugin_parameter(0, 1, 0, 0.2)),
            Ok(Enqueued::Deferred)
        );
        assert_eq!(
            tx.enqueue(ParameterChange::plugin_parameter(0, 1, 1, 5.0)),
            Ok(Enqueued::Deferred)
        );
        assert_eq!(
            tx.enqueue(ParameterChange::plugin_parameter(0, 1, 0, 0.3)),
            Ok(Enqueued::Coalesced)
        );
        assert_eq!(tx.coalesced_count(), 1);

        let mut values = Vec::new();
        loop {
            let got = drain_all(&rx);
            if got.is_empty() && tx.flush().unwrap() == 0 && rx.is_empty() {
                break;
            }
            values.extend(got.iter().map(|c| (c.parameter_index, c.value)));
        }
        assert_eq!(values, vec![(0, 0.1), (1, 5.0), (0, 0.3)]);
    }

    #[test]
    fn test_commands_never_coalesce() {
        let (tx, rx) = parameter_queue(1, 8);
        for _ in 0..3 {
            tx.enqueue(ParameterChange::plugin_command(0, 2, PluginCommand::ToggleNoiseLearn))
                .unwrap();
        }
        assert_eq!(tx.pending_overflow(), 2);
        let mut count = drain_all(&rx).len();
        while tx.flush().unwrap() > 0 || !rx.is_empty() {
            count += drain_all(&rx).len();
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn test_order_preserved_across_keys_while_parked() {
        let (tx, rx) = parameter_queue(1, 8);
        tx.enqueue(ParameterChange::input_gain_db(0, 1.0)).unwrap();
        tx.enqueue(ParameterChange::output_gain_db(0, 2.0)).unwrap();
        tx.enqueue(ParameterChange::mute(0, true)).unwrap();
        let mut kinds = Vec::new();
        loop {
            let got = drain_all(&rx);
            kinds.extend(got.iter().map(|c| c.kind));
            if tx.flush().unwrap() == 0 && rx.is_empty() {
                break;
            }
        }
        assert_eq!(
            kinds,
            vec![
                ParameterKind::InputGainDb,
                ParameterKind::OutputGainDb,
                ParameterKind::Mute
            ]
        );
    }

    #[test]
    fn test_full_overflow_rejects() {
        let (tx, _rx) = parameter_queue(1, 1);
        tx.enqueue(ParameterChange::mute(0, true)).unwrap();
        tx.enqueue(ParameterChange::mute(1, true)).unwrap();
        let err = tx.enqueue(ParameterChange::mute(2, true)).unwrap_err();
        assert_eq!(err, QueueError::Full { pending: 1 });
        assert_eq!(tx.dropped_count(), 1);
    }

    #[test]
    fn test_disconnected() {
        let (tx, rx) = parameter_queue(4, 4);
        drop(rx);
        assert_eq!(
            tx.enqueue(ParameterChange::mute(0, true)),
            Err(QueueError::Disconnected)
        );
    }

    #[test]
    fn test_drain_is_bounded_per_call() {
        let (tx, rx) = parameter_queue(4, 16);
        for i in 0..8 {
            tx.enqueue(ParameterChange::plugin_parameter(0, 1, i, 0.0)).unwrap();
        }
        assert_eq!(rx.drain(|_| {}), 4);
    }

    #[test]
    fn test_queue_error_display() {
        assert_eq!(
            QueueError::Full { pending: 3 }.to_string(),
            "parameter queue full (3 changes waiting)"
        );
    }
}
