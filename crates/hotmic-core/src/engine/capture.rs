//! Analysis tap hand-off from the audio thread.

/// Where in the tapped channel the captured block was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSource {
    /// Right after a specific plugin (mid-chain split).
    Plugin,
    /// The end of the chain.
    Output,
}

/// Describes one captured block.
#[derive(Debug, Clone, Copy)]
pub struct CaptureMeta<'a> {
    /// Engine block counter.
    pub sample_clock: u64,
    /// Sample position of the first sample in the block.
    pub sample_time: i64,
    /// Tapped channel.
    pub channel: usize,
    /// Source channel when the tapped channel is fed by a bus or copy input.
    pub bus: Option<usize>,
    /// Non-bypassed instance IDs upstream of the tap, in chain order.
    pub producers: &'a [i32],
    /// Split or output.
    pub source: CaptureSource,
}

/// Receives the tapped block once per audio callback.
///
/// Called on the audio thread after the tapped channel's chain has run.
/// `block` is the processor's own copy of the signal at the tap point, so
/// plugins after a mid-chain split never show up in it. It is reused on the
/// next callback: implementations copy what they need into preallocated
/// storage and must not allocate, lock or block.
pub trait CaptureSink: Send {
    /// Consume one block.
    fn capture(&mut self, block: &[f32], meta: &CaptureMeta<'_>);
}
