//! Audio-thread side of the analysis hand-off.
//!
//! [`AnalysisCaptureLink`] is installed into the engine's processor as its
//! [`CaptureSink`]. Each tapped block is copied into an `rtrb` sample ring,
//! followed by a fixed-size header on a second ring, and the worker thread
//! is unparked. A block that does not fit is dropped whole and counted.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::Thread;

use hotmic_core::{CaptureMeta, CaptureSink, CaptureSource};
use rtrb::{Consumer, Producer, RingBuffer};

/// Producers carried per block; longer chains are truncated.
pub const MAX_CAPTURE_PRODUCERS: usize = 32;

/// Fixed-size description of one queued block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Engine block counter.
    pub sample_clock: u64,
    /// Sample time of the first sample.
    pub sample_time: i64,
    /// Tapped channel.
    pub channel: usize,
    /// Source channel of a bus-fed tap.
    pub bus: Option<usize>,
    /// Split or output tap.
    pub source: CaptureSource,
    /// Samples queued for this block.
    pub len: usize,
    producer_count: usize,
    producers: [i32; MAX_CAPTURE_PRODUCERS],
}

impl BlockHeader {
    fn from_meta(meta: &CaptureMeta<'_>, len: usize) -> Self {
        let producer_count = meta.producers.len().min(MAX_CAPTURE_PRODUCERS);
        let mut producers = [0; MAX_CAPTURE_PRODUCERS];
        producers[..producer_count].copy_from_slice(&meta.producers[..producer_count]);
        Self {
            sample_clock: meta.sample_clock,
            sample_time: meta.sample_time,
            channel: meta.channel,
            bus: meta.bus,
            source: meta.source,
            len,
            producer_count,
            producers,
        }
    }

    /// Instance IDs upstream of the tap.
    pub fn producers(&self) -> &[i32] {
        &self.producers[..self.producer_count]
    }

    /// Same channel, tap kind, bus and producer set.
    pub fn same_source(&self, other: &Self) -> bool {
        self.channel == other.channel
            && self.source == other.source
            && self.bus == other.bus
            && self.producers() == other.producers()
    }
}

/// Counters shared by the link and its orchestrator.
#[derive(Debug, Default)]
pub struct CaptureStats {
    captured: AtomicU64,
    dropped: AtomicU64,
}

impl CaptureStats {
    /// Blocks queued for analysis.
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    /// Blocks dropped because the rings were full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Real-time producer end of the analysis queue.
pub struct AnalysisCaptureLink {
    samples: Producer<f32>,
    headers: Producer<BlockHeader>,
    worker: Option<Thread>,
    stats: Arc<CaptureStats>,
}

impl std::fmt::Debug for AnalysisCaptureLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCaptureLink")
            .field("free_samples", &self.samples.slots())
            .field("free_headers", &self.headers.slots())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Consumer ends handed to the worker.
pub(crate) struct CaptureQueue {
    pub(crate) samples: Consumer<f32>,
    pub(crate) headers: Consumer<BlockHeader>,
}

/// Create a link and its consumer ends.
pub(crate) fn channel(
    sample_capacity: usize,
    header_capacity: usize,
    stats: Arc<CaptureStats>,
) -> (AnalysisCaptureLink, CaptureQueue) {
    let (sample_tx, sample_rx) = RingBuffer::<f32>::new(sample_capacity);
    let (header_tx, header_rx) = RingBuffer::<BlockHeader>::new(header_capacity);
    (
        AnalysisCaptureLink {
            samples: sample_tx,
            headers: header_tx,
            worker: None,
            stats,
        },
        CaptureQueue {
            samples: sample_rx,
            headers: header_rx,
        },
    )
}

impl AnalysisCaptureLink {
    pub(crate) fn set_worker(&mut self, worker: Thread) {
        self.worker = Some(worker);
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<CaptureStats> {
        &self.stats
    }
}

impl CaptureSink for AnalysisCaptureLink {
    fn capture(&mut self, block: &[f32], meta: &CaptureMeta<'_>) {
        if block.is_empty() {
            return;
        }
        if self.headers.slots() == 0 {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let Ok(chunk) = self.samples.write_chunk_uninit(block.len()) else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        chunk.fill_from_iter(block.iter().copied());
        let queued = self.headers.push(BlockHeader::from_meta(meta, block.len())).is_ok();
        debug_assert!(queued, "header slot reserved above");
        self.stats.captured.fetch_add(1, Ordering::Relaxed);
        if let Some(worker) = &self.worker {
            worker.unpark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(producers: &[i32], source: CaptureSource) -> CaptureMeta<'_> {
        CaptureMeta {
            sample_clock: 3,
            sample_time: 384,
            channel: 1,
            bus: None,
            producers,
            source,
        }
    }

    #[test]
    fn test_block_and_header_queued() {
        let (mut link, mut queue) = channel(16, 4, Arc::default());
        link.capture(&[0.1, 0.2, 0.3], &meta(&[1, 2], CaptureSource::Plugin));

        let header = queue.headers.pop().unwrap();
        assert_eq!(header.len, 3);
        assert_eq!(header.sample_time, 384);
        assert_eq!(header.producers(), &[1, 2]);
        assert_eq!(header.source, CaptureSource::Plugin);
        let samples: Vec<f32> = (0..3).map(|_| queue.samples.pop().unwrap()).collect();
        assert_eq!(samples, vec![0.1, 0.2, 0.3]);
        assert_eq!(link.stats().captured(), 1);
    }

    #[test]
    fn test_full_ring_drops_whole_block() {
        let (mut link, mut queue) = channel(4, 4, Arc::default());
        link.capture(&[1.0; 3], &meta(&[], CaptureSource::Output));
        link.capture(&[2.0; 3], &meta(&[], CaptureSource::Output));
        assert_eq!(link.stats().captured(), 1);
        assert_eq!(link.stats().dropped(), 1);
        assert_eq!(queue.headers.slots(), 1);
        assert_eq!(queue.samples.slots(), 3);

        let (mut link, queue) = channel(64, 1, Arc::default());
        link.capture(&[1.0; 3], &meta(&[], CaptureSource::Output));
        link.capture(&[1.0; 3], &meta(&[], CaptureSource::Output));
        assert_eq!(link.stats().dropped(), 1, "header ring full");
        assert_eq!(queue.samples.slots(), 3, "dropped block left no samples");
    }

    #[test]
    fn test_blocks_wrap_around_the_sample_ring() {
        let (mut link, mut queue) = channel(5, 4, Arc::default());
        for round in 0..4 {
            let block = [round as f32, round as f32 + 0.5, round as f32 + 0.25];
            link.capture(&block, &meta(&[], CaptureSource::Output));
            assert_eq!(queue.headers.pop().unwrap().len, 3);
            let samples: Vec<f32> = (0..3).map(|_| queue.samples.pop().unwrap()).collect();
            assert_eq!(samples, block);
        }
        assert_eq!(link.stats().captured(), 4);
        assert_eq!(link.stats().dropped(), 0);
    }

    #[test]
    fn test_source_identity() {
        let a = BlockHeader::from_meta(&meta(&[1, 2], CaptureSource::Plugin), 8);
        let b = BlockHeader::from_meta(&meta(&[1, 2], CaptureSource::Plugin), 16);
        let c = BlockHeader::from_meta(&meta(&[1, 2, 3], CaptureSource::Output), 8);
        let d = BlockHeader::from_meta(&meta(&[1], CaptureSource::Plugin), 8);
        assert!(a.same_source(&b));
        assert!(!a.same_source(&c));
        assert!(!a.same_source(&d));
    }

    #[test]
    fn test_long_producer_list_truncated() {
        let ids: Vec<i32> = (1..=40).collect();
        let header = BlockHeader::from_meta(&meta(&ids, CaptureSource::Output), 1);
        assert_eq!(header.producers().len(), MAX_CAPTURE_PRODUCERS);
        assert_eq!(header.producers()[31], 32);
    }
}
