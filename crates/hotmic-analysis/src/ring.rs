//! Versioned frame ring: one writer, any number of readers, no locks.
//!
//! Each slot is a sequence lock built from atomics. The writer makes the
//! slot's sequence odd, stores the payload and frame ID, makes the sequence
//! even again and only then advances `latest`. A reader retries a slot whose
//! sequence was odd or changed while it copied, so it never returns a torn
//! frame. Frame IDs start at 1 and only grow; frame `id` lives in slot
//! `id % capacity`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};

use crate::error::AnalysisError;

struct Slot {
    seq: AtomicU64,
    frame_id: AtomicU64,
    data: Box<[AtomicU32]>,
}

impl Slot {
    fn new(width: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            frame_id: AtomicU64::new(0),
            data: (0..width).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Consistent copy of the slot into `out`; returns the frame ID it held.
    fn read(&self, out: &mut [f32]) -> u64 {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            for (o, v) in out.iter_mut().zip(self.data.iter()) {
                *o = f32::from_bits(v.load(Ordering::Relaxed));
            }
            let id = self.frame_id.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return id;
            }
        }
    }
}

/// Outcome of [`FrameRing::copy_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyResult {
    /// Newest frame ID the copy is consistent with; `0` before any frame.
    pub latest_frame_id: u64,
    /// Frames currently held by the ring, at most its capacity.
    pub available_frames: usize,
    /// The requested range was overwritten; the whole window was copied.
    pub full_copy_required: bool,
    /// Slots written into the caller's buffers.
    pub copied: usize,
}

/// Fixed-capacity ring of `width`-value frames.
pub struct FrameRing {
    slots: Box<[Slot]>,
    width: usize,
    latest: AtomicU64,
}

impl std::fmt::Debug for FrameRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRing")
            .field("capacity", &self.capacity())
            .field("width", &self.width)
            .field("latest", &self.latest_frame_id())
            .finish()
    }
}

impl FrameRing {
    /// A ring with `capacity` slots of `width` values and its only writer.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::InvalidRingCapacity`] when `capacity < 2`.
    pub fn with_writer(capacity: usize, width: usize) -> Result<(Arc<Self>, FrameWriter), AnalysisError> {
        if capacity < 2 {
            return Err(AnalysisError::InvalidRingCapacity(capacity));
        }
        let ring = Arc::new(Self {
            slots: (0..capacity).map(|_| Slot::new(width)).collect(),
            width,
            latest: AtomicU64::new(0),
        });
        let writer = FrameWriter {
            ring: Arc::clone(&ring),
            next_id: 1,
        };
        Ok((ring, writer))
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Values per frame.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Newest published frame ID, `0` before the first frame.
    pub fn latest_frame_id(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Frames currently held.
    pub fn available_frames(&self) -> usize {
        available(self.latest_frame_id(), self.capacity())
    }

    /// Slot index holding frame `frame_id`.
    pub fn position(&self, frame_id: u64) -> usize {
        (frame_id % self.capacity() as u64) as usize
    }

    /// Copy the newest frame into `out`, returning its ID.
    ///
    /// Returns `None` before the first frame. `out` shorter than the width
    /// receives a prefix.
    pub fn read_latest(&self, out: &mut [f32]) -> Option<u64> {
        let latest = self.latest_frame_id();
        if latest == 0 {
            return None;
        }
        Some(self.slots[self.position(latest)].read(out))
    }

    /// Copy frames newer than `since_frame_id` into caller buffers.
    ///
    /// `frames` holds `capacity * width` values laid out like the ring and
    /// `frame_ids` one ID per slot. Only slots of frames after
    /// `since_frame_id` are written; every other slot is left untouched.
    /// When the caller fell a full ring behind (`latest - since >= capacity`)
    /// the whole available window is copied and `full_copy_required` is set.
    /// A cursor ahead of the ring copies nothing.
    ///
    /// `latest_frame_id` is the newest frame at the start of the copy. If the
    /// writer laps a slot while it is being copied, `frame_ids` records the
    /// newer frame the slot now holds and `full_copy_required` is set, since
    /// the frame asked for is gone.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::BufferMismatch`] when the buffers do not match the
    /// ring layout.
    pub fn copy_updates(
        &self,
        since_frame_id: u64,
        frames: &mut [f32],
        frame_ids: &mut [u64],
    ) -> Result<CopyResult, AnalysisError> {
        let capacity = self.capacity();
        if frame_ids.len() != capacity || frames.len() != capacity * self.width {
            return Err(AnalysisError::BufferMismatch {
                frames: capacity,
                bins: self.width,
                got: frame_ids.len(),
                got_bins: if frame_ids.is_empty() {
                    0
                } else {
                    frames.len() / frame_ids.len()
                },
            });
        }

        let latest = self.latest_frame_id();
        let mut result = CopyResult {
            latest_frame_id: latest,
            available_frames: available(latest, capacity),
            ..CopyResult::default()
        };
        if latest <= since_frame_id {
            return Ok(result);
        }

        let full = latest - since_frame_id >= capacity as u64;
        let first = if full {
            latest - result.available_frames as u64 + 1
        } else {
            since_frame_id + 1
        };
        result.full_copy_required = full;

        for id in first..=latest {
            let pos = self.position(id);
            let row = &mut frames[pos * self.width..(pos + 1) * self.width];
            let got = self.slots[pos].read(row);
            frame_ids[pos] = got;
            if got != id {
                result.full_copy_required = true;
            }
            result.copied += 1;
        }
        Ok(result)
    }
}

fn available(latest: u64, capacity: usize) -> usize {
    latest.min(capacity as u64) as usize
}

/// The single writer of a [`FrameRing`].
pub struct FrameWriter {
    ring: Arc<FrameRing>,
    next_id: u64,
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl FrameWriter {
    /// The ring this writer publishes into.
    pub fn ring(&self) -> &Arc<FrameRing> {
        &self.ring
    }

    /// ID the next [`publish`](Self::publish) will use.
    pub fn next_frame_id(&self) -> u64 {
        self.next_id
    }

    /// Publish one frame, returning its ID.
    ///
    /// Missing trailing values are stored as zero; extra values are ignored.
    pub fn publish(&mut self, frame: &[f32]) -> u64 {
        let id = self.next_id;
        let slot = &self.ring.slots[self.ring.position(id)];

        let seq = slot.seq.load(Ordering::Relaxed);
        slot.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        for (i, v) in slot.data.iter().enumerate() {
            v.store(frame.get(i).copied().unwrap_or(0.0).to_bits(), Ordering::Relaxed);
        }
        slot.frame_id.store(id, Ordering::Relaxed);
        slot.seq.store(seq.wrapping_add(2), Ordering::Release);

        self.ring.latest.store(id, Ordering::Release);
        self.next_id += 1;
        id
    }
}
