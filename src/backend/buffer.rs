//! Bounded sample ring shared between the decoder and the renderer

use crate::backend::lock;
use crate::types::Sample;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of samples kept for rendering
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Fixed-capacity, thread-safe ring of the most recent samples
///
/// The writer (driver thread) holds the lock for one O(1) push; the reader
/// (render thread) holds it for one O(C) copy. Readers only ever see whole
/// snapshots, never a view into the ring.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a sample, silently evicting the oldest one when full
    pub fn push(&self, sample: Sample) {
        let mut samples = lock(&self.samples);
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Consistent copy of the buffer in arrival order
    pub fn snapshot(&self) -> Vec<Sample> {
        lock(&self.samples).iter().copied().collect()
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<Sample> {
        lock(&self.samples).back().copied()
    }

    pub fn clear(&self) {
        lock(&self.samples).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.samples).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
