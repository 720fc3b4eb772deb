//! `FrameStore` – consumer-side registry of received chunks.
//!
//! Lives on the render side and is only touched from that thread, so no
//! locking is needed. Chunks are appended strictly in index order; any other
//! index is an integrity violation.

use crate::error::{Result, StreamError};
use crate::protocol::Chunk;

/// Result of a lookup that may run ahead of the producer.
///
/// `Pending` is ordinary control flow, not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame<T> {
    Available(T),
    Pending,
}

impl<T> Frame<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Frame::Available(_))
    }

    pub fn available(self) -> Option<T> {
        match self {
            Frame::Available(v) => Some(v),
            Frame::Pending => None,
        }
    }
}

#[derive(Debug)]
pub struct FrameStore {
    /// Samples per chunk for this session. Every chunk except a final
    /// flushed one holds exactly this many.
    capacity: usize,
    chunks: Vec<Chunk>,
    samples: u64,
}

impl FrameStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chunks: Vec::new(),
            samples: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index the next accepted chunk must carry.
    pub fn next_expected(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn add_chunk(&mut self, chunk: Chunk) -> Result<()> {
        let expected = self.next_expected();
        if chunk.index != expected {
            return Err(StreamError::Integrity {
                expected,
                received: chunk.index,
            });
        }
        self.samples += chunk.sample_count() as u64;
        self.chunks.push(chunk);
        Ok(())
    }

    /// Chunk by chunk index.
    pub fn get_frame(&self, index: u64) -> Frame<&Chunk> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.chunks.get(i))
            .map_or(Frame::Pending, Frame::Available)
    }

    /// Sample by global sample index.
    pub fn sample(&self, index: u64) -> Frame<f32> {
        let cap = self.capacity as u64;
        let Frame::Available(chunk) = self.get_frame(index / cap) else {
            return Frame::Pending;
        };
        chunk
            .sample((index % cap) as usize)
            .map_or(Frame::Pending, Frame::Available)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len_samples(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Largest available sample in `0..=index`, or `None` if sample 0 has
    /// not arrived. Stops at the first pending sample.
    pub fn max_value_up_to(&self, index: u64) -> Option<f32> {
        let mut max: Option<f32> = None;
        for i in 0..=index {
            match self.sample(i) {
                Frame::Available(v) => max = Some(max.map_or(v, |m| m.max(v))),
                Frame::Pending => break,
            }
        }
        max
    }

    /// Drop every chunk, keeping the capacity.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.samples = 0;
    }

    /// Drop every chunk and adopt a new capacity (session restart).
    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
