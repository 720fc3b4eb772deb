//! Producer ↔ consumer message protocol.
//!
//! This module owns **every message that crosses the context boundary**
//! between the producer worker and the render side.
//!
//! | Type                      | Direction           | Carried by                |
//! |---------------------------|---------------------|---------------------------|
//! | [`Control`]               | consumer → producer | worker control channel    |
//! | [`Envelope<ProducerMsg>`] | producer → consumer | [`transport`] data channel |
//!
//! ## Design rules
//!
//! 1. Every message kind is an explicit enum variant; nothing is inferred
//!    from which fields happen to be present.
//! 2. Every producer message carries the [`Generation`] of the session that
//!    produced it. The consumer discards anything from another generation.
//! 3. Sample bytes travel as [`bytes::Bytes`] and are moved, never copied.
//!
//! [`transport`]: crate::transport

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::types::{Body, ConfigPatch, GraphSettings};

/// Byte width of one encoded sample (little-endian `f32`).
pub const SAMPLE_WIDTH: usize = 4;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Monotonically increasing session identifier.
#[derive(
    Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// One transport unit: a run of consecutive samples.
///
/// Immutable once built. `index` is zero-based and gapless per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: u64,
    pub samples: Bytes,
    pub element_width: usize,
}

impl Chunk {
    /// Byte length of the sample payload.
    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len() / self.element_width
    }

    /// Decode the sample at `offset` within this chunk.
    pub fn sample(&self, offset: usize) -> Option<f32> {
        let start = offset.checked_mul(self.element_width)?;
        let raw = self.samples.get(start..start + SAMPLE_WIDTH)?;
        let mut le = [0u8; SAMPLE_WIDTH];
        le.copy_from_slice(raw);
        Some(f32::from_le_bytes(le))
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.sample_count()).filter_map(move |i| self.sample(i))
    }
}

/// Accumulates samples for the chunk currently being filled.
#[derive(Debug)]
pub struct ChunkBuilder {
    index: u64,
    capacity: usize,
    buf: BytesMut,
}

impl ChunkBuilder {
    pub fn new(index: u64, capacity: usize) -> Self {
        Self {
            index,
            capacity,
            buf: BytesMut::with_capacity(capacity * SAMPLE_WIDTH),
        }
    }

    pub fn push(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len() / SAMPLE_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Freeze the filled bytes into a [`Chunk`] and start the next index.
    pub fn seal(&mut self) -> Chunk {
        let samples = self.buf.split().freeze();
        let chunk = Chunk {
            index: self.index,
            samples,
            element_width: SAMPLE_WIDTH,
        };
        self.index += 1;
        self.buf.reserve(self.capacity * SAMPLE_WIDTH);
        chunk
    }
}

// ---------------------------------------------------------------------------
// Producer → consumer
// ---------------------------------------------------------------------------

/// Statistics attached to the completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Physics ticks executed.
    pub ticks: u64,
    /// Samples recorded (including the flushed partial chunk).
    pub samples: u64,
    /// Chunks emitted.
    pub chunks: u64,
    /// Mean absolute relative drift of mechanical energy over all ticks.
    pub error_average: f64,
    /// Wall-clock completion time, milliseconds since the Unix epoch.
    pub finished_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerMsg {
    Chunk(Chunk),
    Complete(RunSummary),
}

/// Every producer message is wrapped in this envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub generation: Generation,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(generation: Generation, payload: T) -> Self {
        Self {
            generation,
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Consumer → producer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Control {
    /// Begin a new session with a fresh body.
    Start {
        generation: Generation,
        body: Body,
        #[serde(default)]
        settings: Option<GraphSettings>,
    },
    /// Partial settings update, applied whatever the generation. Its
    /// `allowed_buffers` also resets the credit of a running producer when
    /// `generation` matches; the other fields take effect at the next `Start`.
    Configure {
        generation: Generation,
        patch: ConfigPatch,
    },
    /// Replace the remaining credit of the given session.
    Credit {
        generation: Generation,
        allowed_buffers: u32,
    },
    /// Stop the worker thread.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
