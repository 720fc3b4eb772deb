//! Chunked transport – producer thread → render side.
//!
//! ## Threading model
//!
//! ```text
//! Render thread              │  Producer worker thread
//! ────────────────────────── │ ──────────────────────────
//! Session::pump()            │ SampleProducer::run()
//!   → rx.try_recv()          │   → GenerationSink::deliver(chunk)
//!   → generation check       │   → tx.send(Envelope<ProducerMsg>)
//!   → FrameStore::add_chunk  │
//! ```
//!
//! The channel is unbounded so `send` never blocks; the only backpressure is
//! the credit budget. Chunks are moved into the channel, so the producer
//! keeps no handle to bytes it has sent.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{Result, StreamError};
use crate::producer::ChunkSink;
use crate::protocol::{Chunk, Envelope, Generation, ProducerMsg, RunSummary};

/// Create a connected sender/receiver pair.
pub fn channel() -> (ChunkSender, ChunkReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ChunkSender { tx }, ChunkReceiver { rx })
}

// ---------------------------------------------------------------------------
// Sender (producer side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChunkSender {
    tx: Sender<Envelope<ProducerMsg>>,
}

impl ChunkSender {
    /// Move `chunk` to the consumer, tagged with `generation`.
    pub fn send(&self, generation: Generation, chunk: Chunk) -> Result<()> {
        self.post(Envelope::new(generation, ProducerMsg::Chunk(chunk)))
    }

    pub fn complete(&self, generation: Generation, summary: RunSummary) -> Result<()> {
        self.post(Envelope::new(generation, ProducerMsg::Complete(summary)))
    }

    fn post(&self, envelope: Envelope<ProducerMsg>) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| StreamError::TransportClosed)
    }

    /// Bind this sender to one generation so the producer can use it as a
    /// [`ChunkSink`].
    pub fn for_generation(&self, generation: Generation) -> GenerationSink<'_> {
        GenerationSink {
            sender: self,
            generation,
        }
    }
}

/// A [`ChunkSender`] stamped with the generation of the running session.
pub struct GenerationSink<'a> {
    sender: &'a ChunkSender,
    generation: Generation,
}

impl ChunkSink for GenerationSink<'_> {
    fn deliver(&mut self, chunk: Chunk) -> Result<()> {
        self.sender.send(self.generation, chunk)
    }
}

// ---------------------------------------------------------------------------
// Receiver (consumer side)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ChunkReceiver {
    rx: Receiver<Envelope<ProducerMsg>>,
}

impl ChunkReceiver {
    /// Drain every message currently queued without blocking.
    ///
    /// Stops early (after returning what was queued) once all senders are
    /// gone.
    pub fn drain(&self) -> Vec<Envelope<ProducerMsg>> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Block until one message arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<Envelope<ProducerMsg>> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ChunkBuilder;

    fn chunk(index: u64) -> Chunk {
        let mut b = ChunkBuilder::new(index, 1);
        b.push(index as f32);
        b.seal()
    }

    #[test]
    fn delivery_is_ordered_and_tagged() {
        let (tx, rx) = channel();
        let mut sink = tx.for_generation(Generation(7));
        for i in 0..5 {
            sink.deliver(chunk(i)).unwrap();
        }

        let got = rx.drain();
        assert_eq!(got.len(), 5);
        for (i, env) in got.iter().enumerate() {
            assert_eq!(env.generation, Generation(7));
            match &env.payload {
                ProducerMsg::Chunk(c) => assert_eq!(c.index, i as u64),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn send_after_receiver_dropped_fails() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(matches!(
            tx.send(Generation(1), chunk(0)),
            Err(StreamError::TransportClosed)
        ));
    }

    #[test]
    fn transferred_bytes_are_shared_not_copied() {
        let (tx, rx) = channel();
        let c = chunk(0);
        let ptr = c.samples.as_ptr();
        tx.send(Generation(1), c).unwrap();

        let env = rx.drain().pop().unwrap();
        let ProducerMsg::Chunk(received) = env.payload else {
            panic!("expected chunk");
        };
        assert_eq!(received.samples.as_ptr(), ptr);
    }
}
