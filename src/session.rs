//! Session – lifecycle, generation tagging, and consumer-side credit policy.
//!
//! A [`Session`] is an explicit context value: it owns the producer worker,
//! the receiving end of the transport, and the [`FrameStore`]. Nothing is
//! global, so several sessions can coexist.
//!
//! ## State machine
//!
//! ```text
//!  BeforeStart ──start()──► Running ──Complete(current gen)──► Ended
//!       ▲                      │                                 │
//!       └───────reset()────────┴──────────────reset()────────────┘
//! ```
//!
//! Resetting a `Running` session terminates its worker and spawns a fresh
//! one. Resetting an `Ended` session keeps the parked worker. Either way the
//! generation is bumped, so anything still in flight from the old session is
//! dropped by [`Session::pump`].

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::frame_store::FrameStore;
use crate::protocol::{Control, Generation, ProducerMsg, RunSummary};
use crate::transport::{self, ChunkReceiver, ChunkSender};
use crate::types::{Body, ConfigPatch, GraphSettings, SimConfig};
use crate::worker::{self, WorkerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    BeforeStart,
    Running,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub generation: u64,
    pub state: SessionState,
    pub chunks_received: usize,
    pub samples_received: u64,
    /// Messages discarded because they carried an old generation.
    pub stale_dropped: u64,
    pub workers_spawned: u64,
    pub workers_terminated: u64,
    pub summary: Option<RunSummary>,
}

/// Read-only view the render clock needs each tick.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackView<'a> {
    pub generation: Generation,
    pub state: SessionState,
    pub store: &'a FrameStore,
    /// Simulated seconds between consecutive samples.
    pub sample_period: f64,
}

pub struct Session {
    /// Latest configuration, including patches not yet latched.
    config: SimConfig,
    /// Configuration latched at the last `start`.
    run_config: SimConfig,
    settings: GraphSettings,
    state: SessionState,
    generation: Generation,
    store: FrameStore,
    sender: ChunkSender,
    receiver: ChunkReceiver,
    worker: Option<WorkerHandle>,
    /// Total chunks the producer has been allowed this session.
    granted: u64,
    summary: Option<RunSummary>,
    stale_dropped: u64,
    workers_spawned: u64,
    workers_terminated: u64,
}

impl Session {
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = transport::channel();
        let worker = worker::spawn(config.clone(), sender.clone())?;

        Ok(Self {
            store: FrameStore::new(config.buffer_size),
            run_config: config.clone(),
            config,
            settings: GraphSettings::default(),
            state: SessionState::BeforeStart,
            generation: Generation::default(),
            sender,
            receiver,
            worker: Some(worker),
            granted: 0,
            summary: None,
            stale_dropped: 0,
            workers_spawned: 1,
            workers_terminated: 0,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn run_config(&self) -> &SimConfig {
        &self.run_config
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn view(&self) -> PlaybackView<'_> {
        PlaybackView {
            generation: self.generation,
            state: self.state,
            store: &self.store,
            sample_period: self.run_config.sample_period(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            generation: self.generation.0,
            state: self.state,
            chunks_received: self.store.chunk_count(),
            samples_received: self.store.len_samples(),
            stale_dropped: self.stale_dropped,
            workers_spawned: self.workers_spawned,
            workers_terminated: self.workers_terminated,
            summary: self.summary,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Begin a new session. A session that is not in `BeforeStart` is reset
    /// first.
    pub fn start(&mut self, body: Body, settings: Option<GraphSettings>) -> Result<()> {
        if self.state != SessionState::BeforeStart {
            self.reset()?;
        }
        self.config.validate()?;

        if let Some(s) = settings {
            self.settings = s;
        }
        self.generation = self.generation.next();
        self.run_config = self.config.clone();
        self.store.reset(self.run_config.buffer_size);
        self.granted = u64::from(self.run_config.allowed_buffers);
        self.summary = None;

        self.worker()?.send(Control::Start {
            generation: self.generation,
            body,
            settings: Some(self.settings),
        })?;
        self.state = SessionState::Running;

        info!(
            "Session {} running ({:?}, {} samples/chunk, stride {}, credit {})",
            self.generation,
            self.settings.property,
            self.run_config.buffer_size,
            self.run_config.stride,
            self.run_config.allowed_buffers
        );
        Ok(())
    }

    /// Return to `BeforeStart`.
    ///
    /// The teardown always happens. An integrity violation found while
    /// draining the old session is returned afterwards.
    pub fn reset(&mut self) -> Result<()> {
        // A completion may already be queued; it decides whether the worker
        // can be reused.
        let drained = self.pump();

        if self.state == SessionState::Running {
            if let Some(old) = self.worker.take() {
                info!("Terminating producer of {}", self.generation);
                old.terminate();
                self.workers_terminated += 1;
            }
            self.worker = Some(worker::spawn(self.config.clone(), self.sender.clone())?);
            self.workers_spawned += 1;
        }

        self.generation = self.generation.next();
        self.store.reset(self.config.buffer_size);
        self.granted = 0;
        self.summary = None;
        self.state = SessionState::BeforeStart;
        drained.map(|_| ())
    }

    /// Stop the worker for good.
    pub fn shutdown(mut self) {
        if let Some(w) = self.worker.take() {
            w.terminate();
        }
    }

    // -----------------------------------------------------------------------
    // Consumer → producer
    // -----------------------------------------------------------------------

    /// Apply a partial configuration update. Empty patches are a no-op; a
    /// patch that would leave the configuration invalid is rejected whole.
    pub fn update_config(&mut self, patch: ConfigPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut updated = self.config.clone();
        updated.apply(&patch);
        updated.validate()?;

        self.worker()?.send(Control::Configure {
            generation: self.generation,
            patch,
        })?;
        self.config = updated;
        if let (Some(allowed), SessionState::Running) = (patch.allowed_buffers, self.state) {
            self.granted = self.store.chunk_count() as u64 + u64::from(allowed);
        }
        Ok(())
    }

    /// Replace the producer's remaining credit.
    pub fn grant_credit(&mut self, allowed_buffers: u32) -> Result<()> {
        if self.state != SessionState::Running {
            return Ok(());
        }
        self.worker()?.send(Control::Credit {
            generation: self.generation,
            allowed_buffers,
        })?;
        self.granted = self.store.chunk_count() as u64 + u64::from(allowed_buffers);
        debug!("Granted {} chunks to {}", allowed_buffers, self.generation);
        Ok(())
    }

    /// Keep `read_ahead` chunks requested beyond the playhead.
    ///
    /// Credit is only re-granted once every previously granted chunk has
    /// arrived, at which point the producer is idle with zero credit.
    pub fn maintain_read_ahead(&mut self, playhead_sample: u64) -> Result<()> {
        if self.state != SessionState::Running {
            return Ok(());
        }
        let received = self.store.chunk_count() as u64;
        if self.granted > received {
            return Ok(());
        }
        let playhead_chunk = playhead_sample / self.store.capacity() as u64;
        let read_ahead = self.run_config.read_ahead.max(1);
        if received.saturating_sub(playhead_chunk) < u64::from(read_ahead) {
            self.grant_credit(read_ahead)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Producer → consumer
    // -----------------------------------------------------------------------

    /// Drain the transport into the frame store.
    ///
    /// Returns the number of chunks accepted. The whole queue is drained even
    /// after an integrity violation, so a queued completion is still seen;
    /// the first violation is then returned and is fatal for the session.
    pub fn pump(&mut self) -> Result<usize> {
        let mut accepted = 0;
        let mut violation = None;

        for envelope in self.receiver.drain() {
            if envelope.generation != self.generation {
                self.stale_dropped += 1;
                debug!(
                    "Dropping message from {} (current {})",
                    envelope.generation, self.generation
                );
                continue;
            }

            match envelope.payload {
                ProducerMsg::Chunk(chunk) => {
                    let added = if self.state == SessionState::Running {
                        self.store.add_chunk(chunk)
                    } else {
                        Err(StreamError::Integrity {
                            expected: self.store.next_expected(),
                            received: chunk.index,
                        })
                    };
                    match added {
                        Ok(()) => accepted += 1,
                        Err(e) => {
                            error!(
                                "Session {} corrupted ({:?}): {}",
                                self.generation, self.state, e
                            );
                            violation.get_or_insert(e);
                        }
                    }
                }
                ProducerMsg::Complete(summary) => {
                    if self.state == SessionState::Running {
                        info!(
                            "Session {} ended: {} samples in {} chunks",
                            self.generation, summary.samples, summary.chunks
                        );
                        self.summary = Some(summary);
                        self.state = SessionState::Ended;
                    }
                }
            }
        }

        match violation {
            Some(e) => Err(e),
            None => Ok(accepted),
        }
    }

    fn worker(&self) -> Result<&WorkerHandle> {
        self.worker.as_ref().ok_or(StreamError::TransportClosed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Chunk, ChunkBuilder};

    /// Zero initial credit: the worker never emits, so every message seen by
    /// `pump` is one the test injected.
    fn quiet_session() -> Session {
        let config = SimConfig {
            buffer_size: 2,
            allowed_buffers: 0,
            sim_duration: 0.0,
            ..Default::default()
        };
        let mut s = Session::new(config).unwrap();
        s.start(Body::dropped_from(1.0), None).unwrap();
        s
    }

    fn chunk(index: u64) -> Chunk {
        let mut b = ChunkBuilder::new(index, 2);
        b.push(1.0);
        b.push(2.0);
        b.seal()
    }

    fn summary() -> RunSummary {
        RunSummary {
            ticks: 2,
            samples: 2,
            chunks: 1,
            error_average: 0.0,
            finished_at_ms: 0,
        }
    }

    #[test]
    fn stale_generation_is_dropped() {
        let mut s = quiet_session();
        let old = Generation(s.generation().0 - 1);
        s.sender.send(old, chunk(0)).unwrap();
        s.sender.complete(old, summary()).unwrap();

        assert_eq!(s.pump().unwrap(), 0);
        assert_eq!(s.stats().stale_dropped, 2);
        assert!(s.store().is_empty());
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn current_generation_is_accepted() {
        let mut s = quiet_session();
        let gen = s.generation();
        s.sender.send(gen, chunk(0)).unwrap();
        s.sender.send(gen, chunk(1)).unwrap();

        assert_eq!(s.pump().unwrap(), 2);
        assert_eq!(s.store().len_samples(), 4);
    }

    #[test]
    fn out_of_order_chunk_is_fatal() {
        let mut s = quiet_session();
        s.sender.send(s.generation(), chunk(1)).unwrap();

        assert!(matches!(
            s.pump(),
            Err(StreamError::Integrity {
                expected: 0,
                received: 1
            })
        ));
    }

    #[test]
    fn chunk_after_completion_is_fatal() {
        let mut s = quiet_session();
        let gen = s.generation();
        s.sender.send(gen, chunk(0)).unwrap();
        s.sender.complete(gen, summary()).unwrap();
        s.sender.send(gen, chunk(1)).unwrap();

        assert!(matches!(s.pump(), Err(StreamError::Integrity { .. })));
        assert_eq!(s.state(), SessionState::Ended);
        assert_eq!(s.summary(), Some(&summary()));
    }

    #[test]
    fn reset_reports_integrity_violation_and_sees_completion() {
        let mut s = quiet_session();
        let gen = s.generation();
        s.sender.send(gen, chunk(1)).unwrap();
        s.sender.complete(gen, summary()).unwrap();

        assert!(matches!(
            s.reset(),
            Err(StreamError::Integrity {
                expected: 0,
                received: 1
            })
        ));
        // the queued completion was still processed, so the worker is kept
        let stats = s.stats();
        assert_eq!(stats.workers_terminated, 0);
        assert_eq!(stats.workers_spawned, 1);
        assert_eq!(s.state(), SessionState::BeforeStart);
        assert!(s.generation() > gen);
        assert!(s.store().is_empty());
    }

    #[test]
    fn pump_drains_past_a_violation() {
        let mut s = quiet_session();
        let gen = s.generation();
        s.sender.send(gen, chunk(0)).unwrap();
        s.sender.send(gen, chunk(5)).unwrap();
        s.sender.send(gen, chunk(1)).unwrap();

        assert!(matches!(
            s.pump(),
            Err(StreamError::Integrity {
                expected: 1,
                received: 5
            })
        ));
        assert_eq!(s.store().chunk_count(), 2);
        assert!(s.receiver.is_empty());
    }

    #[test]
    fn invalid_patch_leaves_config_untouched() {
        let mut s = quiet_session();
        let before = s.config().clone();

        for patch in [
            ConfigPatch {
                buffer_size: Some(0),
                ..Default::default()
            },
            ConfigPatch {
                simulation_quality: Some(-0.5),
                allowed_buffers: Some(3),
                ..Default::default()
            },
            ConfigPatch {
                simulation_quality: Some(f64::NAN),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                s.update_config(patch),
                Err(StreamError::InvalidConfig(_))
            ));
            assert_eq!(s.config(), &before);
        }
        assert_eq!(s.granted, 0);
        assert!(s.start(Body::dropped_from(1.0), None).is_ok());
    }

    #[test]
    fn in_flight_chunks_are_dropped_after_reset() {
        let mut s = quiet_session();
        let before = s.generation();
        s.reset().unwrap();
        s.sender.send(before, chunk(0)).unwrap();

        assert_eq!(s.pump().unwrap(), 0);
        assert!(s.store().is_empty());
        assert_eq!(s.state(), SessionState::BeforeStart);
    }

    #[test]
    fn credit_is_ignored_outside_running() {
        let mut s = quiet_session();
        s.reset().unwrap();
        s.grant_credit(5).unwrap();
        s.maintain_read_ahead(0).unwrap();
        assert_eq!(s.granted, 0);
    }
}
