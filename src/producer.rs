//! SampleProducer – drives the physics stepper and packs samples into chunks.
//!
//! The producer owns the body for the whole session. [`SampleProducer::run`]
//! is a tight loop that only returns when it has to: credit is exhausted,
//! the terminal tick is reached, or the cancel flag was raised. Calling
//! `run` again after [`RunOutcome::Idle`] resumes exactly where it stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::error::Result;
use crate::protocol::{Chunk, ChunkBuilder, RunSummary};
use crate::types::{Body, GraphProperty, GraphSettings, SimConfig};

// ---------------------------------------------------------------------------
// Credit
// ---------------------------------------------------------------------------

/// Remaining chunks the producer may emit before it must idle.
///
/// Only [`Credit::reset`] raises it; that is driven exclusively by consumer
/// control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Credit(u32);

impl Credit {
    pub fn new(allowed: u32) -> Self {
        Credit(allowed)
    }

    pub fn remaining(&self) -> u32 {
        self.0
    }

    pub fn is_exhausted(&self) -> bool {
        self.0 == 0
    }

    /// Take one unit. Returns `false` (and leaves credit at zero) when none
    /// is left.
    pub fn try_consume(&mut self) -> bool {
        match self.0.checked_sub(1) {
            Some(rest) => {
                self.0 = rest;
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self, allowed: u32) {
        self.0 = allowed;
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Where sealed chunks go. The worker binds this to the transport; tests
/// collect into a `Vec`.
pub trait ChunkSink {
    fn deliver(&mut self, chunk: Chunk) -> Result<()>;
}

impl ChunkSink for Vec<Chunk> {
    fn deliver(&mut self, chunk: Chunk) -> Result<()> {
        self.push(chunk);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parameters & outcome
// ---------------------------------------------------------------------------

/// Settings latched when a session starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    pub property: GraphProperty,
    /// Physics ticks per recorded sample (>= 1).
    pub stride: u64,
    /// Samples per chunk (>= 1).
    pub capacity: usize,
    /// Integration step in seconds.
    pub dt: f64,
    pub gravity: f64,
    /// Terminal tick; `None` runs until cancelled.
    pub max_ticks: Option<u64>,
}

impl RunParams {
    pub fn from_config(config: &SimConfig, settings: GraphSettings) -> Self {
        Self {
            property: settings.property,
            stride: config.stride.max(1),
            capacity: config.buffer_size.max(1),
            dt: config.simulation_quality,
            gravity: config.gravity,
            max_ticks: config.max_ticks(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunOutcome {
    /// Credit ran out; call `run` again once credit is replenished.
    Idle,
    /// Terminal tick reached and every recorded sample was delivered.
    Completed(RunSummary),
    /// The cancel flag was raised. The partial chunk was discarded.
    Cancelled,
}

// ---------------------------------------------------------------------------
// SampleProducer
// ---------------------------------------------------------------------------

pub struct SampleProducer {
    body: Body,
    params: RunParams,
    builder: ChunkBuilder,
    tick: u64,
    samples: u64,
    chunks: u64,
    initial_energy: f64,
    error_sum: f64,
    summary: Option<RunSummary>,
}

impl SampleProducer {
    pub fn new(body: Body, params: RunParams) -> Self {
        let initial_energy = body.mechanical_energy(params.gravity);
        Self {
            builder: ChunkBuilder::new(0, params.capacity),
            body,
            params,
            tick: 0,
            samples: 0,
            chunks: 0,
            initial_energy,
            error_sum: 0.0,
            summary: None,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// Physics ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn samples_recorded(&self) -> u64 {
        self.samples
    }

    pub fn chunks_emitted(&self) -> u64 {
        self.chunks
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some()
    }

    /// Run until credit is exhausted, the terminal tick is reached, or
    /// `cancel` is raised.
    ///
    /// Credit is checked only on sample ticks, so with stride `S` the
    /// producer has executed exactly `N * S` ticks when it idles after `N`
    /// samples.
    pub fn run<S: ChunkSink>(
        &mut self,
        credit: &mut Credit,
        sink: &mut S,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunOutcome> {
        if let Some(summary) = self.summary {
            return Ok(RunOutcome::Completed(summary));
        }

        loop {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                debug!(
                    "Producer cancelled at tick {} ({} samples pending discarded)",
                    self.tick,
                    self.builder.len()
                );
                return Ok(RunOutcome::Cancelled);
            }

            if self.params.max_ticks.is_some_and(|max| self.tick >= max) {
                return self.finish(credit, sink);
            }

            let sample_tick = self.tick % self.params.stride == 0;
            if sample_tick && credit.is_exhausted() {
                return Ok(RunOutcome::Idle);
            }

            self.body.ensure_gravity(self.params.gravity);

            if sample_tick {
                let value = self.params.property.sample(&self.body);
                self.builder.push(value as f32);
                self.samples += 1;

                if self.builder.is_full() {
                    self.emit(credit, sink)?;
                }
            }

            self.body.step(self.params.dt);
            self.tick += 1;
            self.track_energy();
        }
    }

    fn emit<S: ChunkSink>(&mut self, credit: &mut Credit, sink: &mut S) -> Result<()> {
        let chunk = self.builder.seal();
        debug!(
            "Chunk {} sealed ({} samples, credit left {})",
            chunk.index,
            chunk.sample_count(),
            credit.remaining().saturating_sub(1)
        );
        sink.deliver(chunk)?;
        credit.try_consume();
        self.chunks += 1;
        Ok(())
    }

    /// Flush the partial chunk (needs one credit) and build the summary.
    fn finish<S: ChunkSink>(&mut self, credit: &mut Credit, sink: &mut S) -> Result<RunOutcome> {
        if !self.builder.is_empty() {
            if credit.is_exhausted() {
                return Ok(RunOutcome::Idle);
            }
            self.emit(credit, sink)?;
        }

        let summary = RunSummary {
            ticks: self.tick,
            samples: self.samples,
            chunks: self.chunks,
            error_average: if self.tick == 0 {
                0.0
            } else {
                self.error_sum / self.tick as f64
            },
            finished_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        };
        info!(
            "Producer complete: {} ticks, {} samples in {} chunks, energy error avg {:.3e}",
            summary.ticks, summary.samples, summary.chunks, summary.error_average
        );
        self.summary = Some(summary);
        Ok(RunOutcome::Completed(summary))
    }

    fn track_energy(&mut self) {
        let energy = self.body.mechanical_energy(self.params.gravity);
        let drift = (energy - self.initial_energy).abs();
        self.error_sum += if self.initial_energy.abs() > f64::EPSILON {
            drift / self.initial_energy.abs()
        } else {
            drift
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
