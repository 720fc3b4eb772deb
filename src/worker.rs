//! Producer worker – background thread hosting the [`SampleProducer`].
//!
//! ```text
//! Session (render thread)          │  bounce-producer thread
//! ──────────────────────────────── │ ────────────────────────────────
//! WorkerHandle::send(Control)  ──► │ control_rx.recv()
//!                                  │   Start     → new SampleProducer
//!                                  │   Configure → patch config / credit
//!                                  │   Credit    → reset credit
//!                                  │ SampleProducer::run()
//! ChunkReceiver::drain()       ◄── │   → ChunkSender (generation-tagged)
//! ```
//!
//! The thread blocks on its control channel whenever it has nothing to
//! compute (between sessions, or out of credit). While the producer runs it
//! only polls the cancel flag; control messages are handled once it idles.
//! A completed worker stays parked and is reused by the next `Start`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::producer::{Credit, RunOutcome, RunParams, SampleProducer};
use crate::protocol::{Control, Generation};
use crate::transport::ChunkSender;
use crate::types::{GraphSettings, SimConfig};

// ---------------------------------------------------------------------------
// Handle (given to the session)
// ---------------------------------------------------------------------------

/// Owned by the [`Session`](crate::session::Session).
pub struct WorkerHandle {
    control: Sender<Control>,
    cancel: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, msg: Control) -> Result<()> {
        self.control
            .send(msg)
            .map_err(|_| StreamError::TransportClosed)
    }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker immediately and wait for its thread to exit.
    ///
    /// Whatever the producer had not yet sent is discarded.
    pub fn terminate(mut self) {
        self.signal_stop();
        if let Some(t) = self.thread.take() {
            if t.join().is_err() {
                warn!("Producer worker panicked before termination");
            }
        }
    }

    fn signal_stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        let _ = self.control.send(Control::Shutdown);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.signal_stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Spawning the worker thread
// ---------------------------------------------------------------------------

/// Spawn a producer worker that posts into `data`.
pub fn spawn(config: SimConfig, data: ChunkSender) -> Result<WorkerHandle> {
    let (control_tx, control_rx) = crossbeam_channel::unbounded::<Control>();
    let cancel = Arc::new(AtomicBool::new(false));

    let worker_cancel = cancel.clone();
    let handle = thread::Builder::new()
        .name("bounce-producer".into())
        .spawn(move || run_worker(config, control_rx, data, worker_cancel))?;

    Ok(WorkerHandle {
        control: control_tx,
        cancel,
        thread: Some(handle),
    })
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run_worker(
    mut config: SimConfig,
    control: Receiver<Control>,
    data: ChunkSender,
    cancel: Arc<AtomicBool>,
) {
    let mut settings = GraphSettings::default();
    let mut active: Option<(Generation, SampleProducer)> = None;
    let mut credit = Credit::default();
    let mut runnable = false;

    debug!("[worker] started");

    'outer: loop {
        // Block only when there is nothing to compute.
        let first = if runnable {
            None
        } else {
            match control.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            }
        };

        for msg in first.into_iter().chain(control.try_iter()) {
            match msg {
                Control::Start {
                    generation,
                    body,
                    settings: new_settings,
                } => {
                    if let Some(s) = new_settings {
                        settings = s;
                    }
                    let params = RunParams::from_config(&config, settings);
                    debug!("[worker] {} starting with {:?}", generation, params);
                    credit.reset(config.allowed_buffers);
                    active = Some((generation, SampleProducer::new(body, params)));
                    runnable = true;
                }
                Control::Configure { generation, patch } => {
                    config.apply(&patch);
                    match (patch.allowed_buffers, &active) {
                        (Some(allowed), Some((current, _))) if *current == generation => {
                            credit.reset(allowed);
                            runnable = true;
                        }
                        (Some(_), Some(_)) => {
                            debug!("[worker] ignoring credit patch for stale {}", generation)
                        }
                        _ => {}
                    }
                }
                Control::Credit {
                    generation,
                    allowed_buffers,
                } => match &active {
                    Some((current, _)) if *current == generation => {
                        credit.reset(allowed_buffers);
                        runnable = true;
                    }
                    _ => debug!("[worker] ignoring credit for stale {}", generation),
                },
                Control::Shutdown => break 'outer,
            }
        }

        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let Some((generation, producer)) = active.as_mut() else {
            runnable = false;
            continue;
        };
        let generation = *generation;

        let outcome = producer.run(
            &mut credit,
            &mut data.for_generation(generation),
            Some(&cancel),
        );

        match outcome {
            Ok(RunOutcome::Idle) => runnable = false,
            Ok(RunOutcome::Completed(summary)) => {
                if data.complete(generation, summary).is_err() {
                    break;
                }
                active = None;
                runnable = false;
            }
            Ok(RunOutcome::Cancelled) => break,
            Err(e) => {
                warn!("[worker] {} stopped: {}", generation, e);
                break;
            }
        }
    }

    info!("[worker] exiting");
}
