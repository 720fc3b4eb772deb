//! bounce-stream binary
//!
//! Runs one simulation session headless: the producer worker streams chunks
//! while a display-rate loop pumps them into the frame store and drives the
//! render clock against a logging canvas.
//!
//! ## Configuration (env / TOML via `config` crate, overridden by flags)
//!
//! | Key                       | Default  | Description                         |
//! |---------------------------|----------|-------------------------------------|
//! | `BOUNCE_SIMULATION_QUALITY` | `0.001`| Physics step (seconds)              |
//! | `BOUNCE_BUFFER_SIZE`      | `1024`   | Samples per chunk                   |
//! | `BOUNCE_ALLOWED_BUFFERS`  | `4`      | Initial credit (chunks)             |
//! | `BOUNCE_STRIDE`           | `10`     | Physics ticks per sample            |
//! | `BOUNCE_SIM_DURATION`     | `20`     | Simulated seconds before completion |
//! | `BOUNCE_PLAYBACK_RATE`    | `1`      | Simulated seconds per wall second   |

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bounce_stream::{
    config, Body, Canvas, GraphProperty, GraphSettings, RenderClock, ScreenPoint, Session,
    SimConfig, Viewport,
};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{info, warn};

const CANVAS_WIDTH: f64 = 800.0;
const CANVAS_HEIGHT: f64 = 600.0;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "bounce-stream", about = "Streaming bouncing-body graph", version)]
struct Args {
    /// Optional config file (TOML, JSON or YAML)
    #[arg(long, env = "BOUNCE_CONFIG")]
    config: Option<PathBuf>,

    /// Physics step in seconds
    #[arg(long)]
    quality: Option<f64>,

    /// Samples per chunk
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Initial credit, in chunks
    #[arg(long)]
    allowed_buffers: Option<u32>,

    /// Physics ticks per recorded sample
    #[arg(long)]
    stride: Option<u64>,

    /// Simulated seconds before the producer completes
    #[arg(long)]
    duration: Option<f64>,

    /// Sampled quantity: position_y | speed_y
    #[arg(long, default_value = "position_y")]
    property: GraphProperty,

    /// Drop height in metres
    #[arg(long, default_value_t = 1.0)]
    height: f64,

    /// Display refresh rate (Hz)
    #[arg(long, default_value_t = 60.0)]
    fps: f64,
}

impl Args {
    fn apply(&self, config: &mut SimConfig) {
        if let Some(q) = self.quality {
            config.simulation_quality = q;
        }
        if let Some(b) = self.buffer_size {
            config.buffer_size = b;
        }
        if let Some(c) = self.allowed_buffers {
            config.allowed_buffers = c;
        }
        if let Some(s) = self.stride {
            config.stride = s;
        }
        if let Some(d) = self.duration {
            config.sim_duration = d;
        }
    }
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// Logs what would be drawn, at most once per second.
struct LogCanvas {
    last_report: Instant,
    axes_range: (f64, f64),
    points: usize,
    tail: Option<ScreenPoint>,
}

impl LogCanvas {
    fn new() -> Self {
        Self {
            last_report: Instant::now(),
            axes_range: (0.0, 0.0),
            points: 0,
            tail: None,
        }
    }

    fn report(&mut self) {
        if self.last_report.elapsed() < Duration::from_secs(1) {
            return;
        }
        self.last_report = Instant::now();
        info!(
            "frame: {} points, visible range t≤{:.2}s y≤{:.3}, pen at {:?}",
            self.points, self.axes_range.0, self.axes_range.1, self.tail
        );
    }
}

impl Canvas for LogCanvas {
    fn clear(&mut self) {
        self.points = 0;
        self.tail = None;
    }

    fn axes(&mut self, viewport: &Viewport) {
        self.axes_range = viewport.visible_range();
    }

    fn polyline(&mut self, points: &[ScreenPoint]) {
        self.points = points.len();
        self.tail = points.last().copied();
        self.report();
    }
}

// ---------------------------------------------------------------------------
// Render loop
// ---------------------------------------------------------------------------

async fn render_loop(session: Arc<Mutex<Session>>, fps: f64) -> Result<()> {
    let (zoom_cap, playback_rate) = {
        let s = session.lock();
        (s.config().zoom_cap, s.config().playback_rate)
    };
    let mut clock = RenderClock::new(
        Viewport::new(CANVAS_WIDTH, CANVAS_HEIGHT, zoom_cap),
        playback_rate,
    );
    let mut canvas = LogCanvas::new();
    let mut timer = tokio::time::interval(Duration::from_secs_f64(1.0 / fps.max(1.0)));

    loop {
        timer.tick().await;

        // Hold the lock only for this frame.
        let report = {
            let mut s = session.lock();
            s.pump().context("Producer stream corrupted")?;
            let report = clock.tick(Instant::now(), s.view(), &mut canvas);
            s.maintain_read_ahead(report.playhead)
                .context("Failed to grant producer credit")?;
            report
        };

        if report.finished {
            info!(
                "Playback finished at t={:.3}s ({} samples drawn)",
                report.elapsed, report.drawn
            );
            return Ok(());
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bounce_stream=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut sim_config =
        config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut sim_config);

    info!(
        "Starting bounce-stream (dt={}s, stride={}, {} samples/chunk, credit={})",
        sim_config.simulation_quality,
        sim_config.stride,
        sim_config.buffer_size,
        sim_config.allowed_buffers,
    );

    let session = Arc::new(Mutex::new(
        Session::new(sim_config).context("Failed to create session")?,
    ));
    session
        .lock()
        .start(
            Body::dropped_from(args.height),
            Some(GraphSettings {
                property: args.property,
            }),
        )
        .context("Failed to start session")?;

    // Periodic status line
    let status_session = session.clone();
    let status = tokio::spawn(async move {
        let mut timer = tokio::time::interval(Duration::from_secs(5));
        loop {
            timer.tick().await;
            let stats = status_session.lock().stats();
            match serde_json::to_string(&stats) {
                Ok(line) => info!("stats {}", line),
                Err(e) => warn!("Failed to serialise stats: {}", e),
            }
        }
    });

    let mut render = tokio::spawn(render_loop(session.clone(), args.fps));

    let finished = tokio::select! {
        res = &mut render => Some(res.context("Render loop panicked").and_then(|r| r)),
        _ = tokio::signal::ctrl_c() => {
            info!("bounce-stream shutting down (SIGINT)");
            None
        }
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => {
            stop_task(render).await;
            Ok(())
        }
    };

    stop_task(status).await;
    match Arc::try_unwrap(session) {
        Ok(session) => session.into_inner().shutdown(),
        Err(_) => warn!("Session still shared at exit; producer worker not joined"),
    }
    outcome
}

/// Abort `task` and wait until it has dropped everything it captured.
async fn stop_task<T>(task: tokio::task::JoinHandle<T>) {
    task.abort();
    let _ = task.await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
