//! RenderClock – keeps playback in step with data as it arrives.
//!
//! Each display tick the clock works out which sample the current elapsed
//! simulation time needs, walks the [`FrameStore`] from sample 0 up to it,
//! and draws the line. If any of those samples is still pending the clock
//! **freezes**: elapsed time does not move this tick. Playback therefore
//! slows down when the producer is slow instead of skipping data.
//!
//! [`FrameStore`]: crate::frame_store::FrameStore

use std::time::Instant;

use crate::frame_store::Frame;
use crate::protocol::Generation;
use crate::session::{PlaybackView, SessionState};
use crate::viewport::{ScreenPoint, Viewport};

/// Drawing surface. Pixel-level rendering lives behind this trait.
pub trait Canvas {
    fn clear(&mut self);
    fn axes(&mut self, viewport: &Viewport);
    fn polyline(&mut self, points: &[ScreenPoint]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Samples drawn this tick.
    pub drawn: u64,
    /// Whether elapsed time moved forward.
    pub advanced: bool,
    /// Elapsed simulation time after this tick, in seconds.
    pub elapsed: f64,
    /// Highest sample index the clock needed this tick.
    pub playhead: u64,
    /// Session ended and every received sample has been played.
    pub finished: bool,
}

pub struct RenderClock {
    /// Session the playhead belongs to.
    generation: Option<Generation>,
    elapsed: f64,
    last: Option<Instant>,
    playback_rate: f64,
    max_y: f64,
    viewport: Viewport,
    raw: Vec<(f64, f64)>,
    screen: Vec<ScreenPoint>,
}

impl RenderClock {
    pub fn new(viewport: Viewport, playback_rate: f64) -> Self {
        Self {
            generation: None,
            elapsed: 0.0,
            last: None,
            playback_rate,
            max_y: 0.0,
            viewport,
            raw: Vec::new(),
            screen: Vec::new(),
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Back to the start of playback.
    pub fn rewind(&mut self) {
        self.elapsed = 0.0;
        self.last = None;
        self.max_y = 0.0;
        self.viewport.reset();
    }

    pub fn tick<C: Canvas>(
        &mut self,
        now: Instant,
        view: PlaybackView<'_>,
        canvas: &mut C,
    ) -> TickReport {
        // A restart can go Running -> Running between two ticks.
        if self.generation != Some(view.generation) {
            self.generation = Some(view.generation);
            self.rewind();
        }

        if view.state == SessionState::BeforeStart {
            self.rewind();
            canvas.clear();
            canvas.axes(&self.viewport);
            return TickReport {
                drawn: 0,
                advanced: false,
                elapsed: 0.0,
                playhead: 0,
                finished: false,
            };
        }

        let period = view.sample_period;
        let playhead = if period > 0.0 {
            (self.elapsed / period).floor() as u64
        } else {
            0
        };

        self.raw.clear();
        let mut complete = true;
        for i in 0..=playhead {
            match view.store.sample(i) {
                Frame::Available(v) => {
                    let v = f64::from(v);
                    self.max_y = self.max_y.max(v);
                    self.raw.push((i as f64 * period, v));
                }
                Frame::Pending => {
                    complete = false;
                    break;
                }
            }
        }

        self.viewport.fit(self.elapsed, self.max_y);
        self.screen.clear();
        let viewport = &self.viewport;
        self.screen
            .extend(self.raw.iter().map(|&(x, y)| viewport.to_screen(x, y)));

        canvas.clear();
        canvas.axes(&self.viewport);
        canvas.polyline(&self.screen);

        let advanced = match self.last {
            Some(prev) if complete => {
                let wall = now.saturating_duration_since(prev).as_secs_f64();
                self.elapsed += wall * self.playback_rate;
                true
            }
            _ => false,
        };
        self.last = Some(now);

        let drawn = self.raw.len() as u64;
        TickReport {
            drawn,
            advanced,
            elapsed: self.elapsed,
            playhead,
            finished: view.state == SessionState::Ended
                && !complete
                && drawn == view.store.len_samples(),
        }
    }
}
