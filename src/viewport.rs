//! Auto-scaling viewport: (simulated time, sample value) → screen pixels.
//!
//! The visible range only ever grows during a session. Scale is clamped to
//! `zoom_cap` so early, tiny ranges are not blown up without bound.

use serde::{Deserialize, Serialize};

/// Screen-space point. `y` grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Horizontal room reserved per character of a Y-axis label.
const LABEL_CHAR_WIDTH: f64 = 7.0;
const BASE_MARGIN: f64 = 12.0;
/// Room below the X axis for tick labels.
const BOTTOM_MARGIN: f64 = 24.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    width: f64,
    height: f64,
    zoom_cap: f64,
    /// Largest X / Y fitted so far.
    range_x: f64,
    range_y: f64,
    scale_x: f64,
    scale_y: f64,
    origin: ScreenPoint,
}

impl Viewport {
    pub fn new(width: f64, height: f64, zoom_cap: f64) -> Self {
        let mut v = Self {
            width,
            height,
            zoom_cap,
            range_x: 0.0,
            range_y: 0.0,
            scale_x: zoom_cap,
            scale_y: zoom_cap,
            origin: ScreenPoint::default(),
        };
        v.reposition();
        v
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn zoom_cap(&self) -> f64 {
        self.zoom_cap
    }

    /// `(pixels per second, pixels per value unit)`.
    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    /// Largest `(x, y)` currently guaranteed to be on screen.
    pub fn visible_range(&self) -> (f64, f64) {
        (self.range_x, self.range_y)
    }

    /// Screen position of the data origin `(0, 0)`.
    pub fn origin(&self) -> ScreenPoint {
        self.origin
    }

    /// Grow the visible range to include `max_x` / `max_y` and recompute
    /// scale and origin.
    pub fn fit(&mut self, max_x: f64, max_y: f64) {
        if max_x.is_finite() {
            self.range_x = self.range_x.max(max_x);
        }
        if max_y.is_finite() {
            self.range_y = self.range_y.max(max_y.abs());
        }
        self.reposition();
    }

    pub fn reset(&mut self) {
        self.range_x = 0.0;
        self.range_y = 0.0;
        self.reposition();
    }

    pub fn to_screen(&self, x: f64, y: f64) -> ScreenPoint {
        ScreenPoint {
            x: self.origin.x + x * self.scale_x,
            y: self.origin.y - y * self.scale_y,
        }
    }

    fn reposition(&mut self) {
        // Y labels are printed with one decimal, left of the axis.
        let label = format!("{:.1}", self.range_y);
        let left = BASE_MARGIN + LABEL_CHAR_WIDTH * label.len() as f64;
        self.origin = ScreenPoint {
            x: left,
            y: self.height - BOTTOM_MARGIN,
        };

        let plot_w = (self.width - left - BASE_MARGIN).max(1.0);
        let plot_h = (self.height - BOTTOM_MARGIN - BASE_MARGIN).max(1.0);
        self.scale_x = capped_scale(plot_w, self.range_x, self.zoom_cap);
        self.scale_y = capped_scale(plot_h, self.range_y, self.zoom_cap);
    }
}

fn capped_scale(pixels: f64, range: f64, cap: f64) -> f64 {
    if range > 0.0 {
        (pixels / range).min(cap)
    } else {
        cap
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
