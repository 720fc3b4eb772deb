//! Core simulation types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Basic math
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn scaled(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::fmt::Display for Vec2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// A physical point mass.
///
/// Owned by the producer for the duration of a session; only
/// [`Body::step`](crate::physics) mutates its kinematic state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Forces currently applied. Summed each step.
    #[serde(default)]
    pub forces: Vec<Vec2>,
    pub mass: f64,
}

impl Body {
    pub fn new(position: Vec2, velocity: Vec2, mass: f64) -> Self {
        Self {
            position,
            velocity,
            forces: Vec::new(),
            mass,
        }
    }

    /// Unit mass dropped from rest at `height`.
    pub fn dropped_from(height: f64) -> Self {
        Self::new(Vec2::new(0.0, height), Vec2::zero(), 1.0)
    }
}

// ---------------------------------------------------------------------------
// Graph settings
// ---------------------------------------------------------------------------

/// Which scalar the producer samples each recorded tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphProperty {
    /// Signed vertical position.
    #[default]
    PositionY,
    /// Absolute vertical velocity.
    SpeedY,
}

impl GraphProperty {
    pub fn sample(self, body: &Body) -> f64 {
        match self {
            GraphProperty::PositionY => body.position.y,
            GraphProperty::SpeedY => body.velocity.y.abs(),
        }
    }
}

impl std::str::FromStr for GraphProperty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position_y" | "position" | "y" => Ok(GraphProperty::PositionY),
            "speed_y" | "speed" | "vy" => Ok(GraphProperty::SpeedY),
            other => Err(format!("unknown graph property '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct GraphSettings {
    pub property: GraphProperty,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Physics integration step in seconds.
    pub simulation_quality: f64,
    /// Chunk capacity in samples.
    pub buffer_size: usize,
    /// Chunks the producer may emit before it must wait for more credit.
    pub allowed_buffers: u32,
    /// Physics ticks per recorded sample.
    pub stride: u64,
    /// Downward acceleration applied when the body carries no forces.
    pub gravity: f64,
    /// Simulated seconds before the producer completes on its own.
    pub sim_duration: f64,
    /// Chunks the consumer keeps requested ahead of the playhead.
    pub read_ahead: u32,
    /// Simulated seconds per wall-clock second.
    pub playback_rate: f64,
    /// Upper bound on viewport scale, in pixels per unit.
    pub zoom_cap: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulation_quality: 0.001,
            buffer_size: 1024,
            allowed_buffers: 4,
            stride: 10,
            gravity: 9.81,
            sim_duration: 20.0,
            read_ahead: 4,
            playback_rate: 1.0,
            zoom_cap: 400.0,
        }
    }
}

impl SimConfig {
    /// Simulated seconds between two recorded samples.
    pub fn sample_period(&self) -> f64 {
        self.simulation_quality * self.stride as f64
    }

    /// Tick cap derived from `sim_duration`; `None` when the duration is
    /// not a positive finite number (the producer then never completes).
    pub fn max_ticks(&self) -> Option<u64> {
        if self.sim_duration.is_finite() && self.sim_duration > 0.0 {
            Some((self.sim_duration / self.simulation_quality).round() as u64)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), crate::StreamError> {
        use crate::StreamError::InvalidConfig;

        if !(self.simulation_quality.is_finite() && self.simulation_quality > 0.0) {
            return Err(InvalidConfig(format!(
                "simulation_quality must be positive, got {}",
                self.simulation_quality
            )));
        }
        if self.buffer_size == 0 {
            return Err(InvalidConfig("buffer_size must be at least 1".into()));
        }
        if self.stride == 0 {
            return Err(InvalidConfig("stride must be at least 1".into()));
        }
        if !(self.zoom_cap.is_finite() && self.zoom_cap > 0.0) {
            return Err(InvalidConfig(format!(
                "zoom_cap must be positive, got {}",
                self.zoom_cap
            )));
        }
        Ok(())
    }

    /// Apply a partial update. Absent fields keep their current value.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(q) = patch.simulation_quality {
            self.simulation_quality = q;
        }
        if let Some(b) = patch.buffer_size {
            self.buffer_size = b;
        }
        if let Some(c) = patch.allowed_buffers {
            self.allowed_buffers = c;
        }
    }
}

/// Partial configuration update carried by a control message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buffers: Option<u32>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.simulation_quality.is_none()
            && self.buffer_size.is_none()
            && self.allowed_buffers.is_none()
    }
}
