//! Physics stepper: semi-implicit Euler with an ideal floor at `y = 0`.

use crate::types::{Body, Vec2};

impl Body {
    pub fn apply_force(&mut self, force: Vec2) {
        self.forces.push(force);
    }

    pub fn clear_forces(&mut self) {
        self.forces.clear();
    }

    pub fn has_forces(&self) -> bool {
        !self.forces.is_empty()
    }

    pub fn net_force(&self) -> Vec2 {
        self.forces.iter().fold(Vec2::zero(), |acc, f| acc + *f)
    }

    /// Apply the standing weight `mass * g` (downward) unless some force is
    /// already set.
    pub fn ensure_gravity(&mut self, g: f64) {
        if !self.has_forces() {
            self.apply_force(Vec2::new(0.0, -self.mass * g));
        }
    }

    /// Kinetic plus gravitational potential energy relative to the floor.
    pub fn mechanical_energy(&self, g: f64) -> f64 {
        let v2 = self.velocity.x * self.velocity.x + self.velocity.y * self.velocity.y;
        0.5 * self.mass * v2 + self.mass * g * self.position.y
    }

    /// Advance the body by `dt` seconds.
    ///
    /// Velocity is integrated first and the updated velocity drives the
    /// position update. Reaching or crossing the floor reflects the vertical
    /// velocity and pins the body to `y = 0`.
    pub fn step(&mut self, dt: f64) {
        let accel = self.net_force().scaled(1.0 / self.mass);
        self.velocity += accel.scaled(dt);
        self.position += self.velocity.scaled(dt);

        // TODO: apply a restitution coefficient once energy loss is configurable.
        if self.position.y <= 0.0 {
            self.velocity.y = -self.velocity.y;
            self.position.y = 0.0;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
