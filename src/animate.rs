/// Clock-driven value interpolation
/// One Tween per bar channel, plus the opacity fade and color cross-fade
/// used by the lifecycle and paint paths
///
/// Everything here is sampled with an explicit Instant instead of reading
/// the wall clock internally, so the render loop passes one timestamp per
/// tick and tests can use synthetic time.

use std::time::{Duration, Instant};

use crate::color::Rgba;

/// A single linear interpolation channel
///
/// At most one interpolation is in flight per tween: retargeting samples
/// the current value first and restarts from there, so an old segment never
/// keeps mutating the output after a new target is set.
#[derive(Clone, Copy, Debug)]
pub struct Tween {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
    active: bool,
}

impl Tween {
    /// A tween holding a fixed value (no interpolation in flight)
    pub fn fixed(value: f32, now: Instant) -> Self {
        Self {
            from: value,
            to: value,
            start: now,
            duration: Duration::ZERO,
            active: false,
        }
    }

    /// Sample the interpolated value at `now`
    pub fn value_at(&self, now: Instant) -> f32 {
        if !self.active {
            return self.to;
        }

        let elapsed = now.saturating_duration_since(self.start);
        if elapsed >= self.duration || self.duration.is_zero() {
            return self.to;
        }

        let t = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.from + (self.to - self.from) * t
    }

    /// Cancel the in-flight interpolation, freezing at the current value
    pub fn cancel(&mut self, now: Instant) {
        let held = self.value_at(now);
        self.from = held;
        self.to = held;
        self.active = false;
    }

    /// Replace any in-flight interpolation with a new one from the
    /// *current* value to `to`
    pub fn retarget(&mut self, to: f32, duration: Duration, now: Instant) {
        // Cancel first - the new segment starts from wherever the old one
        // actually got to, not from the old target
        self.cancel(now);

        self.from = self.to;
        self.to = to;
        self.start = now;
        self.duration = duration;
        self.active = true;
    }

    /// Snap to a fixed value, dropping any in-flight interpolation
    pub fn set(&mut self, value: f32) {
        self.from = value;
        self.to = value;
        self.active = false;
    }

    /// Whether the interpolation has run to completion at `now`
    pub fn finished_at(&self, now: Instant) -> bool {
        !self.active || now.saturating_duration_since(self.start) >= self.duration
    }

    /// The value this tween is heading toward
    pub fn target(&self) -> f32 {
        self.to
    }
}

/// Timed cross-fade between two paint colors
#[derive(Clone, Copy, Debug)]
pub struct ColorFade {
    from: Rgba,
    to: Rgba,
    start: Instant,
    duration: Duration,
}

impl ColorFade {
    pub fn new(from: Rgba, to: Rgba, duration: Duration, now: Instant) -> Self {
        Self {
            from,
            to,
            start: now,
            duration,
        }
    }

    /// Sample the blended color at `now`
    pub fn color_at(&self, now: Instant) -> Rgba {
        let elapsed = now.saturating_duration_since(self.start);
        if elapsed >= self.duration || self.duration.is_zero() {
            return self.to;
        }

        let t = elapsed.as_secs_f32() / self.duration.as_secs_f32();
        self.from.lerp(self.to, t)
    }

    pub fn finished_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.duration
    }

    pub fn target(&self) -> Rgba {
        self.to
    }
}

// ========== Tests ============
