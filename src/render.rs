/// Render output - the thin end of the pipeline
/// A host calls Visualizer::draw each frame and paints whatever comes back

use std::time::{Duration, Instant};

use crate::animate::ColorFade;
use crate::color::Rgba;
use crate::engine::BAR_COUNT;

/// Color cross-fade duration when the paint color changes while visible
const COLOR_FADE: Duration = Duration::from_millis(800);

/// Everything needed to paint one frame of bars
///
/// Reads are best-effort/latest-value: a resize or color change landing
/// mid-frame shows up on the next tick, never as a crash.
#[derive(Clone, Copy, Debug)]
pub struct DrawFrame {
    /// One `(x0, y0, x1, y1)` line segment per bar; `y1` is the baseline
    pub segments: [[f32; 4]; BAR_COUNT],

    /// Stroke color, already normalized and translucent
    pub color: Rgba,

    /// Stroke width for every segment
    pub stroke_width: f32,

    /// Layer opacity from the lifecycle fade, 0.0..=1.0
    pub opacity: f32,
}

/// Current stroke paint, with an optional cross-fade in flight
pub struct PaintState {
    color: Rgba,
    fade: Option<ColorFade>,
}

impl PaintState {
    pub fn new(color: Rgba) -> Self {
        Self { color, fade: None }
    }

    /// The color a draw tick should use right now
    pub fn color_at(&self, now: Instant) -> Rgba {
        match &self.fade {
            Some(fade) => fade.color_at(now),
            None => self.color,
        }
    }

    /// The color the paint is heading toward (or already at)
    pub fn target(&self) -> Rgba {
        self.color
    }

    /// Set the color immediately, dropping any cross-fade
    ///
    /// Used while the visualizer is not attached - there is no point
    /// animating an invisible layer.
    pub fn set(&mut self, color: Rgba) {
        self.color = color;
        self.fade = None;
    }

    /// Cross-fade from the currently displayed color to `color`
    pub fn crossfade_to(&mut self, color: Rgba, now: Instant) {
        let from = self.color_at(now);
        self.fade = Some(ColorFade::new(from, color, COLOR_FADE, now));
        self.color = color;
    }
}

// ========== Tests ============
