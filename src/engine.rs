/// Bar animation engine - 32 independent interpolation channels plus the
/// line-segment geometry the renderer consumes
///
/// Frame capture and drawing are decoupled: each captured frame retargets
/// the channels, and the render loop samples whatever the interpolations
/// are worth at its own tick rate.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::animate::Tween;
use crate::filter::FilterCurve;

/// Number of bars (one per captured frequency bin)
pub const BAR_COUNT: usize = 32;

/// How long each bar takes to reach a freshly captured target
const RETARGET_DURATION: Duration = Duration::from_millis(92);

/// Shortest spectrum frame the engine accepts: two header bytes plus one
/// real/imaginary pair per bin
pub const MIN_FRAME_LEN: usize = BAR_COUNT * 2 + 2;

/// A frame that could not be turned into bar heights; the whole update is
/// skipped and the next frame proceeds normally
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("spectrum frame too short: {len} bytes, need at least {MIN_FRAME_LEN}")]
    TooShort { len: usize },
}

/// One bar's animation state
///
/// The tween's value is the bar's top endpoint (`y0`) in surface
/// coordinates; the baseline `y1` stays pinned to the surface height.
struct BarChannel {
    index: usize,
    tween: Tween,
    base_y: f32,
}

/// Owns the per-bar channels and the geometry derived from surface size
pub struct BarEngine {
    channels: Vec<BarChannel>,

    /// Horizontal center of each bar (both segment endpoints share it)
    centers: [f32; BAR_COUNT],

    /// Stroke width for every bar, derived from surface width
    stroke_width: f32,

    surface_width: f32,
    surface_height: f32,
}

impl BarEngine {
    pub fn new(now: Instant) -> Self {
        let channels = (0..BAR_COUNT)
            .map(|index| BarChannel {
                index,
                tween: Tween::fixed(0.0, now),
                base_y: 0.0,
            })
            .collect();

        Self {
            channels,
            centers: [0.0; BAR_COUNT],
            stroke_width: 0.0,
            surface_width: 0.0,
            surface_height: 0.0,
        }
    }

    /// Recompute geometry for a new surface size
    ///
    /// The bar unit starts as an even 1/32 split, the stroke takes 8/9 of
    /// it, and the unit is then stretched by 32/31 of the remaining gap so
    /// 32 bars plus 31 gaps span the surface exactly (the last bar lands
    /// flush with the right edge).
    ///
    /// Every bar snaps back to the baseline; in-flight interpolations from
    /// the old geometry are dropped rather than carried across.
    pub fn resize(&mut self, width: f32, height: f32) {
        let unit = width / BAR_COUNT as f32;
        let bar_width = unit * 8.0 / 9.0;
        let unit = bar_width + (unit - bar_width) * BAR_COUNT as f32 / (BAR_COUNT - 1) as f32;

        self.stroke_width = bar_width;
        self.surface_width = width;
        self.surface_height = height;

        for channel in &mut self.channels {
            self.centers[channel.index] = channel.index as f32 * unit + bar_width / 2.0;
            channel.base_y = height;
            channel.tween.set(height);
        }
    }

    /// Ingest one captured spectrum frame, retargeting every channel
    ///
    /// Each channel's new interpolation starts from its *current rendered
    /// value*, not the old target, and replaces any interpolation still in
    /// flight.
    pub fn apply_frame(
        &mut self,
        frame: &[u8],
        curve: &FilterCurve,
        now: Instant,
    ) -> Result<(), FrameError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: frame.len() });
        }

        for channel in &mut self.channels {
            let re = frame[channel.index * 2 + 2] as i8;
            let im = frame[channel.index * 2 + 3] as i8;

            let target = channel.base_y - curve.bar_delta(re, im);
            channel.tween.retarget(target, RETARGET_DURATION, now);
        }

        Ok(())
    }

    /// Current line segments, one `(x0, y0, x1, y1)` per bar
    pub fn segments_at(&self, now: Instant) -> [[f32; 4]; BAR_COUNT] {
        let mut segments = [[0.0; 4]; BAR_COUNT];
        for channel in &self.channels {
            let x = self.centers[channel.index];
            segments[channel.index] = [x, channel.tween.value_at(now), x, channel.base_y];
        }
        segments
    }

    pub fn stroke_width(&self) -> f32 {
        self.stroke_width
    }

    pub fn surface_size(&self) -> (f32, f32) {
        (self.surface_width, self.surface_height)
    }
}

// ========== Tests ============

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_bin(index: usize, re: i8, im: i8) -> Vec<u8> {
        let mut frame = vec![0u8; MIN_FRAME_LEN];
        frame[index * 2 + 2] = re as u8;
        frame[index * 2 + 3] = im as u8;
        frame
    }

    #[test]
    fn test_geometry_spans_surface_exactly() {
        for width in [320.0_f32, 1080.0, 1440.0, 333.0] {
            let mut engine = BarEngine::new(Instant::now());
            engine.resize(width, 200.0);

            let bar_width = engine.stroke_width();
            let segments = engine.segments_at(Instant::now());

            // Gap between adjacent bar centers, minus the stroke itself
            let gap = (segments[1][0] - segments[0][0]) - bar_width;

            // 32 strokes plus 31 gaps must cover the width exactly
            let total = BAR_COUNT as f32 * bar_width + (BAR_COUNT - 1) as f32 * gap;
            assert!(
                (total - width).abs() < 1e-3,
                "width {}: bars span {} instead",
                width,
                total
            );

            // The last bar's right edge is flush with the surface edge
            let last_right = segments[BAR_COUNT - 1][0] + bar_width / 2.0;
            assert!((last_right - width).abs() < 1e-3);

            // And the first bar's left edge sits at zero
            let first_left = segments[0][0] - bar_width / 2.0;
            assert!(first_left.abs() < 1e-3);
        }
    }

    #[test]
    fn test_resize_pins_bars_to_baseline() {
        let now = Instant::now();
        let mut engine = BarEngine::new(now);
        engine.resize(640.0, 480.0);

        for segment in engine.segments_at(now) {
            assert_eq!(segment[1], 480.0);
            assert_eq!(segment[3], 480.0);
        }
    }

    #[test]
    fn test_frame_raises_bar_toward_target() {
        let now = Instant::now();
        let mut engine = BarEngine::new(now);
        engine.resize(640.0, 480.0);

        let curve = FilterCurve::default();
        let frame = frame_with_bin(5, 100, 100);
        engine.apply_frame(&frame, &curve, now).unwrap();

        // After the full retarget duration the bar sits at baseline minus
        // the filtered height delta
        let done = now + RETARGET_DURATION;
        let expected = 480.0 - curve.bar_delta(100, 100);
        let segments = engine.segments_at(done);
        assert!((segments[5][1] - expected).abs() < 1e-3);

        // Baseline endpoint never moves
        assert_eq!(segments[5][3], 480.0);

        // Midway through, the bar is strictly between baseline and target
        let mid = engine.segments_at(now + RETARGET_DURATION / 2)[5][1];
        assert!(mid > expected && mid < 480.0);
    }

    #[test]
    fn test_new_frame_replaces_inflight_interpolation() {
        let now = Instant::now();
        let mut engine = BarEngine::new(now);
        engine.resize(640.0, 480.0);
        let curve = FilterCurve::default();

        // First frame drives bin 0 up
        engine
            .apply_frame(&frame_with_bin(0, 120, 120), &curve, now)
            .unwrap();

        // Halfway through, a silent frame arrives. The new interpolation
        // must start from the current rendered position, not the old target.
        let mid = now + RETARGET_DURATION / 2;
        let rendered_mid = engine.segments_at(mid)[0][1];
        engine
            .apply_frame(&vec![0u8; MIN_FRAME_LEN], &curve, mid)
            .unwrap();

        let restart = engine.segments_at(mid)[0][1];
        assert!((restart - rendered_mid).abs() < 1e-3);

        // And it heads back toward the silence target from there
        let silence_target = 480.0 - curve.bar_delta(0, 0);
        let settled = engine.segments_at(mid + RETARGET_DURATION)[0][1];
        assert!((settled - silence_target).abs() < 1e-3);
    }

    #[test]
    fn test_short_frame_skipped_entirely() {
        let now = Instant::now();
        let mut engine = BarEngine::new(now);
        engine.resize(640.0, 480.0);
        let curve = FilterCurve::default();

        engine
            .apply_frame(&frame_with_bin(3, 90, 90), &curve, now)
            .unwrap();
        let before = engine.segments_at(now + RETARGET_DURATION);

        // A truncated frame is rejected without touching any channel
        let result = engine.apply_frame(&[0u8; 10], &curve, now + RETARGET_DURATION);
        assert!(matches!(result, Err(FrameError::TooShort { len: 10 })));

        let after = engine.segments_at(now + RETARGET_DURATION);
        assert_eq!(before, after);
    }

    #[test]
    fn test_short_frame_error_names_required_length() {
        let message = FrameError::TooShort { len: 10 }.to_string();
        assert_eq!(
            message,
            format!("spectrum frame too short: 10 bytes, need at least {MIN_FRAME_LEN}")
        );
    }

    #[test]
    fn test_signed_bin_bytes() {
        let now = Instant::now();
        let mut engine = BarEngine::new(now);
        engine.resize(640.0, 480.0);
        let curve = FilterCurve::default();

        // Negative components carry the same energy as positive ones
        engine
            .apply_frame(&frame_with_bin(0, -100, -100), &curve, now)
            .unwrap();
        let negative = engine.segments_at(now + RETARGET_DURATION)[0][1];

        engine.resize(640.0, 480.0);
        engine
            .apply_frame(&frame_with_bin(0, 100, 100), &curve, now)
            .unwrap();
        let positive = engine.segments_at(now + RETARGET_DURATION)[0][1];

        assert!((negative - positive).abs() < 1e-3);
    }
}
