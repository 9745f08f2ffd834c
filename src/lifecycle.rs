/// Lifecycle state machine - folds the tracked playback/visibility signals
/// into the single displaying decision and drives the opacity fades
///
/// Two states: Hidden (initial) and Displaying. Showing starts an async
/// attach and a fade-in; hiding starts a fade-out whose completion is the
/// only thing allowed to trigger detach.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::animate::Tween;
use crate::color::{Artwork, Rgba};

/// Fade-in duration when the visualizer appears
const FADE_IN: Duration = Duration::from_millis(720);

/// Fade-out duration when it hides; detach waits for this to finish
const FADE_OUT: Duration = Duration::from_millis(600);

/// Everything the host and the core agree on about the visualizer
///
/// Owned by the core behind one mutex; `displaying` only ever changes
/// through [`Lifecycle::evaluate`].
#[derive(Clone)]
pub struct VisualizerState {
    /// Host says the media surface is showing (e.g. lockscreen up)
    pub visible: bool,

    /// Media session is actively playing
    pub playing: bool,

    /// Screen is on
    pub screen_on: bool,

    /// Device is in power-save mode (tracked; see display_condition)
    pub power_save_mode: bool,

    /// Surface is occluded by another layer (tracked; see display_condition)
    pub occluded: bool,

    /// The drawing surface itself is visible in the layout
    pub surface_visible: bool,

    /// True only while the capture source is meant to be attached
    pub displaying: bool,

    /// Current bar tint
    pub color: Rgba,

    /// Artwork the tint was derived from
    pub artwork: Option<Arc<Artwork>>,
}

impl Default for VisualizerState {
    fn default() -> Self {
        Self {
            visible: false,
            playing: false,
            screen_on: true,
            power_save_mode: false,
            occluded: false,
            surface_visible: true,
            displaying: false,
            color: Rgba::WHITE,
            artwork: None,
        }
    }
}

impl VisualizerState {
    /// The combined display condition
    ///
    /// Power-save and occlusion are tracked and re-evaluate this predicate
    /// whenever they change, but do not gate it - matching the original
    /// decision logic. Flagged in DESIGN.md as a product decision.
    pub fn display_condition(&self) -> bool {
        self.surface_visible && self.screen_on && self.visible && self.playing
    }
}

/// What the state machine wants done with the capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRequest {
    Attach,
    Detach,
    /// Detach once the deadline passes (the fade-out's completion time).
    /// The link worker honors this on its own, so hiding does not depend
    /// on the host continuing to tick.
    DetachAfter(Instant),
}

/// The Hidden/Displaying machine plus the layer opacity it animates
pub struct Lifecycle {
    opacity: Tween,
    pending_detach: bool,
}

impl Lifecycle {
    pub fn new(now: Instant) -> Self {
        Self {
            // Hidden is the initial state, so the layer starts transparent
            opacity: Tween::fixed(0.0, now),
            pending_detach: false,
        }
    }

    /// Re-run the display condition after a signal changed
    ///
    /// Returns the link request the caller must dispatch to the worker.
    /// Hiding never requests an immediate Detach - it schedules one for
    /// the fade-out's completion time, and [`tick`] can also fire it from
    /// a draw tick that lands past the deadline. Both routes stay strictly
    /// after the fade; the worker's detach is idempotent so whichever
    /// lands second is a no-op.
    pub fn evaluate(&mut self, state: &mut VisualizerState, now: Instant) -> Option<LinkRequest> {
        if state.display_condition() {
            if state.displaying {
                return None;
            }

            debug!("display condition met, showing visualizer");
            state.displaying = true;
            self.pending_detach = false;
            self.opacity.retarget(1.0, FADE_IN, now);
            Some(LinkRequest::Attach)
        } else {
            if !state.displaying {
                return None;
            }

            debug!("display condition lost, hiding visualizer");
            state.displaying = false;
            self.pending_detach = true;
            self.opacity.retarget(0.0, FADE_OUT, now);
            Some(LinkRequest::DetachAfter(now + FADE_OUT))
        }
    }

    /// Advance the machine to `now`; fires Detach exactly once when a
    /// fade-out has run to completion
    pub fn tick(&mut self, now: Instant) -> Option<LinkRequest> {
        if self.pending_detach && self.opacity.finished_at(now) {
            self.pending_detach = false;
            return Some(LinkRequest::Detach);
        }
        None
    }

    /// Current layer opacity
    pub fn opacity_at(&self, now: Instant) -> f32 {
        self.opacity.value_at(now)
    }
}

// ========== Tests ============
