/// The visualizer facade - inbound setters, the draw tick, and teardown
///
/// This struct is shared between:
///  - the host's UI/render thread (setters, resize, draw)
///  - the link worker (attach/detach of the capture source)
///  - the capture callback (per-frame filtering into the bar engine)
///  - the color extractor's completion (arbitrary thread)

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use crate::color::{normalize_tint, Artwork, ColorExtractor, Rgba};
use crate::engine::BarEngine;
use crate::filter::FilterCurve;
use crate::lifecycle::{Lifecycle, LinkRequest, VisualizerState};
use crate::render::{DrawFrame, PaintState};
use crate::source::{FrameCallback, LinkWorker, SourceProvider};

/// Tunable presentation settings
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Noise-suppression curve applied to every captured bin
    pub curve: FilterCurve,
}

/// State shared with the background workers and callbacks
struct Shared {
    /// Terminal liveness flag: once false, every operation is a no-op.
    /// This is irreversible teardown, not a pause.
    alive: AtomicBool,

    curve: FilterCurve,
    state: Mutex<VisualizerState>,
    engine: Mutex<BarEngine>,
    lifecycle: Mutex<Lifecycle>,
    paint: Mutex<PaintState>,

    /// Guards the per-frame filtering. try_lock only: a frame arriving
    /// while the previous one is still being filtered is dropped whole.
    filter_gate: Mutex<()>,

    /// Bumped on every artwork change so stale extraction completions
    /// can tell they lost the race
    artwork_epoch: AtomicU64,
}

/// Media-synced spectrum bar visualizer core
pub struct Visualizer {
    shared: Arc<Shared>,
    worker: LinkWorker,
    extractor: Arc<dyn ColorExtractor>,
}

impl Visualizer {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        extractor: Arc<dyn ColorExtractor>,
        config: VisualizerConfig,
    ) -> Self {
        let now = Instant::now();
        let state = VisualizerState::default();
        let paint = PaintState::new(state.color);

        let shared = Arc::new(Shared {
            alive: AtomicBool::new(true),
            curve: config.curve,
            state: Mutex::new(state),
            engine: Mutex::new(BarEngine::new(now)),
            lifecycle: Mutex::new(Lifecycle::new(now)),
            paint: Mutex::new(paint),
            filter_gate: Mutex::new(()),
            artwork_epoch: AtomicU64::new(0),
        });

        let shared_cb = Arc::clone(&shared);
        let callback: FrameCallback = Arc::new(move |frame: &[u8]| {
            if !shared_cb.alive.load(Ordering::Relaxed) {
                return;
            }

            // Drop-on-contention backpressure: no queueing of frames
            let Ok(_gate) = shared_cb.filter_gate.try_lock() else {
                return;
            };

            let now = Instant::now();
            let mut engine = shared_cb.engine.lock().unwrap();
            if let Err(e) = engine.apply_frame(frame, &shared_cb.curve, now) {
                debug!("spectrum frame skipped: {}", e);
            }
        });

        let worker = LinkWorker::spawn(provider, callback);

        Self {
            shared,
            worker,
            extractor,
        }
    }

    // ==============================================================
    // INBOUND SETTERS
    // ==============================================================

    pub fn set_visible(&self, visible: bool) {
        self.update_signal(|state| {
            if state.visible == visible {
                return false;
            }
            state.visible = visible;
            true
        });
    }

    pub fn set_playing(&self, playing: bool) {
        self.update_signal(|state| {
            if state.playing == playing {
                return false;
            }
            state.playing = playing;
            true
        });
    }

    pub fn set_power_save_mode(&self, power_save: bool) {
        self.update_signal(|state| {
            if state.power_save_mode == power_save {
                return false;
            }
            state.power_save_mode = power_save;
            true
        });
    }

    pub fn set_occluded(&self, occluded: bool) {
        self.update_signal(|state| {
            if state.occluded == occluded {
                return false;
            }
            state.occluded = occluded;
            true
        });
    }

    pub fn notify_screen_on(&self, screen_on: bool) {
        self.update_signal(|state| {
            if state.screen_on == screen_on {
                return false;
            }
            state.screen_on = screen_on;
            true
        });
    }

    pub fn notify_surface_visibility_changed(&self, surface_visible: bool) {
        self.update_signal(|state| {
            if state.surface_visible == surface_visible {
                return false;
            }
            state.surface_visible = surface_visible;
            true
        });
    }

    /// Recompute bar geometry for a new surface size
    pub fn on_surface_resized(&self, width: f32, height: f32) {
        if !self.alive() {
            return;
        }
        self.shared.engine.lock().unwrap().resize(width, height);
    }

    // ==============================================================
    // ARTWORK / COLOR PATH
    // ==============================================================

    /// Swap the artwork the bar tint derives from
    ///
    /// An unchanged artwork (same allocation) is a no-op. Absent artwork
    /// resets the tint to white immediately.
    pub fn set_artwork(&self, artwork: Option<Arc<Artwork>>) {
        if !self.alive() {
            return;
        }

        {
            let mut state = self.shared.state.lock().unwrap();
            let unchanged = match (&state.artwork, &artwork) {
                (Some(current), Some(new)) => Arc::ptr_eq(current, new),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }
            state.artwork = artwork.clone();
        }

        match artwork {
            Some(art) => self.request_extraction(art),
            None => {
                // Invalidate any in-flight extraction for the old artwork
                self.shared.artwork_epoch.fetch_add(1, Ordering::Relaxed);
                apply_tint(
                    &self.shared,
                    &self.worker.attached_flag(),
                    None,
                    Instant::now(),
                );
            }
        }
    }

    /// Re-derive the tint from the current artwork (or re-apply the state
    /// color when there is none)
    pub fn refresh_color(&self) {
        if !self.alive() {
            return;
        }

        let artwork = self.shared.state.lock().unwrap().artwork.clone();
        match artwork {
            Some(art) => self.request_extraction(art),
            None => {
                let color = self.shared.state.lock().unwrap().color;
                apply_tint(
                    &self.shared,
                    &self.worker.attached_flag(),
                    Some(color),
                    Instant::now(),
                );
            }
        }
    }

    fn request_extraction(&self, artwork: Arc<Artwork>) {
        let epoch = self.shared.artwork_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let shared = Arc::clone(&self.shared);
        let attached = self.worker.attached_flag();

        self.extractor.extract(
            artwork,
            Box::new(move |swatches| {
                // Extraction may complete long after the artwork changed
                // again or the core was torn down
                if !shared.alive.load(Ordering::Relaxed) {
                    return;
                }
                if shared.artwork_epoch.load(Ordering::Relaxed) != epoch {
                    debug!("dropping stale color extraction result");
                    return;
                }

                let resolved = swatches.and_then(|s| s.pick());
                apply_tint(&shared, &attached, resolved, Instant::now());
            }),
        );
    }

    // ==============================================================
    // DRAW TICK
    // ==============================================================

    /// Produce the current frame, or None while hidden/destroyed
    ///
    /// Also advances the lifecycle. The detach that follows a completed
    /// fade-out is already scheduled with the worker when the fade starts,
    /// so a host that stops ticking after hiding still detaches; a tick
    /// that lands past the fade just dispatches it sooner.
    pub fn draw(&self, now: Instant) -> Option<DrawFrame> {
        if !self.alive() {
            return None;
        }

        let request = self.shared.lifecycle.lock().unwrap().tick(now);
        self.dispatch(request);

        if !self.worker.is_attached() {
            return None;
        }

        let (segments, stroke_width) = {
            let engine = self.shared.engine.lock().unwrap();
            (engine.segments_at(now), engine.stroke_width())
        };

        Some(DrawFrame {
            segments,
            color: self.shared.paint.lock().unwrap().color_at(now),
            stroke_width,
            opacity: self.shared.lifecycle.lock().unwrap().opacity_at(now),
        })
    }

    /// Whether the capture source is currently attached
    pub fn is_attached(&self) -> bool {
        self.worker.is_attached()
    }

    /// Snapshot of the shared state (host-facing)
    pub fn state(&self) -> VisualizerState {
        self.shared.state.lock().unwrap().clone()
    }

    // ==============================================================
    // TEARDOWN
    // ==============================================================

    /// Irreversible teardown; calling it twice is the same as once
    ///
    /// Every later operation - setters, frame callbacks, draws, pending
    /// extraction completions - becomes a guaranteed no-op.
    pub fn destroy(&self) {
        if !self.shared.alive.swap(false, Ordering::Relaxed) {
            return;
        }

        debug!("visualizer destroyed");
        if let Ok(mut state) = self.shared.state.lock() {
            state.displaying = false;
        }
        self.worker.request_detach();
    }

    // ==============================================================
    // INTERNALS
    // ==============================================================

    fn alive(&self) -> bool {
        self.shared.alive.load(Ordering::Relaxed)
    }

    /// Apply a signal change and re-run the display condition
    ///
    /// `apply` returns false when the signal did not actually change, in
    /// which case nothing is re-evaluated.
    fn update_signal(&self, apply: impl FnOnce(&mut VisualizerState) -> bool) {
        if !self.alive() {
            return;
        }

        let request = {
            let mut state = self.shared.state.lock().unwrap();
            if !apply(&mut state) {
                return;
            }
            let mut lifecycle = self.shared.lifecycle.lock().unwrap();
            lifecycle.evaluate(&mut state, Instant::now())
        };

        self.dispatch(request);
    }

    fn dispatch(&self, request: Option<LinkRequest>) {
        match request {
            Some(LinkRequest::Attach) => self.worker.request_attach(),
            Some(LinkRequest::Detach) => self.worker.request_detach(),
            Some(LinkRequest::DetachAfter(deadline)) => {
                self.worker.request_detach_after(deadline)
            }
            None => {}
        }
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        self.destroy();
        // LinkWorker's Drop shuts the worker thread down and releases the
        // source if one is still attached
    }
}

/// Normalize a resolved color and swap it into the paint
///
/// Cross-fades over 800 units while the visualizer is attached; sets
/// immediately otherwise.
fn apply_tint(shared: &Shared, attached: &AtomicBool, resolved: Option<Rgba>, now: Instant) {
    if !shared.alive.load(Ordering::Relaxed) {
        return;
    }

    let tint = normalize_tint(resolved);

    let mut state = shared.state.lock().unwrap();
    if state.color == tint {
        return;
    }
    state.color = tint;

    let mut paint = shared.paint.lock().unwrap();
    if attached.load(Ordering::Relaxed) {
        paint.crossfade_to(tint, now);
    } else {
        paint.set(tint);
    }
}

// ========== Tests ============
