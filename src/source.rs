/// Spectrum source adapter boundary and the background link worker
/// The worker thread owns the capture handle and is the only place attach
/// and detach ever run, so the two procedures serialize by construction

use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Capture size requested from the platform source (samples)
pub const CAPTURE_SIZE: usize = 64;

/// Attach attempt budget (transient configure failures retry within it)
const ATTACH_ATTEMPTS: u32 = 3;

/// Detach attempt budget; attempts are indexed from 1
const DETACH_ATTEMPTS: u32 = 3;

/// Callback invoked once per captured spectrum frame
///
/// The buffer is interleaved real/imaginary byte pairs; bytes 2..66 carry
/// the 32 frequency bins the bar engine consumes.
pub type FrameCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// The capture source could not be created at all
///
/// Fatal to the attach procedure - distinct from transient configuration
/// failures, which stay within the retry budget.
#[derive(Debug, Clone, Error)]
pub enum AcquireError {
    #[error("spectrum capture unavailable: {0}")]
    Unavailable(String),

    #[error("capture source is busy")]
    Busy,
}

/// Transient failures from an already-acquired source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("capture configuration rejected: {0}")]
    Configuration(String),

    #[error("enable/disable failed: {0}")]
    Enable(String),

    #[error("release failed: {0}")]
    Release(String),
}

/// An acquired frequency-capture source
///
/// The core only ever calls these from the link worker's attach and detach
/// procedures.
pub trait SpectrumSource: Send {
    /// Set capture size (samples) and capture rate (millihertz)
    fn configure(&mut self, capture_size: usize, rate_millihz: u32) -> Result<(), SourceError>;

    /// Register the per-frame data callback
    fn set_frame_callback(&mut self, callback: FrameCallback) -> Result<(), SourceError>;

    /// Start or stop capture
    fn set_enabled(&mut self, enabled: bool) -> Result<(), SourceError>;

    /// Release the underlying platform handle
    fn release(&mut self) -> Result<(), SourceError>;
}

/// Factory for capture sources (the platform side of the boundary)
pub trait SourceProvider: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn SpectrumSource>, AcquireError>;

    /// Fastest capture rate the platform supports, in millihertz
    fn max_capture_rate(&self) -> u32 {
        20_000
    }
}

// ==============================================================
// LINK WORKER
// ==============================================================

enum LinkCommand {
    Attach,
    Detach,
    /// Detach on the worker's own clock once the deadline passes, unless an
    /// Attach or Detach arrives first
    DetachAfter(Instant),
    Shutdown,
}

/// Background worker owning the capture source
///
/// Attach/detach requests are fire-and-forget from the caller's point of
/// view: the render thread never blocks on them, and attach is best-effort
/// (a visualizer that silently fails to appear beats one that crashes the
/// host).
pub struct LinkWorker {
    tx: Sender<LinkCommand>,
    attached: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl LinkWorker {
    pub fn spawn(provider: Arc<dyn SourceProvider>, callback: FrameCallback) -> Self {
        let (tx, rx) = unbounded();
        let attached = Arc::new(AtomicBool::new(false));
        let attached_worker = Arc::clone(&attached);

        let handle = thread::spawn(move || {
            let mut source: Option<Box<dyn SpectrumSource>> = None;
            let mut detach_at: Option<Instant> = None;

            loop {
                // With a deferred detach scheduled, wait for whichever comes
                // first: the next command or the deadline
                let command = match detach_at {
                    Some(deadline) => match rx.recv_deadline(deadline) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => {
                            detach_at = None;
                            run_detach(&mut source, &attached_worker);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    },
                    None => match rx.recv() {
                        Ok(command) => command,
                        Err(_) => break,
                    },
                };

                match command {
                    LinkCommand::Attach => {
                        // Re-showing cancels any scheduled detach
                        detach_at = None;
                        run_attach(&*provider, &callback, &mut source, &attached_worker);
                    }
                    LinkCommand::Detach => {
                        detach_at = None;
                        run_detach(&mut source, &attached_worker);
                    }
                    LinkCommand::DetachAfter(deadline) => {
                        detach_at = Some(deadline);
                    }
                    LinkCommand::Shutdown => {
                        run_detach(&mut source, &attached_worker);
                        break;
                    }
                }
            }
        });

        Self {
            tx,
            attached,
            handle: Some(handle),
        }
    }

    /// Whether a capture source is currently attached and enabled
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Relaxed)
    }

    /// Shared handle to the attached flag (read by the render path)
    pub fn attached_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.attached)
    }

    pub fn request_attach(&self) {
        // A send failure means the worker is already gone; nothing to do
        let _ = self.tx.send(LinkCommand::Attach);
    }

    pub fn request_detach(&self) {
        let _ = self.tx.send(LinkCommand::Detach);
    }

    /// Schedule a detach for `deadline`; a later attach request cancels it
    pub fn request_detach_after(&self, deadline: Instant) {
        let _ = self.tx.send(LinkCommand::DetachAfter(deadline));
    }
}

impl Drop for LinkWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(LinkCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Attach procedure: acquire, configure, enable - up to 3 attempts
///
/// Acquisition failure aborts the whole procedure (the platform said no,
/// asking again will not help). Transient configuration failures throw the
/// acquired handle away and retry with a fresh one. Exhausting the budget
/// gives up silently; nothing is surfaced to the caller.
pub(crate) fn run_attach(
    provider: &dyn SourceProvider,
    callback: &FrameCallback,
    source: &mut Option<Box<dyn SpectrumSource>>,
    attached: &AtomicBool,
) {
    if source.is_some() {
        debug!("attach requested but source already linked");
        return;
    }

    for attempt in 0..ATTACH_ATTEMPTS {
        let mut candidate = match provider.acquire() {
            Ok(src) => src,
            Err(e) => {
                error!("error acquiring capture source: {}", e);
                return;
            }
        };

        match configure_source(&mut *candidate, provider.max_capture_rate(), callback) {
            Ok(()) => {
                *source = Some(candidate);
                attached.store(true, Ordering::Relaxed);
                debug!("capture source linked (attempt {})", attempt);
                return;
            }
            Err(e) => {
                warn!("link failed, retry {}: {}", attempt, e);
            }
        }
    }

    debug!("attach budget exhausted, giving up");
}

/// The configuration sequence for a freshly acquired source
///
/// Disabled first, then sized, then wired, then enabled last - a source
/// must not deliver frames before its callback is in place.
fn configure_source(
    source: &mut dyn SpectrumSource,
    rate_millihz: u32,
    callback: &FrameCallback,
) -> Result<(), SourceError> {
    source.set_enabled(false)?;
    source.configure(CAPTURE_SIZE, rate_millihz)?;
    source.set_frame_callback(Arc::clone(callback))?;
    source.set_enabled(true)
}

/// Detach procedure: disable and release, attempts indexed 1..=3
///
/// A missing source makes this a no-op, which is what lets destroy() and
/// the fade-out continuation both call it without coordination. The handle
/// reference is cleared even when every attempt failed, so nothing dangles.
pub(crate) fn run_detach(source: &mut Option<Box<dyn SpectrumSource>>, attached: &AtomicBool) {
    if source.is_some() {
        for attempt in 1..=DETACH_ATTEMPTS {
            let src = match source.as_mut() {
                Some(src) => src,
                None => break,
            };

            let result = src.set_enabled(false).and_then(|_| src.release());
            match result {
                Ok(()) => {
                    debug!("capture source released");
                    break;
                }
                Err(e) => {
                    warn!("unlink failed, retry {}: {}", attempt, e);
                }
            }
        }
    }

    *source = None;
    attached.store(false, Ordering::Relaxed);
}

// ==============================================================
// TEST FAKES
// ==============================================================


// ========== Tests ============

#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;

    fn noop_callback() -> FrameCallback {
        Arc::new(|_frame: &[u8]| {})
    }

    #[test]
    fn test_attach_succeeds_first_try() {
        let provider = FakeProvider::new();
        let attached = AtomicBool::new(false);
        let mut source = None;

        run_attach(&provider, &noop_callback(), &mut source, &attached);

        assert!(source.is_some());
        assert!(attached.load(Ordering::Relaxed));

        let stats = provider.stats.lock().unwrap();
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.configures, 1);
        // Disabled before configuration, enabled last
        assert_eq!(stats.enables, vec![false, true]);
    }

    #[test]
    fn test_attach_retries_transient_failures() {
        // Configure fails twice; the third attempt succeeds
        let provider = FakeProvider::failing_configures(2);
        let attached = AtomicBool::new(false);
        let mut source = None;

        run_attach(&provider, &noop_callback(), &mut source, &attached);

        assert!(source.is_some());
        assert!(attached.load(Ordering::Relaxed));
        // Every retry acquires a fresh source
        assert_eq!(provider.stats.lock().unwrap().acquires, 3);
    }

    #[test]
    fn test_attach_gives_up_after_budget() {
        let provider = FakeProvider::failing_configures(99);
        let attached = AtomicBool::new(false);
        let mut source = None;

        run_attach(&provider, &noop_callback(), &mut source, &attached);

        // Best-effort: no panic, no error surfaced, just not attached
        assert!(source.is_none());
        assert!(!attached.load(Ordering::Relaxed));
        assert_eq!(provider.stats.lock().unwrap().acquires, 3);
    }

    #[test]
    fn test_acquire_failure_aborts_without_retry() {
        let provider = FakeProvider::new();
        *provider.acquire_failures.lock().unwrap() = 1;
        let attached = AtomicBool::new(false);
        let mut source = None;

        run_attach(&provider, &noop_callback(), &mut source, &attached);

        // Acquisition failure is fatal to the procedure - exactly one try
        assert!(source.is_none());
        assert_eq!(provider.stats.lock().unwrap().acquires, 1);
    }

    #[test]
    fn test_attach_is_idempotent_when_linked() {
        let provider = FakeProvider::new();
        let attached = AtomicBool::new(false);
        let mut source = None;

        run_attach(&provider, &noop_callback(), &mut source, &attached);
        run_attach(&provider, &noop_callback(), &mut source, &attached);

        assert_eq!(provider.stats.lock().unwrap().acquires, 1);
    }

    #[test]
    fn test_detach_releases_and_clears() {
        let provider = FakeProvider::new();
        let attached = AtomicBool::new(false);
        let mut source = None;
        run_attach(&provider, &noop_callback(), &mut source, &attached);

        run_detach(&mut source, &attached);

        assert!(source.is_none());
        assert!(!attached.load(Ordering::Relaxed));

        let stats = provider.stats.lock().unwrap();
        assert_eq!(stats.releases, 1);
        // Disabled before release
        assert_eq!(stats.enables.last(), Some(&false));
    }

    #[test]
    fn test_detach_clears_reference_even_when_release_fails() {
        let provider = FakeProvider::new();
        *provider.release_failures.lock().unwrap() = 99;
        let attached = AtomicBool::new(false);
        let mut source = None;
        run_attach(&provider, &noop_callback(), &mut source, &attached);

        run_detach(&mut source, &attached);

        // All attempts failed, but the handle must not dangle
        assert!(source.is_none());
        assert!(!attached.load(Ordering::Relaxed));
        assert_eq!(provider.stats.lock().unwrap().releases, 0);
    }

    #[test]
    fn test_detach_without_source_is_noop() {
        let attached = AtomicBool::new(false);
        let mut source: Option<Box<dyn SpectrumSource>> = None;

        // Must not panic or flip anything
        run_detach(&mut source, &attached);
        assert!(source.is_none());
    }

    /// Poll the worker until `condition` holds or two seconds pass
    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + std::time::Duration::from_secs(2);
        while !condition() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn test_worker_attach_detach_round_trip() {
        super::testing::init_tracing();
        let provider = Arc::new(FakeProvider::new());
        let stats = Arc::clone(&provider.stats);

        let worker = LinkWorker::spawn(provider, noop_callback());
        worker.request_attach();
        assert!(wait_for(|| worker.is_attached()));

        worker.request_detach();
        assert!(wait_for(|| !worker.is_attached()));

        drop(worker);
        let stats = stats.lock().unwrap();
        assert_eq!(stats.acquires, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_worker_deferred_detach_fires_on_its_own() {
        super::testing::init_tracing();
        let provider = Arc::new(FakeProvider::new());
        let stats = Arc::clone(&provider.stats);

        let worker = LinkWorker::spawn(provider, noop_callback());
        worker.request_attach();
        assert!(wait_for(|| worker.is_attached()));

        // Schedule a detach 120ms out and then send nothing else; the
        // worker must execute it from its own clock
        worker.request_detach_after(Instant::now() + std::time::Duration::from_millis(120));

        thread::sleep(std::time::Duration::from_millis(40));
        assert!(worker.is_attached(), "detached before the deadline");

        assert!(wait_for(|| !worker.is_attached()));
        assert_eq!(stats.lock().unwrap().releases, 1);
    }

    #[test]
    fn test_worker_attach_cancels_scheduled_detach() {
        super::testing::init_tracing();
        let provider = Arc::new(FakeProvider::new());
        let stats = Arc::clone(&provider.stats);

        let worker = LinkWorker::spawn(provider, noop_callback());
        worker.request_attach();
        assert!(wait_for(|| worker.is_attached()));

        worker.request_detach_after(Instant::now() + std::time::Duration::from_millis(80));
        worker.request_attach();

        // Well past the cancelled deadline the source is still linked
        thread::sleep(std::time::Duration::from_millis(200));
        assert!(worker.is_attached());
        let stats = stats.lock().unwrap();
        assert_eq!(stats.releases, 0);
        // The cancelling attach saw the existing link and did not re-acquire
        assert_eq!(stats.acquires, 1);
    }
}
