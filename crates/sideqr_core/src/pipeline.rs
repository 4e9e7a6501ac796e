//! Scanner pipeline wiring.
//!
//! [`ScannerPipeline`] is what a UI layer talks to. It owns:
//! - the frame mailbox and the [`DecodeWorker`] draining it
//! - a dispatcher thread that owns the [`ResultReconciler`] and applies
//!   decode batches one at a time, so every reconciliation and its view
//!   publish happen as one unit on one thread
//! - the overlay compositor used for outgoing display frames
//!
//! ```text
//! frame_in ──┬── overlay ── FrameSink::frame_out
//!            └── mailbox ── DecodeWorker ── channel ── dispatcher
//!                                                      ├── VisibleCodesView
//!                                                      └── on_new_codes
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};

use crate::config::Settings;
use crate::decode::SymbolDecoder;
use crate::error::{ScanError, ScanResult};
use crate::frame::{FrameMailbox, PixelBuffer};
use crate::overlay::OverlayCompositor;
use crate::reconcile::{ResultReconciler, TrackedCode};
use crate::view::{call_listener, VisibleCodesView};
use crate::worker::{DecodeBatch, DecodeWorker};

/// Receiver of annotated display frames.
pub trait FrameSink: Send + Sync {
    /// Accept one outgoing frame.
    fn frame_out(&self, frame: PixelBuffer);
}

impl<F> FrameSink for F
where
    F: Fn(PixelBuffer) + Send + Sync,
{
    fn frame_out(&self, frame: PixelBuffer) {
        self(frame)
    }
}

/// Callback receiving codes seen for the first time.
pub type NewCodesCallback = Box<dyn Fn(&[TrackedCode]) + Send + Sync>;

type Listeners = Arc<RwLock<Vec<Arc<NewCodesCallback>>>>;

/// Runtime-adjustable settings shared with the dispatcher.
struct Controls {
    highlight: AtomicBool,
    debounce_nanos: AtomicU64,
}

impl Controls {
    fn new(highlight: bool, debounce: Duration) -> Self {
        Self {
            highlight: AtomicBool::new(highlight),
            debounce_nanos: AtomicU64::new(saturating_nanos(debounce)),
        }
    }

    fn set_debounce(&self, debounce: Duration) {
        self.debounce_nanos.store(saturating_nanos(debounce), Ordering::SeqCst);
    }

    fn debounce(&self) -> Duration {
        Duration::from_nanos(self.debounce_nanos.load(Ordering::SeqCst))
    }
}

/// Nanoseconds in `duration`, capped at `u64::MAX` (about 584 years).
fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    invalid: AtomicU64,
    dropped: AtomicU64,
    reconciled: AtomicU64,
}

/// Point-in-time pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames passed to `frame_in`.
    pub frames_received: u64,
    /// Zero-area frames ignored by `frame_in` or the worker.
    pub frames_skipped: u64,
    /// Frames overwritten in the mailbox before the worker took them.
    pub frames_dropped: u64,
    /// Frames the decoder processed successfully.
    pub frames_decoded: u64,
    /// Frames whose decode returned an error or panicked.
    pub decode_failures: u64,
    /// Decode batches applied by the reconciler.
    pub batches_reconciled: u64,
}

/// Live QR scanning pipeline.
///
/// All methods take `&self`; the pipeline can be shared behind an `Arc`
/// between the frame-arrival thread and the UI thread. Dropping it stops
/// the worker and dispatcher threads.
pub struct ScannerPipeline {
    mailbox: Arc<FrameMailbox>,
    worker: DecodeWorker,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    view: VisibleCodesView,
    controls: Arc<Controls>,
    compositor: OverlayCompositor,
    sink: RwLock<Option<Arc<dyn FrameSink>>>,
    listeners: Listeners,
    counters: Arc<Counters>,
}

impl ScannerPipeline {
    /// Start a pipeline around `decoder`.
    ///
    /// Spawns the decode worker and the result dispatcher. Settings are
    /// sanitized first, so zero durations fall back to defaults.
    pub fn new<D>(decoder: D, settings: &Settings) -> ScanResult<Self>
    where
        D: SymbolDecoder + 'static,
    {
        let mut settings = settings.clone();
        for field in settings.sanitize() {
            tracing::warn!("[Pipeline] Invalid setting '{}', using default", field);
        }

        let controls = Arc::new(Controls::new(
            settings.overlay.highlight_enabled,
            settings.scanner.debounce_period(),
        ));
        // Reconciler and overlay must agree on the capped value
        let debounce = controls.debounce();
        let view = VisibleCodesView::new();
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));
        let counters = Arc::new(Counters::default());

        let (tx, rx) = crossbeam_channel::unbounded();
        let mailbox = Arc::new(FrameMailbox::new());
        let worker = DecodeWorker::spawn(
            decoder,
            Arc::clone(&mailbox),
            tx,
            settings.scanner.idle_poll(),
        )?;

        let dispatcher = {
            let reconciler = ResultReconciler::new(debounce, view.clone());
            let controls = Arc::clone(&controls);
            let listeners = Arc::clone(&listeners);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("sideqr-dispatch".to_string())
                .spawn(move || dispatch_loop(rx, reconciler, controls, listeners, counters))
                .map_err(|source| ScanError::SpawnFailed {
                    thread: "dispatch",
                    source,
                })?
        };

        tracing::info!(
            "[Pipeline] Started (decoder '{}', debounce {:?}, highlight {})",
            worker.decoder_name(),
            debounce,
            settings.overlay.highlight_enabled
        );

        Ok(Self {
            mailbox,
            worker,
            dispatcher: Mutex::new(Some(dispatcher)),
            view,
            controls,
            compositor: OverlayCompositor::new(settings.overlay.style()),
            sink: RwLock::new(None),
            listeners,
            counters,
        })
    }

    /// Accept one incoming video frame.
    ///
    /// Renders the overlay for the attached sink (if any) and hands the
    /// frame to the decode worker. Never blocks on decoding; if the worker
    /// is busy, the previous pending frame is replaced. Zero-area frames are
    /// ignored.
    pub fn frame_in(&self, frame: PixelBuffer) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        if frame.is_degenerate() {
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "[Pipeline] Ignoring {}x{} frame",
                frame.width(),
                frame.height()
            );
            return;
        }

        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.frame_out(self.render(&frame, Instant::now()));
        }

        if self.mailbox.put(frame) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Annotate `frame` with the current visible codes as of `now`.
    pub fn render(&self, frame: &PixelBuffer, now: Instant) -> PixelBuffer {
        self.compositor.composite(
            frame,
            &self.view.snapshot(),
            now,
            self.debounce_period(),
            self.highlight_enabled(),
        )
    }

    /// Attach or detach the display sink.
    pub fn set_frame_sink(&self, sink: Option<Arc<dyn FrameSink>>) {
        *self.sink.write() = sink;
    }

    /// Register a callback for newly detected codes.
    ///
    /// Called once per reconciliation that found codes not currently
    /// tracked, with exactly those codes. Runs on the dispatcher thread.
    pub fn on_new_codes<F>(&self, callback: F)
    where
        F: Fn(&[TrackedCode]) + Send + Sync + 'static,
    {
        let callback: NewCodesCallback = Box::new(callback);
        self.listeners.write().push(Arc::new(callback));
    }

    /// The visible codes view.
    pub fn view(&self) -> &VisibleCodesView {
        &self.view
    }

    /// Whether the overlay is drawn.
    pub fn highlight_enabled(&self) -> bool {
        self.controls.highlight.load(Ordering::SeqCst)
    }

    /// Turn the overlay on or off.
    pub fn set_highlight_enabled(&self, enabled: bool) {
        self.controls.highlight.store(enabled, Ordering::SeqCst);
    }

    /// Current debounce period.
    pub fn debounce_period(&self) -> Duration {
        self.controls.debounce()
    }

    /// Change the debounce period.
    ///
    /// A zero period is ignored and returns false. The new period applies
    /// from the next reconciliation and the next rendered frame.
    pub fn set_debounce_period(&self, period: Duration) -> bool {
        if period.is_zero() {
            tracing::warn!("[Pipeline] Ignoring zero debounce period");
            return false;
        }
        self.controls.set_debounce(period);
        true
    }

    /// Name of the decoder backend.
    pub fn decoder_name(&self) -> &str {
        self.worker.decoder_name()
    }

    /// Current counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.counters.received.load(Ordering::Relaxed),
            frames_skipped: self.counters.invalid.load(Ordering::Relaxed)
                + self.worker.frames_skipped(),
            frames_dropped: self.counters.dropped.load(Ordering::Relaxed),
            frames_decoded: self.worker.frames_decoded(),
            decode_failures: self.worker.decode_failures(),
            batches_reconciled: self.counters.reconciled.load(Ordering::Relaxed),
        }
    }

    /// Whether the worker is still running.
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Stop decoding and wait for the worker and dispatcher to exit.
    ///
    /// Batches already decoded are still reconciled before this returns.
    /// Safe to call more than once. Frames passed to `frame_in` afterwards
    /// are still rendered for the sink but no longer decoded.
    pub fn stop(&self) {
        self.worker.stop();

        let handle = {
            let mut slot = self.dispatcher.lock();
            match slot.take() {
                // Called from a listener. The dispatcher exits on its own once
                // the worker's sender is gone; the owner's stop() joins it.
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    *slot = Some(handle);
                    return;
                }
                Some(handle) => handle,
                None => return,
            }
        };
        if handle.join().is_err() {
            tracing::error!("[Pipeline] Dispatcher thread panicked");
        }
        tracing::info!("[Pipeline] Stopped");
    }
}

impl Drop for ScannerPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(
    batches: Receiver<DecodeBatch>,
    mut reconciler: ResultReconciler,
    controls: Arc<Controls>,
    listeners: Listeners,
    counters: Arc<Counters>,
) {
    // Ends once the worker drops its sender
    for batch in batches.iter() {
        let debounce = controls.debounce();
        if debounce != reconciler.debounce_period() {
            reconciler.set_debounce_period(debounce);
        }

        let outcome = reconciler.reconcile(&batch.symbols, batch.decoded_at);
        counters.reconciled.fetch_add(1, Ordering::Relaxed);

        if outcome.newly_seen.is_empty() {
            continue;
        }
        let callbacks: Vec<_> = listeners.read().iter().cloned().collect();
        for callback in callbacks {
            call_listener("Pipeline", || (**callback)(&outcome.newly_seen));
        }
    }
    tracing::debug!("[Pipeline] Dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{BoundingBox, DecodedSymbol};
    use crate::error::DecodeError;
    use crate::logging::init_test_tracing;
    use image::{Rgba, RgbaImage};
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn settings(debounce_ms: u64) -> Settings {
        let mut settings = Settings::default();
        settings.scanner.debounce_ms = debounce_ms;
        settings.scanner.idle_poll_ms = 5;
        settings
    }

    fn frame() -> PixelBuffer {
        PixelBuffer::from_image(RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255])))
    }

    fn hello_decoder(_: &PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError> {
        Ok(vec![DecodedSymbol::new(
            "HELLO",
            BoundingBox::new(10, 10, 50, 50),
        )])
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn decoded_code_becomes_visible_and_is_announced() {
        init_test_tracing();
        let pipeline = ScannerPipeline::new(hello_decoder, &settings(1000)).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        pipeline.on_new_codes(move |codes| {
            let _ = tx.lock().send(codes.to_vec());
        });

        pipeline.frame_in(frame());

        let announced = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(announced.len(), 1);
        assert_eq!(announced[0].payload_text(), "HELLO");
        wait_until(|| pipeline.view().count() == 1);
        assert_eq!(
            pipeline.view().get(0).unwrap().bbox,
            BoundingBox::new(10, 10, 50, 50)
        );

        pipeline.stop();
    }

    #[test]
    fn repeated_sightings_announce_once() {
        let pipeline = ScannerPipeline::new(hello_decoder, &settings(60_000)).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        pipeline.on_new_codes(move |codes| {
            let _ = tx.lock().send(codes.len());
        });

        for _ in 0..3 {
            let before = pipeline.stats().batches_reconciled;
            pipeline.frame_in(frame());
            wait_until(|| pipeline.stats().batches_reconciled > before);
        }
        pipeline.stop();

        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn sink_receives_annotated_frames() {
        let pipeline = ScannerPipeline::new(hello_decoder, &settings(60_000)).unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        pipeline.set_frame_sink(Some(Arc::new(move |frame: PixelBuffer| {
            let _ = tx.lock().send(frame);
        })));

        // First frame: nothing tracked yet, passes through untouched
        pipeline.frame_in(frame());
        let first = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(first.image().get_pixel(10, 10), &Rgba([0, 0, 0, 255]));

        wait_until(|| pipeline.view().count() == 1);
        pipeline.frame_in(frame());
        let second = rx.recv_timeout(WAIT).unwrap();
        assert_ne!(second.image().get_pixel(10, 10), &Rgba([0, 0, 0, 255]));

        pipeline.set_highlight_enabled(false);
        pipeline.frame_in(frame());
        let third = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(third.image().get_pixel(10, 10), &Rgba([0, 0, 0, 255]));

        pipeline.stop();
    }

    #[test]
    fn degenerate_frames_are_ignored() {
        let pipeline = ScannerPipeline::new(hello_decoder, &settings(1000)).unwrap();
        pipeline.frame_in(PixelBuffer::from_image(RgbaImage::new(0, 0)));

        let stats = pipeline.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_skipped, 1);
        pipeline.stop();
        assert_eq!(pipeline.stats().frames_decoded, 0);
    }

    #[test]
    fn debounce_setter_rejects_zero() {
        let pipeline = ScannerPipeline::new(hello_decoder, &settings(1000)).unwrap();

        assert!(!pipeline.set_debounce_period(Duration::ZERO));
        assert_eq!(pipeline.debounce_period(), Duration::from_millis(1000));

        assert!(pipeline.set_debounce_period(Duration::from_millis(300)));
        assert_eq!(pipeline.debounce_period(), Duration::from_millis(300));
    }

    #[test]
    fn codes_expire_after_debounce() {
        let pipeline = Arc::new(
            ScannerPipeline::new(
                |frame: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
                    // Wide frames contain the code, narrow ones are empty
                    if frame.width() > 1 {
                        hello_decoder(frame)
                    } else {
                        Ok(Vec::new())
                    }
                },
                &settings(50),
            )
            .unwrap(),
        );

        pipeline.frame_in(frame());
        wait_until(|| pipeline.view().count() == 1);

        thread::sleep(Duration::from_millis(80));
        let empty = PixelBuffer::from_image(RgbaImage::new(1, 1));
        pipeline.frame_in(empty);
        wait_until(|| pipeline.view().is_empty());

        pipeline.stop();
    }

    #[test]
    fn panicking_listener_does_not_stop_decoding() {
        init_test_tracing();
        let pipeline = ScannerPipeline::new(
            |frame: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
                if frame.width() > 1 {
                    hello_decoder(frame)
                } else {
                    Ok(Vec::new())
                }
            },
            &settings(50),
        )
        .unwrap();
        pipeline.on_new_codes(|_| panic!("listener failure"));
        pipeline.view().subscribe(|_| panic!("view listener failure"));

        pipeline.frame_in(frame());
        wait_until(|| pipeline.stats().batches_reconciled == 1);
        assert_eq!(pipeline.view().count(), 1);

        thread::sleep(Duration::from_millis(80));
        pipeline.frame_in(PixelBuffer::from_image(RgbaImage::new(1, 1)));
        wait_until(|| pipeline.stats().batches_reconciled == 2);

        assert!(pipeline.view().is_empty());
        assert!(pipeline.is_running());
        pipeline.stop();
    }

    #[test]
    fn huge_debounce_saturates_instead_of_wrapping() {
        let mut settings = settings(1000);
        // 2^64 ns plus about 551 ms
        settings.scanner.debounce_ms = 18_446_744_074_261;
        let pipeline = ScannerPipeline::new(hello_decoder, &settings).unwrap();

        assert_eq!(pipeline.debounce_period(), Duration::from_nanos(u64::MAX));

        pipeline.frame_in(frame());
        wait_until(|| pipeline.view().count() == 1);
        let rendered = pipeline.render(&frame(), Instant::now() + Duration::from_secs(1));
        assert_eq!(rendered.image().get_pixel(10, 10), &Rgba([100, 100, 128, 255]));
        pipeline.stop();
    }

    #[test]
    fn saturating_nanos_caps_at_u64_max() {
        assert_eq!(saturating_nanos(Duration::from_millis(3)), 3_000_000);
        assert_eq!(saturating_nanos(Duration::from_secs(u64::MAX)), u64::MAX);
    }

    #[test]
    fn stop_from_listener_leaves_join_to_owner() {
        let pipeline = Arc::new(ScannerPipeline::new(hello_decoder, &settings(1000)).unwrap());
        let (stopped_tx, stopped_rx) = mpsc::channel();
        let stopped_tx = Mutex::new(stopped_tx);
        let listener_done = Arc::new(AtomicBool::new(false));

        let handle = Arc::downgrade(&pipeline);
        let done = Arc::clone(&listener_done);
        pipeline.on_new_codes(move |_| {
            if let Some(pipeline) = handle.upgrade() {
                pipeline.stop();
            }
            let _ = stopped_tx.lock().send(());
            thread::sleep(Duration::from_millis(100));
            done.store(true, Ordering::SeqCst);
        });

        pipeline.frame_in(frame());
        stopped_rx.recv_timeout(WAIT).unwrap();
        pipeline.stop();

        // The owner's stop() waited for the dispatcher to finish
        assert!(listener_done.load(Ordering::SeqCst));
        assert!(!pipeline.is_running());
    }

    #[test]
    fn stop_returns_while_decode_in_flight() {
        let (started_tx, started_rx) = mpsc::channel();
        let decoder = move |_: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(100));
            Ok(Vec::new())
        };
        let pipeline = ScannerPipeline::new(decoder, &settings(1000)).unwrap();

        pipeline.frame_in(frame());
        started_rx.recv_timeout(WAIT).unwrap();
        pipeline.stop();

        assert!(!pipeline.is_running());
        assert_eq!(pipeline.stats().frames_decoded, 1);
        assert_eq!(pipeline.stats().batches_reconciled, 1);
        pipeline.stop();
    }

    #[test]
    fn decoder_failures_are_counted_not_fatal() {
        let decoder = |_: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
            Err(DecodeError::backend("test", "always fails"))
        };
        let pipeline = ScannerPipeline::new(decoder, &settings(1000)).unwrap();

        pipeline.frame_in(frame());
        wait_until(|| pipeline.stats().decode_failures == 1);
        pipeline.frame_in(frame());
        wait_until(|| pipeline.stats().decode_failures == 2);

        assert!(pipeline.is_running());
        assert!(pipeline.view().is_empty());
    }
}
