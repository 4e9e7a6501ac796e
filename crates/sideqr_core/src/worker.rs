//! Decode worker thread.
//!
//! The worker drains the frame mailbox on its own thread, independent of
//! frame arrival. Each frame it gets is decoded synchronously, outside any
//! lock, and the resulting batch is sent down a channel in decode order.
//! Frames that arrive while a decode is running overwrite each other in the
//! mailbox; only the newest one is decoded next.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::decode::{DecodedSymbol, SymbolDecoder};
use crate::error::{panic_message, DecodeError, ScanError, ScanResult};
use crate::frame::{FrameMailbox, PixelBuffer};

/// Symbols decoded from one frame.
#[derive(Debug, Clone)]
pub struct DecodeBatch {
    /// Symbols in decoder order; empty when nothing was found.
    pub symbols: Vec<DecodedSymbol>,
    /// When the decode finished.
    pub decoded_at: Instant,
}

impl DecodeBatch {
    /// A batch with no symbols.
    pub fn empty(decoded_at: Instant) -> Self {
        Self {
            symbols: Vec::new(),
            decoded_at,
        }
    }
}

/// Counters updated by the worker thread.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub(crate) decoded: AtomicU64,
    pub(crate) failures: AtomicU64,
    pub(crate) skipped: AtomicU64,
}

/// Handle to a running decode worker.
///
/// Dropping the handle stops the worker.
pub struct DecodeWorker {
    mailbox: Arc<FrameMailbox>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<WorkerCounters>,
    decoder_name: String,
}

impl DecodeWorker {
    /// Spawn a worker thread.
    ///
    /// # Arguments
    /// * `decoder` - Decoder, moved onto the worker thread
    /// * `mailbox` - Mailbox the worker drains
    /// * `results` - Channel receiving one [`DecodeBatch`] per decoded frame
    /// * `idle_poll` - How long to wait on an empty mailbox before re-checking
    ///   the stop flag
    pub fn spawn<D>(
        decoder: D,
        mailbox: Arc<FrameMailbox>,
        results: Sender<DecodeBatch>,
        idle_poll: Duration,
    ) -> ScanResult<Self>
    where
        D: SymbolDecoder + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(WorkerCounters::default());
        let decoder_name = decoder.name().to_string();

        let handle = {
            let mailbox = Arc::clone(&mailbox);
            let running = Arc::clone(&running);
            let counters = Arc::clone(&counters);
            thread::Builder::new()
                .name("sideqr-decode".to_string())
                .spawn(move || run_loop(decoder, mailbox, results, running, counters, idle_poll))
                .map_err(|source| ScanError::SpawnFailed {
                    thread: "decode",
                    source,
                })?
        };

        tracing::info!("[DecodeWorker] Started with '{}' decoder", decoder_name);

        Ok(Self {
            mailbox,
            running,
            handle: Mutex::new(Some(handle)),
            counters,
            decoder_name,
        })
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// Wakes the worker if it is idle; if a decode is in progress, waits for
    /// it to finish. Safe to call more than once.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.mailbox.close();

        let handle = {
            let mut slot = self.handle.lock();
            match slot.take() {
                // The loop exits on its own; a later stop() from another
                // thread still joins.
                Some(handle) if handle.thread().id() == thread::current().id() => {
                    tracing::debug!("[DecodeWorker] stop() called from the worker thread");
                    *slot = Some(handle);
                    return;
                }
                Some(handle) => handle,
                None => return,
            }
        };
        if handle.join().is_err() {
            tracing::error!("[DecodeWorker] Worker thread panicked");
        }
        tracing::info!("[DecodeWorker] Stopped");
    }

    /// Whether the worker thread is still running.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Name of the decoder backend.
    pub fn decoder_name(&self) -> &str {
        &self.decoder_name
    }

    /// Frames decoded successfully.
    pub fn frames_decoded(&self) -> u64 {
        self.counters.decoded.load(Ordering::Relaxed)
    }

    /// Frames whose decode failed.
    pub fn decode_failures(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }

    /// Degenerate frames skipped without decoding.
    pub fn frames_skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<D: SymbolDecoder>(
    mut decoder: D,
    mailbox: Arc<FrameMailbox>,
    results: Sender<DecodeBatch>,
    running: Arc<AtomicBool>,
    counters: Arc<WorkerCounters>,
    idle_poll: Duration,
) {
    while running.load(Ordering::SeqCst) {
        let Some(frame) = mailbox.take_timeout(idle_poll) else {
            if mailbox.is_closed() {
                break;
            }
            continue;
        };

        if frame.is_degenerate() {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        match decode_guarded(&mut decoder, &frame) {
            Ok(symbols) => {
                counters.decoded.fetch_add(1, Ordering::Relaxed);
                let batch = DecodeBatch {
                    symbols,
                    decoded_at: Instant::now(),
                };
                if results.send(batch).is_err() {
                    tracing::debug!("[DecodeWorker] Result receiver dropped, exiting");
                    break;
                }
            }
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("[DecodeWorker] Decode failed: {}", e);
            }
        }
    }
}

/// Run the decoder, turning a panic into a [`DecodeError`].
fn decode_guarded<D: SymbolDecoder>(
    decoder: &mut D,
    frame: &PixelBuffer,
) -> Result<Vec<DecodedSymbol>, DecodeError> {
    match panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(frame))) {
        Ok(result) => result,
        Err(payload) => Err(DecodeError::Panicked(panic_message(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::BoundingBox;
    use crossbeam_channel::unbounded;
    use image::RgbaImage;
    use std::sync::{mpsc, Weak};

    const POLL: Duration = Duration::from_millis(5);
    const WAIT: Duration = Duration::from_secs(5);

    fn frame(width: u32) -> PixelBuffer {
        PixelBuffer::from_image(RgbaImage::new(width, 1))
    }

    fn width_decoder(frame: &PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError> {
        Ok(vec![DecodedSymbol::new(
            frame.width().to_string(),
            BoundingBox::new(0, 0, frame.width(), 1),
        )])
    }

    #[test]
    fn decodes_frames_and_publishes_batches() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, rx) = unbounded();
        let worker = DecodeWorker::spawn(width_decoder, Arc::clone(&mailbox), tx, POLL).unwrap();

        mailbox.put(frame(3));
        let batch = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.symbols[0].payload, b"3");

        worker.stop();
        assert_eq!(worker.frames_decoded(), 1);
    }

    #[test]
    fn empty_results_are_still_published() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, rx) = unbounded();
        let decoder = |_: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> { Ok(Vec::new()) };
        let worker = DecodeWorker::spawn(decoder, Arc::clone(&mailbox), tx, POLL).unwrap();

        mailbox.put(frame(1));
        let batch = rx.recv_timeout(WAIT).unwrap();
        assert!(batch.symbols.is_empty());
        worker.stop();
    }

    #[test]
    fn degenerate_frames_are_skipped() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, rx) = unbounded();
        let worker = DecodeWorker::spawn(width_decoder, Arc::clone(&mailbox), tx, POLL).unwrap();

        mailbox.put(PixelBuffer::from_image(RgbaImage::new(0, 0)));
        mailbox.put(frame(4));
        // The zero-area frame was overwritten or skipped; only width 4 decodes
        let batch = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.symbols[0].payload, b"4");
        worker.stop();
    }

    #[test]
    fn failures_and_panics_do_not_stop_the_loop() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, rx) = unbounded();
        let decoder = |frame: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
            match frame.width() {
                1 => Err(DecodeError::backend("test", "bad frame")),
                2 => panic!("decoder blew up"),
                _ => width_decoder(frame),
            }
        };
        let worker = DecodeWorker::spawn(decoder, Arc::clone(&mailbox), tx, POLL).unwrap();

        mailbox.put(frame(1));
        wait_until(|| worker.decode_failures() == 1);
        mailbox.put(frame(2));
        wait_until(|| worker.decode_failures() == 2);
        mailbox.put(frame(5));

        let batch = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(batch.symbols[0].payload, b"5");
        assert!(worker.is_running());
        worker.stop();
    }

    #[test]
    fn stop_is_idempotent_and_joins() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, _rx) = unbounded();
        let worker = DecodeWorker::spawn(width_decoder, mailbox, tx, POLL).unwrap();

        worker.stop();
        assert!(!worker.is_running());
        worker.stop();
    }

    #[test]
    fn stop_waits_for_in_flight_decode() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, _rx) = unbounded();
        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let finished_flag = Arc::clone(&finished);

        let decoder = move |_: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(100));
            finished_flag.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        };
        let worker = DecodeWorker::spawn(decoder, Arc::clone(&mailbox), tx, POLL).unwrap();

        mailbox.put(frame(1));
        started_rx.recv_timeout(WAIT).unwrap();
        worker.stop();

        assert!(finished.load(Ordering::SeqCst));
        assert!(!worker.is_running());
    }

    #[test]
    fn stop_from_worker_thread_is_joined_later() {
        let mailbox = Arc::new(FrameMailbox::new());
        let (tx, _rx) = unbounded();
        let (stopped_tx, stopped_rx) = mpsc::channel();
        let handle: Arc<Mutex<Weak<DecodeWorker>>> = Arc::new(Mutex::new(Weak::new()));
        let finished = Arc::new(AtomicBool::new(false));

        let worker_ref = Arc::clone(&handle);
        let finished_flag = Arc::clone(&finished);
        let decoder = move |_: &PixelBuffer| -> Result<Vec<DecodedSymbol>, DecodeError> {
            let worker = worker_ref.lock().upgrade();
            if let Some(worker) = worker {
                worker.stop();
            }
            let _ = stopped_tx.send(());
            thread::sleep(Duration::from_millis(100));
            finished_flag.store(true, Ordering::SeqCst);
            Ok(Vec::new())
        };
        let worker =
            Arc::new(DecodeWorker::spawn(decoder, Arc::clone(&mailbox), tx, POLL).unwrap());
        *handle.lock() = Arc::downgrade(&worker);

        mailbox.put(frame(1));
        stopped_rx.recv_timeout(WAIT).unwrap();
        worker.stop();

        assert!(finished.load(Ordering::SeqCst));
        assert!(!worker.is_running());
    }

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(1));
        }
    }
}
