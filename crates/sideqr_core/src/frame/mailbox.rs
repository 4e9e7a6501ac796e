//! Single-slot frame mailbox.
//!
//! The frame-arrival side `put`s every frame, the decode worker `take`s
//! whatever is there. An untaken frame is overwritten by the next one, so
//! under load the decoder always sees the freshest frame and older ones are
//! shed. Every operation is one short critical section.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::buffer::PixelBuffer;

#[derive(Default)]
struct Slot {
    frame: Option<PixelBuffer>,
    closed: bool,
}

/// Latest-wins handoff of one pending frame.
#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl FrameMailbox {
    /// Create an empty, open mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, discarding any frame not yet taken.
    ///
    /// Returns true if an untaken frame was replaced. Frames put after
    /// [`FrameMailbox::close`] are dropped.
    pub fn put(&self, frame: PixelBuffer) -> bool {
        let replaced = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return false;
            }
            slot.frame.replace(frame).is_some()
        };
        self.ready.notify_one();
        replaced
    }

    /// Take the pending frame, if any, leaving the mailbox empty.
    pub fn take(&self) -> Option<PixelBuffer> {
        self.slot.lock().frame.take()
    }

    /// Take the pending frame, waiting up to `timeout` for one to arrive.
    ///
    /// Returns early with `None` once the mailbox is closed.
    pub fn take_timeout(&self, timeout: Duration) -> Option<PixelBuffer> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.frame.take();
            }
        }
    }

    /// Close the mailbox and wake every waiter.
    ///
    /// Any pending frame is discarded.
    pub fn close(&self) {
        {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.frame = None;
        }
        self.ready.notify_all();
    }

    /// Whether [`FrameMailbox::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Whether no frame is pending.
    pub fn is_empty(&self) -> bool {
        self.slot.lock().frame.is_none()
    }
}
