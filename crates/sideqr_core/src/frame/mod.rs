//! Frames and the frame handoff between arrival and decoding.
//!
//! - [`PixelBuffer`]: immutable RGBA frame, cheap to share
//! - [`PixelLayout`]: raw layouts accepted by [`PixelBuffer::from_raw`]
//! - [`FrameMailbox`]: single-slot, latest-wins handoff

mod buffer;
mod mailbox;

pub use buffer::{PixelBuffer, PixelLayout};
pub use mailbox::FrameMailbox;
