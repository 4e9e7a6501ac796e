//! SideQR Core - live video QR scanning pipeline
//!
//! This crate contains the frame pipeline behind a QR scanning preview:
//! - A single-slot frame mailbox between frame arrival and the decoder
//! - A dedicated decode worker thread
//! - Debounced reconciliation of decode results into tracked codes
//! - An observable view of the currently visible codes
//! - Overlay compositing of fading bounding boxes onto display frames
//!
//! It has no UI dependencies. A UI layer feeds frames through
//! [`ScannerPipeline::frame_in`] and consumes annotated frames, new-code
//! notifications and the [`VisibleCodesView`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use sideqr_core::{PixelBuffer, PixelLayout, ScannerPipeline};
//! use sideqr_core::config::Settings;
//! use sideqr_core::decode::RqrrDecoder;
//!
//! let pipeline = ScannerPipeline::new(RqrrDecoder::new(), &Settings::default()).unwrap();
//! pipeline.on_new_codes(|codes| {
//!     for code in codes {
//!         println!("detected: {}", code.payload_text());
//!     }
//! });
//! pipeline.set_debounce_period(Duration::from_millis(750));
//!
//! let frame = PixelBuffer::from_raw(640, 480, PixelLayout::Rgba8, vec![0; 640 * 480 * 4]).unwrap();
//! pipeline.frame_in(frame);
//! pipeline.stop();
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod logging;
pub mod overlay;
pub mod pipeline;
pub mod reconcile;
pub mod view;
pub mod worker;

pub use decode::{BoundingBox, DecodedSymbol, SymbolDecoder};
pub use error::{ScanError, ScanResult};
pub use frame::{FrameMailbox, PixelBuffer, PixelLayout};
pub use overlay::{OverlayCompositor, OverlayStyle};
pub use pipeline::{FrameSink, PipelineStats, ScannerPipeline};
pub use reconcile::{ReconcileOutcome, ResultReconciler, TrackedCode};
pub use view::VisibleCodesView;
pub use worker::{DecodeBatch, DecodeWorker};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
