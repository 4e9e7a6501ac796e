//! Decoder boundary.
//!
//! The pipeline does not know how symbols are found. It hands frames to a
//! [`SymbolDecoder`] on the worker thread and receives [`DecodedSymbol`]s
//! back. Closures of the right shape are decoders too, which is what tests
//! and simple hosts use.
//!
//! # Backends
//!
//! - [`RqrrDecoder`] (feature `rqrr`, on by default): QR codes via `rqrr`

#[cfg(feature = "rqrr")]
mod rqrr_backend;

#[cfg(feature = "rqrr")]
pub use rqrr_backend::RqrrDecoder;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::frame::PixelBuffer;

/// Axis-aligned rectangle in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge (may be negative when a symbol is partially off-frame).
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Create a bounding box.
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Smallest box containing all points, or None for no points.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (i32, i32)>,
    {
        let mut iter = points.into_iter();
        let (x0, y0) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self {
            left: min_x,
            top: min_y,
            width: max_x.abs_diff(min_x),
            height: max_y.abs_diff(min_y),
        })
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// Whether the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One symbol reported by a decoder for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSymbol {
    /// Decoded payload bytes.
    pub payload: Vec<u8>,
    /// Location in the frame.
    pub bbox: BoundingBox,
}

impl DecodedSymbol {
    /// Create a decoded symbol.
    pub fn new(payload: impl Into<Vec<u8>>, bbox: BoundingBox) -> Self {
        Self {
            payload: payload.into(),
            bbox,
        }
    }
}

/// Trait for barcode decoders.
///
/// Implementations are called from a single dedicated worker thread, one
/// frame at a time. An `Err` means the whole frame failed; the worker logs
/// it and moves on to the next frame.
pub trait SymbolDecoder: Send {
    /// Decode every symbol visible in `frame`, in the decoder's order.
    fn decode(&mut self, frame: &PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError>;

    /// Get the backend name.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> SymbolDecoder for F
where
    F: FnMut(&PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError> + Send,
{
    fn decode(&mut self, frame: &PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError> {
        self(frame)
    }
}
