//! QR decoder backed by the `rqrr` crate.

use super::{BoundingBox, DecodedSymbol, SymbolDecoder};
use crate::error::DecodeError;
use crate::frame::PixelBuffer;

/// QR code decoder.
///
/// Converts the frame to luma, detects QR grids and decodes each one to raw
/// payload bytes. Grids that are found but fail to decode (damaged, partially
/// off-frame) are skipped rather than failing the whole frame.
#[derive(Debug, Default, Clone)]
pub struct RqrrDecoder {
    _private: (),
}

impl RqrrDecoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SymbolDecoder for RqrrDecoder {
    fn decode(&mut self, frame: &PixelBuffer) -> Result<Vec<DecodedSymbol>, DecodeError> {
        if frame.is_degenerate() {
            return Ok(Vec::new());
        }

        let luma = frame.to_dynamic_image().into_luma8();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            luma.width() as usize,
            luma.height() as usize,
            |x, y| luma.get_pixel(x as u32, y as u32).0[0],
        );

        let grids = prepared.detect_grids();
        let mut symbols = Vec::with_capacity(grids.len());

        for grid in grids {
            let mut payload = Vec::new();
            if let Err(e) = grid.decode_to(&mut payload) {
                tracing::debug!("[RqrrDecoder] Skipping undecodable grid: {:?}", e);
                continue;
            }

            let Some(bbox) = BoundingBox::from_points(grid.bounds.iter().map(|p| (p.x, p.y)))
            else {
                continue;
            };
            symbols.push(DecodedSymbol { payload, bbox });
        }

        Ok(symbols)
    }

    fn name(&self) -> &str {
        "rqrr"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn blank_frame_has_no_symbols() {
        let mut decoder = RqrrDecoder::new();
        let frame = PixelBuffer::from_image(RgbaImage::from_pixel(64, 64, image::Rgba([255; 4])));
        assert!(decoder.decode(&frame).unwrap().is_empty());
    }

    #[test]
    fn degenerate_frame_is_skipped() {
        let mut decoder = RqrrDecoder::new();
        let frame = PixelBuffer::from_image(RgbaImage::new(0, 0));
        assert!(decoder.decode(&frame).unwrap().is_empty());
        assert_eq!(decoder.name(), "rqrr");
    }
}
