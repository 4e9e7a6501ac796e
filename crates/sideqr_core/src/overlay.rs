//! Overlay compositing.
//!
//! Draws a rectangle outline around every tracked code onto a copy of the
//! display frame. Each outline fades linearly from fully opaque at the
//! moment the code was last seen to fully transparent once the debounce
//! period has elapsed, so codes that drop out of view fade away instead of
//! vanishing.

use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::decode::BoundingBox;
use crate::frame::PixelBuffer;
use crate::reconcile::TrackedCode;

/// Appearance of code outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayStyle {
    /// Outline color (RGB).
    pub color: [u8; 3],
    /// Outline thickness in pixels, drawn inward from the bbox edge.
    pub stroke_width: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: [100, 100, 128],
            stroke_width: 5,
        }
    }
}

/// Opacity of an outline for a code last seen `age` ago.
///
/// 1.0 at age zero, 0.0 at `debounce`, None once past `debounce`.
pub fn fade_alpha(age: Duration, debounce: Duration) -> Option<f32> {
    if debounce.is_zero() || age > debounce {
        return None;
    }
    let alpha = 1.0 - age.as_secs_f64() / debounce.as_secs_f64();
    Some(alpha.clamp(0.0, 1.0) as f32)
}

/// Renders fading code outlines onto display frames.
#[derive(Debug, Clone, Default)]
pub struct OverlayCompositor {
    style: OverlayStyle,
}

impl OverlayCompositor {
    /// Create a compositor with the given style.
    pub fn new(style: OverlayStyle) -> Self {
        Self { style }
    }

    /// Current style.
    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    /// Annotate `frame` with outlines for `codes`.
    ///
    /// Returns `frame` itself (same storage, no copy) when highlighting is
    /// disabled or no code is within its fade window. Codes are drawn in
    /// slice order, so the same inputs always give the same output.
    ///
    /// # Arguments
    /// * `frame` - Display frame; never modified
    /// * `codes` - Tracked codes to outline
    /// * `now` - Render time used for fading
    /// * `debounce` - Fade duration
    /// * `highlight_enabled` - Master switch
    pub fn composite(
        &self,
        frame: &PixelBuffer,
        codes: &[TrackedCode],
        now: Instant,
        debounce: Duration,
        highlight_enabled: bool,
    ) -> PixelBuffer {
        if !highlight_enabled || frame.is_degenerate() {
            return frame.clone();
        }

        let visible: Vec<(&BoundingBox, f32)> = codes
            .iter()
            .filter_map(|code| fade_alpha(code.age(now), debounce).map(|a| (&code.bbox, a)))
            .filter(|(_, alpha)| *alpha > 0.0)
            .collect();
        if visible.is_empty() {
            return frame.clone();
        }

        let mut image = frame.image().clone();
        for (bbox, alpha) in visible {
            self.draw_outline(&mut image, bbox, alpha);
        }
        PixelBuffer::from_image(image)
    }

    fn draw_outline(&self, image: &mut RgbaImage, bbox: &BoundingBox, alpha: f32) {
        if bbox.is_empty() || self.style.stroke_width == 0 {
            return;
        }

        let stroke = self.style.stroke_width as i64;
        let (left, top) = (bbox.left as i64, bbox.top as i64);
        let (right, bottom) = (bbox.right(), bbox.bottom());

        let x0 = left.max(0);
        let y0 = top.max(0);
        let x1 = right.min(image.width() as i64);
        let y1 = bottom.min(image.height() as i64);

        for y in y0..y1 {
            let edge_row = y - top < stroke || bottom - 1 - y < stroke;
            for x in x0..x1 {
                let on_edge = edge_row || x - left < stroke || right - 1 - x < stroke;
                if !on_edge {
                    continue;
                }
                let pixel = image.get_pixel_mut(x as u32, y as u32);
                for (channel, &target) in pixel.0.iter_mut().zip(self.style.color.iter()) {
                    *channel = blend(*channel, target, alpha);
                }
            }
        }
    }
}

fn blend(base: u8, target: u8, alpha: f32) -> u8 {
    let mixed = base as f32 * (1.0 - alpha) + target as f32 * alpha;
    mixed.round().clamp(0.0, 255.0) as u8
}
