//! Pixel buffers and raw frame conversion.

use std::sync::Arc;

use image::{DynamicImage, RgbaImage};

use crate::error::FrameError;

/// Channel layout of raw frame bytes handed in by the video layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// 8-bit red, green, blue, alpha.
    #[default]
    Rgba8,
    /// 8-bit blue, green, red, alpha.
    Bgra8,
    /// 8-bit red, green, blue (no alpha).
    Rgb8,
    /// 8-bit luma.
    Gray8,
}

impl PixelLayout {
    /// Bytes per pixel for this layout.
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgb8 => 3,
            Self::Gray8 => 1,
        }
    }

    /// Get display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
            Self::Rgb8 => "rgb8",
            Self::Gray8 => "gray8",
        }
    }
}

/// An immutable RGBA frame.
///
/// Cloning is cheap: clones share the same pixel storage. The display path
/// copies the pixels before drawing, the decode path only reads them.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    image: Arc<RgbaImage>,
}

impl PixelBuffer {
    /// Convert raw frame bytes into an RGBA buffer.
    ///
    /// # Arguments
    /// * `width` - Frame width in pixels
    /// * `height` - Frame height in pixels
    /// * `layout` - Channel layout of `bytes`
    /// * `bytes` - Tightly packed pixel rows
    ///
    /// # Errors
    /// Returns `FrameError` for zero-area frames or when the byte length does
    /// not match `width * height * channels`.
    pub fn from_raw(
        width: u32,
        height: u32,
        layout: PixelLayout,
        bytes: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroArea { width, height });
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(layout.channels()))
            .ok_or(FrameError::TooLarge { width, height })?;
        if bytes.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        let rgba = match layout {
            PixelLayout::Rgba8 => bytes,
            PixelLayout::Bgra8 => {
                let mut bytes = bytes;
                for px in bytes.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                bytes
            }
            PixelLayout::Rgb8 => {
                let mut out = Vec::with_capacity(expected / 3 * 4);
                for px in bytes.chunks_exact(3) {
                    out.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                out
            }
            PixelLayout::Gray8 => {
                let mut out = Vec::with_capacity(expected * 4);
                for &luma in &bytes {
                    out.extend_from_slice(&[luma, luma, luma, 255]);
                }
                out
            }
        };

        let actual = rgba.len();
        let image = RgbaImage::from_raw(width, height, rgba).ok_or(FrameError::SizeMismatch {
            expected: width as usize * height as usize * 4,
            actual,
        })?;
        Ok(Self::from_image(image))
    }

    /// Wrap an existing RGBA image. Zero-area images are allowed here and
    /// are reported by [`PixelBuffer::is_degenerate`].
    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the frame has zero area.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Borrow the underlying RGBA image.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Copy into a `DynamicImage` for decoders built on the `image` crate.
    pub fn to_dynamic_image(&self) -> DynamicImage {
        DynamicImage::ImageRgba8((*self.image).clone())
    }

    /// Whether two buffers share the same pixel storage.
    pub fn shares_storage(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        Self::from_image(image)
    }
}
