use log::debug;

use crate::error::{DecodeError, Result};

/// Bytes per pixel in a decoded image.
pub const CHANNELS: usize = 3;

/// A fully decoded image: interleaved 8-bit R, G, B samples, rows top to bottom.
///
/// Only ever produced by a successful decode, so `pixels().len()` is always
/// `width * height * 3`. The pixel buffer belongs to the caller and is freed when the
/// `Image` (or the `Vec` taken out of it) is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    pub(crate) fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * CHANNELS);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The raw RGB buffer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Gives up the pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Row `y`, `width * 3` bytes long.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        self.pixels.get(start..start + stride)
    }

    /// The `[r, g, b]` triple at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width {
            return None;
        }
        let start = x as usize * CHANNELS;
        let rgb = self.row(y)?.get(start..start + CHANNELS)?;
        Some([rgb[0], rgb[1], rgb[2]])
    }
}

/// Allocates the zeroed destination buffer for a `width` x `height` image.
pub(crate) fn allocate_pixels(width: u32, height: u32, max_pixels: Option<u64>) -> Result<Vec<u8>> {
    let pixel_count = width as u64 * height as u64;
    let bytes = usize::try_from(pixel_count * CHANNELS as u64).unwrap_or(usize::MAX);

    if max_pixels.is_some_and(|max| pixel_count > max) {
        return Err(DecodeError::OutOfMemory { bytes });
    }

    let mut pixels = Vec::new();
    pixels
        .try_reserve_exact(bytes)
        .map_err(|_| DecodeError::OutOfMemory { bytes })?;
    pixels.resize(bytes, 0);
    debug!("allocated {} byte pixel buffer for {}x{}", bytes, width, height);
    Ok(pixels)
}
