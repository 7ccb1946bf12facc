//! The FB Adapter: the narrow boundary between this crate and a host's
//! raster device.
//!
//! This crate never owns pixels. An embedder implements [`FrameBuffer`] over
//! whatever backs its screen (a raw `Vec<u8>`, a mapped device framebuffer,
//! a software surface), and the session reads through it on every tick.

use crate::encoding::CURSOR_SIZE;
use crate::protocol::{PixelFormat, Rect};

/// One host palette entry: 16-bit-scaled red, green, blue.
pub type PaletteEntry = (u16, u16, u16);

/// The host cursor's shape: a 16x16 bitmap/mask pair (one row per `u16`, MSB
/// leftmost), a hotspot, and 16-bit-scaled foreground/background colors.
/// Matches the layout [`crate::encoding::encode_cursor`] consumes.
#[derive(Debug, Clone, Copy)]
pub struct CursorShape {
    /// Bit set -> foreground pixel, clear -> background pixel.
    pub bitmap: [u16; CURSOR_SIZE],
    /// Host mask, OR'd with `bitmap` before encoding.
    pub mask: [u16; CURSOR_SIZE],
    /// Hotspot X, in pixels from the cursor image's left edge.
    pub hotspot_x: u16,
    /// Hotspot Y, in pixels from the cursor image's top edge.
    pub hotspot_y: u16,
    /// Foreground colour, 16-bit-scaled RGB.
    pub fg: PaletteEntry,
    /// Background colour, 16-bit-scaled RGB.
    pub bg: PaletteEntry,
}

/// Read-only access to a rectangular pixel surface.
///
/// Implementations must be cheap to call from a single-threaded tick loop;
/// this crate never holds a lock across a `read_rect` call, but it does call
/// it on every Scheduler pass.
pub trait FrameBuffer: Send {
    /// Width in pixels.
    fn width(&self) -> u16;
    /// Height in pixels.
    fn height(&self) -> u16;
    /// Pixel format the buffer is stored in.
    fn pixel_format(&self) -> PixelFormat;
    /// Copies `rect`'s pixels (row-major, `pixel_format()`-encoded, no
    /// padding between rows) into `out`. `out` must be at least
    /// `rect.w * rect.h * bytes_per_pixel` bytes.
    fn read_rect(&self, rect: Rect, out: &mut [u8]);

    /// The host's indexed colour table, consulted when `pixel_format()` is
    /// not true-colour. Empty for true-colour sources, which have no use
    /// for it.
    fn palette(&self) -> Vec<PaletteEntry> {
        Vec::new()
    }

    /// Monotonically increasing counter that increments whenever `palette()`
    /// changes, so the scheduler only resends `SetColourMapEntries` when the
    /// table actually moved. Sources with a constant (or no) palette can
    /// leave this at a fixed value.
    fn palette_generation(&self) -> u64 {
        0
    }

    /// The host cursor's current shape, or `None` if this adapter doesn't
    /// track one (or the host composites its own cursor into the
    /// framebuffer).
    fn cursor(&self) -> Option<CursorShape> {
        None
    }
}

/// A `Vec<u8>`-backed framebuffer used by tests and the `demos/` binaries.
pub struct TestFrameBuffer {
    width: u16,
    height: u16,
    format: PixelFormat,
    pixels: Vec<u8>,
    palette: Vec<PaletteEntry>,
    palette_gen: u64,
    cursor: Option<CursorShape>,
}

impl TestFrameBuffer {
    /// Creates a blank (all-zero) framebuffer of the given size and format.
    #[must_use]
    pub fn new(width: u16, height: u16, format: PixelFormat) -> Self {
        let size = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            pixels: vec![0u8; size],
            palette: Vec::new(),
            palette_gen: 0,
            cursor: None,
        }
    }

    /// Mutable access to the backing pixel buffer, for tests that paint it.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Read-only access to the whole backing pixel buffer.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Replaces the host palette and bumps `palette_generation()`.
    pub fn set_palette(&mut self, entries: Vec<PaletteEntry>) {
        self.palette = entries;
        self.palette_gen += 1;
    }

    /// Sets (or clears, with `None`) the host cursor shape.
    pub fn set_cursor(&mut self, cursor: Option<CursorShape>) {
        self.cursor = cursor;
    }
}

impl FrameBuffer for TestFrameBuffer {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn read_rect(&self, rect: Rect, out: &mut [u8]) {
        let bpp = self.format.bytes_per_pixel();
        let stride = self.width as usize * bpp;
        let row_bytes = rect.w as usize * bpp;
        for row in 0..rect.h as usize {
            let src_start = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            let dst_start = row * row_bytes;
            out[dst_start..dst_start + row_bytes]
                .copy_from_slice(&self.pixels[src_start..src_start + row_bytes]);
        }
    }

    fn palette(&self) -> Vec<PaletteEntry> {
        self.palette.clone()
    }

    fn palette_generation(&self) -> u64 {
        self.palette_gen
    }

    fn cursor(&self) -> Option<CursorShape> {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_rect_extracts_subregion() {
        let pf = PixelFormat::rgba32();
        let mut fb = TestFrameBuffer::new(4, 4, pf);
        for (i, b) in fb.pixels_mut().iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut out = vec![0u8; 2 * 2 * 4];
        fb.read_rect(Rect { x: 1, y: 1, w: 2, h: 2 }, &mut out);
        // Row 0 of the subregion is framebuffer row 1, starting at pixel 1: byte offset (1*4+1)*4=20
        assert_eq!(&out[0..8], &fb.pixels()[20..28]);
        // Row 1 of the subregion is framebuffer row 2, starting at pixel 1: byte offset (2*4+1)*4=36
        assert_eq!(&out[8..16], &fb.pixels()[36..44]);
    }

    #[test]
    fn palette_defaults_to_empty_until_set() {
        let mut fb = TestFrameBuffer::new(4, 4, PixelFormat::rgba32());
        assert!(fb.palette().is_empty());
        assert_eq!(fb.palette_generation(), 0);

        fb.set_palette(vec![(0xFFFF, 0, 0), (0, 0xFFFF, 0)]);
        assert_eq!(fb.palette(), vec![(0xFFFF, 0, 0), (0, 0xFFFF, 0)]);
        assert_eq!(fb.palette_generation(), 1);

        fb.set_palette(vec![(0, 0, 0xFFFF)]);
        assert_eq!(fb.palette_generation(), 2);
    }

    #[test]
    fn cursor_defaults_to_none_until_set() {
        let mut fb = TestFrameBuffer::new(4, 4, PixelFormat::rgba32());
        assert!(fb.cursor().is_none());

        let shape = CursorShape {
            bitmap: [0xFFFFu16; CURSOR_SIZE],
            mask: [0u16; CURSOR_SIZE],
            hotspot_x: 0,
            hotspot_y: 0,
            fg: (0xFFFF, 0xFFFF, 0xFFFF),
            bg: (0, 0, 0),
        };
        fb.set_cursor(Some(shape));
        assert_eq!(fb.cursor().unwrap().hotspot_x, 0);
    }
}
