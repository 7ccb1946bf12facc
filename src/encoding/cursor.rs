// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The RichCursor pseudo-encoding (`encoding = -239`): ships the host
//! cursor's bitmap and bitmask as a regular framebuffer rectangle, so
//! clients that support it render the pointer locally instead of waiting for
//! it to be composited into ordinary screen updates.
//!
//! Grounded on `original_source/VNCEncodeCursor.cpp`: a fixed 16x16 bitmap,
//! one CPIXEL per source bit (set -> foreground colour, clear -> background),
//! and a bitmask that is the bitwise OR of the host's mask and data planes —
//! `VNCEncodeCursor::getChunk`'s comment explains this collapses
//! invert-effect cursors (which would otherwise render blank) into an opaque
//! shape instead.

use crate::palette::write_cpixel;
use crate::protocol::PixelFormat;
use bytes::{BufMut, BytesMut};

/// Fixed cursor bitmap dimensions, matching the host cursor format this is
/// grounded on.
pub const CURSOR_SIZE: usize = 16;

/// A cheap change-detection fingerprint for a cursor bitmap+mask pair:
/// the sum of all bytes, wrapping. Grounded on `needsUpdate`'s checksum over
/// the host's raw 68-byte cursor record — cheap enough to call every tick,
/// exact enough that a real cursor change is never missed.
#[must_use]
pub fn cursor_fingerprint(bitmap: &[u8], mask: &[u8]) -> u64 {
    let mut sum: u64 = 0;
    for &b in bitmap.iter().chain(mask.iter()) {
        sum = sum.wrapping_add(u64::from(b));
    }
    sum
}

/// Encodes a 16x16 cursor as a RichCursor rectangle body: `width * height`
/// CPIXELs (one per `bitmap` bit, `fg` where set and `bg` where clear) in
/// `format`, followed by the `ceil(width/8) * height`-byte bitmask.
///
/// `bitmap` and `host_mask` are each 16 rows of one `u16` (MSB = leftmost
/// pixel). `mask_row = host_mask[row] | bitmap[row]`, matching the host's
/// OR-combination.
#[must_use]
pub fn encode_cursor(bitmap: &[u16; CURSOR_SIZE], host_mask: &[u16; CURSOR_SIZE], fg: u32, bg: u32, format: &PixelFormat) -> BytesMut {
    let mut buf = BytesMut::new();

    for &row in bitmap {
        let mut bits = row;
        for _ in 0..CURSOR_SIZE {
            let pixel = if bits & 0x8000 != 0 { fg } else { bg };
            write_cpixel(&mut buf, pixel, format);
            bits <<= 1;
        }
    }

    for (row, &host_row) in bitmap.iter().zip(host_mask.iter()) {
        let combined = host_row | row;
        buf.put_u8((combined >> 8) as u8);
        buf.put_u8((combined & 0xFF) as u8);
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_length_matches_pixels_plus_mask() {
        let format = PixelFormat::rgba32();
        let bitmap = [0xFFFFu16; CURSOR_SIZE];
        let mask = [0u16; CURSOR_SIZE];
        let buf = encode_cursor(&bitmap, &mask, 0x00FF_FFFF, 0, &format);
        let expected = CURSOR_SIZE * CURSOR_SIZE * format.bytes_per_cpixel() + CURSOR_SIZE * 2;
        assert_eq!(buf.len(), expected);
    }

    #[test]
    fn mask_combines_host_mask_and_bitmap() {
        let format = PixelFormat::rgba32();
        let mut bitmap = [0u16; CURSOR_SIZE];
        bitmap[0] = 0x0001; // rightmost pixel set
        let mask = [0u16; CURSOR_SIZE];
        let buf = encode_cursor(&bitmap, &mask, 0xFF, 0, &format);
        let mask_start = CURSOR_SIZE * CURSOR_SIZE * format.bytes_per_cpixel();
        let first_mask_word = u16::from_be_bytes([buf[mask_start], buf[mask_start + 1]]);
        assert_eq!(first_mask_word, 0x0001);
    }

    #[test]
    fn fingerprint_changes_when_bitmap_changes() {
        let a = cursor_fingerprint(&[0u8; 32], &[0u8; 32]);
        let b = cursor_fingerprint(&[1u8; 32], &[0u8; 32]);
        assert_ne!(a, b);
    }
}
