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

//! Pixel format translation between the framebuffer's native format and a
//! client's negotiated format.
//!
//! Every tile codec in [`crate::encoding`] operates on pixels already packed
//! into the client's target format (so equality comparisons for
//! solid/palette detection are meaningful); this module is the one place
//! that crosses from the framebuffer's native format into that domain.

use crate::palette::{pack_true_colour, unpack_true_colour};
use crate::protocol::PixelFormat;

/// Translates a rectangle of native-format pixel bytes into a `Vec` of
/// packed pixel words in `client_format`.
///
/// For true-colour destinations, each source pixel is unpacked to its
/// native-range RGB components, rescaled to 16-bit, then packed via
/// [`pack_true_colour`]. For indexed destinations (`true_colour_flag == 0`)
/// the nearest palette index under a fixed 3-3-2 quantization is produced —
/// matching the server's BGR233-shaped default pixel format.
#[must_use]
pub fn translate_rect(src: &[u8], src_format: &PixelFormat, client_format: &PixelFormat) -> Vec<u32> {
    let bpp = src_format.bytes_per_pixel();
    let pixel_count = src.len() / bpp.max(1);
    let mut out = Vec::with_capacity(pixel_count);

    for chunk in src.chunks_exact(bpp) {
        let word = crate::palette::read_pixel(chunk, src_format);
        let (r, g, b) = if src_format.true_colour_flag != 0 {
            let (r, g, b) = unpack_true_colour(word, src_format);
            (rescale(r, src_format.red_max), rescale(g, src_format.green_max), rescale(b, src_format.blue_max))
        } else {
            // Indexed source without a colour table attached here: treat the
            // index as a greyscale intensity, which is the best a context-free
            // translation can do.
            let v = rescale(word as u16, 255);
            (v, v, v)
        };

        if client_format.true_colour_flag != 0 {
            out.push(pack_true_colour(r, g, b, client_format));
        } else {
            out.push(quantize_indexed(r, g, b, client_format));
        }
    }
    out
}

fn rescale(value: u16, max: u16) -> u16 {
    if max == 0 {
        return 0;
    }
    ((u32::from(value) * 0xFFFF) / u32::from(max)) as u16
}

/// Quantizes 16-bit-scaled RGB down to `client_format`'s index space using
/// its own max/shift fields as a packing rule (the server's default indexed
/// format is 3-3-2: 3 bits red, 3 bits green, 2 bits blue).
fn quantize_indexed(r: u16, g: u16, b: u16, format: &PixelFormat) -> u32 {
    pack_true_colour(r, g, b, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_colour_to_true_colour_identity() {
        let fmt = PixelFormat::rgba32();
        let src = [0xAAu8, 0xBB, 0xCC, 0x00];
        let out = translate_rect(&src, &fmt, &fmt);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn downscale_to_rgb565() {
        let src_fmt = PixelFormat::rgba32();
        let dst_fmt = PixelFormat {
            bits_per_pixel: 16,
            depth: 16,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 31,
            green_max: 63,
            blue_max: 31,
            red_shift: 11,
            green_shift: 5,
            blue_shift: 0,
        };
        // pure red, big-endian rgba32 native: red at shift 16
        let src = [0xFFu8, 0x00, 0x00, 0x00];
        let out = translate_rect(&src, &src_fmt, &dst_fmt);
        assert_eq!(out[0], 0xF800);
    }
}
