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

//! VNC Hextile encoding.
//!
//! Divides a rectangle into 16x16 tiles and encodes each independently as
//! solid, monochrome-with-subrects, coloured-subrects, or raw — whichever is
//! smallest. `last_bg`/`last_fg` carry across tiles within one rectangle so a
//! run of tiles sharing a background (or foreground) colour only pays for it
//! once.

use super::common::{analyze_tile_colors, extract_tile, find_subrects};
use crate::palette::write_pixel;
use crate::protocol::{
    PixelFormat, HEXTILE_ANY_SUBRECTS, HEXTILE_BACKGROUND_SPECIFIED, HEXTILE_FOREGROUND_SPECIFIED,
    HEXTILE_RAW, HEXTILE_SUBRECTS_COLOURED,
};
use bytes::{BufMut, BytesMut};

const TILE_SIZE: usize = 16;

/// Encodes a `width` x `height` rectangle of pixels (already packed into
/// `format`) using Hextile.
#[allow(clippy::similar_names)] // last_bg/last_fg are standard Hextile terminology
pub fn encode_hextile(pixels: &[u32], width: u16, height: u16, format: &PixelFormat) -> BytesMut {
    let mut buf = BytesMut::new();
    let bpp = format.bytes_per_pixel();

    let mut last_bg: Option<u32> = None;
    let mut last_fg: Option<u32> = None;

    for tile_y in (0..height).step_by(TILE_SIZE) {
        for tile_x in (0..width).step_by(TILE_SIZE) {
            let tile_w = TILE_SIZE.min((width - tile_x) as usize);
            let tile_h = TILE_SIZE.min((height - tile_y) as usize);

            let tile_pixels =
                extract_tile(pixels, width as usize, tile_x as usize, tile_y as usize, tile_w, tile_h);

            let (is_solid, is_mono, bg, fg) = analyze_tile_colors(&tile_pixels);

            let mut subencoding: u8 = 0;
            let tile_start = buf.len();
            buf.put_u8(0); // placeholder, patched below

            if is_solid {
                if Some(bg) != last_bg {
                    subencoding |= HEXTILE_BACKGROUND_SPECIFIED;
                    write_pixel(&mut buf, bg, format);
                    last_bg = Some(bg);
                }
            } else {
                let subrects = find_subrects(&tile_pixels, tile_w, tile_h, bg);

                let raw_size = tile_w * tile_h * bpp;
                let bg_overhead = if Some(bg) == last_bg { 0 } else { bpp };
                let fg_overhead = if is_mono && Some(fg) != last_fg { bpp } else { 0 };
                let subrect_data = subrects.len() * if is_mono { 2 } else { bpp + 2 };
                let encoded_size = bg_overhead + fg_overhead + 1 + subrect_data;

                if subrects.is_empty() || subrects.len() > 255 || encoded_size > raw_size {
                    subencoding = HEXTILE_RAW;
                    buf.truncate(tile_start);
                    buf.put_u8(subencoding);
                    for &pixel in &tile_pixels {
                        write_pixel(&mut buf, pixel, format);
                    }
                    last_bg = None;
                    last_fg = None;
                    continue;
                }

                if Some(bg) != last_bg {
                    subencoding |= HEXTILE_BACKGROUND_SPECIFIED;
                    write_pixel(&mut buf, bg, format);
                    last_bg = Some(bg);
                }

                subencoding |= HEXTILE_ANY_SUBRECTS;

                if is_mono {
                    if Some(fg) != last_fg {
                        subencoding |= HEXTILE_FOREGROUND_SPECIFIED;
                        write_pixel(&mut buf, fg, format);
                        last_fg = Some(fg);
                    }
                    buf.put_u8(subrects.len() as u8);
                    for sr in subrects {
                        buf.put_u8(((sr.x as u8) << 4) | (sr.y as u8));
                        buf.put_u8((((sr.w - 1) as u8) << 4) | ((sr.h - 1) as u8));
                    }
                } else {
                    subencoding |= HEXTILE_SUBRECTS_COLOURED;
                    last_fg = None;
                    buf.put_u8(subrects.len() as u8);
                    for sr in subrects {
                        write_pixel(&mut buf, sr.color, format);
                        buf.put_u8(((sr.x as u8) << 4) | (sr.y as u8));
                        buf.put_u8((((sr.w - 1) as u8) << 4) | ((sr.h - 1) as u8));
                    }
                }
            }

            buf[tile_start] = subencoding;
        }
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_rect_encodes_single_background_only_once() {
        let format = PixelFormat::rgba32();
        let pixels = vec![42u32; 32 * 16];
        let buf = encode_hextile(&pixels, 32, 16, &format);
        // Two 16x16 tiles, each solid: first pays for BACKGROUND_SPECIFIED +
        // 4-byte pixel, second sees last_bg already set and pays 1 byte only.
        assert_eq!(buf.len(), (1 + 4) + 1);
    }

    #[test]
    fn raw_fallback_resets_carry_state() {
        let format = PixelFormat::rgba32();
        // A tile with every pixel distinct forces the raw fallback.
        let mut pixels = Vec::with_capacity(256);
        for i in 0..256u32 {
            pixels.push(i);
        }
        let buf = encode_hextile(&pixels, 16, 16, &format);
        assert_eq!(buf[0], HEXTILE_RAW);
        assert_eq!(buf.len(), 1 + 256 * 4);
    }
}
