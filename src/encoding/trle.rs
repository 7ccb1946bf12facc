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

//! VNC TRLE (Tiled Run-Length Encoding): 16x16 tiles, each one of Raw,
//! Solid, Packed Palette (optionally reusing the previous tile's palette),
//! or RLE (plain or palette-indexed).
//!
//! Grounded on `original_source/VNCEncodeTRLE.cpp`: header codes
//! `0=Raw, 1=Solid, 2=Packed, 127=PackedReused, 128=RLE, 129=RLEReused,
//! 130..=255=RLEPalette(code-128 colours)`; `canReuseColorsPalette`'s
//! subsequence check for palette reuse; candidate byte costs computed per
//! 256 pixels then scaled by `(len * cols * rows) >> 8` for partial edge
//! tiles; `emitPlainRLE = nColors > 127` (a tile with more than 127 distinct
//! colours cannot use a palette code at all).

use super::common::{build_ordered_palette, extract_tile};
use crate::palette::write_cpixel;
use crate::protocol::PixelFormat;
use bytes::{BufMut, BytesMut};

const TILE_SIZE: usize = 16;

const TILE_RAW: u8 = 0;
const TILE_SOLID: u8 = 1;
const TILE_PACKED: u8 = 2;
const TILE_PACKED_REUSED: u8 = 127;
const TILE_RLE: u8 = 128;
const TILE_RLE_REUSED: u8 = 129;

/// Packed-palette bit width for a palette of `n` colours, per
/// `VNCEncodeTRLE.cpp`'s `getDepth`: `<=2 -> 1, <=4 -> 2, <=16 -> 4, else 8`.
#[must_use]
fn depth_for_n_colors(n: usize) -> u8 {
    if n <= 2 {
        1
    } else if n <= 4 {
        2
    } else if n <= 16 {
        4
    } else {
        8
    }
}

/// Whether `next`'s palette can be encoded by reference to `prev`'s: `next`
/// must be a (order-preserving) subsequence of `prev`, and packing the two
/// palette sizes must need the same bit depth, per `canReuseColorsPalette`.
#[must_use]
fn can_reuse_palette(prev: &[u32], next: &[u32]) -> bool {
    if next.is_empty() || next.len() > prev.len() {
        return false;
    }
    if depth_for_n_colors(next.len()) != depth_for_n_colors(prev.len()) {
        return false;
    }
    let mut i = 0;
    for &c in prev {
        if i < next.len() && next[i] == c {
            i += 1;
        }
    }
    i == next.len()
}

/// Counts of same-colour runs (`runs`, length > 1) and isolated single
/// pixels (`singles`) in raster order — the two quantities TRLE's RLE cost
/// estimate needs.
fn analyze_runs(pixels: &[u32]) -> (usize, usize) {
    let (mut runs, mut singles) = (0, 0);
    let mut i = 0;
    while i < pixels.len() {
        let color = pixels[i];
        let mut run_len = 1;
        while i + run_len < pixels.len() && pixels[i + run_len] == color {
            run_len += 1;
        }
        if run_len == 1 {
            singles += 1;
        } else {
            runs += 1;
        }
        i += run_len;
    }
    (runs, singles)
}

fn write_varint_run_length(buf: &mut BytesMut, run_len: usize) {
    let mut remaining = run_len - 1;
    while remaining > 127 {
        buf.put_u8(0xFF);
        remaining -= 127;
    }
    buf.put_u8(remaining as u8);
}

/// Stateful TRLE encoder: carries the previous tile's ordered palette so
/// consecutive tiles within one rectangle can reuse it. A fresh encoder (or
/// [`TrleEncoder::reset`]) must be used at the start of each rectangle — TRLE
/// never reuses a palette across rectangles.
#[derive(Default)]
pub struct TrleEncoder {
    last_palette: Vec<u32>,
}

impl TrleEncoder {
    /// A fresh encoder with no carried palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears carried palette state.
    pub fn reset(&mut self) {
        self.last_palette.clear();
    }

    /// Encodes a `width` x `height` rectangle (already packed into `format`)
    /// as a sequence of TRLE tiles.
    pub fn encode(&mut self, pixels: &[u32], width: u16, height: u16, format: &PixelFormat) -> BytesMut {
        let mut buf = BytesMut::new();
        for tile_y in (0..height).step_by(TILE_SIZE) {
            for tile_x in (0..width).step_by(TILE_SIZE) {
                let cols = TILE_SIZE.min((width - tile_x) as usize);
                let rows = TILE_SIZE.min((height - tile_y) as usize);
                let tile = extract_tile(pixels, width as usize, tile_x as usize, tile_y as usize, cols, rows);
                self.encode_tile(&mut buf, &tile, cols, rows, format);
            }
        }
        buf
    }

    fn encode_tile(&mut self, buf: &mut BytesMut, pixels: &[u32], cols: usize, rows: usize, format: &PixelFormat) {
        let n_pixels = cols * rows;
        let cpixel = format.bytes_per_cpixel();

        if pixels.iter().all(|&p| p == pixels[0]) {
            buf.put_u8(TILE_SOLID);
            write_cpixel(buf, pixels[0], format);
            self.last_palette.clear();
            return;
        }

        let palette = build_ordered_palette(pixels);
        let n_colors = palette.len();
        let (runs, singles) = analyze_runs(pixels);
        let scale = |per_256: usize| (per_256 * n_pixels) >> 8;

        let raw_len = n_pixels * cpixel;
        let plain_rle_len = scale((cpixel + 1) * 256).max((cpixel + 1)) ;
        let plain_rle_len = plain_rle_len.min((cpixel + 1) * (runs + singles));

        let emit_plain_rle_only = n_colors > 127;

        let reuse = can_reuse_palette(&self.last_palette, &palette);
        let palette_cost = if reuse { 0 } else { cpixel * n_colors };

        let mut best_len = raw_len;
        let mut best_kind = TILE_RAW;

        if !emit_plain_rle_only {
            let packed_bits = depth_for_n_colors(n_colors);
            if n_colors <= 16 {
                let packed_len = palette_cost + (n_pixels * packed_bits as usize + 7) / 8;
                if packed_len < best_len {
                    best_len = packed_len;
                    best_kind = if reuse { TILE_PACKED_REUSED } else { TILE_PACKED };
                }
            }
            if n_colors <= 127 {
                let palette_rle_len = palette_cost + 2 * runs + singles;
                if palette_rle_len < best_len {
                    best_len = palette_rle_len;
                    best_kind = if reuse { TILE_RLE_REUSED } else { 128 + n_colors as u8 };
                }
            }
        }

        if plain_rle_len < best_len {
            best_len = plain_rle_len;
            best_kind = TILE_RLE;
        }
        let _ = best_len;

        match best_kind {
            TILE_RAW => {
                buf.put_u8(TILE_RAW);
                for &p in pixels {
                    write_cpixel(buf, p, format);
                }
                self.last_palette.clear();
            }
            TILE_RLE => {
                buf.put_u8(TILE_RLE);
                let mut i = 0;
                while i < pixels.len() {
                    let color = pixels[i];
                    let mut run_len = 1;
                    while i + run_len < pixels.len() && pixels[i + run_len] == color {
                        run_len += 1;
                    }
                    write_cpixel(buf, color, format);
                    write_varint_run_length(buf, run_len);
                    i += run_len;
                }
                self.last_palette.clear();
            }
            TILE_PACKED | TILE_PACKED_REUSED => {
                buf.put_u8(best_kind);
                if best_kind == TILE_PACKED {
                    for &c in &palette {
                        write_cpixel(buf, c, format);
                    }
                }
                let index_of: std::collections::HashMap<u32, u8> =
                    palette.iter().enumerate().map(|(i, &c)| (c, i as u8)).collect();
                let bits = depth_for_n_colors(n_colors);
                let mut packed_byte = 0u8;
                let mut bit_pos = 0u8;
                for &p in pixels {
                    let idx = index_of[&p];
                    let shift = 8 - bit_pos - bits;
                    packed_byte |= idx << shift;
                    bit_pos += bits;
                    if bit_pos >= 8 {
                        buf.put_u8(packed_byte);
                        packed_byte = 0;
                        bit_pos = 0;
                    }
                }
                if bit_pos > 0 {
                    buf.put_u8(packed_byte);
                }
                self.last_palette = palette;
            }
            TILE_RLE_REUSED => {
                buf.put_u8(TILE_RLE_REUSED);
                self.write_palette_rle_body(buf, pixels, &palette, format);
            }
            code => {
                // RLEPalette: code == 128 + n_colors
                buf.put_u8(code);
                for &c in &palette {
                    write_cpixel(buf, c, format);
                }
                self.write_palette_rle_body(buf, pixels, &palette, format);
                self.last_palette = palette;
            }
        }
    }

    fn write_palette_rle_body(&self, buf: &mut BytesMut, pixels: &[u32], palette: &[u32], _format: &PixelFormat) {
        let index_of: std::collections::HashMap<u32, u8> =
            palette.iter().enumerate().map(|(i, &c)| (c, i as u8)).collect();
        let mut i = 0;
        while i < pixels.len() {
            let color = pixels[i];
            let idx = index_of[&color];
            let mut run_len = 1;
            while i + run_len < pixels.len() && pixels[i + run_len] == color {
                run_len += 1;
            }
            if run_len == 1 {
                buf.put_u8(idx);
            } else {
                buf.put_u8(idx | 0x80);
                write_varint_run_length(buf, run_len);
            }
            i += run_len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_tile_emits_solid_code() {
        let mut enc = TrleEncoder::new();
        let format = PixelFormat::rgba32();
        let pixels = vec![0x112233u32; 256];
        let buf = enc.encode(&pixels, 16, 16, &format);
        assert_eq!(buf[0], TILE_SOLID);
        assert_eq!(buf.len(), 1 + format.bytes_per_cpixel());
    }

    #[test]
    fn two_colour_tile_prefers_palette_over_raw() {
        let mut enc = TrleEncoder::new();
        let format = PixelFormat::rgba32();
        let mut pixels = vec![1u32; 256];
        pixels[0] = 2;
        let buf = enc.encode(&pixels, 16, 16, &format);
        assert_ne!(buf[0], TILE_RAW);
    }

    #[test]
    fn palette_reuse_across_identical_tiles_omits_second_palette() {
        let mut enc = TrleEncoder::new();
        let format = PixelFormat::rgba32();
        let mut tile = vec![1u32; 256];
        for i in 0..8 {
            tile[i] = 2;
        }
        // Two tiles, side by side, identical palettes.
        let mut pixels = Vec::with_capacity(512);
        for _ in 0..16 {
            pixels.extend_from_slice(&tile[0..16]);
            pixels.extend_from_slice(&tile[0..16]);
        }
        let buf = enc.encode(&pixels, 32, 16, &format);
        // First tile's code must carry a palette (Packed or RLEPalette, not *Reused).
        assert!(buf[0] == TILE_PACKED || buf[0] >= 130);
    }

    #[test]
    fn many_colours_forces_plain_rle_or_raw() {
        let mut enc = TrleEncoder::new();
        let format = PixelFormat::rgba32();
        let pixels: Vec<u32> = (0..256u32).collect(); // 256 distinct colours
        let buf = enc.encode(&pixels, 16, 16, &format);
        assert!(buf[0] == TILE_RAW || buf[0] == TILE_RLE);
    }
}
