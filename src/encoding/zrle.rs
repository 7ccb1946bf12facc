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

//! VNC ZRLE (Zlib Run-Length Encoding): the framebuffer region is tiled into
//! 64x64 blocks, each tile chooses the cheapest of Raw / Solid / Packed
//! Palette / Plain RLE / Packed Palette RLE, and the concatenated tile
//! stream is compressed as one chunk through a connection-lifetime
//! [`DeflateStage`].
//!
//! Unlike TRLE, ZRLE tiles never reuse a palette from a neighbouring tile —
//! zlib's own back-reference window already captures that redundancy.

use super::common::build_ordered_palette;
use super::deflate::DeflateStage;
use crate::error::Result;
use crate::palette::write_cpixel;
use crate::protocol::PixelFormat;
use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

const TILE_SIZE: usize = 64;

fn extract_tile(pixels: &[u32], width: usize, x: usize, y: usize, tw: usize, th: usize) -> Vec<u32> {
    let mut tile = Vec::with_capacity(tw * th);
    for dy in 0..th {
        let row_start = (y + dy) * width + x;
        tile.extend_from_slice(&pixels[row_start..row_start + tw]);
    }
    tile
}

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

fn encode_tile(buf: &mut BytesMut, pixels: &[u32], cols: usize, rows: usize, format: &PixelFormat) {
    let n_pixels = cols * rows;
    let cpixel = format.bytes_per_cpixel();

    if pixels.iter().all(|&p| p == pixels[0]) {
        buf.put_u8(1); // Solid
        write_cpixel(buf, pixels[0], format);
        return;
    }

    let palette = build_ordered_palette(pixels);
    let n_colors = palette.len();
    let (runs, singles) = analyze_runs(pixels);

    let raw_len = n_pixels * cpixel;
    let plain_rle_len = (cpixel + 1) * (runs + singles);

    let mut best_len = raw_len;
    // 0 = raw, 1..=127 = packed palette of that size, 128 = plain RLE,
    // 129..=255 = packed palette RLE of (code-128) colours.
    let mut best_code: u16 = 0;

    if plain_rle_len < best_len {
        best_len = plain_rle_len;
        best_code = 128;
    }

    if n_colors < 128 {
        let palette_rle_len = cpixel * n_colors + 2 * runs + singles;
        if palette_rle_len < best_len {
            best_len = palette_rle_len;
            best_code = 128 + n_colors as u16;
        }
    }

    if n_colors < 17 {
        let bits = match n_colors {
            2 => 1,
            3..=4 => 2,
            _ => 4,
        };
        let packed_len = cpixel * n_colors + (n_pixels * bits + 7) / 8;
        if packed_len < best_len {
            best_len = packed_len;
            best_code = n_colors as u16;
        }
    }
    let _ = best_len;

    match best_code {
        0 => {
            buf.put_u8(0);
            for &p in pixels {
                write_cpixel(buf, p, format);
            }
        }
        128 => {
            buf.put_u8(128);
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
        }
        code if code >= 129 => {
            buf.put_u8(code as u8);
            for &c in &palette {
                write_cpixel(buf, c, format);
            }
            let index_of: HashMap<u32, u8> = palette.iter().enumerate().map(|(i, &c)| (c, i as u8)).collect();
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
        code => {
            // Packed palette, no RLE.
            buf.put_u8(code as u8);
            for &c in &palette {
                write_cpixel(buf, c, format);
            }
            let index_of: HashMap<u32, u8> = palette.iter().enumerate().map(|(i, &c)| (c, i as u8)).collect();
            let bits = match code {
                2 => 1,
                3..=4 => 2,
                _ => 4,
            };
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
        }
    }
}

/// Tiles a rectangle into the raw ZRLE sub-encoding stream, ahead of
/// compression. Exposed for [`ZrleEncoder::encode`] and for tests that want
/// to inspect the pre-compression byte stream.
fn tile_stream(pixels: &[u32], width: u16, height: u16, format: &PixelFormat) -> BytesMut {
    let mut stream = BytesMut::new();
    let (width, height) = (width as usize, height as usize);
    for y in (0..height).step_by(TILE_SIZE) {
        for x in (0..width).step_by(TILE_SIZE) {
            let cols = TILE_SIZE.min(width - x);
            let rows = TILE_SIZE.min(height - y);
            let tile = extract_tile(pixels, width, x, y, cols, rows);
            encode_tile(&mut stream, &tile, cols, rows, format);
        }
    }
    stream
}

/// A ZRLE encoder bound to one connection's persistent deflate stream.
pub struct ZrleEncoder {
    deflate: DeflateStage,
}

impl ZrleEncoder {
    /// Creates an encoder with a fresh zlib stream at `compression_level`
    /// (0-9). Must be reused for the lifetime of the connection — ZRLE's
    /// compression state is not per-rectangle.
    #[must_use]
    pub fn new(compression_level: u8) -> Self {
        Self { deflate: DeflateStage::new(compression_level) }
    }

    /// Encodes a `width` x `height` rectangle (already packed into `format`)
    /// as ZRLE: tile, concatenate, then compress through the persistent
    /// stream. The returned bytes are the full rectangle body (4-byte length
    /// prefix followed by compressed data).
    pub fn encode(&mut self, pixels: &[u32], width: u16, height: u16, format: &PixelFormat) -> Result<BytesMut> {
        let stream = tile_stream(pixels, width, height, format);
        self.deflate.compress(&stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_rect_produces_single_solid_tile() {
        let format = PixelFormat::rgba32();
        let pixels = vec![7u32; 64 * 64];
        let stream = tile_stream(&pixels, 64, 64, &format);
        assert_eq!(stream[0], 1);
        assert_eq!(stream.len(), 1 + format.bytes_per_cpixel());
    }

    #[test]
    fn partial_edge_tile_is_sized_correctly() {
        let format = PixelFormat::rgba32();
        // 65 wide forces a second, 1-pixel-wide column of tiles.
        let pixels = vec![3u32; 65 * 64];
        let stream = tile_stream(&pixels, 65, 64, &format);
        // Both tiles solid: two 1-byte opcode + cpixel pairs.
        assert_eq!(stream.len(), 2 * (1 + format.bytes_per_cpixel()));
    }

    #[test]
    fn compressed_rectangle_carries_length_prefix() {
        let format = PixelFormat::rgba32();
        let pixels = vec![9u32; 64 * 64];
        let mut enc = ZrleEncoder::new(6);
        let out = enc.encode(&pixels, 64, 64, &format).unwrap();
        let declared_len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(declared_len, out.len() - 4);
    }
}
