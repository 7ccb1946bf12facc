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

//! Helpers shared by the tile codecs (Hextile, TRLE, ZRLE): subrectangle
//! extraction and tile colour analysis over already-packed pixel words.
//!
//! Generalized from a hardcoded RGBA32 domain to operate on `u32` pixel
//! words already packed into the client's negotiated
//! [`crate::protocol::PixelFormat`] (see [`crate::translate::translate_rect`]).

use std::collections::HashMap;

/// A solid-colour subrectangle found within a tile (Hextile).
#[derive(Debug)]
pub struct Subrect {
    /// Packed pixel value of this subrectangle.
    pub color: u32,
    /// X offset within the tile.
    pub x: u16,
    /// Y offset within the tile.
    pub y: u16,
    /// Width in pixels.
    pub w: u16,
    /// Height in pixels.
    pub h: u16,
}

/// Extracts a `tw` x `th` tile from a `width`-wide pixel plane.
#[must_use]
pub fn extract_tile(pixels: &[u32], width: usize, x: usize, y: usize, tw: usize, th: usize) -> Vec<u32> {
    let mut tile = Vec::with_capacity(tw * th);
    for dy in 0..th {
        let row_start = (y + dy) * width + x;
        tile.extend_from_slice(&pixels[row_start..row_start + tw]);
    }
    tile
}

/// Most common colour in `pixels`.
#[must_use]
pub fn get_background_color(pixels: &[u32]) -> u32 {
    if pixels.is_empty() {
        return 0;
    }
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for &pixel in pixels {
        *counts.entry(pixel).or_insert(0) += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(color, _)| color).unwrap_or(pixels[0])
}

/// Greedy largest-rectangle subrect search: for each unmarked non-background
/// pixel (in raster order), grows both a horizontal-first and a
/// vertical-first candidate rectangle of the same colour and keeps whichever
/// covers more area.
#[must_use]
pub fn find_subrects(pixels: &[u32], width: usize, height: usize, bg_color: u32) -> Vec<Subrect> {
    let mut subrects = Vec::new();
    let mut marked = vec![false; pixels.len()];

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if marked[idx] || pixels[idx] == bg_color {
                continue;
            }

            let color = pixels[idx];

            // Find largest rectangle starting at (x, y)
            let mut max_w = 0;
            for test_x in x..width {
                let test_idx = y * width + test_x;
                if marked[test_idx] || pixels[test_idx] != color {
                    break;
                }
                max_w = test_x - x + 1;
            }

            let mut h = 1;
            'outer: for test_y in (y + 1)..height {
                for test_x in x..(x + max_w) {
                    let test_idx = test_y * width + test_x;
                    if marked[test_idx] || pixels[test_idx] != color {
                        break 'outer;
                    }
                }
                h = test_y - y + 1;
            }

            // Try horizontal vs vertical rectangle
            let mut best_w = max_w;
            let mut best_h = h;

            let mut max_h = 0;
            for test_y in y..height {
                let test_idx = test_y * width + x;
                if marked[test_idx] || pixels[test_idx] != color {
                    break;
                }
                max_h = test_y - y + 1;
            }

            let mut w2 = 1;
            'outer2: for test_x in (x + 1)..width {
                for test_y in y..(y + max_h) {
                    let test_idx = test_y * width + test_x;
                    if marked[test_idx] || pixels[test_idx] != color {
                        break 'outer2;
                    }
                }
                w2 = test_x - x + 1;
            }

            if w2 * max_h > best_w * best_h {
                best_w = w2;
                best_h = max_h;
            }

            for dy in 0..best_h {
                for dx in 0..best_w {
                    marked[(y + dy) * width + (x + dx)] = true;
                }
            }

            subrects.push(Subrect {
                color,
                x: x as u16,
                y: y as u16,
                w: best_w as u16,
                h: best_h as u16,
            });
        }
    }

    subrects
}

/// Classifies a tile's colour content: `(is_solid, is_mono, bg, fg)`.
/// `is_mono` tiles use `bg`/`fg` as their two colours; multicolour tiles
/// leave `fg` at 0 (unused — callers fall back to [`find_subrects`]).
#[must_use]
pub fn analyze_tile_colors(pixels: &[u32]) -> (bool, bool, u32, u32) {
    if pixels.is_empty() {
        return (true, true, 0, 0);
    }

    let mut colors: HashMap<u32, usize> = HashMap::new();
    for &pixel in pixels {
        *colors.entry(pixel).or_insert(0) += 1;
    }

    if colors.len() == 1 {
        return (true, true, pixels[0], 0);
    }

    if colors.len() == 2 {
        let mut sorted: Vec<_> = colors.into_iter().collect();
        sorted.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
        return (false, true, sorted[0].0, sorted[1].0);
    }

    let bg = get_background_color(pixels);
    (false, false, bg, 0)
}

/// Builds an order-preserving palette (first-seen order, not frequency
/// order). TRLE's `canReuseColorsPalette` check depends on a stable ordering
/// across tiles, which a frequency-sorted palette cannot provide.
#[must_use]
pub fn build_ordered_palette(pixels: &[u32]) -> Vec<u32> {
    let mut seen = HashMap::new();
    let mut palette = Vec::new();
    for &pixel in pixels {
        if seen.insert(pixel, ()).is_none() {
            palette.push(pixel);
        }
    }
    palette
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_solid_tile() {
        let pixels = vec![7u32; 16];
        let (solid, mono, bg, _fg) = analyze_tile_colors(&pixels);
        assert!(solid && mono);
        assert_eq!(bg, 7);
    }

    #[test]
    fn analyze_mono_tile() {
        let pixels = vec![1, 1, 1, 2, 2, 1, 1, 1];
        let (solid, mono, bg, fg) = analyze_tile_colors(&pixels);
        assert!(!solid && mono);
        assert_eq!(bg, 1);
        assert_eq!(fg, 2);
    }

    #[test]
    fn find_subrects_covers_all_non_background_pixels() {
        #[rustfmt::skip]
        let pixels = vec![
            0, 0, 0, 0,
            0, 9, 9, 0,
            0, 9, 9, 0,
            0, 0, 0, 0,
        ];
        let subrects = find_subrects(&pixels, 4, 4, 0);
        let total: usize = subrects.iter().map(|s| s.w as usize * s.h as usize).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn ordered_palette_preserves_first_seen_order() {
        let pixels = vec![5, 3, 5, 8, 3];
        assert_eq!(build_ordered_palette(&pixels), vec![5, 3, 8]);
    }
}
