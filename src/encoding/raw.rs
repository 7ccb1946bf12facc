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

//! VNC Raw encoding: pixel data sent directly, no compression.
//!
//! The fallback encoding when a client negotiates nothing else, or as the
//! per-tile fallback in Hextile when a tile's subrects cost more than the
//! tile's raw bytes.

use crate::palette::write_pixel;
use crate::protocol::PixelFormat;
use bytes::BytesMut;

/// Encodes `pixels` (already packed into `format`) as Raw pixel data.
pub fn encode_raw(pixels: &[u32], format: &PixelFormat) -> BytesMut {
    let mut buf = BytesMut::with_capacity(pixels.len() * format.bytes_per_pixel());
    for &p in pixels {
        write_pixel(&mut buf, p, format);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_length_matches_pixel_count_times_bpp() {
        let format = PixelFormat::rgba32();
        let pixels = vec![0u32; 10];
        let buf = encode_raw(&pixels, &format);
        assert_eq!(buf.len(), 10 * format.bytes_per_pixel());
    }
}
