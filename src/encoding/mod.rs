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

//! Tile encoders for framebuffer rectangles: Raw, Hextile, TRLE, and ZRLE,
//! plus the RichCursor pseudo-encoding and the shared palette/subrect
//! analysis helpers they build on.

use crate::error::Result;
use crate::protocol::{PixelFormat, ENCODING_HEXTILE, ENCODING_RAW, ENCODING_TRLE, ENCODING_ZRLE};
use bytes::BytesMut;

pub mod common;
pub mod cursor;
pub mod deflate;
pub mod hextile;
pub mod raw;
pub mod trle;
pub mod zrle;

pub use cursor::{cursor_fingerprint, encode_cursor, CURSOR_SIZE};
pub use hextile::encode_hextile;
pub use raw::encode_raw;
pub use trle::TrleEncoder;
pub use zrle::ZrleEncoder;

/// The encoders a client may negotiate, in the priority order the scheduler
/// prefers when more than one is acceptable: ZRLE compresses best, TRLE
/// without a zlib stream, Hextile for cheap incremental tiling, Raw as the
/// universal fallback.
pub const ENCODER_PRIORITY: &[i32] = &[ENCODING_ZRLE, ENCODING_TRLE, ENCODING_HEXTILE, ENCODING_RAW];

/// A tile encoder bound to one connection, holding whatever persistent state
/// (a palette carry for TRLE, a zlib stream for ZRLE) that encoding needs
/// across calls within (TRLE) or across (ZRLE) rectangles.
pub enum TileEncoder {
    /// No persistent state.
    Raw,
    /// No persistent state.
    Hextile,
    /// Carries the previous tile's palette for reuse within one rectangle.
    Trle(TrleEncoder),
    /// Carries a zlib stream for the lifetime of the connection.
    Zrle(ZrleEncoder),
}

impl TileEncoder {
    /// Builds the encoder for a negotiated RFB encoding constant, or `None`
    /// if it isn't one of the four this crate implements.
    #[must_use]
    pub fn for_encoding(encoding: i32, compression_level: u8) -> Option<Self> {
        match encoding {
            ENCODING_RAW => Some(Self::Raw),
            ENCODING_HEXTILE => Some(Self::Hextile),
            ENCODING_TRLE => Some(Self::Trle(TrleEncoder::new())),
            ENCODING_ZRLE => Some(Self::Zrle(ZrleEncoder::new(compression_level))),
            _ => None,
        }
    }

    /// Encodes a rectangle of pixels (already packed into `format`) into the
    /// RFB wire body for this encoding (the rectangle header is written by
    /// the caller).
    pub fn encode(&mut self, pixels: &[u32], width: u16, height: u16, format: &PixelFormat) -> Result<BytesMut> {
        match self {
            Self::Raw => Ok(encode_raw(pixels, format)),
            Self::Hextile => Ok(encode_hextile(pixels, width, height, format)),
            Self::Trle(enc) => {
                enc.reset();
                Ok(enc.encode(pixels, width, height, format))
            }
            Self::Zrle(enc) => enc.encode(pixels, width, height, format),
        }
    }

    /// The RFB encoding constant this instance implements.
    #[must_use]
    pub fn encoding_type(&self) -> i32 {
        match self {
            Self::Raw => ENCODING_RAW,
            Self::Hextile => ENCODING_HEXTILE,
            Self::Trle(_) => ENCODING_TRLE,
            Self::Zrle(_) => ENCODING_ZRLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_encoding_rejects_unsupported_constants() {
        assert!(TileEncoder::for_encoding(-239, 6).is_none()); // cursor pseudo-encoding, not a tile encoder
    }

    #[test]
    fn raw_encoder_round_trips_encoding_type() {
        let enc = TileEncoder::for_encoding(ENCODING_RAW, 6).unwrap();
        assert_eq!(enc.encoding_type(), ENCODING_RAW);
    }
}
