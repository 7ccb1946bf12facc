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

//! VNC Remote Framebuffer (RFB) protocol constants and structures.
//!
//! This module provides the fundamental building blocks for VNC protocol communication:
//! protocol version negotiation, message types, security handshakes, encodings, and
//! pixel format definitions, per RFC 6143.
//!
//! # Protocol Overview
//!
//! The VNC RFB protocol operates in the following phases:
//! 1. **Protocol Version** - Server and client agree on protocol version
//! 2. **Security Handshake** - Authentication method selection and execution
//! 3. **Initialization** - Exchange of framebuffer parameters and capabilities
//! 4. **Normal Operation** - Ongoing message exchange for input events and screen updates

use bytes::{Buf, BufMut, BytesMut};
use std::io;

/// The RFB protocol version string advertised by the server.
///
/// RFB 3.7 (falls back to 3.3 when the client's version string is older).
pub const PROTOCOL_VERSION: &str = "RFB 003.007\n";

// Client-to-Server Message Types

/// Message type: Client requests to change the pixel format.
pub const CLIENT_MSG_SET_PIXEL_FORMAT: u8 = 0;

/// Message type: Client specifies supported encodings, ordered by preference.
pub const CLIENT_MSG_SET_ENCODINGS: u8 = 2;

/// Message type: Client requests a framebuffer update.
pub const CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST: u8 = 3;

/// Message type: Client sends a keyboard event.
pub const CLIENT_MSG_KEY_EVENT: u8 = 4;

/// Message type: Client sends a pointer (mouse) event.
pub const CLIENT_MSG_POINTER_EVENT: u8 = 5;

/// Message type: Client sends cut text (clipboard data).
pub const CLIENT_MSG_CLIENT_CUT_TEXT: u8 = 6;

// Server-to-Client Message Types

/// Message type: Server sends a framebuffer update.
pub const SERVER_MSG_FRAMEBUFFER_UPDATE: u8 = 0;

/// Message type: Server sets colour map entries (indexed pixel formats only).
pub const SERVER_MSG_SET_COLOUR_MAP_ENTRIES: u8 = 1;

/// Message type: Server sends a bell (beep) notification.
#[allow(dead_code)]
pub const SERVER_MSG_BELL: u8 = 2;

/// Message type: Server sends cut text (clipboard data).
#[allow(dead_code)]
pub const SERVER_MSG_SERVER_CUT_TEXT: u8 = 3;

// Encoding Types (the set this crate implements; see SPEC_FULL.md §1 Non-goals
// for what was deliberately left out — Tight, ZYWRLE, CopyRect, and friends)

/// Encoding type: Raw pixel data.
pub const ENCODING_RAW: i32 = 0;

/// Encoding type: Hextile. Divides rectangles into 16x16 tiles.
pub const ENCODING_HEXTILE: i32 = 5;

/// Encoding type: Tile Run-Length Encoding. 16x16 tiles with palette/RLE.
pub const ENCODING_TRLE: i32 = 15;

/// Encoding type: Zlib-compressed TRLE. 64x64 tiles, single persistent deflate stream.
pub const ENCODING_ZRLE: i32 = 16;

/// Pseudo-encoding: Rich Cursor. Server sends cursor shape and hotspot.
pub const ENCODING_CURSOR: i32 = -239;

// Hextile subencoding flags

/// Hextile: Raw pixel data for this tile.
pub const HEXTILE_RAW: u8 = 1 << 0;

/// Hextile: Background color is specified.
pub const HEXTILE_BACKGROUND_SPECIFIED: u8 = 1 << 1;

/// Hextile: Foreground color is specified.
pub const HEXTILE_FOREGROUND_SPECIFIED: u8 = 1 << 2;

/// Hextile: Tile contains subrectangles.
pub const HEXTILE_ANY_SUBRECTS: u8 = 1 << 3;

/// Hextile: Subrectangles are colored (not monochrome).
pub const HEXTILE_SUBRECTS_COLOURED: u8 = 1 << 4;

// Security Types

/// Security type: Invalid/Unknown.
#[allow(dead_code)]
pub const SECURITY_TYPE_INVALID: u8 = 0;

/// Security type: None (no authentication).
pub const SECURITY_TYPE_NONE: u8 = 1;

/// Security type: VNC Authentication (DES challenge-response).
pub const SECURITY_TYPE_VNC_AUTH: u8 = 2;

// Security Results

/// Security result: Authentication successful.
pub const SECURITY_RESULT_OK: u32 = 0;

/// Security result: Authentication failed.
pub const SECURITY_RESULT_FAILED: u32 = 1;

/// A rectangular region, always in framebuffer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// X coordinate of the top-left corner.
    pub x: u16,
    /// Y coordinate of the top-left corner.
    pub y: u16,
    /// Width in pixels.
    pub w: u16,
    /// Height in pixels.
    pub h: u16,
}

impl Rect {
    /// A rect covering the whole framebuffer.
    #[must_use]
    pub fn full(width: u16, height: u16) -> Self {
        Self { x: 0, y: 0, w: width, h: height }
    }

    /// Whether this rect has zero area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// The smallest rect containing both `self` and `other`. An empty operand
    /// is absorbed rather than widening the result, matching
    /// `VNCScreenHash`'s `unionRect` semantics.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = (self.x as u32 + self.w as u32).max(other.x as u32 + other.w as u32);
        let y1 = (self.y as u32 + self.h as u32).max(other.y as u32 + other.h as u32);
        Rect { x: x0, y: y0, w: (x1 - x0 as u32) as u16, h: (y1 - y0 as u32) as u16 }
    }

    /// The overlap between `self` and `other`, or an empty rect at `(0, 0)`
    /// if they don't overlap.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect { x: 0, y: 0, w: 0, h: 0 };
        }
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x as u32 + self.w as u32).min(other.x as u32 + other.w as u32);
        let y1 = (self.y as u32 + self.h as u32).min(other.y as u32 + other.h as u32);
        if u32::from(x0) >= x1 || u32::from(y0) >= y1 {
            return Rect { x: 0, y: 0, w: 0, h: 0 };
        }
        Rect { x: x0, y: y0, w: (x1 - u32::from(x0)) as u16, h: (y1 - u32::from(y0)) as u16 }
    }
}

/// Represents the pixel format of a VNC framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Number of bits per pixel (8, 16, or 32).
    pub bits_per_pixel: u8,
    /// Depth of the pixel in bits.
    pub depth: u8,
    /// 1 if pixel data is big-endian, 0 if little-endian.
    pub big_endian_flag: u8,
    /// 1 if true-colour, 0 if colour-mapped (indexed).
    pub true_colour_flag: u8,
    /// Maximum red color value.
    pub red_max: u16,
    /// Maximum green color value.
    pub green_max: u16,
    /// Maximum blue color value.
    pub blue_max: u16,
    /// Shift to apply for the red color component.
    pub red_shift: u8,
    /// Shift to apply for the green color component.
    pub green_shift: u8,
    /// Shift to apply for the blue color component.
    pub blue_shift: u8,
}

impl PixelFormat {
    /// The default pixel format a `ServerInit` advertises per RFB 3.7: 8bpp
    /// indexed BGR233-shaped (3-3-2), big-endian, depth matching the host's
    /// native depth.
    #[must_use]
    pub fn server_default(native_depth: u8) -> Self {
        Self {
            bits_per_pixel: 8,
            depth: native_depth,
            big_endian_flag: 1,
            true_colour_flag: 0,
            red_max: 7,
            green_max: 7,
            blue_max: 3,
            red_shift: 5,
            green_shift: 2,
            blue_shift: 0,
        }
    }

    /// A standard 32-bit true-colour pixel format, little-endian, 8 bits per
    /// channel (R at byte 0, G at byte 1, B at byte 2). Useful as a
    /// framebuffer-side native format for adapters.
    #[must_use]
    pub fn rgba32() -> Self {
        Self {
            bits_per_pixel: 32,
            depth: 24,
            big_endian_flag: 0,
            true_colour_flag: 1,
            red_max: 255,
            green_max: 255,
            blue_max: 255,
            red_shift: 0,
            green_shift: 8,
            blue_shift: 16,
        }
    }

    /// Whether this format can be represented with a 3-byte CPIXEL: true
    /// colour, 32bpp, depth at most 24, and the used bytes form a contiguous
    /// 24-bit span at either the top or bottom of the pixel word.
    #[must_use]
    pub fn uses_cpixel(&self) -> bool {
        if self.true_colour_flag == 0 || self.bits_per_pixel != 32 || self.depth > 24 {
            return false;
        }
        let max_shift = self.red_shift.max(self.green_shift).max(self.blue_shift);
        let min_shift = self.red_shift.min(self.green_shift).min(self.blue_shift);
        max_shift < 24 || min_shift >= 8
    }

    /// Number of bytes a CPIXEL occupies for this format: 3 when
    /// [`Self::uses_cpixel`], else the same as a full pixel.
    #[must_use]
    pub fn bytes_per_cpixel(&self) -> usize {
        if self.uses_cpixel() {
            3
        } else {
            self.bytes_per_pixel()
        }
    }

    /// Number of bytes a full pixel occupies.
    #[must_use]
    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    /// Validates that this pixel format is structurally sound.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if ![8, 16, 32].contains(&self.bits_per_pixel) {
            return false;
        }
        if self.depth == 0 || self.depth > 32 {
            return false;
        }
        if self.true_colour_flag == 0 && self.bits_per_pixel != 8 {
            return false;
        }
        true
    }

    /// Serializes the pixel format into the RFB wire layout (16 bytes).
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.bits_per_pixel);
        buf.put_u8(self.depth);
        buf.put_u8(self.big_endian_flag);
        buf.put_u8(self.true_colour_flag);
        buf.put_u16(self.red_max);
        buf.put_u16(self.green_max);
        buf.put_u16(self.blue_max);
        buf.put_u8(self.red_shift);
        buf.put_u8(self.green_shift);
        buf.put_u8(self.blue_shift);
        buf.put_bytes(0, 3); // padding
    }

    /// Reads a pixel format from the RFB wire layout.
    ///
    /// # Errors
    ///
    /// Returns `Err` if fewer than 16 bytes remain in `buf`.
    pub fn from_bytes(buf: &mut BytesMut) -> io::Result<Self> {
        if buf.len() < 16 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes for PixelFormat"));
        }
        let pf = Self {
            bits_per_pixel: buf.get_u8(),
            depth: buf.get_u8(),
            big_endian_flag: buf.get_u8(),
            true_colour_flag: buf.get_u8(),
            red_max: buf.get_u16(),
            green_max: buf.get_u16(),
            blue_max: buf.get_u16(),
            red_shift: buf.get_u8(),
            green_shift: buf.get_u8(),
            blue_shift: buf.get_u8(),
        };
        buf.advance(3);
        Ok(pf)
    }
}

/// The `ServerInit` message sent once security negotiation is complete.
#[derive(Debug, Clone)]
pub struct ServerInit {
    /// Framebuffer width in pixels.
    pub framebuffer_width: u16,
    /// Framebuffer height in pixels.
    pub framebuffer_height: u16,
    /// Initial pixel format.
    pub pixel_format: PixelFormat,
    /// Desktop name.
    pub name: String,
}

impl ServerInit {
    /// Serializes the `ServerInit` message.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.framebuffer_width);
        buf.put_u16(self.framebuffer_height);
        self.pixel_format.write_to(buf);
        let name_bytes = self.name.as_bytes();
        buf.put_u32(name_bytes.len() as u32);
        buf.put_slice(name_bytes);
    }
}

/// All client-to-server message types this crate understands.
#[derive(Debug)]
pub enum ClientMessage {
    /// Client requests a specific pixel format for framebuffer updates.
    SetPixelFormat(PixelFormat),
    /// Client specifies the list of encodings it supports, by preference.
    SetEncodings(Vec<i32>),
    /// Client requests a framebuffer update for a specific region.
    FramebufferUpdateRequest {
        /// If true, only send changes since the last update.
        incremental: bool,
        /// Requested region.
        rect: Rect,
    },
    /// Client sends a keyboard key event.
    KeyEvent {
        /// True if the key is pressed, false if released.
        down: bool,
        /// X11 keysym value.
        key: u32,
    },
    /// Client sends a pointer (mouse) event.
    PointerEvent {
        /// Bitmask of currently pressed mouse buttons.
        button_mask: u8,
        /// X coordinate of the pointer.
        x: u16,
        /// Y coordinate of the pointer.
        y: u16,
    },
    /// Client sends clipboard (cut text) data.
    ClientCutText(String),
}

impl ClientMessage {
    /// Attempts to parse one message from the front of `buf`, consuming it
    /// only if a complete message is present — buffering incomplete reads
    /// rather than erroring, matching the teacher's `handle_messages`
    /// `if buf.len() < N { break }` pattern.
    ///
    /// # Errors
    ///
    /// Returns `Err` for a message type this crate doesn't understand, or a
    /// `SetPixelFormat` payload that fails [`PixelFormat::is_valid`].
    pub fn try_parse(buf: &mut BytesMut) -> io::Result<Option<Self>> {
        if buf.is_empty() {
            return Ok(None);
        }
        let msg_type = buf[0];
        match msg_type {
            CLIENT_MSG_SET_PIXEL_FORMAT => {
                if buf.len() < 20 {
                    return Ok(None);
                }
                buf.advance(4);
                let format = PixelFormat::from_bytes(buf)?;
                if !format.is_valid() {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid pixel format requested"));
                }
                Ok(Some(Self::SetPixelFormat(format)))
            }
            CLIENT_MSG_SET_ENCODINGS => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                let count = u16::from_be_bytes([buf[2], buf[3]]) as usize;
                let total = 4 + count * 4;
                if buf.len() < total {
                    return Ok(None);
                }
                buf.advance(4);
                let mut encodings = Vec::with_capacity(count);
                for _ in 0..count {
                    encodings.push(buf.get_i32());
                }
                Ok(Some(Self::SetEncodings(encodings)))
            }
            CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                buf.advance(1);
                let incremental = buf.get_u8() != 0;
                let x = buf.get_u16();
                let y = buf.get_u16();
                let w = buf.get_u16();
                let h = buf.get_u16();
                Ok(Some(Self::FramebufferUpdateRequest { incremental, rect: Rect { x, y, w, h } }))
            }
            CLIENT_MSG_KEY_EVENT => {
                if buf.len() < 8 {
                    return Ok(None);
                }
                buf.advance(1);
                let down = buf.get_u8() != 0;
                buf.advance(2);
                let key = buf.get_u32();
                Ok(Some(Self::KeyEvent { down, key }))
            }
            CLIENT_MSG_POINTER_EVENT => {
                if buf.len() < 6 {
                    return Ok(None);
                }
                buf.advance(1);
                let button_mask = buf.get_u8();
                let x = buf.get_u16();
                let y = buf.get_u16();
                Ok(Some(Self::PointerEvent { button_mask, x, y }))
            }
            CLIENT_MSG_CLIENT_CUT_TEXT => {
                if buf.len() < 8 {
                    return Ok(None);
                }
                let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
                const MAX_CUT_TEXT: usize = 10 * 1024 * 1024;
                if length > MAX_CUT_TEXT {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "cut text too large"));
                }
                if buf.len() < 8 + length {
                    return Ok(None);
                }
                buf.advance(8);
                let text_bytes = buf.split_to(length);
                let text = String::from_utf8(text_bytes.to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(Self::ClientCutText(text)))
            }
            other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unknown client message type: {other}"))),
        }
    }
}

/// A rectangle header within a `FramebufferUpdate` message.
#[derive(Debug)]
pub struct RectHeader {
    /// Rectangle geometry.
    pub rect: Rect,
    /// Encoding type used for the pixel data that follows.
    pub encoding: i32,
}

impl RectHeader {
    /// Writes the 12-byte rectangle header.
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u16(self.rect.x);
        buf.put_u16(self.rect.y);
        buf.put_u16(self.rect.w);
        buf.put_u16(self.rect.h);
        buf.put_i32(self.encoding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_round_trip() {
        let pf = PixelFormat::rgba32();
        let mut buf = BytesMut::new();
        pf.write_to(&mut buf);
        assert_eq!(buf.len(), 16);
        let read = PixelFormat::from_bytes(&mut buf).unwrap();
        assert_eq!(pf, read);
    }

    #[test]
    fn server_default_matches_rfb_3_7_defaults() {
        let pf = PixelFormat::server_default(16);
        assert_eq!(pf.bits_per_pixel, 8);
        assert_eq!(pf.big_endian_flag, 1);
        assert_eq!(pf.true_colour_flag, 0);
        assert_eq!(pf.red_max, 7);
        assert_eq!(pf.green_max, 7);
        assert_eq!(pf.blue_max, 3);
        assert_eq!(pf.red_shift, 5);
        assert_eq!(pf.green_shift, 2);
        assert_eq!(pf.blue_shift, 0);
    }

    #[test]
    fn rgba32_uses_cpixel() {
        assert!(PixelFormat::rgba32().uses_cpixel());
        assert_eq!(PixelFormat::rgba32().bytes_per_cpixel(), 3);
    }

    #[test]
    fn server_default_does_not_use_cpixel() {
        assert!(!PixelFormat::server_default(8).uses_cpixel());
    }

    #[test]
    fn rect_union_absorbs_empty() {
        let a = Rect { x: 10, y: 10, w: 0, h: 0 };
        let b = Rect { x: 5, y: 5, w: 20, h: 20 };
        assert_eq!(a.union(&b), b);
        assert_eq!(b.union(&a), b);
    }

    #[test]
    fn rect_intersect_clips_to_overlap() {
        let a = Rect { x: 0, y: 0, w: 10, h: 10 };
        let b = Rect { x: 5, y: 5, w: 10, h: 10 };
        assert_eq!(a.intersect(&b), Rect { x: 5, y: 5, w: 5, h: 5 });
    }

    #[test]
    fn rect_intersect_of_disjoint_rects_is_empty() {
        let a = Rect { x: 0, y: 0, w: 4, h: 4 };
        let b = Rect { x: 10, y: 10, w: 4, h: 4 };
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn rect_union_grows_bounding_box() {
        let a = Rect { x: 0, y: 0, w: 10, h: 10 };
        let b = Rect { x: 5, y: 5, w: 10, h: 10 };
        let u = a.union(&b);
        assert_eq!(u, Rect { x: 0, y: 0, w: 15, h: 15 });
    }

    #[test]
    fn try_parse_waits_for_a_complete_message() {
        let mut buf = BytesMut::new();
        buf.put_u8(CLIENT_MSG_POINTER_EVENT);
        buf.put_u8(0); // button_mask
        buf.put_u16(10); // x, missing y
        assert!(ClientMessage::try_parse(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4); // nothing consumed
    }

    #[test]
    fn try_parse_decodes_framebuffer_update_request() {
        let mut buf = BytesMut::new();
        buf.put_u8(CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
        buf.put_u8(1);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(100);
        buf.put_u16(50);
        let msg = ClientMessage::try_parse(&mut buf).unwrap().unwrap();
        match msg {
            ClientMessage::FramebufferUpdateRequest { incremental, rect } => {
                assert!(incremental);
                assert_eq!(rect, Rect { x: 0, y: 0, w: 100, h: 50 });
            }
            _ => panic!("wrong variant"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn try_parse_rejects_unknown_message_type() {
        let mut buf = BytesMut::new();
        buf.put_u8(255);
        assert!(ClientMessage::try_parse(&mut buf).is_err());
    }
}
