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

//! Update Scheduler: decides, once per tick, whether a `FramebufferUpdate`
//! is owed to the client and encodes it if so.
//!
//! Five steps, run in order every tick a [`crate::session::Session`] has a
//! pending request: snap the requested rect to tile-friendly boundaries,
//! resolve incremental vs full update, consult the dirty-region hasher,
//! defer (keeping the request latched) if nothing is ready yet, and finally
//! pick an encoder by priority and emit the update.

use bytes::{BufMut, BytesMut};

use crate::encoding::{cursor_fingerprint, encode_cursor, TileEncoder, CURSOR_SIZE, ENCODER_PRIORITY};
use crate::error::Result;
use crate::framebuffer::FrameBuffer;
use crate::hasher::HasherOutcome;
use crate::palette::{pack_true_colour, ColourMap};
use crate::protocol::{Rect, RectHeader, ENCODING_CURSOR, ENCODING_RAW, SERVER_MSG_FRAMEBUFFER_UPDATE};
use crate::session::Session;
use crate::translate::translate_rect;

/// Snaps `rect` to the boundaries the tile encoders expect: `x` rounds down
/// to an 8-pixel boundary (widening `w` by whatever was lost), `w` then
/// rounds up to a 16-pixel multiple, and the result is clipped to the
/// framebuffer's bounds.
#[must_use]
fn snap_rect(rect: Rect, fb_width: u16, fb_height: u16) -> Rect {
    let x = (rect.x / 8) * 8;
    let widened = rect.w + (rect.x - x);
    let w = widened.div_ceil(16) * 16;
    Rect { x, y: rect.y, w, h: rect.h }.intersect(&Rect::full(fb_width, fb_height))
}

/// Drives one [`Session`] through a single tick of the 5-step update
/// algorithm. Stateless itself; all state it reads and mutates lives on the
/// `Session` (negotiated format/encodings, the pending-request latch, the
/// dirty hasher, and the tile encoder).
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Creates a scheduler. Stateless — this only exists so call sites read
    /// like the other per-connection components.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs one tick. Returns the wire bytes of a `FramebufferUpdate`
    /// message when an update was owed and ready, or `None` if there was
    /// nothing pending, the dirty scan hasn't finished, or the dirty region
    /// doesn't intersect what the client asked for.
    ///
    /// Per the update ordering this crate honors: a `SetColourMapEntries`
    /// message is written directly to the socket first if the client's
    /// format is indexed and the host palette has moved since the last one
    /// sent, then the returned `FramebufferUpdate` carries an optional
    /// cursor rectangle (if the host cursor changed and the client
    /// negotiated the RichCursor pseudo-encoding) ahead of the tile rect.
    ///
    /// # Errors
    ///
    /// Returns `Err` if sending `SetColourMapEntries` fails.
    pub async fn on_tick(&mut self, session: &mut Session, fb: &dyn FrameBuffer) -> Result<Option<BytesMut>> {
        if !session.fb_update_pending {
            return Ok(None);
        }

        let client_rect = snap_rect(session.requested_rect, fb.width(), fb.height());

        let dirty = if session.incremental {
            let _ = session.hasher.request_scan();
            match session.hasher.tick(fb) {
                HasherOutcome::Dirty(rect) => rect,
                HasherOutcome::Busy | HasherOutcome::Pending => return Ok(None),
            }
        } else {
            Rect::full(fb.width(), fb.height())
        };

        let rect = dirty.intersect(&client_rect);
        if rect.is_empty() {
            session.fb_update_pending = false;
            return Ok(None);
        }

        if session.client_format.true_colour_flag == 0 {
            let generation = fb.palette_generation();
            if session.last_sent_palette_gen != Some(generation) {
                let mut map = ColourMap::new();
                for (i, (r, g, b)) in fb.palette().into_iter().enumerate() {
                    map.set(i, r, g, b);
                }
                session.send_colour_map(&map, 0).await?;
                session.last_sent_palette_gen = Some(generation);
            }
        }

        let cursor_rect = fb.cursor().and_then(|shape| {
            let fingerprint = cursor_fingerprint(&cursor_rows_to_bytes(&shape.bitmap), &cursor_rows_to_bytes(&shape.mask));
            let changed = fingerprint != session.cursor_fingerprint;
            session.cursor_fingerprint = fingerprint;
            if changed && session.client_encodings.contains(&ENCODING_CURSOR) {
                let fg = pack_true_colour(shape.fg.0, shape.fg.1, shape.fg.2, &session.client_format);
                let bg = pack_true_colour(shape.bg.0, shape.bg.1, shape.bg.2, &session.client_format);
                let body = encode_cursor(&shape.bitmap, &shape.mask, fg, bg, &session.client_format);
                let header = RectHeader {
                    rect: Rect { x: shape.hotspot_x, y: shape.hotspot_y, w: CURSOR_SIZE as u16, h: CURSOR_SIZE as u16 },
                    encoding: ENCODING_CURSOR,
                };
                Some((header, body))
            } else {
                None
            }
        });

        let encoding = ENCODER_PRIORITY
            .iter()
            .copied()
            .find(|candidate| session.client_encodings.contains(candidate))
            .unwrap_or(ENCODING_RAW);
        if session.tile_encoder.as_ref().map(TileEncoder::encoding_type) != Some(encoding) {
            session.tile_encoder = TileEncoder::for_encoding(encoding, session.config.compression_level);
        }

        let fb_format = fb.pixel_format();
        let mut raw = vec![0u8; rect.w as usize * rect.h as usize * fb_format.bytes_per_pixel()];
        fb.read_rect(rect, &mut raw);
        let pixels = translate_rect(&raw, &fb_format, &session.client_format);

        let Some(encoder) = session.tile_encoder.as_mut() else {
            return Ok(None);
        };
        let Ok(body) = encoder.encode(&pixels, rect.w, rect.h, &session.client_format) else {
            return Ok(None);
        };

        let num_rects = 1 + u16::from(cursor_rect.is_some());
        let mut out = BytesMut::with_capacity(4 + body.len());
        out.put_u8(SERVER_MSG_FRAMEBUFFER_UPDATE);
        out.put_u8(0); // padding
        out.put_u16(num_rects);
        if let Some((header, cursor_body)) = cursor_rect {
            header.write_to(&mut out);
            out.extend_from_slice(&cursor_body);
        }
        RectHeader { rect, encoding }.write_to(&mut out);
        out.extend_from_slice(&body);

        session.fb_update_pending = false;
        Ok(Some(out))
    }
}

/// Flattens a 16-row `u16` cursor bitmap/mask plane into big-endian bytes for
/// [`cursor_fingerprint`].
fn cursor_rows_to_bytes(rows: &[u16; CURSOR_SIZE]) -> [u8; CURSOR_SIZE * 2] {
    let mut out = [0u8; CURSOR_SIZE * 2];
    for (i, row) in rows.iter().enumerate() {
        let bytes = row.to_be_bytes();
        out[i * 2] = bytes[0];
        out[i * 2 + 1] = bytes[1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::framebuffer::TestFrameBuffer;
    use crate::framebuffer::CursorShape;
    use crate::protocol::{PixelFormat, SERVER_MSG_SET_COLOUR_MAP_ENTRIES, ENCODING_CURSOR, ENCODING_RAW, ENCODING_ZRLE};
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn snap_rect_rounds_x_down_and_width_up() {
        let snapped = snap_rect(Rect { x: 10, y: 3, w: 5, h: 8 }, 640, 480);
        assert_eq!(snapped.x, 8);
        assert_eq!(snapped.w, 16); // x lost 2, so 5+2=7 pixels needed, rounds up to 16
        assert_eq!(snapped.y, 3);
        assert_eq!(snapped.h, 8);
    }

    #[test]
    fn snap_rect_clips_to_framebuffer_bounds() {
        let snapped = snap_rect(Rect { x: 630, y: 0, w: 20, h: 10 }, 640, 480);
        assert_eq!(snapped.x, 624);
        assert!(snapped.x + snapped.w <= 640);
    }

    async fn test_session() -> (Session, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let config = ServerConfig::default();
        let session = Session::new(server, "127.0.0.1:0".parse().unwrap(), 1, config, 32, 32, 24, false);
        (session, client)
    }

    #[tokio::test]
    async fn no_pending_request_produces_no_update() {
        let (mut session, _client) = test_session().await;
        let fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        let mut scheduler = Scheduler::new();
        assert!(scheduler.on_tick(&mut session, &fb).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_update_request_encodes_raw_by_default() {
        let (mut session, _client) = test_session().await;
        session.fb_update_pending = true;
        session.incremental = false;
        session.requested_rect = Rect::full(32, 32);
        session.client_encodings = vec![ENCODING_RAW];
        session.client_format = PixelFormat::rgba32();

        let fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        let mut scheduler = Scheduler::new();
        let update = scheduler.on_tick(&mut session, &fb).await.unwrap().expect("update expected");

        assert_eq!(update[0], SERVER_MSG_FRAMEBUFFER_UPDATE);
        // header: 4-byte FramebufferUpdate prefix, then a 12-byte RectHeader
        // (x,y,w,h at +0/+2/+4/+6, encoding at +8).
        let encoding = i32::from_be_bytes([update[12], update[13], update[14], update[15]]);
        assert_eq!(encoding, ENCODING_RAW);
        assert!(!session.fb_update_pending);
    }

    #[tokio::test]
    async fn prefers_zrle_when_negotiated_over_raw() {
        let (mut session, _client) = test_session().await;
        session.fb_update_pending = true;
        session.incremental = false;
        session.requested_rect = Rect::full(32, 32);
        session.client_encodings = vec![ENCODING_RAW, ENCODING_ZRLE];
        session.client_format = PixelFormat::rgba32();

        let fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        let mut scheduler = Scheduler::new();
        let update = scheduler.on_tick(&mut session, &fb).await.unwrap().expect("update expected");
        let encoding = i32::from_be_bytes([update[12], update[13], update[14], update[15]]);
        assert_eq!(encoding, ENCODING_ZRLE);
    }

    #[tokio::test]
    async fn indexed_format_sends_colour_map_before_update() {
        let (mut session, mut client) = test_session().await;
        session.fb_update_pending = true;
        session.incremental = false;
        session.requested_rect = Rect::full(32, 32);
        session.client_encodings = vec![ENCODING_RAW];
        session.client_format = PixelFormat::server_default(24);

        let mut fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        fb.set_palette(vec![(0xFFFF, 0, 0), (0, 0xFFFF, 0)]);

        let mut scheduler = Scheduler::new();
        scheduler.on_tick(&mut session, &fb).await.unwrap();

        let mut header = [0u8; 6];
        client.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0], SERVER_MSG_SET_COLOUR_MAP_ENTRIES);
        assert_eq!(u16::from_be_bytes([header[2], header[3]]), 0); // first colour
        assert_eq!(u16::from_be_bytes([header[4], header[5]]), 2); // colour count
        assert_eq!(session.last_sent_palette_gen, Some(fb.palette_generation()));
    }

    #[tokio::test]
    async fn unchanged_palette_generation_is_not_resent() {
        let (mut session, _client) = test_session().await;
        session.client_format = PixelFormat::server_default(24);
        session.last_sent_palette_gen = Some(0);

        let fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32()); // palette_generation() == 0
        session.fb_update_pending = true;
        session.incremental = false;
        session.requested_rect = Rect::full(32, 32);
        session.client_encodings = vec![ENCODING_RAW];

        let mut scheduler = Scheduler::new();
        scheduler.on_tick(&mut session, &fb).await.unwrap();
        assert_eq!(session.last_sent_palette_gen, Some(0));
    }

    #[tokio::test]
    async fn cursor_change_adds_a_second_rect_ahead_of_the_tile_rect() {
        let (mut session, _client) = test_session().await;
        session.fb_update_pending = true;
        session.incremental = false;
        session.requested_rect = Rect::full(32, 32);
        session.client_encodings = vec![ENCODING_RAW, ENCODING_CURSOR];
        session.client_format = PixelFormat::rgba32();

        let mut fb = TestFrameBuffer::new(32, 32, PixelFormat::rgba32());
        fb.set_cursor(Some(CursorShape {
            bitmap: [0xFFFFu16; crate::encoding::CURSOR_SIZE],
            mask: [0u16; crate::encoding::CURSOR_SIZE],
            hotspot_x: 2,
            hotspot_y: 3,
            fg: (0xFFFF, 0xFFFF, 0xFFFF),
            bg: (0, 0, 0),
        }));

        let mut scheduler = Scheduler::new();
        let update = scheduler.on_tick(&mut session, &fb).await.unwrap().expect("update expected");
        let num_rects = u16::from_be_bytes([update[2], update[3]]);
        assert_eq!(num_rects, 2);
        // First RectHeader starts right after the 4-byte FramebufferUpdate
        // prefix; its encoding field is at header-relative offset +8.
        let first_encoding = i32::from_be_bytes([update[12], update[13], update[14], update[15]]);
        assert_eq!(first_encoding, ENCODING_CURSOR);

        // An unchanged cursor on the next tick isn't resent.
        session.fb_update_pending = true;
        session.requested_rect = Rect::full(32, 32);
        let update = scheduler.on_tick(&mut session, &fb).await.unwrap().expect("update expected");
        let num_rects = u16::from_be_bytes([update[2], update[3]]);
        assert_eq!(num_rects, 1);
    }
}
