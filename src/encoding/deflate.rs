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

//! A persistent zlib deflate stream for ZRLE.
//!
//! RFC 6143 requires ZRLE rectangles within one connection to share a single
//! zlib stream (state carries across rectangles, unlike Tight's per-stream
//! resets) — so a [`DeflateStage`] is owned by the session for the lifetime
//! of the connection, not recreated per rectangle.

use crate::error::{Result, VncError};
use bytes::{BufMut, BytesMut};
use flate2::{Compress, Compression, FlushCompress, Status};

/// Conservative per-call output buffer; grown (by looping) if a single
/// rectangle's compressed output exceeds it.
const CHUNK_SIZE: usize = 65536;

/// A persistent zlib compressor plus the 4-byte big-endian length prefix
/// ZRLE wraps its compressed payload in.
pub struct DeflateStage {
    compress: Compress,
}

impl DeflateStage {
    /// Creates a stream at the given compression level (0-9).
    #[must_use]
    pub fn new(level: u8) -> Self {
        Self { compress: Compress::new(Compression::new(u32::from(level.min(9))), true) }
    }

    /// Compresses `input` with `Z_SYNC_FLUSH` (so the receiver can decode the
    /// rectangle without waiting for more data) and returns the 4-byte
    /// length-prefixed result ZRLE's wire format expects.
    pub fn compress(&mut self, input: &[u8]) -> Result<BytesMut> {
        let mut compressed = Vec::new();
        let mut output_buf = vec![0u8; CHUNK_SIZE];

        let before_in = self.compress.total_in();
        let before_out = self.compress.total_out();
        let mut input_pos = 0;

        loop {
            let status = self.compress.compress(&input[input_pos..], &mut output_buf, FlushCompress::Sync)?;

            let consumed = (self.compress.total_in() - before_in) as usize - input_pos;
            let produced = (self.compress.total_out() - before_out) as usize - compressed.len();
            if produced > 0 {
                compressed.extend_from_slice(&output_buf[..produced]);
            }
            input_pos += consumed;

            match status {
                Status::StreamEnd => break,
                Status::BufError => {
                    return Err(VncError::InternalAssertion("zlib compressor stalled with no progress".into()))
                }
                Status::Ok if input_pos >= input.len() && produced == 0 && consumed == 0 => break,
                Status::Ok => {}
            }
        }

        let mut result = BytesMut::with_capacity(4 + compressed.len());
        result.put_u32(compressed.len() as u32);
        result.extend_from_slice(&compressed);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_output_carries_a_length_prefix() {
        let mut stage = DeflateStage::new(6);
        let out = stage.compress(b"hello world hello world hello world").unwrap();
        let declared_len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(declared_len, out.len() - 4);
    }

    #[test]
    fn stream_state_persists_across_calls() {
        let mut stage = DeflateStage::new(6);
        let first = stage.compress(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        let second = stage.compress(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap();
        // A fresh stream would compress the repeated identical input to the same
        // size; a persistent stream's second call benefits from the first call's
        // dictionary and should not be larger.
        assert!(second.len() <= first.len());
    }
}
