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

//! VNC (DES) authentication: a 16-byte random challenge encrypted by the
//! client with its password as a DES key, per RFB's `VNC Authentication`
//! security type.
//!
//! The password is used as an 8-byte DES key with each byte's bits reversed
//! before use — a quirk of the original RFB implementation that every
//! RFB-compliant client and server still has to reproduce.

use cipher::{BlockEncrypt, KeyInit};
use des::Des;
use rand::RngCore;

/// Length of the server's random challenge, and of the client's encrypted
/// response.
pub const CHALLENGE_LEN: usize = 16;

/// Pads/truncates a password to the 8 bytes RFB's DES key needs, with each
/// byte's bits reversed (the VNC-specific quirk every compliant
/// implementation reproduces).
fn des_key_from_password(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (i, &b) in password.as_bytes().iter().take(8).enumerate() {
        key[i] = b;
    }
    for byte in &mut key {
        *byte = byte.reverse_bits();
    }
    key
}

/// Encrypts `challenge` (two 8-byte DES-ECB blocks) with `password`'s
/// derived key, matching what a correct VNC client does to produce its
/// response.
#[must_use]
pub fn encrypt_challenge(challenge: &[u8; CHALLENGE_LEN], password: &str) -> [u8; CHALLENGE_LEN] {
    let cipher = Des::new_from_slice(&des_key_from_password(password)).expect("DES key is always 8 bytes");
    let mut result = *challenge;
    let (block0, block1) = result.split_at_mut(8);
    cipher.encrypt_block(block0.into());
    cipher.encrypt_block(block1.into());
    result
}

/// Server-side VNC authentication state for one connection: holds the
/// password to check against and generates/verifies one challenge.
pub struct VncAuth {
    password: String,
}

impl VncAuth {
    /// Creates an authenticator for `password`. A `None` password means the
    /// caller should not offer the VNC Authentication security type at all
    /// (checked by [`crate::session::Session`], not here).
    #[must_use]
    pub fn new(password: String) -> Self {
        Self { password }
    }

    /// Generates a fresh random 16-byte challenge to send to the client.
    #[must_use]
    pub fn generate_challenge(&self) -> [u8; CHALLENGE_LEN] {
        let mut challenge = [0u8; CHALLENGE_LEN];
        rand::thread_rng().fill_bytes(&mut challenge);
        challenge
    }

    /// Checks whether `response` is the correct DES encryption of
    /// `challenge` under this authenticator's password.
    #[must_use]
    pub fn verify_response(&self, response: &[u8; CHALLENGE_LEN], challenge: &[u8; CHALLENGE_LEN]) -> bool {
        encrypt_challenge(challenge, &self.password) == *response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_verifies() {
        let auth = VncAuth::new("secret12".into());
        let challenge = [7u8; CHALLENGE_LEN];
        let response = encrypt_challenge(&challenge, "secret12");
        assert!(auth.verify_response(&response, &challenge));
    }

    #[test]
    fn wrong_password_fails() {
        let auth = VncAuth::new("secret12".into());
        let challenge = [7u8; CHALLENGE_LEN];
        let response = encrypt_challenge(&challenge, "wrongpass");
        assert!(!auth.verify_response(&response, &challenge));
    }

    #[test]
    fn password_longer_than_eight_bytes_is_truncated() {
        let challenge = [1u8; CHALLENGE_LEN];
        let a = encrypt_challenge(&challenge, "12345678tail-ignored");
        let b = encrypt_challenge(&challenge, "12345678");
        assert_eq!(a, b);
    }
}
