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

//! Session state machine: RFB handshake, message dispatch, and the
//! per-connection state the [`crate::scheduler::Scheduler`] reads and
//! mutates every tick.
//!
//! Grounded on the teacher's `VncClient::new`/`handle_messages` continuation
//! chain (version exchange -> security negotiation -> DES challenge/response
//! -> `ClientInit`/`ServerInit` -> message loop), restructured from one
//! all-in-one constructor and loop into explicit state held on `Session` so a
//! caller can drive it from a `tokio::select!` loop one readiness event at a
//! time instead.

use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::auth::{VncAuth, CHALLENGE_LEN};
use crate::config::ServerConfig;
use crate::encoding::TileEncoder;
use crate::error::{Result, VncError};
use crate::events::ServerEvent;
use crate::hasher::DirtyHasher;
use crate::input::Modifiers;
use crate::palette::ColourMap;
use crate::protocol::{
    ClientMessage, PixelFormat, Rect, ServerInit, PROTOCOL_VERSION, SECURITY_RESULT_FAILED,
    SECURITY_RESULT_OK, SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH, SERVER_MSG_SET_COLOUR_MAP_ENTRIES,
};

/// Where a [`Session`] is in the RFB handshake/message state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Protocol version string has not been exchanged yet.
    Handshake,
    /// Version exchanged; negotiating a security type.
    Security,
    /// Security type chosen; running its challenge/response (if any).
    Authenticating,
    /// Authenticated; waiting for `ClientInit`, about to send `ServerInit`.
    ClientInit,
    /// Handshake complete; dispatching `ClientMessage`s and emitting updates.
    Running,
    /// The connection has ended, cleanly or otherwise.
    Closed,
}

/// Authentication resolved for one connection from [`ServerConfig::password`].
enum AuthState {
    /// No password configured: `SECURITY_TYPE_NONE` only.
    None,
    /// VNC (DES challenge-response) authentication available.
    Vnc(VncAuth),
}

/// One RFB connection: handshake progress, negotiated pixel format and
/// encodings, and the scheduling state the Update Scheduler consults and
/// updates every tick.
///
/// Fields the scheduler reads/writes are `pub(crate)`; the handshake and
/// socket plumbing stay private to this module.
pub struct Session {
    state: ConnState,
    stream: TcpStream,
    peer_addr: SocketAddr,
    client_id: usize,
    read_buf: BytesMut,
    auth: AuthState,
    force_auth: bool,
    modifiers: Modifiers,
    fb_width: u16,
    fb_height: u16,
    native_depth: u8,

    pub(crate) config: ServerConfig,
    pub(crate) client_format: PixelFormat,
    pub(crate) client_encodings: Vec<i32>,
    pub(crate) fb_update_pending: bool,
    pub(crate) incremental: bool,
    pub(crate) requested_rect: Rect,
    pub(crate) cursor_fingerprint: u64,
    pub(crate) last_sent_palette_gen: Option<u64>,
    pub(crate) tile_encoder: Option<TileEncoder>,
    pub(crate) hasher: DirtyHasher,
}

impl Session {
    /// Creates a session for a freshly-accepted socket. The handshake has not
    /// run yet; call [`Session::run_handshake`] before anything else.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stream: TcpStream,
        peer_addr: SocketAddr,
        client_id: usize,
        config: ServerConfig,
        fb_width: u16,
        fb_height: u16,
        native_depth: u8,
        force_auth: bool,
    ) -> Self {
        let auth = match config.password.clone() {
            Some(password) => AuthState::Vnc(VncAuth::new(password)),
            None => AuthState::None,
        };
        let hasher = DirtyHasher::new(fb_width, fb_height);
        Self {
            state: ConnState::Handshake,
            stream,
            peer_addr,
            client_id,
            read_buf: BytesMut::with_capacity(4096),
            auth,
            force_auth,
            modifiers: Modifiers::default(),
            fb_width,
            fb_height,
            native_depth,
            client_format: PixelFormat::server_default(native_depth),
            client_encodings: Vec::new(),
            fb_update_pending: false,
            incremental: false,
            requested_rect: Rect::full(fb_width, fb_height),
            cursor_fingerprint: 0,
            last_sent_palette_gen: None,
            tile_encoder: None,
            hasher,
            config,
        }
    }

    /// Current handshake/dispatch state.
    #[must_use]
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// The client's address, for logging.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// This session's client identifier, carried on every [`ServerEvent`] it
    /// emits.
    #[must_use]
    pub fn client_id(&self) -> usize {
        self.client_id
    }

    /// Security types offered to the client: `SECURITY_TYPE_NONE` only when
    /// no password is configured; both `NONE` and `VNC_AUTH` when a password
    /// is configured but `force_auth` hasn't been set by an earlier
    /// connection's early close; `VNC_AUTH` only once it has.
    fn offered_security_types(&self) -> Vec<u8> {
        match &self.auth {
            AuthState::None => vec![SECURITY_TYPE_NONE],
            AuthState::Vnc(_) if self.force_auth => vec![SECURITY_TYPE_VNC_AUTH],
            AuthState::Vnc(_) => vec![SECURITY_TYPE_NONE, SECURITY_TYPE_VNC_AUTH],
        }
    }

    /// Runs the full handshake: protocol version exchange (falling back to
    /// the RFB 3.3 unilateral security-type scheme for older clients),
    /// security negotiation, authentication, and `ClientInit`/`ServerInit`.
    ///
    /// # Errors
    ///
    /// Returns `Err` on any I/O failure, a malformed version string, an
    /// unoffered security type choice, or a failed VNC authentication
    /// attempt. In every error case the connection should be closed by the
    /// caller; `state()` is left at whatever phase failed rather than
    /// advanced to `Running`.
    pub async fn run_handshake(&mut self) -> Result<()> {
        self.state = ConnState::Handshake;
        self.send_bytes(PROTOCOL_VERSION.as_bytes()).await?;

        let mut client_version = [0u8; 12];
        self.stream.read_exact(&mut client_version).await.map_err(VncError::Transport)?;
        let legacy_3_3 = is_legacy_3_3(&client_version);

        self.state = ConnState::Security;
        let offered = self.offered_security_types();
        let chosen = if legacy_3_3 {
            // RFB 3.3: the server picks unilaterally and sends a single u32,
            // no client response. Prefer the strongest type available.
            let chosen = *offered.iter().max().unwrap_or(&SECURITY_TYPE_NONE);
            let mut buf = BytesMut::with_capacity(4);
            buf.put_u32(u32::from(chosen));
            self.send_bytes(&buf).await?;
            chosen
        } else {
            let mut buf = BytesMut::with_capacity(1 + offered.len());
            buf.put_u8(offered.len() as u8);
            buf.extend_from_slice(&offered);
            self.send_bytes(&buf).await?;

            let mut chosen_buf = [0u8; 1];
            self.stream.read_exact(&mut chosen_buf).await.map_err(VncError::Transport)?;
            let chosen = chosen_buf[0];
            if !offered.contains(&chosen) {
                return Err(VncError::Protocol(format!("client chose unoffered security type {chosen}")));
            }
            chosen
        };

        self.run_security(chosen).await?;

        self.state = ConnState::ClientInit;
        let mut shared = [0u8; 1];
        self.stream.read_exact(&mut shared).await.map_err(VncError::Transport)?;

        let server_init = ServerInit {
            framebuffer_width: self.fb_width,
            framebuffer_height: self.fb_height,
            pixel_format: PixelFormat::server_default(self.native_depth),
            name: self.config.desktop_name.clone(),
        };
        let mut buf = BytesMut::new();
        server_init.write_to(&mut buf);
        self.send_bytes(&buf).await?;
        self.client_format = server_init.pixel_format;

        self.state = ConnState::Running;
        info!("client {} ({}) completed handshake", self.client_id, self.peer_addr);
        Ok(())
    }

    async fn run_security(&mut self, chosen: u8) -> Result<()> {
        self.state = ConnState::Authenticating;
        match chosen {
            SECURITY_TYPE_NONE => {
                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(SECURITY_RESULT_OK);
                self.send_bytes(&buf).await?;
                Ok(())
            }
            SECURITY_TYPE_VNC_AUTH => {
                let AuthState::Vnc(auth) = &self.auth else {
                    return Err(VncError::InternalAssertion(
                        "VNC authentication chosen without a configured password".into(),
                    ));
                };
                let challenge = auth.generate_challenge();
                self.send_bytes(&challenge).await?;

                let mut response = [0u8; CHALLENGE_LEN];
                self.stream.read_exact(&mut response).await.map_err(VncError::Transport)?;
                let ok = auth.verify_response(&response, &challenge);

                let mut buf = BytesMut::with_capacity(4);
                buf.put_u32(if ok { SECURITY_RESULT_OK } else { SECURITY_RESULT_FAILED });
                self.send_bytes(&buf).await?;

                if ok {
                    Ok(())
                } else {
                    warn!("client {} ({}) failed VNC authentication", self.client_id, self.peer_addr);
                    self.state = ConnState::Closed;
                    Err(VncError::Protocol("VNC authentication failed".into()))
                }
            }
            other => Err(VncError::Protocol(format!("unsupported security type {other}"))),
        }
    }

    /// Reads one batch of available bytes from the socket and dispatches
    /// every complete `ClientMessage` found, returning the `ServerEvent`s
    /// produced. Call this from the `readable()` arm of the driving
    /// `select!` loop; incomplete trailing messages stay buffered for the
    /// next call.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the socket read fails or returns EOF (the client
    /// closed the connection), or if a message fails to parse.
    pub async fn on_readable(&mut self) -> Result<Vec<ServerEvent>> {
        let mut chunk = [0u8; 4096];
        let n = match self.stream.try_read(&mut chunk) {
            Ok(0) => {
                self.state = ConnState::Closed;
                return Err(VncError::Transport(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by client")));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(VncError::Transport(e)),
        };
        self.read_buf.extend_from_slice(&chunk[..n]);

        let mut events = Vec::new();
        while let Some(msg) = ClientMessage::try_parse(&mut self.read_buf).map_err(VncError::Transport)? {
            self.handle_message(msg, &mut events);
        }
        Ok(events)
    }

    fn handle_message(&mut self, msg: ClientMessage, events: &mut Vec<ServerEvent>) {
        match msg {
            ClientMessage::SetPixelFormat(format) => {
                debug!("client {}: SetPixelFormat {:?}", self.client_id, format);
                self.client_format = format;
                self.tile_encoder = None; // format changed, current encoder's state is stale
                self.last_sent_palette_gen = None; // force a resend if the new format is indexed
            }
            ClientMessage::SetEncodings(encodings) => {
                debug!("client {}: SetEncodings {:?}", self.client_id, encodings);
                self.client_encodings = encodings;
            }
            ClientMessage::FramebufferUpdateRequest { incremental, rect } => {
                debug!("client {}: FramebufferUpdateRequest incremental={} rect={:?}", self.client_id, incremental, rect);
                self.incremental = incremental;
                self.requested_rect = rect;
                self.fb_update_pending = true;
            }
            ClientMessage::KeyEvent { down, key } => {
                let is_modifier = self.modifiers.track(key, down);
                self.modifiers.rewrite_ctrl_alt_meta();
                if !is_modifier {
                    let scancode = crate::input::keysym_to_scancode(key);
                    events.push(ServerEvent::KeyEvent { client_id: self.client_id, keysym: key, scancode, pressed: down });
                }
            }
            ClientMessage::PointerEvent { button_mask, x, y } => {
                events.push(ServerEvent::PointerEvent { client_id: self.client_id, x, y, button_mask });
            }
            ClientMessage::ClientCutText(text) => {
                events.push(ServerEvent::ClipboardReceived { client_id: self.client_id, text });
            }
        }
    }

    /// Writes a pre-assembled wire message (a `FramebufferUpdate` built by
    /// the [`crate::scheduler::Scheduler`], or any other server-to-client
    /// message) to the socket.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying write fails.
    pub async fn send_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf).await.map_err(VncError::Transport)
    }

    /// Sends a `SetColourMapEntries` message for indexed (non-true-colour)
    /// pixel formats.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the underlying write fails.
    pub async fn send_colour_map(&mut self, map: &ColourMap, first_colour: u16) -> Result<()> {
        let mut buf = BytesMut::new();
        buf.put_u8(SERVER_MSG_SET_COLOUR_MAP_ENTRIES);
        buf.put_u8(0); // padding
        map.write_to(&mut buf, first_colour);
        self.send_bytes(&buf).await
    }
}

/// Whether the client's 12-byte `"RFB 0MM.mmm\n"` version string is older
/// than 3.7 and therefore needs the RFB 3.3 unilateral security handshake.
fn is_legacy_3_3(version: &[u8; 12]) -> bool {
    let s = String::from_utf8_lossy(version);
    let parse = |range: std::ops::Range<usize>| s.get(range).and_then(|p| p.parse::<u32>().ok());
    let major = parse(4..7).unwrap_or(3);
    let minor = parse(8..11).unwrap_or(3);
    major < 3 || (major == 3 && minor < 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    #[test]
    fn legacy_version_detected_below_3_7() {
        assert!(is_legacy_3_3(b"RFB 003.003\n"));
        assert!(is_legacy_3_3(b"RFB 003.006\n"));
        assert!(!is_legacy_3_3(b"RFB 003.007\n"));
        assert!(!is_legacy_3_3(b"RFB 003.008\n"));
    }

    #[tokio::test]
    async fn handshake_with_no_password_completes_unauthenticated() {
        let (server_sock, mut client_sock) = loopback_pair().await;
        let config = ServerConfig { password: None, ..ServerConfig::default() };
        let mut session = Session::new(server_sock, "127.0.0.1:0".parse().unwrap(), 1, config, 800, 600, 24, false);

        let handshake = tokio::spawn(async move {
            session.run_handshake().await.unwrap();
            session
        });

        let mut version = [0u8; 12];
        client_sock.read_exact(&mut version).await.unwrap();
        assert_eq!(&version, PROTOCOL_VERSION.as_bytes());
        client_sock.write_all(PROTOCOL_VERSION.as_bytes()).await.unwrap();

        let mut sec_header = [0u8; 2]; // count=1, NONE
        client_sock.read_exact(&mut sec_header).await.unwrap();
        assert_eq!(sec_header, [1, SECURITY_TYPE_NONE]);
        client_sock.write_all(&[SECURITY_TYPE_NONE]).await.unwrap();

        let mut result = [0u8; 4];
        client_sock.read_exact(&mut result).await.unwrap();
        assert_eq!(u32::from_be_bytes(result), SECURITY_RESULT_OK);

        client_sock.write_all(&[0]).await.unwrap(); // ClientInit: not shared

        let mut init_prefix = [0u8; 4];
        client_sock.read_exact(&mut init_prefix).await.unwrap();
        assert_eq!(u16::from_be_bytes([init_prefix[0], init_prefix[1]]), 800);
        assert_eq!(u16::from_be_bytes([init_prefix[2], init_prefix[3]]), 600);

        let session = handshake.await.unwrap();
        assert_eq!(session.state(), ConnState::Running);
    }

    #[tokio::test]
    async fn force_auth_strips_none_from_offered_types() {
        let (server_sock, mut client_sock) = loopback_pair().await;
        let config = ServerConfig { password: Some("hunter2".into()), ..ServerConfig::default() };
        let mut session = Session::new(server_sock, "127.0.0.1:0".parse().unwrap(), 1, config, 800, 600, 24, true);

        let handshake = tokio::spawn(async move {
            let _ = session.run_handshake().await;
        });

        let mut version = [0u8; 12];
        client_sock.read_exact(&mut version).await.unwrap();
        client_sock.write_all(PROTOCOL_VERSION.as_bytes()).await.unwrap();

        let mut sec_header = [0u8; 2];
        client_sock.read_exact(&mut sec_header).await.unwrap();
        assert_eq!(sec_header, [1, SECURITY_TYPE_VNC_AUTH]);

        drop(client_sock);
        let _ = handshake.await;
    }

    #[tokio::test]
    async fn framebuffer_update_request_latches_pending_flag() {
        let (server_sock, mut client_sock) = loopback_pair().await;
        let config = ServerConfig::default();
        let mut session = Session::new(server_sock, "127.0.0.1:0".parse().unwrap(), 1, config, 800, 600, 24, false);
        session.state = ConnState::Running;

        let mut req = BytesMut::new();
        req.put_u8(crate::protocol::CLIENT_MSG_FRAMEBUFFER_UPDATE_REQUEST);
        req.put_u8(1);
        req.put_u16(0);
        req.put_u16(0);
        req.put_u16(800);
        req.put_u16(600);
        client_sock.write_all(&req).await.unwrap();

        // Give the write a moment to land in the server socket's buffer, then drive one read.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let events = session.on_readable().await.unwrap();
        assert!(events.is_empty());
        assert!(session.fb_update_pending);
        assert!(session.incremental);
    }
}
