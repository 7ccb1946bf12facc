//! Server configuration.
//!
//! Loading this from disk, environment variables, or a CLI is the embedder's
//! job; this crate only defines the shape of the knobs it reads.

use std::time::Duration;

/// Configuration accepted by [`crate::server::VncServer::start`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Desktop name advertised in `ServerInit`.
    pub desktop_name: String,
    /// VNC authentication password. `None` offers `SECURITY_TYPE_NONE` only.
    pub password: Option<String>,
    /// How often a session's scheduler tick runs when driven internally.
    pub tick_interval: Duration,
    /// Deflate compression level used for the ZRLE stage (0-9).
    pub compression_level: u8,
    /// How long the server waits for a client to complete the handshake.
    pub handshake_timeout: Duration,
    /// If a client closes the connection during `ServerInit` once, force VNC
    /// authentication on the next connection attempt regardless of
    /// `password`. Mirrors a workaround for clients that probe unauthenticated
    /// access before retrying with credentials. See `DESIGN.md` for the
    /// history behind this default.
    pub force_auth_after_early_close: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: crate::DEFAULT_PORT,
            desktop_name: "Rust VNC Server".to_string(),
            password: None,
            tick_interval: Duration::from_millis(16),
            compression_level: 6,
            handshake_timeout: Duration::from_secs(10),
            force_auth_after_early_close: true,
        }
    }
}
