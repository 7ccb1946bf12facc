//! Error types for the VNC server core.

use std::io;
use thiserror::Error;

/// Result type for VNC operations.
pub type Result<T> = std::result::Result<T, VncError>;

/// Errors that can occur while running an RFB session.
///
/// The four variants mirror the kinds a Session's caller needs to react to
/// differently: a `Transport` failure or `Protocol` violation ends the
/// connection, a `Resource` failure is retried on the next tick, and
/// `InternalAssertion` indicates a bug in this crate rather than a hostile or
/// confused client.
#[derive(Debug, Error)]
pub enum VncError {
    /// The underlying socket failed (read/write/connect).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The client sent a message that violates the RFB wire format or the
    /// negotiated session state (e.g. a message type not valid for the
    /// current handshake phase).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A transient resource limit was hit (e.g. the deflate stream's output
    /// buffer needed growing, or a tick found no framebuffer available yet).
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// An invariant this crate relies on did not hold. Seeing this means a
    /// programming error, not a client or network fault.
    #[error("internal assertion failed: {0}")]
    InternalAssertion(String),
}

impl VncError {
    /// True for errors that should end the connection outright.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, VncError::Transport(_) | VncError::Protocol(_) | VncError::InternalAssertion(_))
    }
}

impl Clone for VncError {
    /// `io::Error` isn't `Clone`; `Transport` is reconstructed from its kind
    /// and message, which loses the OS error code but keeps the kind and
    /// text `last_error()` callers need.
    fn clone(&self) -> Self {
        match self {
            VncError::Transport(e) => VncError::Transport(io::Error::new(e.kind(), e.to_string())),
            VncError::Protocol(s) => VncError::Protocol(s.clone()),
            VncError::Resource(s) => VncError::Resource(s.clone()),
            VncError::InternalAssertion(s) => VncError::InternalAssertion(s.clone()),
        }
    }
}
