//! Events surfaced by a running session to its embedder.

use std::net::SocketAddr;

/// Events emitted by the VNC server core.
///
/// `KeyEvent`/`PointerEvent` carry already-decoded input (see [`crate::input`]
/// for the keysym/scancode translation); this crate stops at producing the
/// event, injecting it into a host OS is outside its scope.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A client has connected.
    ClientConnected {
        /// Unique client identifier.
        id: usize,
        /// Client's socket address.
        address: SocketAddr,
    },

    /// A client has disconnected.
    ClientDisconnected {
        /// Unique client identifier.
        id: usize,
    },

    /// Pointer movement or button event from a client.
    PointerEvent {
        /// Client identifier.
        client_id: usize,
        /// X coordinate.
        x: u16,
        /// Y coordinate.
        y: u16,
        /// Button mask (bit 0 = left, bit 1 = middle, bit 2 = right).
        button_mask: u8,
    },

    /// Key press or release event from a client, after scancode translation.
    KeyEvent {
        /// Client identifier.
        client_id: usize,
        /// Original X11 keysym as received on the wire.
        keysym: u32,
        /// Translated scancode, when the keysym is recognized.
        scancode: Option<u8>,
        /// True if pressed, false if released.
        pressed: bool,
    },

    /// Clipboard text received from a client.
    ClipboardReceived {
        /// Client identifier.
        client_id: usize,
        /// Clipboard text content.
        text: String,
    },
}
