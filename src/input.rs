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

//! X-keysym translation for `KeyEvent` messages.
//!
//! The teacher surfaces raw `KeyEvent { key, pressed }` with no scancode
//! translation at all. Grounded on `nickcrabtree-tigervnc`'s `platform-input`
//! crate, which keeps its X11 keysym table as plain `const` values — the same
//! shape, run in reverse (keysym to scancode rather than virtual-key to
//! keysym).

/// A small, common subset of X11 keysyms a VNC client may send.
#[allow(non_upper_case_globals, missing_docs)]
pub mod keysyms {
    pub const XK_BackSpace: u32 = 0xff08;
    pub const XK_Tab: u32 = 0xff09;
    pub const XK_Return: u32 = 0xff0d;
    pub const XK_Escape: u32 = 0xff1b;
    pub const XK_Delete: u32 = 0xffff;
    pub const XK_Shift_L: u32 = 0xffe1;
    pub const XK_Shift_R: u32 = 0xffe2;
    pub const XK_Control_L: u32 = 0xffe3;
    pub const XK_Control_R: u32 = 0xffe4;
    pub const XK_Alt_L: u32 = 0xffe9;
    pub const XK_Alt_R: u32 = 0xffea;
    pub const XK_Super_L: u32 = 0xffeb;
    pub const XK_Super_R: u32 = 0xffec;
}
use keysyms::*;

/// PC scancode (set 1, make code) for a handful of non-printable keys a host
/// input-injection backend commonly needs.
const XK_LEFT: u32 = 0xff51;
const XK_UP: u32 = 0xff52;
const XK_RIGHT: u32 = 0xff53;
const XK_DOWN: u32 = 0xff54;

/// Maps an X11 keysym to a PC scancode, where this crate has one. ASCII
/// printable keysyms (`0x20..=0x7e`) equal their own keysym value, so callers
/// needing the character rather than a scancode should check that range
/// directly rather than go through this table.
#[must_use]
pub fn keysym_to_scancode(keysym: u32) -> Option<u8> {
    match keysym {
        XK_BackSpace => Some(0x0E),
        XK_Tab => Some(0x0F),
        XK_Return => Some(0x1C),
        XK_Escape => Some(0x01),
        XK_Delete => Some(0x53),
        XK_Shift_L => Some(0x2A),
        XK_Shift_R => Some(0x36),
        XK_Control_L => Some(0x1D),
        XK_Control_R => Some(0x1D),
        XK_Alt_L => Some(0x38),
        XK_Alt_R => Some(0x38),
        XK_Super_L | XK_Super_R => Some(0x5B),
        XK_LEFT => Some(0x4B),
        XK_UP => Some(0x48),
        XK_RIGHT => Some(0x4D),
        XK_DOWN => Some(0x50),
        0x20..=0x7e => Some(keysym as u8),
        _ => None,
    }
}

/// Which of Ctrl/Alt/Meta are currently held, tracked by the session from the
/// stream of `KeyEvent`s so a Ctrl+Alt chord can be rewritten to Meta before
/// it's surfaced — some host input backends bind Ctrl+Alt to a
/// window-manager action a remote user should instead be able to send as a
/// plain Meta chord.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    /// Left or right Ctrl held.
    pub ctrl: bool,
    /// Left or right Alt held.
    pub alt: bool,
    /// Left or right Super/Meta held.
    pub meta: bool,
}

impl Modifiers {
    /// Updates modifier state for one `KeyEvent`, returning whether this
    /// keysym is itself a modifier (so the caller need not additionally
    /// surface it as a regular key).
    pub fn track(&mut self, keysym: u32, pressed: bool) -> bool {
        match keysym {
            XK_Control_L | XK_Control_R => {
                self.ctrl = pressed;
                true
            }
            XK_Alt_L | XK_Alt_R => {
                self.alt = pressed;
                true
            }
            XK_Super_L | XK_Super_R => {
                self.meta = pressed;
                true
            }
            _ => false,
        }
    }

    /// Rewrites a Ctrl+Alt chord to Meta: if both are held when this is
    /// called, clears them and sets `meta` instead.
    pub fn rewrite_ctrl_alt_meta(&mut self) {
        if self.ctrl && self.alt {
            self.ctrl = false;
            self.alt = false;
            self.meta = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_keysym_maps_to_itself() {
        assert_eq!(keysym_to_scancode('a' as u32), Some(b'a'));
    }

    #[test]
    fn unknown_keysym_returns_none() {
        assert_eq!(keysym_to_scancode(0xDEAD), None);
    }

    #[test]
    fn ctrl_alt_chord_rewrites_to_meta() {
        let mut mods = Modifiers::default();
        mods.track(XK_Control_L, true);
        mods.track(XK_Alt_L, true);
        mods.rewrite_ctrl_alt_meta();
        assert!(mods.meta && !mods.ctrl && !mods.alt);
    }

    #[test]
    fn modifier_keysym_reported_as_tracked() {
        let mut mods = Modifiers::default();
        assert!(mods.track(XK_Shift_L, true));
        assert!(!mods.track('a' as u32, true));
    }
}
