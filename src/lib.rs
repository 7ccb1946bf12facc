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

//! # rfb-core
//!
//! An RFB (Remote Framebuffer, RFC 6143) server core: the handshake and
//! authentication state machine, a dirty-region scheduler, and the Raw,
//! Hextile, TRLE and ZRLE tile encoders. This crate never owns a
//! framebuffer or an input device — an embedder supplies both.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfb_core::{FrameBuffer, PixelFormat, Rect, ServerConfig, VncServer};
//!
//! struct MyFb;
//! impl FrameBuffer for MyFb {
//!     fn width(&self) -> u16 { 1920 }
//!     fn height(&self) -> u16 { 1080 }
//!     fn pixel_format(&self) -> PixelFormat { PixelFormat::rgba32() }
//!     fn read_rect(&self, _rect: Rect, _out: &mut [u8]) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig { desktop_name: "example".into(), ..ServerConfig::default() };
//!     let (server, mut events) = VncServer::start(config, Arc::new(MyFb)).await?;
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     server.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Embedder                    │
//! │  • owns the FrameBuffer and input device │
//! │  • drives ServerConfig / ServerEvent      │
//! └──────────────────┬──────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │           VncServer (server.rs)          │
//! │  • accept loop, one session at a time    │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │           Session (session.rs)           │
//! │  • handshake state machine, auth, input  │
//! └──────────────────┬──────────────────────┘
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │   Scheduler + Hasher (scheduler.rs,       │
//! │   hasher.rs) + encoding/ tile encoders    │
//! └─────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod encoding;
pub mod error;
pub mod events;
pub mod framebuffer;
pub mod hasher;
pub mod input;
pub mod palette;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod session;
mod translate;

// Re-exports
pub use config::ServerConfig;
pub use error::{Result, VncError};
pub use events::ServerEvent;
pub use framebuffer::FrameBuffer;
pub use protocol::{PixelFormat, Rect};
pub use server::VncServer;

/// RFB protocol version this crate's handshake advertises.
pub const PROTOCOL_VERSION: &str = "RFB 003.007\n";

/// Default VNC port.
pub const DEFAULT_PORT: u16 = 5900;
