//! Headless VNC server example with animated content.
//!
//! This example creates a VNC server that continuously updates the framebuffer
//! with animated content, demonstrating how to use the server in a headless
//! environment without actual screen capture.
//!
//! Usage:
//!   cargo run --example headless_server

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rfb_core::{FrameBuffer, PixelFormat, Rect, ServerConfig, VncServer};
use tokio::time;

const WIDTH: u16 = 640;
const HEIGHT: u16 = 480;

struct AnimatedFb {
    pixels: Mutex<Vec<u8>>,
}

impl FrameBuffer for AnimatedFb {
    fn width(&self) -> u16 {
        WIDTH
    }

    fn height(&self) -> u16 {
        HEIGHT
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::rgba32()
    }

    fn read_rect(&self, rect: Rect, out: &mut [u8]) {
        let pixels = self.pixels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let bpp = self.pixel_format().bytes_per_pixel();
        let stride = WIDTH as usize * bpp;
        let row_bytes = rect.w as usize * bpp;
        for row in 0..rect.h as usize {
            let src = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            let dst = row * row_bytes;
            out[dst..dst + row_bytes].copy_from_slice(&pixels[src..src + row_bytes]);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("Starting headless VNC server on port 5900...");
    println!("Connect with: vncviewer localhost:5900");

    let fb = Arc::new(AnimatedFb { pixels: Mutex::new(vec![0u8; WIDTH as usize * HEIGHT as usize * 4]) });

    let config = ServerConfig { desktop_name: "Headless Rust VNC Server".to_string(), ..ServerConfig::default() };
    let (server, mut events) = VncServer::start(config, fb.clone()).await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event:?}");
        }
    });

    println!("Server started, generating animated content...");
    println!("Press Ctrl+C to stop");

    let mut frame = 0u32;
    loop {
        {
            let mut pixels = fb.pixels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for y in 0..HEIGHT as usize {
                for x in 0..WIDTH as usize {
                    let offset = (y * WIDTH as usize + x) * 4;
                    pixels[offset] = ((x as u32 + frame) % 256) as u8;
                    pixels[offset + 1] = ((y as u32 + frame) % 256) as u8;
                    pixels[offset + 2] = ((frame / 2) % 256) as u8;
                    pixels[offset + 3] = 255;
                }
            }
        }

        server.tick().await;
        frame = frame.wrapping_add(1);
        time::sleep(Duration::from_millis(33)).await;

        if frame % 300 == 0 {
            println!("Frame: {frame}");
        }
    }
}
