//! Simple VNC server example: a static gradient test pattern.
//!
//! Usage:
//!   cargo run --example simple_server
//!
//! Then connect with a VNC viewer to localhost:5900, password "test123".

use std::error::Error;
use std::sync::Arc;

use rfb_core::{FrameBuffer, PixelFormat, Rect, ServerConfig, VncServer};

struct GradientFb {
    width: u16,
    height: u16,
    pixels: Vec<u8>,
}

impl FrameBuffer for GradientFb {
    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::rgba32()
    }

    fn read_rect(&self, rect: Rect, out: &mut [u8]) {
        let bpp = self.pixel_format().bytes_per_pixel();
        let stride = self.width as usize * bpp;
        let row_bytes = rect.w as usize * bpp;
        for row in 0..rect.h as usize {
            let src = (rect.y as usize + row) * stride + rect.x as usize * bpp;
            let dst = row * row_bytes;
            out[dst..dst + row_bytes].copy_from_slice(&self.pixels[src..src + row_bytes]);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    const WIDTH: u16 = 800;
    const HEIGHT: u16 = 600;
    let mut pixels = vec![0u8; WIDTH as usize * HEIGHT as usize * 4];
    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            let offset = (y * WIDTH as usize + x) * 4;
            pixels[offset] = (x * 255 / WIDTH as usize) as u8;
            pixels[offset + 1] = (y * 255 / HEIGHT as usize) as u8;
            pixels[offset + 2] = 128;
            pixels[offset + 3] = 255;
        }
    }
    let fb = Arc::new(GradientFb { width: WIDTH, height: HEIGHT, pixels });

    println!("Starting VNC server on port 5900...");
    println!("Connect with: vncviewer localhost:5900");
    println!("Password: test123");

    let config = ServerConfig {
        desktop_name: "Simple Rust VNC Server".to_string(),
        password: Some("test123".to_string()),
        ..ServerConfig::default()
    };
    let (server, mut events) = VncServer::start(config, fb).await?;

    println!("Server ready for connections");
    while let Some(event) = events.recv().await {
        println!("{event:?}");
    }

    server.stop();
    Ok(())
}
