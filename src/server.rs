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

//! Public server API: the accept loop and per-connection driver loop.
//!
//! This crate serves one client at a time (multi-client arbitration beyond
//! rejecting a second connection is out of scope). The accept loop itself
//! never blocks on a connection's handshake or message loop — each accepted
//! socket is handed to its own `tokio` task, gated by an `active` flag, so a
//! second connection attempt while one is already running is rejected
//! immediately rather than queued behind the first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{Result, VncError};
use crate::events::ServerEvent;
use crate::framebuffer::FrameBuffer;
use crate::scheduler::Scheduler;
use crate::session::Session;

/// A running VNC server: an accept loop plus, at most, one active session
/// at a time, all driven from tasks spawned by [`VncServer::start`].
pub struct VncServer {
    shutdown: watch::Sender<bool>,
    tick_hook: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    handle: JoinHandle<()>,
    last_error: Arc<Mutex<Option<VncError>>>,
}

impl VncServer {
    /// Starts listening on `config.port` and spawns the accept loop.
    /// Framebuffer reads for every connected session go through `fb`, which
    /// must stay valid for the server's lifetime.
    ///
    /// Returns the server handle plus the receiving end of the channel
    /// `ServerEvent`s (connect/disconnect, decoded input) are published on.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the listening socket can't be bound.
    pub async fn start(
        config: ServerConfig,
        fb: Arc<dyn FrameBuffer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>)> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await.map_err(VncError::Transport)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let last_error = Arc::new(Mutex::new(None));
        let tick_hook = Arc::new(Mutex::new(None));

        let handle = tokio::spawn(accept_loop(
            listener,
            config,
            fb,
            shutdown_rx,
            event_tx,
            last_error.clone(),
            tick_hook.clone(),
        ));

        Ok((Self { shutdown: shutdown_tx, tick_hook, handle, last_error }, event_rx))
    }

    /// Signals the accept loop and any active session to stop. Does not
    /// block; the underlying tasks wind down at their next suspension
    /// point.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Whether the accept loop's task is still running.
    #[must_use]
    pub fn active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// The most recent error surfaced by a session or the accept loop, if
    /// any.
    #[must_use]
    pub fn last_error(&self) -> Option<VncError> {
        lock(&self.last_error).clone()
    }

    /// Drives one Scheduler tick on the currently active session
    /// immediately, instead of waiting for the internal `tick_interval`. A
    /// no-op if no client is connected. For embedders that want to pace
    /// updates from their own event loop rather than this crate's internal
    /// timer.
    pub async fn tick(&self) {
        let sender = lock(&self.tick_hook).clone();
        if let Some(sender) = sender {
            let _ = sender.send(()).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    fb: Arc<dyn FrameBuffer>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    last_error: Arc<Mutex<Option<VncError>>>,
    tick_hook: Arc<Mutex<Option<mpsc::Sender<()>>>>,
) {
    let active = Arc::new(AtomicBool::new(false));
    let force_auth = Arc::new(AtomicBool::new(false));
    let mut client_id = 0usize;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("VNC server accept loop shutting down");
                    return;
                }
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };

                if active.swap(true, Ordering::SeqCst) {
                    warn!("rejecting connection from {peer_addr}: a client is already connected");
                    drop(stream);
                    continue;
                }

                client_id += 1;
                tokio::spawn(drive_connection(
                    stream,
                    peer_addr,
                    client_id,
                    config.clone(),
                    fb.clone(),
                    shutdown_rx.clone(),
                    event_tx.clone(),
                    last_error.clone(),
                    tick_hook.clone(),
                    active.clone(),
                    force_auth.clone(),
                ));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_connection(
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
    client_id: usize,
    config: ServerConfig,
    fb: Arc<dyn FrameBuffer>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    last_error: Arc<Mutex<Option<VncError>>>,
    tick_hook: Arc<Mutex<Option<mpsc::Sender<()>>>>,
    active: Arc<AtomicBool>,
    force_auth: Arc<AtomicBool>,
) {
    let native_depth = fb.pixel_format().depth;
    let mut session = Session::new(
        stream,
        peer_addr,
        client_id,
        config.clone(),
        fb.width(),
        fb.height(),
        native_depth,
        force_auth.load(Ordering::SeqCst),
    );

    let handshake = tokio::time::timeout(config.handshake_timeout, session.run_handshake()).await;
    let reached_running = matches!(handshake, Ok(Ok(())));
    force_auth.store(config.force_auth_after_early_close && !reached_running, Ordering::SeqCst);

    if !reached_running {
        match handshake {
            Ok(Err(e)) => {
                warn!("handshake with {peer_addr} failed: {e}");
                *lock(&last_error) = Some(e);
            }
            Err(_) => warn!("handshake with {peer_addr} timed out"),
            Ok(Ok(())) => unreachable!(),
        }
        active.store(false, Ordering::SeqCst);
        return;
    }

    let _ = event_tx.send(ServerEvent::ClientConnected { id: client_id, address: peer_addr });
    info!("client {client_id} connected from {peer_addr}");

    let (tick_tx, mut tick_rx) = mpsc::channel(1);
    *lock(&tick_hook) = Some(tick_tx);

    let mut scheduler = Scheduler::new();
    let mut interval = tokio::time::interval(config.tick_interval);

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            result = session.on_readable() => {
                match result {
                    Ok(events) => {
                        for event in events {
                            let _ = event_tx.send(event);
                        }
                    }
                    Err(e) => {
                        warn!("client {client_id} ({peer_addr}) disconnected: {e}");
                        *lock(&last_error) = Some(e);
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                if !send_update(&mut scheduler, &mut session, fb.as_ref(), &last_error).await {
                    break;
                }
            }
            _ = tick_rx.recv() => {
                if !send_update(&mut scheduler, &mut session, fb.as_ref(), &last_error).await {
                    break;
                }
            }
        }
    }

    *lock(&tick_hook) = None;
    let _ = event_tx.send(ServerEvent::ClientDisconnected { id: client_id });
    active.store(false, Ordering::SeqCst);
}

/// Runs one Scheduler tick and writes its update, if any. Returns `false` if
/// the write failed and the connection should be torn down.
async fn send_update(scheduler: &mut Scheduler, session: &mut Session, fb: &dyn FrameBuffer, last_error: &Arc<Mutex<Option<VncError>>>) -> bool {
    let update = match scheduler.on_tick(session, fb).await {
        Ok(Some(update)) => update,
        Ok(None) => return true,
        Err(e) => {
            warn!("client {} update failed: {e}", session.client_id());
            *lock(last_error) = Some(e);
            return false;
        }
    };
    match session.send_bytes(&update).await {
        Ok(()) => true,
        Err(e) => {
            warn!("client {} write failed: {e}", session.client_id());
            *lock(last_error) = Some(e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framebuffer::TestFrameBuffer;
    use crate::protocol::PixelFormat;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn start_binds_and_stop_ends_the_accept_loop() {
        let fb: Arc<dyn FrameBuffer> = Arc::new(TestFrameBuffer::new(64, 64, PixelFormat::rgba32()));
        let config = ServerConfig { port: 0, ..ServerConfig::default() };
        let (server, _events) = VncServer::start(config, fb).await.unwrap();
        assert!(server.active());
        server.stop();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!server.active());
    }

    #[tokio::test]
    async fn second_connection_is_rejected_while_one_is_active() {
        let fb: Arc<dyn FrameBuffer> = Arc::new(TestFrameBuffer::new(64, 64, PixelFormat::rgba32()));

        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let config = ServerConfig { port, ..ServerConfig::default() };

        let (server, _events) = VncServer::start(config, fb).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let _first = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut second = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 12];
        let n = second.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        server.stop();
    }
}
