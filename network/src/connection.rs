// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host/guest connection lifecycle over a TCP stream
//!
//! One [`ConnectionManager`] is constructed per match. The host side
//! binds a listener and runs a bounded accept loop in the background; the
//! guest side dials a previously selected peer. Once a stream is up, a
//! read loop publishes every newline-terminated frame on the message
//! stream and a writer task drains the outgoing queue. Observers attach
//! through the `subscribe_*` methods; events are not replayed to late
//! subscribers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::NetworkConfig;
use crate::net_util::CancellationToken;

/// Pause between read attempts after an error or end-of-stream. The read
/// loop keeps running until teardown, so it must not spin on a dead
/// socket.
const READ_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Outcome of one connection attempt. Terminal per attempt; a retry
/// produces a fresh status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Failed,
}

/// Owns the socket lifecycle for both roles of a match.
pub struct ConnectionManager {
    config: NetworkConfig,
    session_id: Uuid,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    peer_addr: Mutex<Option<SocketAddr>>,
    host_started: Arc<AtomicBool>,
    guest_started: Arc<AtomicBool>,
    status_tx: broadcast::Sender<ConnectionStatus>,
    peer_tx: broadcast::Sender<bool>,
    message_tx: broadcast::Sender<String>,
    writer_tx: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    shutdown: Mutex<CancellationToken>,
}

impl ConnectionManager {
    pub fn new(config: NetworkConfig) -> Self {
        let (status_tx, _) = broadcast::channel(config.event_buffer);
        let (peer_tx, _) = broadcast::channel(config.event_buffer);
        let (message_tx, _) = broadcast::channel(config.event_buffer);

        Self {
            config,
            session_id: Uuid::new_v4(),
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            peer_addr: Mutex::new(None),
            host_started: Arc::new(AtomicBool::new(false)),
            guest_started: Arc::new(AtomicBool::new(false)),
            status_tx,
            peer_tx,
            message_tx,
            writer_tx: Arc::new(Mutex::new(None)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            shutdown: Mutex::new(CancellationToken::new()),
        }
    }

    /// Connection status events (one per listener/connect attempt)
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Host-side "peer accepted" events: `true` on accept, `false` on
    /// timeout or accept error
    pub fn subscribe_peer_events(&self) -> broadcast::Receiver<bool> {
        self.peer_tx.subscribe()
    }

    /// Decoded incoming frames, one event per line received
    pub fn subscribe_messages(&self) -> broadcast::Receiver<String> {
        self.message_tx.subscribe()
    }

    /// Address the listener is bound to, once [`init_listener`] has
    /// succeeded
    ///
    /// [`init_listener`]: ConnectionManager::init_listener
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Select the peer a later [`start_as_guest`] call will dial
    ///
    /// [`start_as_guest`]: ConnectionManager::start_as_guest
    pub fn set_peer(&self, addr: SocketAddr) {
        tracing::debug!(session = %self.session_id, peer = %addr, "peer selected");
        *self.peer_addr.lock() = Some(addr);
    }

    /// Bind the listening endpoint. Idempotent; the outcome is reported
    /// on the status stream, and a failure can be retried by calling
    /// again.
    pub async fn init_listener(&self) {
        if self.listener.lock().is_some() {
            tracing::debug!(session = %self.session_id, "listener already bound");
            let _ = self.status_tx.send(ConnectionStatus::Connected);
            return;
        }

        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                let bound = listener.local_addr().ok();
                tracing::info!(session = %self.session_id, addr = ?bound, "listener bound");
                *self.local_addr.lock() = bound;
                *self.listener.lock() = Some(listener);
                let _ = self.status_tx.send(ConnectionStatus::Connected);
            }
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "failed to bind listener");
                let _ = self.status_tx.send(ConnectionStatus::Failed);
            }
        }
    }

    /// Run the bounded accept loop in the background. No-op when already
    /// started. Publishes `true` on the peer stream once a peer is
    /// accepted, `false` on timeout or error; either failure clears the
    /// started flag so the call can be retried.
    pub fn start_as_host(&self) {
        if self.host_started.swap(true, Ordering::SeqCst) {
            tracing::debug!(session = %self.session_id, "host already started");
            return;
        }

        let Some(listener) = self.listener.lock().take() else {
            tracing::warn!(session = %self.session_id, "start_as_host without a bound listener");
            self.host_started.store(false, Ordering::SeqCst);
            let _ = self.peer_tx.send(false);
            return;
        };

        let session_id = self.session_id;
        let max_attempts = self.config.accept_attempts;
        let poll_interval = self.config.accept_poll_interval();
        let token = self.shutdown.lock().clone();
        let peer_tx = self.peer_tx.clone();
        let message_tx = self.message_tx.clone();
        let writer_slot = Arc::clone(&self.writer_tx);
        let tasks = Arc::clone(&self.tasks);
        let host_started = Arc::clone(&self.host_started);

        let handle = tokio::spawn(async move {
            let mut attempts = 0u32;
            let accepted = loop {
                if attempts >= max_attempts {
                    tracing::warn!(session = %session_id, attempts, "accept loop timed out");
                    break None;
                }
                attempts += 1;

                tokio::select! {
                    _ = token.cancelled() => return,
                    res = timeout(poll_interval, listener.accept()) => match res {
                        Ok(Ok((stream, peer))) => {
                            tracing::info!(session = %session_id, %peer, "peer accepted");
                            break Some(stream);
                        }
                        Ok(Err(e)) => {
                            tracing::error!(session = %session_id, error = %e, "accept failed");
                            break None;
                        }
                        // No peer this iteration, keep polling
                        Err(_) => {}
                    }
                }
            };

            match accepted {
                Some(stream) => {
                    Self::spawn_io(session_id, stream, message_tx, writer_slot, tasks, token);
                    let _ = peer_tx.send(true);
                    // The listener is dropped here, closing the endpoint.
                }
                None => {
                    host_started.store(false, Ordering::SeqCst);
                    let _ = peer_tx.send(false);
                }
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Dial the selected peer in the background. No-op when already
    /// started. The outcome is reported on the status stream; on failure
    /// the started flag is cleared and any half-open socket is dropped.
    pub fn start_as_guest(&self) {
        if self.guest_started.swap(true, Ordering::SeqCst) {
            tracing::debug!(session = %self.session_id, "guest already started");
            return;
        }

        let Some(peer) = *self.peer_addr.lock() else {
            tracing::warn!(session = %self.session_id, "start_as_guest without a selected peer");
            self.guest_started.store(false, Ordering::SeqCst);
            let _ = self.status_tx.send(ConnectionStatus::Failed);
            return;
        };

        let session_id = self.session_id;
        let connect_timeout = self.config.connect_timeout();
        let token = self.shutdown.lock().clone();
        let status_tx = self.status_tx.clone();
        let message_tx = self.message_tx.clone();
        let writer_slot = Arc::clone(&self.writer_tx);
        let tasks = Arc::clone(&self.tasks);
        let guest_started = Arc::clone(&self.guest_started);

        let handle = tokio::spawn(async move {
            let stream = tokio::select! {
                _ = token.cancelled() => return,
                res = timeout(connect_timeout, TcpStream::connect(peer)) => match res {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        tracing::error!(session = %session_id, %peer, error = %e, "connect failed");
                        guest_started.store(false, Ordering::SeqCst);
                        let _ = status_tx.send(ConnectionStatus::Failed);
                        return;
                    }
                    Err(_) => {
                        tracing::error!(session = %session_id, %peer, "connect timed out");
                        guest_started.store(false, Ordering::SeqCst);
                        let _ = status_tx.send(ConnectionStatus::Failed);
                        return;
                    }
                }
            };

            tracing::info!(session = %session_id, %peer, "connected to host");
            Self::spawn_io(session_id, stream, message_tx, writer_slot, tasks, token);
            let _ = status_tx.send(ConnectionStatus::Connected);
        });
        self.tasks.lock().push(handle);
    }

    /// Queue one frame for delivery. Fire-and-forget: enqueue or write
    /// failures are logged and the frame is dropped; there is no retry
    /// and no delivery guarantee.
    pub fn send(&self, message: impl Into<String>) {
        let frame = message.into();
        match &*self.writer_tx.lock() {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    tracing::warn!(session = %self.session_id, "writer gone, dropping outgoing frame");
                }
            }
            None => {
                tracing::warn!(session = %self.session_id, "no active connection, dropping outgoing frame");
            }
        }
    }

    /// Tear everything down: cancel the background loops, close sockets
    /// and the writer queue, and reset every field to its initial unset
    /// value. Idempotent; safe to call when nothing was ever started.
    pub fn die(&self) {
        tracing::debug!(session = %self.session_id, "tearing down connection manager");

        let token = {
            let mut guard = self.shutdown.lock();
            std::mem::replace(&mut *guard, CancellationToken::new())
        };
        token.cancel();

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        *self.writer_tx.lock() = None;
        *self.listener.lock() = None;
        *self.local_addr.lock() = None;
        *self.peer_addr.lock() = None;
        self.host_started.store(false, Ordering::SeqCst);
        self.guest_started.store(false, Ordering::SeqCst);
    }

    /// Start the read and write loops for an established stream.
    fn spawn_io(
        session_id: Uuid,
        stream: TcpStream,
        message_tx: broadcast::Sender<String>,
        writer_slot: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
        tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
        token: CancellationToken,
    ) {
        let (read_half, mut write_half) = stream.into_split();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *writer_slot.lock() = Some(tx);

        let write_token = token.clone();
        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = write_token.cancelled() => break,
                    frame = rx.recv() => {
                        let Some(frame) = frame else { break };
                        tracing::debug!(session = %session_id, %frame, "sending frame");
                        if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                            tracing::warn!(session = %session_id, error = %e, "write failed, frame dropped");
                            continue;
                        }
                        if let Err(e) = write_half.write_all(b"\n").await {
                            tracing::warn!(session = %session_id, error = %e, "write failed, frame dropped");
                        }
                    }
                }
            }
        });

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            tracing::debug!(session = %session_id, frame = %line, "frame received");
                            let _ = message_tx.send(line);
                        }
                        Ok(None) => {
                            // End of stream. The loop only stops on
                            // teardown, matching the reference behavior.
                            tracing::debug!(session = %session_id, "stream ended, waiting for teardown");
                            tokio::time::sleep(READ_RETRY_DELAY).await;
                        }
                        Err(e) => {
                            tracing::warn!(session = %session_id, error = %e, "read failed");
                            tokio::time::sleep(READ_RETRY_DELAY).await;
                        }
                    }
                }
            }
        });

        tasks.lock().extend([writer, reader]);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.die();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> NetworkConfig {
        NetworkConfig {
            bind_addr: "127.0.0.1".parse().unwrap(),
            port: 0,
            accept_attempts: 10,
            accept_poll_ms: 100,
            connect_timeout_secs: 2,
            event_buffer: 16,
        }
    }

    #[tokio::test]
    async fn init_listener_binds_and_reports_connected() {
        let manager = ConnectionManager::new(test_config());
        let mut status = manager.subscribe_status();

        manager.init_listener().await;
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Connected);
        assert!(manager.local_addr().is_some());

        // Second call is a no-op that re-reports success
        manager.init_listener().await;
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn host_without_listener_reports_no_peer() {
        let manager = ConnectionManager::new(test_config());
        let mut peers = manager.subscribe_peer_events();

        manager.start_as_host();
        assert!(!peers.recv().await.unwrap());
    }

    #[tokio::test]
    async fn guest_without_peer_reports_failed() {
        let manager = ConnectionManager::new(test_config());
        let mut status = manager.subscribe_status();

        manager.start_as_guest();
        assert_eq!(status.recv().await.unwrap(), ConnectionStatus::Failed);
    }

    #[tokio::test]
    async fn send_without_connection_drops_frame() {
        let manager = ConnectionManager::new(test_config());
        // Must not panic or block
        manager.send("0,0,0");
    }

    #[tokio::test]
    async fn die_is_idempotent() {
        let manager = ConnectionManager::new(test_config());
        manager.die();
        manager.die();

        let manager = ConnectionManager::new(test_config());
        manager.init_listener().await;
        manager.start_as_host();
        manager.die();
        manager.die();
        assert!(manager.local_addr().is_none());
    }
}
