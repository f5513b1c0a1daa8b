// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use p2ptt_network::{ConnectionManager, ConnectionStatus, NetworkConfig};

/// Generous bound for every awaited event; loopback traffic is fast.
pub const WAIT: Duration = Duration::from_secs(5);

/// Loopback config with an OS-assigned port and a short accept window.
pub fn test_config() -> NetworkConfig {
    NetworkConfig {
        bind_addr: "127.0.0.1".parse().unwrap(),
        port: 0,
        accept_attempts: 50,
        accept_poll_ms: 100,
        connect_timeout_secs: 2,
        event_buffer: 64,
    }
}

/// Bring up a host/guest pair over loopback and wait until both sides
/// report the connection.
pub async fn pair() -> (Arc<ConnectionManager>, Arc<ConnectionManager>) {
    let host = Arc::new(ConnectionManager::new(test_config()));
    let mut host_status = host.subscribe_status();
    let mut peer_events = host.subscribe_peer_events();

    host.init_listener().await;
    assert_eq!(
        timeout(WAIT, host_status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Connected
    );
    let addr = host.local_addr().expect("listener bound");
    host.start_as_host();

    let guest = Arc::new(ConnectionManager::new(test_config()));
    let mut guest_status = guest.subscribe_status();
    guest.set_peer(addr);
    guest.start_as_guest();

    assert!(
        timeout(WAIT, peer_events.recv()).await.unwrap().unwrap(),
        "host should accept the guest"
    );
    assert_eq!(
        timeout(WAIT, guest_status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Connected
    );

    (host, guest)
}
