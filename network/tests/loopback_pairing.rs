// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::time::Duration;

use tokio::time::timeout;

use common::{pair, test_config, WAIT};
use p2ptt_network::{ConnectionManager, ConnectionStatus};

#[tokio::test]
async fn frames_are_delivered_in_both_directions() {
    let (host, guest) = pair().await;
    let mut guest_msgs = guest.subscribe_messages();
    let mut host_msgs = host.subscribe_messages();

    host.send("0,0,0");
    let frame = timeout(WAIT, guest_msgs.recv()).await.unwrap().unwrap();
    assert_eq!(frame, "0,0,0");

    guest.send("1,1,1");
    let frame = timeout(WAIT, host_msgs.recv()).await.unwrap().unwrap();
    assert_eq!(frame, "1,1,1");

    host.die();
    guest.die();
}

#[tokio::test]
async fn back_to_back_frames_arrive_as_separate_messages() {
    // Two frames written in quick succession may coalesce into one TCP
    // segment; the line framing must still split them.
    let (host, guest) = pair().await;
    let mut guest_msgs = guest.subscribe_messages();

    host.send("0,0,0");
    host.send("reset");

    let first = timeout(WAIT, guest_msgs.recv()).await.unwrap().unwrap();
    let second = timeout(WAIT, guest_msgs.recv()).await.unwrap().unwrap();
    assert_eq!(first, "0,0,0");
    assert_eq!(second, "reset");

    host.die();
    guest.die();
}

#[tokio::test]
async fn guest_reports_failed_when_nobody_listens() {
    let guest = ConnectionManager::new(test_config());
    let mut status = guest.subscribe_status();

    // Port 1 on loopback refuses the connection
    guest.set_peer("127.0.0.1:1".parse().unwrap());
    guest.start_as_guest();

    assert_eq!(
        timeout(WAIT, status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Failed
    );

    // The failure cleared the started flag, so a retry spawns a fresh
    // attempt and reports again.
    guest.start_as_guest();
    assert_eq!(
        timeout(WAIT, status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Failed
    );
}

#[tokio::test]
async fn host_gives_up_after_the_accept_window() {
    let mut config = test_config();
    config.accept_attempts = 3;
    config.accept_poll_ms = 50;

    let host = ConnectionManager::new(config);
    let mut peer_events = host.subscribe_peer_events();

    host.init_listener().await;
    host.start_as_host();

    assert!(
        !timeout(WAIT, peer_events.recv()).await.unwrap().unwrap(),
        "accept loop should report false after the window elapses"
    );
}

#[tokio::test]
async fn start_as_host_is_guarded_against_double_start() {
    let (host, guest) = pair().await;
    let mut peer_events = host.subscribe_peer_events();

    // Already connected; a second start must not spawn another loop or
    // emit another peer event.
    host.start_as_host();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(matches!(
        peer_events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    host.die();
    guest.die();
}

#[tokio::test]
async fn die_tears_down_while_loops_are_live() {
    let (host, guest) = pair().await;

    host.die();
    // Frames after teardown are dropped, not delivered and not a panic
    host.send("0,0,0");
    host.die();

    // The guest read loop keeps running against the dead stream until
    // its own teardown.
    tokio::time::sleep(Duration::from_millis(200)).await;
    guest.send("1,1,1");
    guest.die();
    guest.die();

    assert!(host.local_addr().is_none());
}

#[tokio::test]
async fn managers_are_reusable_after_die() {
    let (host, guest) = pair().await;
    host.die();
    guest.die();

    // A fresh pairing on the same manager objects works because die()
    // resets every field to its initial value.
    let mut host_status = host.subscribe_status();
    let mut peer_events = host.subscribe_peer_events();
    host.init_listener().await;
    assert_eq!(
        timeout(WAIT, host_status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Connected
    );
    let addr = host.local_addr().expect("listener rebound");
    host.start_as_host();

    let mut guest_status = guest.subscribe_status();
    guest.set_peer(addr);
    guest.start_as_guest();

    assert!(timeout(WAIT, peer_events.recv()).await.unwrap().unwrap());
    assert_eq!(
        timeout(WAIT, guest_status.recv()).await.unwrap().unwrap(),
        ConnectionStatus::Connected
    );

    let mut guest_msgs = guest.subscribe_messages();
    host.send("2,2,0");
    assert_eq!(
        timeout(WAIT, guest_msgs.recv()).await.unwrap().unwrap(),
        "2,2,0"
    );

    host.die();
    guest.die();
}

#[tokio::test]
async fn late_subscribers_miss_earlier_messages() {
    let (host, guest) = pair().await;

    let mut early = guest.subscribe_messages();
    host.send("0,0,0");
    assert_eq!(
        timeout(WAIT, early.recv()).await.unwrap().unwrap(),
        "0,0,0"
    );

    // Attached after the frame above was published: sees nothing.
    let mut late = guest.subscribe_messages();
    assert!(matches!(
        late.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    host.die();
    guest.die();
}
