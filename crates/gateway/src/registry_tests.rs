// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use tokio::sync::mpsc;

use im_proto::frame::{encode, CmdId};

use crate::registry::ConnectionRegistry;
use crate::session::{Outbound, SessionHandle, SessionState};

fn active_session(user_id: i64, device: &str) -> (SessionHandle, mpsc::Receiver<Outbound>) {
    let (handle, rx) = SessionHandle::new(user_id, device.to_owned(), 8);
    handle.activate();
    (handle, rx)
}

#[tokio::test]
async fn join_and_leave_track_counts() {
    let registry = ConnectionRegistry::new();
    let (pc, _rx1) = active_session(1, "PC");
    let (mobile, _rx2) = active_session(1, "Mobile");
    let (other, _rx3) = active_session(2, "PC");

    registry.join(pc.clone());
    registry.join(mobile.clone());
    registry.join(other.clone());
    assert_eq!(registry.user_count(), 2);
    assert_eq!(registry.session_count(), 3);

    registry.leave(&pc);
    assert_eq!(registry.session_count(), 2);
    // Leaving twice is harmless.
    registry.leave(&pc);
    assert_eq!(registry.session_count(), 2);

    registry.leave(&mobile);
    registry.leave(&other);
    assert_eq!(registry.user_count(), 0);
}

#[tokio::test]
async fn send_to_user_reaches_every_device() {
    let registry = ConnectionRegistry::new();
    let (pc, mut rx_pc) = active_session(7, "PC");
    let (mobile, mut rx_mobile) = active_session(7, "Mobile");
    registry.join(pc);
    registry.join(mobile);

    let frame = encode(CmdId::MsgPushNotify, b"\x08\x01");
    let delivered = registry.send_to_user(7, frame).await;
    assert_eq!(delivered, 2);
    assert!(matches!(rx_pc.try_recv(), Ok(Outbound::Frame(_))));
    assert!(matches!(rx_mobile.try_recv(), Ok(Outbound::Frame(_))));

    // Unknown user: no sessions, nothing delivered, no error.
    assert_eq!(registry.send_to_user(999, encode(CmdId::MsgPushNotify, b"")).await, 0);
}

#[tokio::test]
async fn kick_honors_device_filter() {
    let registry = ConnectionRegistry::new();
    let (pc, _rx1) = active_session(9, "PC");
    let (mobile, _rx2) = active_session(9, "Mobile");
    registry.join(pc.clone());
    registry.join(mobile.clone());

    let kicked = registry.kick_user(9, "PC", "Kicked by another device login").await;
    assert_eq!(kicked, 1);
    assert_eq!(pc.state(), SessionState::Draining);
    assert_eq!(mobile.state(), SessionState::Active);
}

#[tokio::test]
async fn empty_filter_kicks_all_devices_once() {
    let registry = ConnectionRegistry::new();
    let (pc, _rx1) = active_session(10, "PC");
    let (mobile, _rx2) = active_session(10, "Mobile");
    registry.join(pc.clone());
    registry.join(mobile.clone());

    assert_eq!(registry.kick_user(10, "", "Kicked").await, 2);
    assert_eq!(pc.state(), SessionState::Draining);
    assert_eq!(mobile.state(), SessionState::Draining);

    // Repeat kick finds the sessions already draining.
    assert_eq!(registry.kick_user(10, "", "Kicked").await, 0);
}
