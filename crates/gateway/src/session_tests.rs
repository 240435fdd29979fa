// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use anyhow::Context;
use axum::extract::ws::Message;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use im_proto::frame::{encode, CmdId, FrameDecoder};

use crate::session::{run_writer, Outbound, SessionHandle, SessionState};

fn spawn_writer(handle: &SessionHandle, rx: mpsc::Receiver<Outbound>) -> mpsc::Receiver<Message> {
    let (out_tx, out_rx) = mpsc::channel::<Message>(32);
    tokio::spawn(run_writer(rx, PollSender::new(out_tx), handle.cancel_token()));
    out_rx
}

fn binary_frame(msg: Option<Message>) -> Option<(u16, Bytes)> {
    match msg {
        Some(Message::Binary(data)) => {
            let mut dec = FrameDecoder::new();
            dec.extend(&data);
            dec.next_frame().ok().flatten().map(|f| (f.cmd_id, f.body))
        }
        _ => None,
    }
}

#[tokio::test]
async fn writer_preserves_fifo_order() -> anyhow::Result<()> {
    let (handle, rx) = SessionHandle::new(1, "PC".into(), 8);
    handle.activate();
    let mut out = spawn_writer(&handle, rx);

    for body in [b"one".as_slice(), b"two", b"three"] {
        assert!(handle.send(encode(CmdId::MsgSendResp, body)).await);
    }

    for expected in [b"one".as_slice(), b"two", b"three"] {
        let (cmd, body) = binary_frame(out.recv().await).context("expected a frame")?;
        assert_eq!(cmd, CmdId::MsgSendResp.as_u16());
        assert_eq!(&body[..], expected);
    }
    Ok(())
}

#[tokio::test]
async fn kick_drains_queue_then_closes() -> anyhow::Result<()> {
    let (handle, rx) = SessionHandle::new(2, "PC".into(), 8);
    handle.activate();

    // Queue two frames before the kick so the drain is observable.
    assert!(handle.send(encode(CmdId::MsgSendResp, b"a")).await);
    assert!(handle.send(encode(CmdId::MsgSendResp, b"b")).await);
    assert!(handle.kick("Kicked by another device login").await);
    assert_eq!(handle.state(), SessionState::Draining);

    let mut out = spawn_writer(&handle, rx);
    let first = binary_frame(out.recv().await).context("expected first queued frame")?;
    let second = binary_frame(out.recv().await).context("expected second queued frame")?;
    assert_eq!(first.1, Bytes::from_static(b"a"));
    assert_eq!(second.1, Bytes::from_static(b"b"));

    let (cmd, body) =
        binary_frame(out.recv().await).context("expected the final logout frame")?;
    assert_eq!(cmd, CmdId::LogoutResp.as_u16());
    assert!(body.starts_with(b"Kicked"), "kick reason must start with Kicked");

    // The writer closes the sink and cancels the session after the final frame.
    assert!(out.recv().await.is_none());
    assert!(handle.cancel_token().is_cancelled());
    Ok(())
}

#[tokio::test]
async fn kick_is_idempotent() {
    let (handle, _rx) = SessionHandle::new(3, "PC".into(), 8);
    handle.activate();
    assert!(handle.kick("Kicked").await);
    assert!(!handle.kick("Kicked again").await);
}

#[tokio::test]
async fn send_is_rejected_after_kick() {
    let (handle, _rx) = SessionHandle::new(4, "Mobile".into(), 8);
    handle.activate();
    assert!(handle.send(encode(CmdId::HeartbeatResp, b"")).await);
    assert!(handle.kick("Kicked").await);
    assert!(!handle.send(encode(CmdId::HeartbeatResp, b"")).await);
}

#[tokio::test]
async fn send_is_rejected_before_activation() {
    let (handle, _rx) = SessionHandle::new(5, "PC".into(), 8);
    assert_eq!(handle.state(), SessionState::Handshaking);
    assert!(!handle.send(encode(CmdId::HeartbeatResp, b"")).await);
}

#[tokio::test]
async fn kick_with_dead_writer_falls_back_to_hard_close() {
    let (handle, rx) = SessionHandle::new(6, "PC".into(), 8);
    handle.activate();
    drop(rx);
    assert!(handle.kick("Kicked").await);
    assert!(handle.cancel_token().is_cancelled());
}

#[test]
fn state_transitions() {
    let (handle, _rx) = SessionHandle::new(7, "PC".into(), 8);
    assert_eq!(handle.state(), SessionState::Handshaking);
    handle.activate();
    assert_eq!(handle.state(), SessionState::Active);
    handle.mark_closed();
    assert_eq!(handle.state(), SessionState::Closed);
    // activate() must not resurrect a closed session.
    handle.activate();
    assert_eq!(handle.state(), SessionState::Closed);
}
