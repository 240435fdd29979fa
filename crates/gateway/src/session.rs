// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection session engine.
//!
//! Each session is one reader task (this module's `run_session`) plus one
//! writer task draining a bounded queue. External producers (push RPCs, the
//! kick subscriber, inbound dispatch) only ever post to the queue; the writer
//! task exclusively owns the socket sink, so frames are never interleaved.
//!
//! State machine: `HANDSHAKING → ACTIVE → DRAINING → CLOSED`. Kick moves the
//! session to DRAINING and enqueues a final `LOGOUT_RESP` frame; the writer
//! closes the socket once that frame has been flushed behind everything
//! queued before it.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use im_proto::frame::{encode, CmdId, FrameDecoder};

use crate::dispatch::{self, Action};
use crate::state::GatewayState;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Handshaking = 0,
    Active = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Handshaking,
            1 => Self::Active,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Outbound queue entries. `Final` closes the socket after the write.
pub(crate) enum Outbound {
    Frame(Bytes),
    Final(Bytes),
}

struct SessionInner {
    id: u64,
    user_id: i64,
    device: String,
    state: AtomicU8,
    kicked: AtomicBool,
    tx: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
}

/// Cloneable reference to a live session. The registry holds these as
/// back-references; dropping one never extends the session's lifetime
/// (the reader task owns the socket).
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub(crate) fn new(
        user_id: i64,
        device: String,
        queue_depth: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let inner = SessionInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            device,
            state: AtomicU8::new(SessionState::Handshaking as u8),
            kicked: AtomicBool::new(false),
            tx,
            cancel: CancellationToken::new(),
        };
        (Self { inner: Arc::new(inner) }, rx)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn user_id(&self) -> i64 {
        self.inner.user_id
    }

    pub fn device(&self) -> &str {
        &self.inner.device
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub(crate) fn activate(&self) {
        let _ = self.inner.state.compare_exchange(
            SessionState::Handshaking as u8,
            SessionState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_closed(&self) {
        self.inner.state.store(SessionState::Closed as u8, Ordering::Release);
    }

    /// Enqueue an encoded frame, FIFO. Returns false once the session is
    /// draining or closed; the packet is dropped.
    pub async fn send(&self, frame: Bytes) -> bool {
        if self.state() != SessionState::Active {
            return false;
        }
        self.inner.tx.send(Outbound::Frame(frame)).await.is_ok()
    }

    /// Graceful kick: queue a final `LOGOUT_RESP` carrying `reason`, let the
    /// writer drain everything queued before it, then close. Idempotent.
    pub async fn kick(&self, reason: &str) -> bool {
        if self.inner.kicked.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.state.store(SessionState::Draining as u8, Ordering::Release);
        let frame = encode(CmdId::LogoutResp, reason.as_bytes());
        if self.inner.tx.send(Outbound::Final(frame)).await.is_err() {
            // Writer already gone; fall back to a hard close.
            self.inner.cancel.cancel();
        }
        true
    }

    /// Immediate close: pending queued packets are dropped.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }
}

/// Writer loop: sole consumer of the outbound queue, sole owner of the sink.
/// Cancels the session token on exit so the reader unwinds too.
pub(crate) async fn run_writer<S>(
    mut rx: mpsc::Receiver<Outbound>,
    mut sink: S,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            out = rx.recv() => match out {
                Some(Outbound::Frame(frame)) => {
                    if sink.send(Message::Binary(frame)).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Final(frame)) => {
                    // Best effort: the peer may already be gone.
                    let _ = sink.send(Message::Binary(frame)).await;
                    let _ = sink.close().await;
                    break;
                }
                None => break,
            }
        }
    }
    cancel.cancel();
}

/// Drive one authenticated client channel to completion.
///
/// Owns the socket, the decode buffer, and the `(user_id, device)` location
/// record. Terminal cleanup (registry leave + location delete) runs exactly
/// once, on the single exit path at the bottom.
pub async fn run_session(state: Arc<GatewayState>, socket: WebSocket, user_id: i64, device: String) {
    let (handle, rx) = SessionHandle::new(user_id, device.clone(), state.config.write_queue_depth);

    // Bounded open: write the location record before accepting traffic.
    let push_addr = state.config.push_advertise_addr();
    let open = state.kv.set_location(user_id, &device, &push_addr);
    match tokio::time::timeout(state.config.handshake_timeout(), open).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(user_id, device = %device, err = %e, "session open failed");
            return;
        }
        Err(_) => {
            warn!(user_id, device = %device, "session open timed out");
            return;
        }
    }

    state.registry.join(handle.clone());
    handle.activate();
    info!(user_id, device = %device, "session open");

    let (ws_tx, mut ws_rx) = socket.split();
    let writer = tokio::spawn(run_writer(rx, ws_tx, handle.cancel_token()));

    let cancel = handle.cancel_token();
    let idle = state.config.idle_timeout();
    let mut decoder = FrameDecoder::new();

    'read: loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(idle, ws_rx.next()) => match next {
                Err(_) => {
                    info!(user_id, device = %device, "idle timeout");
                    break;
                }
                Ok(None) | Ok(Some(Err(_))) => break,
                Ok(Some(Ok(msg))) => msg,
            }
        };

        match msg {
            Message::Binary(data) => {
                decoder.extend(&data);
                loop {
                    match decoder.next_frame() {
                        Ok(Some(frame)) => match dispatch::handle_frame(&state, &handle, frame).await {
                            Action::None => {}
                            Action::Reply(frame) => {
                                let _ = handle.send(frame).await;
                            }
                            Action::Shutdown { reason } => {
                                handle.kick(&reason).await;
                            }
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!(user_id, device = %device, err = %e, "protocol violation, dropping session");
                            break 'read;
                        }
                    }
                }
            }
            Message::Close(_) => break,
            // axum answers pings itself; text frames are not part of the protocol.
            Message::Ping(_) | Message::Pong(_) | Message::Text(_) => {}
        }
    }

    handle.close();
    let _ = writer.await;
    state.registry.leave(&handle);
    if let Err(e) = state.kv.del_location(user_id, &device).await {
        warn!(user_id, device = %device, err = %e, "location cleanup failed");
    }
    handle.mark_closed();
    info!(user_id, device = %device, "session closed");
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
