// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use anyhow::Context;
use prost::Message;
use tonic::Request;

use im_proto::chat::MsgPushNotify;
use im_proto::frame::{CmdId, FrameDecoder};
use im_proto::gateway::gateway_service_server::GatewayService;
use im_proto::gateway::{KickUserReq, PushNotifyReq};

use crate::push::GatewayGrpc;
use crate::registry::ConnectionRegistry;
use crate::session::{Outbound, SessionHandle, SessionState};

fn registry_with_session(user_id: i64, device: &str) -> (Arc<ConnectionRegistry>, SessionHandle, tokio::sync::mpsc::Receiver<Outbound>) {
    let registry = Arc::new(ConnectionRegistry::new());
    let (handle, rx) = SessionHandle::new(user_id, device.to_owned(), 8);
    handle.activate();
    registry.join(handle.clone());
    (registry, handle, rx)
}

#[tokio::test]
async fn push_notify_frames_and_delivers() -> anyhow::Result<()> {
    let (registry, _handle, mut rx) = registry_with_session(5, "PC");
    let svc = GatewayGrpc::new(Arc::clone(&registry));

    let resp = svc
        .push_notify(Request::new(PushNotifyReq { user_id: 5, max_seq: 41, msg_type: 0 }))
        .await?
        .into_inner();
    assert!(resp.success);

    let out = rx.try_recv()?;
    let bytes = match out {
        Outbound::Frame(bytes) => bytes,
        Outbound::Final(_) => anyhow::bail!("push must not close the session"),
    };
    let mut dec = FrameDecoder::new();
    dec.extend(&bytes);
    let frame = dec.next_frame()?.context("frame")?;
    assert_eq!(frame.cmd_id, CmdId::MsgPushNotify.as_u16());
    let notify = MsgPushNotify::decode(frame.body)?;
    assert_eq!(notify.max_seq, 41);
    Ok(())
}

#[tokio::test]
async fn push_notify_succeeds_for_absent_user() -> anyhow::Result<()> {
    let registry = Arc::new(ConnectionRegistry::new());
    let svc = GatewayGrpc::new(registry);
    let resp = svc
        .push_notify(Request::new(PushNotifyReq { user_id: 404, max_seq: 1, msg_type: 0 }))
        .await?
        .into_inner();
    assert!(resp.success, "stale location routing must not error");
    Ok(())
}

#[tokio::test]
async fn kick_user_defaults_the_reason() -> anyhow::Result<()> {
    let (registry, handle, mut rx) = registry_with_session(6, "PC");
    let svc = GatewayGrpc::new(registry);

    let resp = svc
        .kick_user(Request::new(KickUserReq {
            user_id: 6,
            device: "PC".into(),
            reason: String::new(),
        }))
        .await?
        .into_inner();
    assert!(resp.success);
    assert_eq!(handle.state(), SessionState::Draining);

    let out = rx.try_recv()?;
    let bytes = match out {
        Outbound::Final(bytes) => bytes,
        Outbound::Frame(_) => anyhow::bail!("kick must queue a final frame"),
    };
    let mut dec = FrameDecoder::new();
    dec.extend(&bytes);
    let frame = dec.next_frame()?.context("frame")?;
    assert_eq!(frame.cmd_id, CmdId::LogoutResp.as_u16());
    assert!(frame.body.starts_with(b"Kicked"));
    Ok(())
}

#[tokio::test]
async fn kick_user_ignores_non_matching_device() -> anyhow::Result<()> {
    let (registry, handle, _rx) = registry_with_session(8, "Mobile");
    let svc = GatewayGrpc::new(registry);

    let resp = svc
        .kick_user(Request::new(KickUserReq {
            user_id: 8,
            device: "PC".into(),
            reason: "Kicked".into(),
        }))
        .await?
        .into_inner();
    assert!(resp.success);
    assert_eq!(handle.state(), SessionState::Active);
    Ok(())
}
