// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway push endpoint: the gRPC surface peer services dial to reach
//! sessions held by this node.

use std::sync::Arc;

use prost::Message;
use tonic::{Request, Response, Status};
use tracing::info;

use im_proto::chat::MsgPushNotify;
use im_proto::frame::{encode, CmdId};
use im_proto::gateway::gateway_service_server::GatewayService;
use im_proto::gateway::{KickUserReq, KickUserResp, PushNotifyReq, PushNotifyResp};

use crate::registry::ConnectionRegistry;

/// Kick reason used when the caller does not supply one. End-to-end checks
/// key off the "Kicked" prefix.
pub const DEFAULT_KICK_REASON: &str = "Kicked";

pub struct GatewayGrpc {
    registry: Arc<ConnectionRegistry>,
}

impl GatewayGrpc {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[tonic::async_trait]
impl GatewayService for GatewayGrpc {
    /// Wrap the notification in a `MSG_PUSH_NOTIFY` frame and hand it to
    /// every local session of the user. Succeeds even when the user is not
    /// connected here; the caller selected this node from a location record
    /// that may have just gone stale.
    async fn push_notify(
        &self,
        request: Request<PushNotifyReq>,
    ) -> Result<Response<PushNotifyResp>, Status> {
        let req = request.into_inner();
        let notify = MsgPushNotify { max_seq: req.max_seq, r#type: req.msg_type };
        let frame = encode(CmdId::MsgPushNotify, &notify.encode_to_vec());

        let delivered = self.registry.send_to_user(req.user_id, frame).await;
        info!(user_id = req.user_id, max_seq = req.max_seq, delivered, "push notify");
        Ok(Response::new(PushNotifyResp { success: true }))
    }

    async fn kick_user(
        &self,
        request: Request<KickUserReq>,
    ) -> Result<Response<KickUserResp>, Status> {
        let req = request.into_inner();
        let reason = if req.reason.is_empty() { DEFAULT_KICK_REASON } else { &req.reason };
        let kicked = self.registry.kick_user(req.user_id, &req.device, reason).await;
        info!(user_id = req.user_id, device = %req.device, kicked, "kick user");
        Ok(Response::new(KickUserResp { success: true }))
    }
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
