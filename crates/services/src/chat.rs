// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chat service: the message timeline.
//!
//! Bodies are written once; index entries are fanned out per owner with a
//! per-owner sequence from the key-value store. A push with `max_seq = S` is
//! only sent after the body and that owner's index row are durably written,
//! so a later sync from below `S` always returns the message.

use sqlx::Row;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use im_core::channels::ChannelPool;
use im_core::db::Db;
use im_core::kv::Kv;
use im_proto::chat::chat_service_server::ChatService;
use im_proto::chat::{
    MessageItem, MsgType, SendMessageReq, SendMessageResp, SyncMessagesReq, SyncMessagesResp,
};
use im_proto::gateway::gateway_service_client::GatewayServiceClient;
use im_proto::gateway::PushNotifyReq;

/// Accepted-relation status code in the `relation` table.
const REL_ACCEPTED: i32 = 1;

const DEFAULT_SYNC_LIMIT: i64 = 10;

const SYNC_FORWARD_SQL: &str = "SELECT idx.seq_id, idx.msg_id, body.sender_id, body.group_id, \
     body.msg_type, body.content, \
     DATE_FORMAT(body.created_at, '%Y-%m-%d %H:%i:%s') AS created_at \
     FROM message_index idx \
     LEFT JOIN message_body body ON idx.msg_id = body.msg_id \
     WHERE idx.owner_id = ? AND idx.seq_id > ? \
     ORDER BY idx.seq_id ASC LIMIT ?";

const SYNC_REVERSE_SQL: &str = "SELECT idx.seq_id, idx.msg_id, body.sender_id, body.group_id, \
     body.msg_type, body.content, \
     DATE_FORMAT(body.created_at, '%Y-%m-%d %H:%i:%s') AS created_at \
     FROM message_index idx \
     LEFT JOIN message_body body ON idx.msg_id = body.msg_id \
     WHERE idx.owner_id = ? \
     ORDER BY idx.seq_id DESC LIMIT ?";

/// Sync limit with the default applied.
fn effective_limit(limit: i32) -> i64 {
    if limit <= 0 {
        DEFAULT_SYNC_LIMIT
    } else {
        i64::from(limit)
    }
}

/// SYSTEM and FRIEND_REQ messages may cross non-friend boundaries.
fn bypasses_relation_check(msg_type: i32) -> bool {
    msg_type == MsgType::System as i32 || msg_type == MsgType::FriendReq as i32
}

pub struct ChatGrpc {
    kv: Kv,
    db: Db,
    channels: ChannelPool,
}

impl ChatGrpc {
    pub fn new(kv: Kv, db: Db, channels: ChannelPool) -> Self {
        Self { kv, db, channels }
    }

    /// Best-effort online push: look up the recipient's live locations and
    /// notify each device's gateway. Failures are logged, never propagated;
    /// the recipient catches up via sync.
    async fn push_notify_user(&self, user_id: i64, max_seq: i64, msg_type: i32) {
        match self.kv.session_exists(user_id).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(user_id, err = %e, "online check failed, skipping push");
                return;
            }
        }
        let locations = match self.kv.locations(user_id).await {
            Ok(locations) => locations,
            Err(e) => {
                warn!(user_id, err = %e, "location lookup failed, skipping push");
                return;
            }
        };
        for (device, addr) in locations {
            let channel = match self.channels.get(&addr) {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(user_id, addr = %addr, err = %e, "bad push address");
                    continue;
                }
            };
            let mut client = GatewayServiceClient::new(channel);
            let req = PushNotifyReq { user_id, max_seq, msg_type };
            if let Err(e) = client.push_notify(req).await {
                warn!(user_id, device = %device, addr = %addr, err = %e, "push failed");
            }
        }
    }

    /// Single-chat fan-out: one index row on the receiver's timeline.
    async fn fan_out_single(
        &self,
        msg_id: i64,
        sender_id: i64,
        receiver_id: i64,
        msg_type: i32,
    ) -> Result<SendMessageResp, Status> {
        let seq = match self.kv.next_seq(receiver_id).await {
            Ok(seq) => seq,
            Err(e) => {
                error!(receiver_id, err = %e, "sequence allocation failed");
                return Err(Status::internal("sequence store error"));
            }
        };

        let inserted = sqlx::query(
            "INSERT INTO message_index (owner_id, other_id, msg_id, seq_id, is_sender) \
             VALUES (?, ?, ?, ?, 0)",
        )
        .bind(receiver_id)
        .bind(sender_id)
        .bind(msg_id)
        .bind(seq)
        .execute(self.db.write())
        .await;
        if let Err(e) = inserted {
            error!(receiver_id, msg_id, err = %e, "index insert failed");
            return Ok(send_fail("Save index failed"));
        }

        self.push_notify_user(receiver_id, seq, msg_type).await;
        Ok(SendMessageResp { success: true, msg_id, seq_id: seq, error_message: String::new() })
    }

    /// Group fan-out: one index row per member, each on its own timeline.
    /// Per-member failures are logged and skipped; there is no cross-member
    /// atomicity.
    async fn fan_out_group(
        &self,
        msg_id: i64,
        group_id: i64,
        msg_type: i32,
    ) -> Result<SendMessageResp, Status> {
        let rows = sqlx::query("SELECT user_id FROM group_member WHERE group_id = ?")
            .bind(group_id)
            .fetch_all(self.db.read())
            .await
            .map_err(|e| {
                error!(group_id, err = %e, "member enumeration failed");
                Status::internal("database error")
            })?;
        let members: Vec<i64> =
            rows.iter().map(|row| row.try_get("user_id").unwrap_or_default()).collect();
        if members.is_empty() {
            return Ok(send_fail("Group not found"));
        }

        for member in members {
            let seq = match self.kv.next_seq(member).await {
                Ok(seq) => seq,
                Err(e) => {
                    warn!(member, group_id, err = %e, "sequence allocation failed, skipping member");
                    continue;
                }
            };
            let inserted = sqlx::query(
                "INSERT INTO message_index (owner_id, other_id, msg_id, seq_id, is_sender) \
                 VALUES (?, ?, ?, ?, 0)",
            )
            .bind(member)
            .bind(group_id)
            .bind(msg_id)
            .bind(seq)
            .execute(self.db.write())
            .await;
            if let Err(e) = inserted {
                warn!(member, group_id, msg_id, err = %e, "index insert failed, skipping member");
                continue;
            }
            self.push_notify_user(member, seq, msg_type).await;
        }

        // Group senders read their own timeline; no single seq applies.
        Ok(SendMessageResp { success: true, msg_id, seq_id: 0, error_message: String::new() })
    }
}

fn send_fail(message: &str) -> SendMessageResp {
    SendMessageResp { success: false, msg_id: 0, seq_id: 0, error_message: message.to_owned() }
}

#[tonic::async_trait]
impl ChatService for ChatGrpc {
    async fn send_message(
        &self,
        request: Request<SendMessageReq>,
    ) -> Result<Response<SendMessageResp>, Status> {
        let req = request.into_inner();
        let msg_type = req.r#type;

        // Friend precondition applies to single chat only; group membership
        // is the sole precondition on the group path.
        if req.group_id == 0 && !bypasses_relation_check(msg_type) {
            let row = sqlx::query("SELECT status FROM relation WHERE user_id = ? AND friend_id = ?")
                .bind(req.sender_id)
                .bind(req.receiver_id)
                .fetch_optional(self.db.read())
                .await
                .map_err(|e| {
                    error!(err = %e, "relation check failed");
                    Status::internal("database error")
                })?;
            let accepted = row
                .map(|r| r.try_get::<i32, _>("status").unwrap_or_default() == REL_ACCEPTED)
                .unwrap_or(false);
            if !accepted {
                return Ok(Response::new(send_fail("Not friends")));
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO message_body (sender_id, group_id, msg_type, content) VALUES (?, ?, ?, ?)",
        )
        .bind(req.sender_id)
        .bind(req.group_id)
        .bind(msg_type)
        .bind(&req.content)
        .execute(self.db.write())
        .await;
        let msg_id = match inserted {
            Ok(done) => done.last_insert_id() as i64,
            Err(e) => {
                error!(sender_id = req.sender_id, err = %e, "body insert failed");
                return Ok(Response::new(send_fail("Save body failed")));
            }
        };

        let resp = if req.group_id > 0 {
            self.fan_out_group(msg_id, req.group_id, msg_type).await?
        } else {
            self.fan_out_single(msg_id, req.sender_id, req.receiver_id, msg_type).await?
        };
        if resp.success {
            info!(
                sender_id = req.sender_id,
                receiver_id = req.receiver_id,
                group_id = req.group_id,
                msg_id = resp.msg_id,
                seq_id = resp.seq_id,
                "message stored"
            );
        }
        Ok(Response::new(resp))
    }

    async fn sync_messages(
        &self,
        request: Request<SyncMessagesReq>,
    ) -> Result<Response<SyncMessagesResp>, Status> {
        let req = request.into_inner();
        let limit = effective_limit(req.limit);

        let rows = if req.reverse {
            sqlx::query(SYNC_REVERSE_SQL)
                .bind(req.user_id)
                .bind(limit)
                .fetch_all(self.db.read())
                .await
        } else {
            sqlx::query(SYNC_FORWARD_SQL)
                .bind(req.user_id)
                .bind(req.local_seq)
                .bind(limit)
                .fetch_all(self.db.read())
                .await
        };
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!(user_id = req.user_id, err = %e, "sync query failed");
                return Ok(Response::new(SyncMessagesResp {
                    success: false,
                    msgs: Vec::new(),
                    max_seq: 0,
                    error_message: "Sync query failed".to_owned(),
                }));
            }
        };

        let mut max_seq = req.local_seq;
        let mut msgs = Vec::with_capacity(rows.len());
        for row in rows {
            let seq_id: i64 = row.try_get("seq_id").unwrap_or_default();
            // Body columns come through a LEFT JOIN and may be NULL for an
            // orphaned index row.
            let item = MessageItem {
                seq_id,
                msg_id: row.try_get("msg_id").unwrap_or_default(),
                sender_id: row.try_get::<Option<i64>, _>("sender_id").ok().flatten().unwrap_or_default(),
                group_id: row.try_get::<Option<i64>, _>("group_id").ok().flatten().unwrap_or_default(),
                r#type: row.try_get::<Option<i32>, _>("msg_type").ok().flatten().unwrap_or_default(),
                content: row.try_get::<Option<String>, _>("content").ok().flatten().unwrap_or_default(),
                created_at: row
                    .try_get::<Option<String>, _>("created_at")
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
            };
            if seq_id > max_seq {
                max_seq = seq_id;
            }
            msgs.push(item);
        }

        Ok(Response::new(SyncMessagesResp {
            success: true,
            msgs,
            max_seq,
            error_message: String::new(),
        }))
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
