// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relation service: friend requests and acceptance, group lifecycle and
//! membership, and the verification-gated join flow.
//!
//! Side-effect system messages (friend request notices, join announcements)
//! are best-effort: they ride through the chat service and never fail the
//! primary operation.

use sqlx::Row;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use im_core::db::Db;
use im_core::rpc::Backends;
use im_proto::chat::{MsgType, SendMessageReq};
use im_proto::relation::relation_service_server::RelationService;
use im_proto::relation::{
    AcceptFriendReq, AcceptFriendResp, AcceptGroupReq, AcceptGroupResp, ApplyFriendReq,
    ApplyFriendResp, ApplyGroupReq, ApplyGroupResp, CreateGroupReq, CreateGroupResp, FriendItem,
    GetFriendListReq, GetFriendListResp, GetGroupListReq, GetGroupListResp, GroupItem,
    JoinGroupReq, JoinGroupResp,
};

/// `relation.status` codes.
const REL_ACCEPTED: i32 = 1;

/// `friend_request.status` / `group_request.status` codes.
const REQ_PENDING: i32 = 0;
const REQ_ACCEPTED: i32 = 1;
const REQ_REJECTED: i32 = 2;

/// `group_member.role` codes.
const ROLE_MEMBER: i32 = 0;
const ROLE_ADMIN: i32 = 1;
const ROLE_OWNER: i32 = 2;

/// Owners and admins may approve join requests.
fn can_approve(role: i32) -> bool {
    role >= ROLE_ADMIN
}

fn internal(e: sqlx::Error, what: &str) -> Status {
    error!(err = %e, "{what} failed");
    Status::internal("database error")
}

pub struct RelationGrpc {
    db: Db,
    backends: Backends,
}

impl RelationGrpc {
    pub fn new(db: Db, backends: Backends) -> Self {
        Self { db, backends }
    }

    /// Fire-and-forget system message through the chat service.
    async fn send_system_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        group_id: i64,
        msg_type: MsgType,
        content: &str,
    ) {
        let req = SendMessageReq {
            sender_id,
            receiver_id,
            group_id,
            r#type: msg_type as i32,
            content: content.to_owned(),
        };
        match self.backends.chat().await {
            Ok(mut client) => {
                if let Err(e) = client.send_message(req).await {
                    warn!(receiver_id, group_id, err = %e, "system message failed");
                }
            }
            Err(e) => warn!(err = %e, "no chat service for system message"),
        }
    }
}

#[tonic::async_trait]
impl RelationService for RelationGrpc {
    async fn apply_friend(
        &self,
        request: Request<ApplyFriendReq>,
    ) -> Result<Response<ApplyFriendResp>, Status> {
        let req = request.into_inner();
        if req.user_id == req.friend_id {
            return Ok(Response::new(ApplyFriendResp {
                success: false,
                apply_id: 0,
                error_message: "Cannot add self".to_owned(),
            }));
        }

        let pending = sqlx::query(
            "SELECT id FROM friend_request WHERE user_id = ? AND friend_id = ? AND status = ?",
        )
        .bind(req.user_id)
        .bind(req.friend_id)
        .bind(REQ_PENDING)
        .fetch_optional(self.db.read())
        .await
        .map_err(|e| internal(e, "pending lookup"))?;
        if pending.is_some() {
            return Ok(Response::new(ApplyFriendResp {
                success: false,
                apply_id: 0,
                error_message: "Request already pending".to_owned(),
            }));
        }

        let done = sqlx::query(
            "INSERT INTO friend_request (user_id, friend_id, remark, status) VALUES (?, ?, ?, ?)",
        )
        .bind(req.user_id)
        .bind(req.friend_id)
        .bind(&req.remark)
        .bind(REQ_PENDING)
        .execute(self.db.write())
        .await
        .map_err(|e| internal(e, "friend request insert"))?;

        self.send_system_message(req.user_id, req.friend_id, 0, MsgType::FriendReq, "Friend Request")
            .await;

        info!(user_id = req.user_id, friend_id = req.friend_id, "friend apply");
        Ok(Response::new(ApplyFriendResp {
            success: true,
            apply_id: done.last_insert_id() as i64,
            error_message: String::new(),
        }))
    }

    async fn accept_friend(
        &self,
        request: Request<AcceptFriendReq>,
    ) -> Result<Response<AcceptFriendResp>, Status> {
        let req = request.into_inner();
        let new_status = if req.accept { REQ_ACCEPTED } else { REQ_REJECTED };

        sqlx::query(
            "UPDATE friend_request SET status = ? WHERE user_id = ? AND friend_id = ? AND status = ?",
        )
        .bind(new_status)
        .bind(req.requester_id)
        .bind(req.user_id)
        .bind(REQ_PENDING)
        .execute(self.db.write())
        .await
        .map_err(|e| internal(e, "friend request update"))?;

        if req.accept {
            let inserted = sqlx::query(
                "INSERT INTO relation (user_id, friend_id, status) VALUES (?, ?, ?), (?, ?, ?)",
            )
            .bind(req.user_id)
            .bind(req.requester_id)
            .bind(REL_ACCEPTED)
            .bind(req.requester_id)
            .bind(req.user_id)
            .bind(REL_ACCEPTED)
            .execute(self.db.write())
            .await;
            if let Err(e) = inserted {
                // Re-accepting an existing relation trips the primary key;
                // the relation is in place either way.
                warn!(user_id = req.user_id, requester_id = req.requester_id, err = %e, "relation insert");
            }

            self.send_system_message(
                req.user_id,
                req.requester_id,
                0,
                MsgType::System,
                "Friend Request Accepted",
            )
            .await;
        }

        info!(user_id = req.user_id, requester_id = req.requester_id, accept = req.accept, "friend accept");
        Ok(Response::new(AcceptFriendResp { success: true, error_message: String::new() }))
    }

    async fn get_friend_list(
        &self,
        request: Request<GetFriendListReq>,
    ) -> Result<Response<GetFriendListResp>, Status> {
        let req = request.into_inner();
        let rows = sqlx::query(
            "SELECT r.friend_id, u.username, u.nickname FROM relation r \
             JOIN `user` u ON r.friend_id = u.user_id \
             WHERE r.user_id = ? AND r.status = ?",
        )
        .bind(req.user_id)
        .bind(REL_ACCEPTED)
        .fetch_all(self.db.read())
        .await
        .map_err(|e| internal(e, "friend list query"))?;

        let friends = rows
            .iter()
            .map(|row| FriendItem {
                user_id: row.try_get("friend_id").unwrap_or_default(),
                username: row.try_get("username").unwrap_or_default(),
                nickname: row.try_get("nickname").unwrap_or_default(),
            })
            .collect();
        Ok(Response::new(GetFriendListResp { success: true, friends }))
    }

    async fn create_group(
        &self,
        request: Request<CreateGroupReq>,
    ) -> Result<Response<CreateGroupResp>, Status> {
        let req = request.into_inner();
        let done = sqlx::query("INSERT INTO `group` (name, owner_id, needs_verify) VALUES (?, ?, ?)")
            .bind(&req.group_name)
            .bind(req.owner_id)
            .bind(req.needs_verify)
            .execute(self.db.write())
            .await
            .map_err(|e| internal(e, "group insert"))?;
        let group_id = done.last_insert_id() as i64;

        let owner_row = sqlx::query(
            "INSERT INTO group_member (group_id, user_id, role) VALUES (?, ?, ?)",
        )
        .bind(group_id)
        .bind(req.owner_id)
        .bind(ROLE_OWNER)
        .execute(self.db.write())
        .await;
        if let Err(e) = owner_row {
            error!(group_id, err = %e, "owner membership insert failed");
            return Ok(Response::new(CreateGroupResp {
                success: false,
                group_id: 0,
                error_message: "Create group failed".to_owned(),
            }));
        }

        for member in req.initial_members {
            if member == req.owner_id {
                continue;
            }
            let inserted =
                sqlx::query("INSERT INTO group_member (group_id, user_id, role) VALUES (?, ?, ?)")
                    .bind(group_id)
                    .bind(member)
                    .bind(ROLE_MEMBER)
                    .execute(self.db.write())
                    .await;
            if let Err(e) = inserted {
                warn!(group_id, member, err = %e, "initial member insert failed, skipping");
            }
        }

        info!(group_id, owner_id = req.owner_id, "group created");
        Ok(Response::new(CreateGroupResp {
            success: true,
            group_id,
            error_message: String::new(),
        }))
    }

    async fn join_group(
        &self,
        request: Request<JoinGroupReq>,
    ) -> Result<Response<JoinGroupResp>, Status> {
        let req = request.into_inner();

        let group = sqlx::query("SELECT needs_verify FROM `group` WHERE group_id = ?")
            .bind(req.group_id)
            .fetch_optional(self.db.read())
            .await
            .map_err(|e| internal(e, "group lookup"))?;
        let Some(group) = group else {
            return Ok(Response::new(JoinGroupResp {
                success: false,
                error_message: "Group not found".to_owned(),
            }));
        };

        let member = sqlx::query("SELECT role FROM group_member WHERE group_id = ? AND user_id = ?")
            .bind(req.group_id)
            .bind(req.user_id)
            .fetch_optional(self.db.read())
            .await
            .map_err(|e| internal(e, "membership lookup"))?;
        if member.is_some() {
            // Idempotent: joining a group you are in is a success, no change.
            return Ok(Response::new(JoinGroupResp { success: true, error_message: String::new() }));
        }

        let gated: bool = group.try_get::<bool, _>("needs_verify").unwrap_or(false);
        if gated {
            return Ok(Response::new(JoinGroupResp {
                success: false,
                error_message: "Group requires approval".to_owned(),
            }));
        }

        let inserted =
            sqlx::query("INSERT INTO group_member (group_id, user_id, role) VALUES (?, ?, ?)")
                .bind(req.group_id)
                .bind(req.user_id)
                .bind(ROLE_MEMBER)
                .execute(self.db.write())
                .await;
        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                // Raced another join of the same user; already a member.
                return Ok(Response::new(JoinGroupResp {
                    success: true,
                    error_message: String::new(),
                }));
            }
            Err(e) => return Err(internal(e, "membership insert")),
        }

        self.send_system_message(
            req.user_id,
            0,
            req.group_id,
            MsgType::System,
            &format!("User {} joined the group", req.user_id),
        )
        .await;

        info!(user_id = req.user_id, group_id = req.group_id, "group join");
        Ok(Response::new(JoinGroupResp { success: true, error_message: String::new() }))
    }

    async fn get_group_list(
        &self,
        request: Request<GetGroupListReq>,
    ) -> Result<Response<GetGroupListResp>, Status> {
        let req = request.into_inner();
        let rows = sqlx::query(
            "SELECT g.group_id, g.name, g.owner_id FROM group_member m \
             JOIN `group` g ON m.group_id = g.group_id \
             WHERE m.user_id = ?",
        )
        .bind(req.user_id)
        .fetch_all(self.db.read())
        .await
        .map_err(|e| internal(e, "group list query"))?;

        let groups = rows
            .iter()
            .map(|row| GroupItem {
                group_id: row.try_get("group_id").unwrap_or_default(),
                group_name: row.try_get("name").unwrap_or_default(),
                owner_id: row.try_get("owner_id").unwrap_or_default(),
            })
            .collect();
        Ok(Response::new(GetGroupListResp { success: true, groups }))
    }

    async fn apply_group(
        &self,
        request: Request<ApplyGroupReq>,
    ) -> Result<Response<ApplyGroupResp>, Status> {
        let req = request.into_inner();

        let group = sqlx::query("SELECT owner_id FROM `group` WHERE group_id = ?")
            .bind(req.group_id)
            .fetch_optional(self.db.read())
            .await
            .map_err(|e| internal(e, "group lookup"))?;
        let Some(group) = group else {
            return Ok(Response::new(ApplyGroupResp {
                success: false,
                apply_id: 0,
                error_message: "Group not found".to_owned(),
            }));
        };
        let owner_id: i64 = group.try_get("owner_id").unwrap_or_default();

        let member = sqlx::query("SELECT role FROM group_member WHERE group_id = ? AND user_id = ?")
            .bind(req.group_id)
            .bind(req.user_id)
            .fetch_optional(self.db.read())
            .await
            .map_err(|e| internal(e, "membership lookup"))?;
        if member.is_some() {
            return Ok(Response::new(ApplyGroupResp {
                success: false,
                apply_id: 0,
                error_message: "Already a member".to_owned(),
            }));
        }

        let pending = sqlx::query(
            "SELECT id FROM group_request WHERE user_id = ? AND group_id = ? AND status = ?",
        )
        .bind(req.user_id)
        .bind(req.group_id)
        .bind(REQ_PENDING)
        .fetch_optional(self.db.read())
        .await
        .map_err(|e| internal(e, "pending lookup"))?;
        if pending.is_some() {
            return Ok(Response::new(ApplyGroupResp {
                success: false,
                apply_id: 0,
                error_message: "Request already pending".to_owned(),
            }));
        }

        let done = sqlx::query(
            "INSERT INTO group_request (user_id, group_id, remark, status) VALUES (?, ?, ?, ?)",
        )
        .bind(req.user_id)
        .bind(req.group_id)
        .bind(&req.remark)
        .bind(REQ_PENDING)
        .execute(self.db.write())
        .await
        .map_err(|e| internal(e, "group request insert"))?;

        self.send_system_message(req.user_id, owner_id, 0, MsgType::System, "Group join request")
            .await;

        info!(user_id = req.user_id, group_id = req.group_id, "group apply");
        Ok(Response::new(ApplyGroupResp {
            success: true,
            apply_id: done.last_insert_id() as i64,
            error_message: String::new(),
        }))
    }

    async fn accept_group(
        &self,
        request: Request<AcceptGroupReq>,
    ) -> Result<Response<AcceptGroupResp>, Status> {
        let req = request.into_inner();

        let approver =
            sqlx::query("SELECT role FROM group_member WHERE group_id = ? AND user_id = ?")
                .bind(req.group_id)
                .bind(req.user_id)
                .fetch_optional(self.db.read())
                .await
                .map_err(|e| internal(e, "approver lookup"))?;
        let role = approver.map(|row| row.try_get("role").unwrap_or(ROLE_MEMBER));
        if !role.map(can_approve).unwrap_or(false) {
            return Ok(Response::new(AcceptGroupResp {
                success: false,
                error_message: "Not authorized".to_owned(),
            }));
        }

        let new_status = if req.accept { REQ_ACCEPTED } else { REQ_REJECTED };
        sqlx::query(
            "UPDATE group_request SET status = ? WHERE user_id = ? AND group_id = ? AND status = ?",
        )
        .bind(new_status)
        .bind(req.applicant_id)
        .bind(req.group_id)
        .bind(REQ_PENDING)
        .execute(self.db.write())
        .await
        .map_err(|e| internal(e, "group request update"))?;

        if req.accept {
            let inserted =
                sqlx::query("INSERT INTO group_member (group_id, user_id, role) VALUES (?, ?, ?)")
                    .bind(req.group_id)
                    .bind(req.applicant_id)
                    .bind(ROLE_MEMBER)
                    .execute(self.db.write())
                    .await;
            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {}
                Err(e) => return Err(internal(e, "membership insert")),
            }

            self.send_system_message(
                req.user_id,
                req.applicant_id,
                0,
                MsgType::System,
                "Group join request accepted",
            )
            .await;
        }

        info!(
            user_id = req.user_id,
            group_id = req.group_id,
            applicant_id = req.applicant_id,
            accept = req.accept,
            "group accept"
        );
        Ok(Response::new(AcceptGroupResp { success: true, error_message: String::new() }))
    }
}

#[cfg(test)]
#[path = "relation_tests.rs"]
mod tests;
