// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound command dispatch: maps each request `cmd_id` to its protobuf
//! request type, the back-end RPC that serves it, and the paired response
//! `cmd_id`.
//!
//! Identity discipline: whatever the client put in `sender_id`/`user_id`
//! fields is overwritten with the session's authenticated `user_id` before
//! the request leaves this node. Heartbeats and in-band login checks are
//! answered inline without a back-end call.

use bytes::Bytes;
use prost::Message;
use tracing::{debug, warn};

use im_proto::auth::LogoutReq;
use im_proto::chat::{SendMessageReq, SendMessageResp, SyncMessagesReq, SyncMessagesResp};
use im_proto::frame::{encode, CmdId, Frame};
use im_proto::gateway::{HeartbeatReq, HeartbeatResp, WsLoginReq, WsLoginResp, WsLogoutReq};
use im_proto::relation::{
    AcceptFriendReq, AcceptFriendResp, AcceptGroupReq, AcceptGroupResp, ApplyFriendReq,
    ApplyFriendResp, ApplyGroupReq, ApplyGroupResp, CreateGroupReq, CreateGroupResp,
    GetFriendListReq, GetFriendListResp, GetGroupListReq, GetGroupListResp, JoinGroupReq,
    JoinGroupResp,
};

use crate::session::SessionHandle;
use crate::state::{epoch_ms, GatewayState};

/// What the reader loop should do with the dispatch result.
pub enum Action {
    /// Nothing to write (push notifications, unknown commands).
    None,
    /// Post one encoded response frame to the writer queue.
    Reply(Bytes),
    /// Queue a final logout frame carrying `reason`, then drain and close.
    Shutdown { reason: String },
}

fn reply<M: Message>(cmd: CmdId, msg: &M) -> Action {
    Action::Reply(encode(cmd, &msg.encode_to_vec()))
}

const ERR_BAD_REQUEST: &str = "bad request";
const ERR_BACKEND: &str = "backend unavailable";

/// Dispatch one decoded frame for an authenticated session.
pub async fn handle_frame(state: &GatewayState, session: &SessionHandle, frame: Frame) -> Action {
    let user_id = session.user_id();
    let cmd = match CmdId::from_u16(frame.cmd_id) {
        Some(cmd) => cmd,
        None => {
            warn!(user_id, cmd_id = frame.cmd_id, "unknown command, ignoring");
            return Action::None;
        }
    };

    match cmd {
        // -- Inline commands --------------------------------------------------
        CmdId::LoginReq => {
            // The upgrade already authenticated this session; the in-band
            // login just re-checks that the token is still current.
            let req = match WsLoginReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::LoginResp,
                        &WsLoginResp { success: false, error_message: ERR_BAD_REQUEST.to_owned() },
                    )
                }
            };
            let stored = state.kv.session_token(user_id, session.device()).await;
            let ok = matches!(stored, Ok(Some(ref t)) if *t == req.token);
            reply(
                CmdId::LoginResp,
                &WsLoginResp {
                    success: ok,
                    error_message: if ok { String::new() } else { "token mismatch".to_owned() },
                },
            )
        }

        CmdId::HeartbeatReq => {
            let _ = HeartbeatReq::decode(frame.body.clone());
            if let Err(e) = state.kv.touch_session(user_id).await {
                debug!(user_id, err = %e, "session ttl refresh failed");
            }
            if let Err(e) = state.kv.touch_location(user_id).await {
                debug!(user_id, err = %e, "location ttl refresh failed");
            }
            reply(CmdId::HeartbeatResp, &HeartbeatResp { server_time_ms: epoch_ms() })
        }

        CmdId::LogoutReq => {
            let _ = WsLogoutReq::decode(frame.body.clone());
            match state.backends.auth().await {
                Ok(mut client) => {
                    let req = LogoutReq {
                        user_id,
                        device: session.device().to_owned(),
                        token: String::new(),
                    };
                    if let Err(e) = client.logout(req).await {
                        warn!(user_id, err = %e, "logout rpc failed");
                    }
                }
                Err(e) => warn!(user_id, err = %e, "no auth service for logout"),
            }
            Action::Shutdown { reason: "Logout success".to_owned() }
        }

        // -- Chat -------------------------------------------------------------
        CmdId::MsgSendReq => {
            let mut req = match SendMessageReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => return reply(CmdId::MsgSendResp, &send_fail(ERR_BAD_REQUEST)),
            };
            req.sender_id = user_id;
            match state.backends.chat().await {
                Ok(mut client) => match client.send_message(req).await {
                    Ok(resp) => reply(CmdId::MsgSendResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "send_message rpc failed");
                        reply(CmdId::MsgSendResp, &send_fail(ERR_BACKEND))
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no chat service");
                    reply(CmdId::MsgSendResp, &send_fail(ERR_BACKEND))
                }
            }
        }

        CmdId::MsgSyncReq => {
            let mut req = match SyncMessagesReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => return reply(CmdId::MsgSyncResp, &sync_fail(ERR_BAD_REQUEST)),
            };
            req.user_id = user_id;
            match state.backends.chat().await {
                Ok(mut client) => match client.sync_messages(req).await {
                    Ok(resp) => reply(CmdId::MsgSyncResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "sync_messages rpc failed");
                        reply(CmdId::MsgSyncResp, &sync_fail(ERR_BACKEND))
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no chat service");
                    reply(CmdId::MsgSyncResp, &sync_fail(ERR_BACKEND))
                }
            }
        }

        // -- Friend relations -------------------------------------------------
        CmdId::FriendApplyReq => {
            let mut req = match ApplyFriendReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::FriendApplyResp,
                        &ApplyFriendResp {
                            success: false,
                            apply_id: 0,
                            error_message: ERR_BAD_REQUEST.to_owned(),
                        },
                    )
                }
            };
            req.user_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.apply_friend(req).await {
                    Ok(resp) => reply(CmdId::FriendApplyResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "apply_friend rpc failed");
                        reply(
                            CmdId::FriendApplyResp,
                            &ApplyFriendResp {
                                success: false,
                                apply_id: 0,
                                error_message: ERR_BACKEND.to_owned(),
                            },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::FriendApplyResp,
                        &ApplyFriendResp {
                            success: false,
                            apply_id: 0,
                            error_message: ERR_BACKEND.to_owned(),
                        },
                    )
                }
            }
        }

        CmdId::FriendAcceptReq => {
            let mut req = match AcceptFriendReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::FriendAcceptResp,
                        &AcceptFriendResp {
                            success: false,
                            error_message: ERR_BAD_REQUEST.to_owned(),
                        },
                    )
                }
            };
            req.user_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.accept_friend(req).await {
                    Ok(resp) => reply(CmdId::FriendAcceptResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "accept_friend rpc failed");
                        reply(
                            CmdId::FriendAcceptResp,
                            &AcceptFriendResp {
                                success: false,
                                error_message: ERR_BACKEND.to_owned(),
                            },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::FriendAcceptResp,
                        &AcceptFriendResp { success: false, error_message: ERR_BACKEND.to_owned() },
                    )
                }
            }
        }

        CmdId::FriendListReq => {
            let _ = GetFriendListReq::decode(frame.body.clone());
            let req = GetFriendListReq { user_id };
            match state.backends.relation().await {
                Ok(mut client) => match client.get_friend_list(req).await {
                    Ok(resp) => reply(CmdId::FriendListResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "get_friend_list rpc failed");
                        reply(
                            CmdId::FriendListResp,
                            &GetFriendListResp { success: false, friends: Vec::new() },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::FriendListResp,
                        &GetFriendListResp { success: false, friends: Vec::new() },
                    )
                }
            }
        }

        // -- Groups -----------------------------------------------------------
        CmdId::GroupCreateReq => {
            let mut req = match CreateGroupReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::GroupCreateResp,
                        &CreateGroupResp {
                            success: false,
                            group_id: 0,
                            error_message: ERR_BAD_REQUEST.to_owned(),
                        },
                    )
                }
            };
            req.owner_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.create_group(req).await {
                    Ok(resp) => reply(CmdId::GroupCreateResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "create_group rpc failed");
                        reply(
                            CmdId::GroupCreateResp,
                            &CreateGroupResp {
                                success: false,
                                group_id: 0,
                                error_message: ERR_BACKEND.to_owned(),
                            },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::GroupCreateResp,
                        &CreateGroupResp {
                            success: false,
                            group_id: 0,
                            error_message: ERR_BACKEND.to_owned(),
                        },
                    )
                }
            }
        }

        CmdId::GroupJoinReq => {
            let mut req = match JoinGroupReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::GroupJoinResp,
                        &JoinGroupResp { success: false, error_message: ERR_BAD_REQUEST.to_owned() },
                    )
                }
            };
            req.user_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.join_group(req).await {
                    Ok(resp) => reply(CmdId::GroupJoinResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "join_group rpc failed");
                        reply(
                            CmdId::GroupJoinResp,
                            &JoinGroupResp { success: false, error_message: ERR_BACKEND.to_owned() },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::GroupJoinResp,
                        &JoinGroupResp { success: false, error_message: ERR_BACKEND.to_owned() },
                    )
                }
            }
        }

        CmdId::GroupListReq => {
            let _ = GetGroupListReq::decode(frame.body.clone());
            let req = GetGroupListReq { user_id };
            match state.backends.relation().await {
                Ok(mut client) => match client.get_group_list(req).await {
                    Ok(resp) => reply(CmdId::GroupListResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "get_group_list rpc failed");
                        reply(
                            CmdId::GroupListResp,
                            &GetGroupListResp { success: false, groups: Vec::new() },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::GroupListResp,
                        &GetGroupListResp { success: false, groups: Vec::new() },
                    )
                }
            }
        }

        CmdId::GroupApplyReq => {
            let mut req = match ApplyGroupReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::GroupApplyResp,
                        &ApplyGroupResp {
                            success: false,
                            apply_id: 0,
                            error_message: ERR_BAD_REQUEST.to_owned(),
                        },
                    )
                }
            };
            req.user_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.apply_group(req).await {
                    Ok(resp) => reply(CmdId::GroupApplyResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "apply_group rpc failed");
                        reply(
                            CmdId::GroupApplyResp,
                            &ApplyGroupResp {
                                success: false,
                                apply_id: 0,
                                error_message: ERR_BACKEND.to_owned(),
                            },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::GroupApplyResp,
                        &ApplyGroupResp {
                            success: false,
                            apply_id: 0,
                            error_message: ERR_BACKEND.to_owned(),
                        },
                    )
                }
            }
        }

        CmdId::GroupAcceptReq => {
            let mut req = match AcceptGroupReq::decode(frame.body.clone()) {
                Ok(req) => req,
                Err(_) => {
                    return reply(
                        CmdId::GroupAcceptResp,
                        &AcceptGroupResp {
                            success: false,
                            error_message: ERR_BAD_REQUEST.to_owned(),
                        },
                    )
                }
            };
            req.user_id = user_id;
            match state.backends.relation().await {
                Ok(mut client) => match client.accept_group(req).await {
                    Ok(resp) => reply(CmdId::GroupAcceptResp, &resp.into_inner()),
                    Err(status) => {
                        warn!(user_id, err = %status, "accept_group rpc failed");
                        reply(
                            CmdId::GroupAcceptResp,
                            &AcceptGroupResp { success: false, error_message: ERR_BACKEND.to_owned() },
                        )
                    }
                },
                Err(e) => {
                    warn!(user_id, err = %e, "no relation service");
                    reply(
                        CmdId::GroupAcceptResp,
                        &AcceptGroupResp { success: false, error_message: ERR_BACKEND.to_owned() },
                    )
                }
            }
        }

        // Server-initiated or response commands arriving inbound are noise.
        CmdId::LoginResp
        | CmdId::HeartbeatResp
        | CmdId::LogoutResp
        | CmdId::MsgSendResp
        | CmdId::MsgPushNotify
        | CmdId::MsgSyncResp
        | CmdId::FriendApplyResp
        | CmdId::FriendAcceptResp
        | CmdId::FriendListResp
        | CmdId::GroupCreateResp
        | CmdId::GroupJoinResp
        | CmdId::GroupListResp
        | CmdId::GroupApplyResp
        | CmdId::GroupAcceptResp => {
            debug!(user_id, cmd_id = frame.cmd_id, "ignoring non-request command");
            Action::None
        }
    }
}

fn send_fail(message: &str) -> SendMessageResp {
    SendMessageResp { success: false, msg_id: 0, seq_id: 0, error_message: message.to_owned() }
}

fn sync_fail(message: &str) -> SyncMessagesResp {
    SyncMessagesResp {
        success: false,
        msgs: Vec::new(),
        max_seq: 0,
        error_message: message.to_owned(),
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
