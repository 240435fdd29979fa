// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth service: credential checks, session token minting, same-device
//! eviction.

use sqlx::Row;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use im_core::db::Db;
use im_core::kv::Kv;
use im_proto::auth::auth_service_server::AuthService;
use im_proto::auth::{LoginReq, LoginResp, LogoutReq, LogoutResp, RegisterReq, RegisterResp};

use crate::token;

pub struct AuthGrpc {
    kv: Kv,
    db: Db,
    secret: String,
}

impl AuthGrpc {
    pub fn new(kv: Kv, db: Db, secret: String) -> Self {
        Self { kv, db, secret }
    }
}

fn register_fail(message: &str) -> RegisterResp {
    RegisterResp { success: false, user_id: 0, error_message: message.to_owned() }
}

fn login_fail(message: &str) -> LoginResp {
    LoginResp {
        success: false,
        user_id: 0,
        token: String::new(),
        nickname: String::new(),
        error_message: message.to_owned(),
    }
}

#[tonic::async_trait]
impl AuthService for AuthGrpc {
    async fn register(
        &self,
        request: Request<RegisterReq>,
    ) -> Result<Response<RegisterResp>, Status> {
        let req = request.into_inner();
        if req.username.is_empty() || req.password.is_empty() {
            return Ok(Response::new(register_fail("Username or password cannot be empty")));
        }

        let result = sqlx::query("INSERT INTO `user` (username, password, nickname) VALUES (?, ?, ?)")
            .bind(&req.username)
            .bind(&req.password)
            .bind(&req.nickname)
            .execute(self.db.write())
            .await;

        match result {
            Ok(done) => {
                let user_id = done.last_insert_id() as i64;
                info!(user_id, username = %req.username, "user registered");
                Ok(Response::new(RegisterResp {
                    success: true,
                    user_id,
                    error_message: String::new(),
                }))
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Ok(Response::new(register_fail("Register failed: user may exist")))
            }
            Err(e) => {
                error!(err = %e, "register insert failed");
                Err(Status::internal("database error"))
            }
        }
    }

    async fn login(&self, request: Request<LoginReq>) -> Result<Response<LoginResp>, Status> {
        let req = request.into_inner();
        let device = if req.device.is_empty() { "PC".to_owned() } else { req.device };

        let row = sqlx::query("SELECT user_id, nickname, password FROM `user` WHERE username = ?")
            .bind(&req.username)
            .fetch_optional(self.db.read())
            .await
            .map_err(|e| {
                error!(err = %e, "login query failed");
                Status::internal("database error")
            })?;

        let Some(row) = row else {
            return Ok(Response::new(login_fail("User not found")));
        };
        let user_id: i64 = row.try_get("user_id").unwrap_or_default();
        let nickname: String = row.try_get("nickname").unwrap_or_default();
        let stored_password: String = row.try_get("password").unwrap_or_default();

        if stored_password != req.password {
            return Ok(Response::new(login_fail("Invalid password")));
        }

        let token = token::mint(&self.secret, user_id, &device, token::now_ns())
            .map_err(|_| Status::internal("token minting failed"))?;

        // Same-device eviction: the publish here is the only authoritative
        // kick source; gateways subscribe and act locally.
        match self.kv.session_token(user_id, &device).await {
            Ok(Some(_)) => {
                warn!(user_id, device = %device, "displacing existing session");
                if let Err(e) = self.kv.publish_kick(user_id, &device).await {
                    warn!(user_id, err = %e, "kick publish failed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(err = %e, "session lookup failed");
                return Err(Status::internal("session store error"));
            }
        }

        self.kv.set_session_token(user_id, &device, &token).await.map_err(|e| {
            error!(err = %e, "session write failed");
            Status::internal("session store error")
        })?;

        info!(user_id, device = %device, "login");
        Ok(Response::new(LoginResp {
            success: true,
            user_id,
            token,
            nickname,
            error_message: String::new(),
        }))
    }

    async fn logout(&self, request: Request<LogoutReq>) -> Result<Response<LogoutResp>, Status> {
        let req = request.into_inner();
        if req.device.is_empty() {
            self.kv.clear_session(req.user_id).await.map_err(|e| {
                error!(err = %e, "session clear failed");
                Status::internal("session store error")
            })?;
        } else {
            self.kv.clear_session_device(req.user_id, &req.device).await.map_err(|e| {
                error!(err = %e, "session clear failed");
                Status::internal("session store error")
            })?;
            if let Err(e) = self.kv.publish_kick(req.user_id, &req.device).await {
                warn!(user_id = req.user_id, err = %e, "kick publish failed");
            }
        }
        info!(user_id = req.user_id, device = %req.device, "logout");
        Ok(Response::new(LogoutResp { success: true }))
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
