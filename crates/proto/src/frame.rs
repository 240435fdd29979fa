// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Binary frame codec for client channels.
//!
//! Layout (all multi-byte fields big-endian):
//!
//! ```text
//! offset 0 : magic 'I','M'      (2 bytes)
//! offset 2 : version = 1        (1 byte)
//! offset 3 : cmd_id             (2 bytes)
//! offset 5 : body_length        (4 bytes)
//! offset 9 : body               (body_length bytes)
//! ```
//!
//! Frames ride inside binary WebSocket messages but are not aligned to them:
//! one message may carry several frames or a fragment of one. [`FrameDecoder`]
//! buffers input and pops complete frames in order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Leading magic bytes of every frame.
pub const MAGIC: [u8; 2] = *b"IM";

/// Protocol version carried in byte 2.
pub const VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 9;

/// Largest accepted body. Anything above is a protocol violation and drops
/// the session.
pub const MAX_BODY_LEN: usize = 1024 * 1024;

/// Command identifiers. Every `*Req` has a paired `*Resp`; `MsgPushNotify`
/// is server-initiated with no request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CmdId {
    LoginReq = 0x1001,
    LoginResp = 0x1002,
    HeartbeatReq = 0x1003,
    HeartbeatResp = 0x1004,
    LogoutReq = 0x1005,
    LogoutResp = 0x1006,

    MsgSendReq = 0x2001,
    MsgSendResp = 0x2002,
    MsgPushNotify = 0x2003,
    MsgSyncReq = 0x2004,
    MsgSyncResp = 0x2005,

    FriendApplyReq = 0x3001,
    FriendApplyResp = 0x3002,
    FriendAcceptReq = 0x3003,
    FriendAcceptResp = 0x3004,
    FriendListReq = 0x3005,
    FriendListResp = 0x3006,

    GroupCreateReq = 0x4001,
    GroupCreateResp = 0x4002,
    GroupJoinReq = 0x4003,
    GroupJoinResp = 0x4004,
    GroupListReq = 0x4005,
    GroupListResp = 0x4006,
    GroupApplyReq = 0x4007,
    GroupApplyResp = 0x4008,
    GroupAcceptReq = 0x4009,
    GroupAcceptResp = 0x4010,
}

impl CmdId {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(raw: u16) -> Option<Self> {
        let cmd = match raw {
            0x1001 => Self::LoginReq,
            0x1002 => Self::LoginResp,
            0x1003 => Self::HeartbeatReq,
            0x1004 => Self::HeartbeatResp,
            0x1005 => Self::LogoutReq,
            0x1006 => Self::LogoutResp,
            0x2001 => Self::MsgSendReq,
            0x2002 => Self::MsgSendResp,
            0x2003 => Self::MsgPushNotify,
            0x2004 => Self::MsgSyncReq,
            0x2005 => Self::MsgSyncResp,
            0x3001 => Self::FriendApplyReq,
            0x3002 => Self::FriendApplyResp,
            0x3003 => Self::FriendAcceptReq,
            0x3004 => Self::FriendAcceptResp,
            0x3005 => Self::FriendListReq,
            0x3006 => Self::FriendListResp,
            0x4001 => Self::GroupCreateReq,
            0x4002 => Self::GroupCreateResp,
            0x4003 => Self::GroupJoinReq,
            0x4004 => Self::GroupJoinResp,
            0x4005 => Self::GroupListReq,
            0x4006 => Self::GroupListResp,
            0x4007 => Self::GroupApplyReq,
            0x4008 => Self::GroupApplyResp,
            0x4009 => Self::GroupAcceptReq,
            0x4010 => Self::GroupAcceptResp,
            _ => return None,
        };
        Some(cmd)
    }

    /// Response command paired with this request, if this is a request.
    pub fn response(self) -> Option<Self> {
        let resp = match self {
            Self::LoginReq => Self::LoginResp,
            Self::HeartbeatReq => Self::HeartbeatResp,
            Self::LogoutReq => Self::LogoutResp,
            Self::MsgSendReq => Self::MsgSendResp,
            Self::MsgSyncReq => Self::MsgSyncResp,
            Self::FriendApplyReq => Self::FriendApplyResp,
            Self::FriendAcceptReq => Self::FriendAcceptResp,
            Self::FriendListReq => Self::FriendListResp,
            Self::GroupCreateReq => Self::GroupCreateResp,
            Self::GroupJoinReq => Self::GroupJoinResp,
            Self::GroupListReq => Self::GroupListResp,
            Self::GroupApplyReq => Self::GroupApplyResp,
            Self::GroupAcceptReq => Self::GroupAcceptResp,
            _ => return None,
        };
        Some(resp)
    }
}

/// One decoded frame. The body is protobuf for most commands; kick/logout
/// responses carry a plain UTF-8 reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub cmd_id: u16,
    pub body: Bytes,
}

/// Protocol violations that terminate the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    BadMagic,
    BadVersion(u8),
    Oversize(u32),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadMagic => f.write_str("bad frame magic"),
            Self::BadVersion(v) => write!(f, "unsupported frame version {v}"),
            Self::Oversize(len) => write!(f, "frame body too large ({len} bytes)"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Encode a single frame.
pub fn encode(cmd_id: CmdId, body: &[u8]) -> Bytes {
    encode_raw(cmd_id.as_u16(), body)
}

/// Encode with an arbitrary command id (used by tests to build bad input).
pub fn encode_raw(cmd_id: u16, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_slice(&MAGIC);
    buf.put_u8(VERSION);
    buf.put_u16(cmd_id);
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Streaming decoder. Feed bytes with [`extend`](Self::extend), pop frames
/// with [`next_frame`](Self::next_frame) until it returns `Ok(None)`. Any
/// error is fatal: the buffer contents are no longer trustworthy.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw input (typically one WebSocket binary payload).
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes currently buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete frame, or `Ok(None)` on a short read.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        if self.buf[0..2] != MAGIC {
            return Err(FrameError::BadMagic);
        }
        if self.buf[2] != VERSION {
            return Err(FrameError::BadVersion(self.buf[2]));
        }

        let cmd_id = u16::from_be_bytes([self.buf[3], self.buf[4]]);
        let body_len = u32::from_be_bytes([self.buf[5], self.buf[6], self.buf[7], self.buf[8]]);
        if body_len as usize > MAX_BODY_LEN {
            return Err(FrameError::Oversize(body_len));
        }

        if self.buf.len() < HEADER_LEN + body_len as usize {
            return Ok(None);
        }

        self.buf.advance(HEADER_LEN);
        let body = self.buf.split_to(body_len as usize).freeze();
        Ok(Some(Frame { cmd_id, body }))
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
