// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire contract shared by every IM component: generated gRPC/protobuf types
//! for the `im.v1` packages plus the binary frame codec spoken on client
//! channels.

pub mod frame;

/// Generated protobuf types for the `im.auth.v1` package.
pub mod auth {
    tonic::include_proto!("im.auth.v1");
}

/// Generated protobuf types for the `im.chat.v1` package.
pub mod chat {
    tonic::include_proto!("im.chat.v1");
}

/// Generated protobuf types for the `im.relation.v1` package.
pub mod relation {
    tonic::include_proto!("im.relation.v1");
}

/// Generated protobuf types for the `im.gateway.v1` package.
pub mod gateway {
    tonic::include_proto!("im.gateway.v1");
}
