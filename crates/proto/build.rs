// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    tonic_prost_build::configure().build_server(true).build_client(true).compile_protos(
        &[
            "../../proto/im/v1/auth.proto",
            "../../proto/im/v1/chat.proto",
            "../../proto/im/v1/relation.proto",
            "../../proto/im/v1/gateway.proto",
        ],
        &["../../proto"],
    )?;
    Ok(())
}
