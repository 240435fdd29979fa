// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::channels::ChannelPool;

#[tokio::test]
async fn channels_are_memoized_per_address() -> anyhow::Result<()> {
    let pool = ChannelPool::new();
    assert!(pool.is_empty());

    let _a = pool.get("127.0.0.1:50051")?;
    let _a_again = pool.get("127.0.0.1:50051")?;
    assert_eq!(pool.len(), 1);

    let _b = pool.get("127.0.0.1:50052")?;
    assert_eq!(pool.len(), 2);
    Ok(())
}

#[tokio::test]
async fn bad_address_is_rejected() {
    let pool = ChannelPool::new();
    assert!(pool.get("not a uri").is_err());
    assert!(pool.is_empty());
}
