// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::token::{mint, now_ns};

#[test]
fn tokens_keep_the_legacy_prefix() -> anyhow::Result<()> {
    let token = mint("secret", 42, "PC", 1_000)?;
    assert!(token.starts_with("token_42_1000_"), "got {token}");
    Ok(())
}

#[test]
fn tokens_are_deterministic_per_input() -> anyhow::Result<()> {
    let a = mint("secret", 42, "PC", 1_000)?;
    let b = mint("secret", 42, "PC", 1_000)?;
    assert_eq!(a, b);
    Ok(())
}

#[yare::parameterized(
    different_time   = { "secret", 42, "PC", 2_000 },
    different_user   = { "secret", 43, "PC", 1_000 },
    different_device = { "secret", 42, "Mobile", 1_000 },
    different_secret = { "other", 42, "PC", 1_000 },
)]
fn any_input_change_yields_a_new_token(
    secret: &str,
    user_id: i64,
    device: &str,
    now: u128,
) -> anyhow::Result<()> {
    let baseline = mint("secret", 42, "PC", 1_000)?;
    let other = mint(secret, user_id, device, now)?;
    assert_ne!(baseline, other);
    Ok(())
}

#[test]
fn device_binding_changes_only_the_signature() -> anyhow::Result<()> {
    let pc = mint("secret", 42, "PC", 1_000)?;
    let mobile = mint("secret", 42, "Mobile", 1_000)?;
    // Same visible payload, different tag.
    let prefix = "token_42_1000_";
    assert!(pc.starts_with(prefix) && mobile.starts_with(prefix));
    assert_ne!(pc, mobile);
    Ok(())
}

#[test]
fn clock_is_monotone_enough_for_uniqueness() {
    assert!(now_ns() > 0);
}
