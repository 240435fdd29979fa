// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session tokens: opaque strings minted at login.
//!
//! The shape (`token_{user_id}_{nanos}_{sig}`) keeps the legacy prefix but
//! appends an HMAC-SHA256 tag over user, device, and timestamp, so a token
//! cannot be forged from knowing the format. Every other component treats
//! the whole string as opaque and only ever compares it for equality against
//! the stored session record.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex characters of the HMAC tag kept in the token.
const SIG_LEN: usize = 16;

/// Mint a token for `(user_id, device)` at `now_ns`.
pub fn mint(secret: &str, user_id: i64, device: &str, now_ns: u128) -> anyhow::Result<String> {
    let payload = format!("token_{user_id}_{now_ns}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    mac.update(b".");
    mac.update(device.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{payload}_{}", &sig[..SIG_LEN]))
}

/// Current wall clock in nanoseconds since the epoch.
pub fn now_ns() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
