// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::directory::Discovery;
use crate::kv::Kv;

fn offline_discovery() -> std::sync::Arc<Discovery> {
    // Port 1 never has a listener; any fallback enumeration will error and
    // discover() must degrade to None instead of panicking.
    match Kv::open("redis://127.0.0.1:1/") {
        Ok(kv) => Discovery::new(kv),
        Err(_) => unreachable!("static URL always parses"),
    }
}

#[tokio::test]
async fn round_robin_rotates_and_wraps() {
    let d = offline_discovery();
    d.replace("gateway", vec!["a:1".into(), "b:2".into(), "c:3".into()]);

    let picks: Vec<Option<String>> = [
        d.discover("gateway").await,
        d.discover("gateway").await,
        d.discover("gateway").await,
        d.discover("gateway").await,
    ]
    .into();
    assert_eq!(
        picks,
        vec![
            Some("a:1".to_owned()),
            Some("b:2".to_owned()),
            Some("c:3".to_owned()),
            Some("a:1".to_owned()),
        ]
    );
}

#[tokio::test]
async fn replace_shrinks_list_without_cursor_panic() {
    let d = offline_discovery();
    d.replace("chat", vec!["a:1".into(), "b:2".into(), "c:3".into()]);
    // Advance the cursor past the future list length.
    let _ = d.discover("chat").await;
    let _ = d.discover("chat").await;
    let _ = d.discover("chat").await;

    d.replace("chat", vec!["z:9".into()]);
    assert_eq!(d.discover("chat").await, Some("z:9".to_owned()));
    assert_eq!(d.discover("chat").await, Some("z:9".to_owned()));
}

#[tokio::test]
async fn empty_cache_and_unreachable_store_yield_none() {
    let d = offline_discovery();
    assert_eq!(d.discover("auth").await, None);

    // An observed-but-empty entry behaves the same.
    d.replace("auth", Vec::new());
    assert_eq!(d.discover("auth").await, None);
}

#[tokio::test]
async fn observe_is_idempotent() {
    let d = offline_discovery();
    d.observe("relation");
    d.observe("relation");
    // refresh() will fail against the dead store but must not panic or
    // disturb seeded entries for other services.
    d.replace("gateway", vec!["a:1".into()]);
    d.refresh().await;
    assert_eq!(d.discover("gateway").await, Some("a:1".to_owned()));
}
