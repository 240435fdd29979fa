// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Relational pools with read/write splitting.
//!
//! One pool points at the primary; one pool per read replica. Reads spread
//! randomly across the replicas and fall back to the primary when none are
//! configured. Connections are health-pinged on checkout.

use rand::Rng;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

#[derive(Clone)]
pub struct Db {
    write: MySqlPool,
    read: Vec<MySqlPool>,
}

impl Db {
    /// Build lazily-connecting pools from the primary URL and zero or more
    /// replica URLs. No connection is made until the first query.
    pub fn connect(
        write_url: &str,
        read_urls: &[String],
        max_conns: u32,
    ) -> anyhow::Result<Self> {
        let write = pool_options(max_conns).connect_lazy(write_url)?;
        let mut read = Vec::with_capacity(read_urls.len());
        for url in read_urls {
            read.push(pool_options(max_conns).connect_lazy(url)?);
        }
        Ok(Self { write, read })
    }

    pub fn write(&self) -> &MySqlPool {
        &self.write
    }

    /// A pool for read traffic: a random replica, or the primary when no
    /// replicas are configured.
    pub fn read(&self) -> &MySqlPool {
        match pick_replica(self.read.len()) {
            Some(i) => &self.read[i],
            None => &self.write,
        }
    }

    pub fn replica_count(&self) -> usize {
        self.read.len()
    }
}

fn pool_options(max_conns: u32) -> MySqlPoolOptions {
    MySqlPoolOptions::new().max_connections(max_conns).test_before_acquire(true)
}

fn pick_replica(count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    Some(rand::rng().random_range(0..count))
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
