//! In-memory view of taken usernames, consulted by registration before the
//! database. The cuckoo filter answers "definitely free"; the moka cache holds
//! recently active accounts and answers "taken" without a query.

use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::sync::RwLock;
use std::time::Duration;

use crate::models::normalize_username;

/// A campus has a few thousand accounts; the filter grows past this if needed.
const FILTER_CAPACITY: usize = 10_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;
const RECENT_CAPACITY: u64 = 5_000;
const RECENT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const WARMUP_BATCH: usize = 256;

pub static USERNAMES: Lazy<UsernameRegistry> = Lazy::new(UsernameRegistry::new);

pub struct UsernameRegistry {
    filter: RwLock<CuckooFilter<String>>,
    recent: Cache<String, ()>,
}

impl UsernameRegistry {
    pub fn new() -> Self {
        Self {
            filter: RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)),
            recent: Cache::builder()
                .max_capacity(RECENT_CAPACITY)
                .time_to_live(RECENT_TTL)
                .build(),
        }
    }

    /// Records a username that now exists in the table.
    pub async fn remember(&self, username: &str) {
        let username = normalize_username(username);
        if let Ok(mut filter) = self.filter.write() {
            filter.add(&username);
        }
        self.recent.insert(username, ()).await;
    }

    /// Marks an existing account as recently active.
    pub async fn touch(&self, username: &str) {
        self.recent.insert(normalize_username(username), ()).await;
    }

    /// A poisoned lock answers "maybe" so the caller falls through to the database.
    fn might_exist(&self, username: &str) -> bool {
        self.filter
            .read()
            .map(|filter| filter.contains(username))
            .unwrap_or(true)
    }

    /// Whether `username` is free to register. Database errors count as taken.
    pub async fn is_available(&self, pool: &SqlitePool, username: &str) -> bool {
        let username = normalize_username(username);

        if !self.might_exist(&username) {
            return true;
        }
        if self.recent.contains_key(&username) {
            return false;
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ? LIMIT 1)",
        )
        .bind(&username)
        .fetch_one(pool)
        .await
        .unwrap_or(true);

        !exists
    }

    /// Loads every username into the filter, and those active within
    /// `recent_days` into the cache, in one streaming pass.
    pub async fn warmup(&self, pool: &SqlitePool, recent_days: u32) -> Result<()> {
        let mut rows = sqlx::query_as::<_, (String, bool)>(
            r#"
            SELECT username,
                   COALESCE(last_login_at >= datetime('now', ?), 0) AS recent
            FROM users
            "#,
        )
        .bind(format!("-{recent_days} days"))
        .fetch(pool);

        let mut batch = Vec::with_capacity(WARMUP_BATCH);
        let (mut total, mut recent) = (0usize, 0usize);

        while let Some(row) = rows.next().await {
            let (username, is_recent) = row?;
            let username = normalize_username(&username);
            if is_recent {
                self.recent.insert(username.clone(), ()).await;
                recent += 1;
            }
            batch.push(username);
            total += 1;

            if batch.len() == WARMUP_BATCH {
                self.add_batch(&batch)?;
                batch.clear();
            }
        }
        self.add_batch(&batch)?;

        log::info!(
            "Username registry warmup complete: {} users, {} active in the last {} days",
            total,
            recent,
            recent_days
        );
        Ok(())
    }

    fn add_batch(&self, usernames: &[String]) -> Result<()> {
        let mut filter = self
            .filter
            .write()
            .map_err(|_| anyhow!("username filter poisoned"))?;
        for username in usernames {
            filter.add(username);
        }
        Ok(())
    }
}

impl Default for UsernameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
