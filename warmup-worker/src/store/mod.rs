//! Persistence layer for warmup entities.
//!
//! The engine only needs single-row primitives, so the seam is one trait with
//! two implementations:
//! - [`PgStore`]: Postgres via sqlx, used in production
//! - [`MemoryStore`]: in-process collections, used by tests and dry runs
//!
//! Counter updates are atomic increments in both implementations, so
//! concurrent cycles and webhooks cannot lose an increment. Multi-step
//! sequences (send, then record) are still not transactional.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    DailyStat, DomainConfig, Message, NewMessage, NewThread, PooledAddress, StatField, Thread,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait WarmupStore: Send + Sync {
    // --- Domain configs ---

    /// All configs with `is_active = true`.
    async fn active_domain_configs(&self) -> Result<Vec<DomainConfig>>;

    /// Write back a recomputed ramp week and daily limit.
    async fn update_domain_ramp(&self, config_id: Uuid, week: i32, daily_limit: i32) -> Result<()>;

    // --- Pooled addresses ---

    /// Active addresses whose domain equals `domain`.
    async fn active_addresses_in(&self, domain: &str) -> Result<Vec<PooledAddress>>;

    /// Active addresses whose domain differs from `domain`.
    async fn active_addresses_outside(&self, domain: &str) -> Result<Vec<PooledAddress>>;

    /// Number of active addresses per domain.
    async fn active_address_counts(&self) -> Result<HashMap<String, i64>>;

    /// Exact (lowercase) email match, active or not.
    async fn find_address(&self, email: &str) -> Result<Option<PooledAddress>>;

    /// Bump daily/total send counters and `last_sent_at`.
    async fn record_address_sent(&self, email: &str, at: DateTime<Utc>) -> Result<()>;

    /// Bump daily/total receive counters and `last_received_at`.
    async fn record_address_received(&self, email: &str, at: DateTime<Utc>) -> Result<()>;

    /// Zero every address's daily counters. Returns the number of rows touched.
    async fn reset_daily_counters(&self) -> Result<u64>;

    // --- Threads ---

    /// Least-recently-updated active thread between `a` and `b` (either
    /// direction) with fewer than the capped number of messages.
    async fn find_open_thread(&self, a: Uuid, b: Uuid) -> Result<Option<Thread>>;

    async fn create_thread(&self, new: NewThread) -> Result<Thread>;

    async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>>;

    /// Increment the message count and move `last_message_id` forward.
    async fn record_thread_message(
        &self,
        id: Uuid,
        message_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn complete_thread(&self, id: Uuid) -> Result<()>;

    // --- Messages ---

    async fn insert_message(&self, new: NewMessage) -> Result<Message>;

    /// Earliest message carrying this Message-ID header.
    async fn find_message_by_message_id(&self, message_id: &str) -> Result<Option<Message>>;

    /// Message-IDs of a thread in chronological order, skipping messages
    /// without one.
    async fn thread_message_ids(&self, thread_id: Uuid) -> Result<Vec<String>>;

    // --- Daily stats ---

    async fn daily_stat(&self, date: NaiveDate, domain: &str) -> Result<Option<DailyStat>>;

    /// Upsert the `(date, domain)` row and add one to `field`.
    async fn increment_stat(&self, date: NaiveDate, domain: &str, field: StatField) -> Result<()>;

    /// Rows on or after `since`, newest first, optionally for one domain.
    async fn stats_since(&self, since: NaiveDate, domain: Option<&str>) -> Result<Vec<DailyStat>>;

    /// All rows for one date.
    async fn stats_for_date(&self, date: NaiveDate) -> Result<Vec<DailyStat>>;
}
