//! Postgres-backed store using sqlx.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use super::WarmupStore;
use crate::error::Result;
use crate::models::{
    DailyStat, DomainConfig, Message, NewMessage, NewThread, PooledAddress, StatField, Thread,
    ThreadStatus, THREAD_MESSAGE_CAP,
};

/// Store backed by a Postgres connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;

        info!(max_connections = max_connections, "database_pool_created");
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database_migrations_applied");
        Ok(())
    }
}

/// Upsert statement for one stat column. Column names come from
/// [`StatField::column`], never from input.
fn increment_stat_sql(field: StatField) -> String {
    let col = field.column();
    format!(
        "INSERT INTO warmup_stats (id, date, domain, {col}) VALUES ($1, $2, $3, 1) \
         ON CONFLICT (date, domain) DO UPDATE SET {col} = warmup_stats.{col} + 1"
    )
}

#[async_trait]
impl WarmupStore for PgStore {
    async fn active_domain_configs(&self) -> Result<Vec<DomainConfig>> {
        let rows = sqlx::query_as::<_, DomainConfig>(
            "SELECT * FROM warmup_config WHERE is_active = TRUE ORDER BY domain",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update_domain_ramp(&self, config_id: Uuid, week: i32, daily_limit: i32) -> Result<()> {
        sqlx::query(
            "UPDATE warmup_config SET current_week = $2, daily_limit = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(config_id)
        .bind(week)
        .bind(daily_limit)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_addresses_in(&self, domain: &str) -> Result<Vec<PooledAddress>> {
        let rows = sqlx::query_as::<_, PooledAddress>(
            "SELECT * FROM warmup_emails WHERE is_active = TRUE AND domain = $1 ORDER BY email",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn active_addresses_outside(&self, domain: &str) -> Result<Vec<PooledAddress>> {
        let rows = sqlx::query_as::<_, PooledAddress>(
            "SELECT * FROM warmup_emails WHERE is_active = TRUE AND domain <> $1 ORDER BY email",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn active_address_counts(&self) -> Result<HashMap<String, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT domain, COUNT(*) FROM warmup_emails WHERE is_active = TRUE GROUP BY domain",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn find_address(&self, email: &str) -> Result<Option<PooledAddress>> {
        let row = sqlx::query_as::<_, PooledAddress>(
            "SELECT * FROM warmup_emails WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn record_address_sent(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE warmup_emails SET daily_send_count = daily_send_count + 1, \
             total_sent = total_sent + 1, last_sent_at = $2, updated_at = $2 \
             WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_address_received(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE warmup_emails SET daily_receive_count = daily_receive_count + 1, \
             total_received = total_received + 1, last_received_at = $2, updated_at = $2 \
             WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_daily_counters(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE warmup_emails SET daily_send_count = 0, daily_receive_count = 0, \
             updated_at = NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_open_thread(&self, a: Uuid, b: Uuid) -> Result<Option<Thread>> {
        let row = sqlx::query_as::<_, Thread>(
            "SELECT * FROM warmup_threads WHERE status = $3 AND message_count < $4 \
             AND ((from_email_id = $1 AND to_email_id = $2) \
               OR (from_email_id = $2 AND to_email_id = $1)) \
             ORDER BY updated_at ASC LIMIT 1",
        )
        .bind(a)
        .bind(b)
        .bind(ThreadStatus::Active.as_str())
        .bind(THREAD_MESSAGE_CAP)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_thread(&self, new: NewThread) -> Result<Thread> {
        let row = sqlx::query_as::<_, Thread>(
            "INSERT INTO warmup_threads (id, from_email_id, to_email_id, subject, status) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.from_email_id)
        .bind(new.to_email_id)
        .bind(&new.subject)
        .bind(ThreadStatus::Active.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>> {
        let row = sqlx::query_as::<_, Thread>("SELECT * FROM warmup_threads WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn record_thread_message(
        &self,
        id: Uuid,
        message_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE warmup_threads SET message_count = message_count + 1, \
             last_message_id = COALESCE($2, last_message_id), updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(message_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_thread(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE warmup_threads SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(ThreadStatus::Completed.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let row = sqlx::query_as::<_, Message>(
            "INSERT INTO warmup_messages (id, thread_id, from_email, to_email, subject, body, \
             message_id, in_reply_to, direction, resend_id, status, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new.thread_id)
        .bind(&new.from_email)
        .bind(&new.to_email)
        .bind(&new.subject)
        .bind(&new.body)
        .bind(&new.message_id)
        .bind(&new.in_reply_to)
        .bind(new.direction.as_str())
        .bind(&new.resend_id)
        .bind(new.direction.status())
        .bind(new.sent_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_message_by_message_id(&self, message_id: &str) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, Message>(
            "SELECT * FROM warmup_messages WHERE message_id = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn thread_message_ids(&self, thread_id: Uuid) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT message_id FROM warmup_messages \
             WHERE thread_id = $1 AND message_id IS NOT NULL ORDER BY created_at ASC",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn daily_stat(&self, date: NaiveDate, domain: &str) -> Result<Option<DailyStat>> {
        let row = sqlx::query_as::<_, DailyStat>(
            "SELECT * FROM warmup_stats WHERE date = $1 AND domain = $2",
        )
        .bind(date)
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn increment_stat(&self, date: NaiveDate, domain: &str, field: StatField) -> Result<()> {
        sqlx::query(&increment_stat_sql(field))
            .bind(Uuid::new_v4())
            .bind(date)
            .bind(domain)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats_since(&self, since: NaiveDate, domain: Option<&str>) -> Result<Vec<DailyStat>> {
        let rows = sqlx::query_as::<_, DailyStat>(
            "SELECT * FROM warmup_stats WHERE date >= $1 AND ($2::TEXT IS NULL OR domain = $2) \
             ORDER BY date DESC, domain ASC",
        )
        .bind(since)
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn stats_for_date(&self, date: NaiveDate) -> Result<Vec<DailyStat>> {
        let rows = sqlx::query_as::<_, DailyStat>(
            "SELECT * FROM warmup_stats WHERE date = $1 ORDER BY domain",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
