//! In-process store for tests and dry runs.
//!
//! Every operation holds one lock for its whole read-modify-write, so
//! increments are atomic with respect to each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::WarmupStore;
use crate::error::{Result, WarmupError};
use crate::models::{
    DailyStat, DomainConfig, Message, NewMessage, NewThread, PooledAddress, StatField, Thread,
    ThreadStatus, THREAD_MESSAGE_CAP,
};

#[derive(Default)]
struct Tables {
    addresses: Vec<PooledAddress>,
    configs: Vec<DomainConfig>,
    threads: Vec<Thread>,
    messages: Vec<Message>,
    stats: Vec<DailyStat>,
}

/// Store keeping every table in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    ramp_writes: AtomicUsize,
    fail_thread_creation: AtomicBool,
    fail_config_load: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_address(&self, address: PooledAddress) {
        self.tables.lock().await.addresses.push(address);
    }

    pub async fn insert_domain_config(&self, config: DomainConfig) {
        self.tables.lock().await.configs.push(config);
    }

    pub async fn insert_stat(&self, stat: DailyStat) {
        self.tables.lock().await.stats.push(stat);
    }

    pub async fn domain_configs(&self) -> Vec<DomainConfig> {
        self.tables.lock().await.configs.clone()
    }

    pub async fn threads(&self) -> Vec<Thread> {
        self.tables.lock().await.threads.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.tables.lock().await.messages.clone()
    }

    /// Number of `update_domain_ramp` calls so far.
    pub fn ramp_writes(&self) -> usize {
        self.ramp_writes.load(Ordering::SeqCst)
    }

    /// Make subsequent `active_domain_configs` calls fail with a persistence error.
    pub fn fail_config_load(&self, fail: bool) {
        self.fail_config_load.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent `create_thread` calls fail with a persistence error.
    pub fn fail_thread_creation(&self, fail: bool) {
        self.fail_thread_creation.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WarmupStore for MemoryStore {
    async fn active_domain_configs(&self) -> Result<Vec<DomainConfig>> {
        if self.fail_config_load.load(Ordering::SeqCst) {
            return Err(WarmupError::Persistence("config load failed".to_string()));
        }
        let tables = self.tables.lock().await;
        Ok(tables.configs.iter().filter(|c| c.is_active).cloned().collect())
    }

    async fn update_domain_ramp(&self, config_id: Uuid, week: i32, daily_limit: i32) -> Result<()> {
        self.ramp_writes.fetch_add(1, Ordering::SeqCst);
        let mut tables = self.tables.lock().await;
        if let Some(config) = tables.configs.iter_mut().find(|c| c.id == config_id) {
            config.current_week = week;
            config.daily_limit = daily_limit;
            config.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn active_addresses_in(&self, domain: &str) -> Result<Vec<PooledAddress>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .addresses
            .iter()
            .filter(|a| a.is_active && a.domain == domain)
            .cloned()
            .collect())
    }

    async fn active_addresses_outside(&self, domain: &str) -> Result<Vec<PooledAddress>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .addresses
            .iter()
            .filter(|a| a.is_active && a.domain != domain)
            .cloned()
            .collect())
    }

    async fn active_address_counts(&self) -> Result<HashMap<String, i64>> {
        let tables = self.tables.lock().await;
        let mut counts = HashMap::new();
        for address in tables.addresses.iter().filter(|a| a.is_active) {
            *counts.entry(address.domain.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn find_address(&self, email: &str) -> Result<Option<PooledAddress>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .addresses
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn record_address_sent(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(address) = tables
            .addresses
            .iter_mut()
            .find(|a| a.email.eq_ignore_ascii_case(email))
        {
            address.daily_send_count += 1;
            address.total_sent += 1;
            address.last_sent_at = Some(at);
            address.updated_at = at;
        }
        Ok(())
    }

    async fn record_address_received(&self, email: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(address) = tables
            .addresses
            .iter_mut()
            .find(|a| a.email.eq_ignore_ascii_case(email))
        {
            address.daily_receive_count += 1;
            address.total_received += 1;
            address.last_received_at = Some(at);
            address.updated_at = at;
        }
        Ok(())
    }

    async fn reset_daily_counters(&self) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        for address in tables.addresses.iter_mut() {
            address.daily_send_count = 0;
            address.daily_receive_count = 0;
        }
        Ok(tables.addresses.len() as u64)
    }

    async fn find_open_thread(&self, a: Uuid, b: Uuid) -> Result<Option<Thread>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .threads
            .iter()
            .filter(|t| {
                t.status == ThreadStatus::Active
                    && t.message_count < THREAD_MESSAGE_CAP
                    && t.connects(a, b)
            })
            .min_by_key(|t| t.updated_at)
            .cloned())
    }

    async fn create_thread(&self, new: NewThread) -> Result<Thread> {
        if self.fail_thread_creation.load(Ordering::SeqCst) {
            return Err(WarmupError::Persistence("thread insert rejected".to_string()));
        }

        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            from_email_id: new.from_email_id,
            to_email_id: new.to_email_id,
            subject: new.subject,
            message_count: 0,
            last_message_id: None,
            status: ThreadStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.threads.push(thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, id: Uuid) -> Result<Option<Thread>> {
        let tables = self.tables.lock().await;
        Ok(tables.threads.iter().find(|t| t.id == id).cloned())
    }

    async fn record_thread_message(
        &self,
        id: Uuid,
        message_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(thread) = tables.threads.iter_mut().find(|t| t.id == id) {
            thread.message_count += 1;
            if let Some(message_id) = message_id {
                thread.last_message_id = Some(message_id.to_string());
            }
            thread.updated_at = at;
        }
        Ok(())
    }

    async fn complete_thread(&self, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if let Some(thread) = tables.threads.iter_mut().find(|t| t.id == id) {
            thread.status = ThreadStatus::Completed;
            thread.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_message(&self, new: NewMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            thread_id: new.thread_id,
            from_email: new.from_email,
            to_email: new.to_email,
            subject: new.subject,
            body: new.body,
            message_id: new.message_id,
            in_reply_to: new.in_reply_to,
            direction: new.direction,
            resend_id: new.resend_id,
            status: new.direction.status().to_string(),
            sent_at: Some(new.sent_at),
            created_at: Utc::now(),
        };
        self.tables.lock().await.messages.push(message.clone());
        Ok(message)
    }

    async fn find_message_by_message_id(&self, message_id: &str) -> Result<Option<Message>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .iter()
            .find(|m| m.message_id.as_deref() == Some(message_id))
            .cloned())
    }

    async fn thread_message_ids(&self, thread_id: Uuid) -> Result<Vec<String>> {
        // Insertion order is chronological order.
        let tables = self.tables.lock().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .filter_map(|m| m.message_id.clone())
            .collect())
    }

    async fn daily_stat(&self, date: NaiveDate, domain: &str) -> Result<Option<DailyStat>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .stats
            .iter()
            .find(|s| s.date == date && s.domain == domain)
            .cloned())
    }

    async fn increment_stat(&self, date: NaiveDate, domain: &str, field: StatField) -> Result<()> {
        let mut tables = self.tables.lock().await;
        match tables
            .stats
            .iter_mut()
            .find(|s| s.date == date && s.domain == domain)
        {
            Some(stat) => stat.bump(field),
            None => {
                let mut stat = DailyStat::empty(date, domain);
                stat.bump(field);
                tables.stats.push(stat);
            }
        }
        Ok(())
    }

    async fn stats_since(&self, since: NaiveDate, domain: Option<&str>) -> Result<Vec<DailyStat>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<DailyStat> = tables
            .stats
            .iter()
            .filter(|s| s.date >= since && domain.map_or(true, |d| s.domain == d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.domain.cmp(&b.domain)));
        Ok(rows)
    }

    async fn stats_for_date(&self, date: NaiveDate) -> Result<Vec<DailyStat>> {
        let tables = self.tables.lock().await;
        Ok(tables.stats.iter().filter(|s| s.date == date).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_find_open_thread_prefers_oldest() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = store
            .create_thread(NewThread { from_email_id: a, to_email_id: b, subject: "one".into() })
            .await
            .unwrap();
        let second = store
            .create_thread(NewThread { from_email_id: b, to_email_id: a, subject: "two".into() })
            .await
            .unwrap();

        // Touch the first thread so the second becomes least recently updated.
        store
            .record_thread_message(first.id, Some("<m1@a.com>"), Utc::now() + Duration::seconds(5))
            .await
            .unwrap();

        let found = store.find_open_thread(a, b).await.unwrap().unwrap();
        assert_eq!(found.id, second.id);
    }

    #[tokio::test]
    async fn test_find_open_thread_skips_full_and_completed() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let full = store
            .create_thread(NewThread { from_email_id: a, to_email_id: b, subject: "full".into() })
            .await
            .unwrap();
        for _ in 0..THREAD_MESSAGE_CAP {
            store.record_thread_message(full.id, None, Utc::now()).await.unwrap();
        }
        let done = store
            .create_thread(NewThread { from_email_id: a, to_email_id: b, subject: "done".into() })
            .await
            .unwrap();
        store.complete_thread(done.id).await.unwrap();

        assert!(store.find_open_thread(a, b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_stat_upserts() {
        let store = MemoryStore::new();
        let today = Utc::now().date_naive();

        store.increment_stat(today, "a.com", StatField::EmailsSent).await.unwrap();
        store.increment_stat(today, "a.com", StatField::EmailsSent).await.unwrap();
        store.increment_stat(today, "a.com", StatField::EmailsReceived).await.unwrap();

        let stat = store.daily_stat(today, "a.com").await.unwrap().unwrap();
        assert_eq!(stat.emails_sent, 2);
        assert_eq!(stat.emails_received, 1);
        assert_eq!(store.stats_for_date(today).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_daily_counters() {
        let store = MemoryStore::new();
        store.insert_address(PooledAddress::new("x@a.com", "a.com", "X")).await;
        store.record_address_sent("x@a.com", Utc::now()).await.unwrap();
        store.record_address_received("x@a.com", Utc::now()).await.unwrap();

        assert_eq!(store.reset_daily_counters().await.unwrap(), 1);

        let address = store.find_address("x@a.com").await.unwrap().unwrap();
        assert_eq!(address.daily_send_count, 0);
        assert_eq!(address.daily_receive_count, 0);
        assert_eq!(address.total_sent, 1);
        assert_eq!(address.total_received, 1);
    }
}
