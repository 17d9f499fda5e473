//! Warmup cycle: decides who emails whom and how much.
//!
//! One cycle walks every active domain, sends a small batch (1 or 2) within
//! the remaining daily quota, and either continues an open thread or starts a
//! new one. Repeated periodic cycles spread the quota across the day.
//!
//! Failures are per attempt: each is collected into the cycle's `errors` and
//! the cycle moves on.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::content::{generate_outbound, generate_reply};
use crate::error::{Result, WarmupError};
use crate::mailer::Mailer;
use crate::models::{DomainConfig, NewThread, PooledAddress, Thread, THREAD_MESSAGE_CAP};
use crate::sender::{SendRequest, Sender};
use crate::stats::StatsLedger;
use crate::store::WarmupStore;
use crate::util::Chance;

/// Outcome of one warmup cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub success: bool,
    pub emails_sent: u32,
    pub errors: Vec<String>,
}

/// Tunables for the cycle's random decisions.
#[derive(Debug, Clone, Copy)]
pub struct CyclePolicy {
    /// Probability of continuing an existing open thread
    pub reply_probability: f64,
    /// Probability of a typo in a new thread's subject
    pub typo_probability: f64,
    /// Batch sizes are drawn uniformly from `1..=max_batch`
    pub max_batch: u32,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        Self {
            reply_probability: 0.7,
            typo_probability: 0.2,
            max_batch: 2,
        }
    }
}

impl From<&Config> for CyclePolicy {
    fn from(config: &Config) -> Self {
        Self {
            reply_probability: config.reply_probability,
            typo_probability: config.typo_probability,
            max_batch: config.max_batch.max(1),
        }
    }
}

/// Runs warmup cycles.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn WarmupStore>,
    sender: Sender,
    stats: StatsLedger,
    chance: Arc<dyn Chance>,
    policy: CyclePolicy,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn WarmupStore>,
        mailer: Arc<dyn Mailer>,
        chance: Arc<dyn Chance>,
        policy: CyclePolicy,
    ) -> Self {
        Self {
            sender: Sender::new(store.clone(), mailer),
            stats: StatsLedger::new(store.clone()),
            store,
            chance,
            policy,
        }
    }

    /// Run one cycle over all active domains.
    pub async fn run_cycle(&self) -> CycleResult {
        info!("warmup_cycle_started");

        let configs = match self.store.active_domain_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "warmup_cycle_config_load_failed");
                return CycleResult {
                    success: false,
                    emails_sent: 0,
                    errors: vec![format!("Failed to fetch configs: {e}")],
                };
            }
        };

        if configs.is_empty() {
            info!("warmup_cycle_no_active_configs");
            return CycleResult {
                success: true,
                emails_sent: 0,
                errors: vec!["No active warmup configs".to_string()],
            };
        }

        let mut result = CycleResult {
            success: true,
            ..CycleResult::default()
        };

        for config in &configs {
            self.run_domain(config, &mut result).await;
        }

        info!(
            domains = configs.len(),
            emails_sent = result.emails_sent,
            error_count = result.errors.len(),
            "warmup_cycle_complete"
        );

        result
    }

    async fn run_domain(&self, config: &DomainConfig, result: &mut CycleResult) {
        let sent_today = match self.stats.count_sent_today(&config.domain).await {
            Ok(n) => n,
            Err(e) => {
                result.errors.push(format!("{}: {e}", config.domain));
                return;
            }
        };

        let remaining = config.daily_limit - sent_today;
        if remaining <= 0 {
            info!(
                domain = %config.domain,
                daily_limit = config.daily_limit,
                sent_today = sent_today,
                "warmup_daily_limit_reached"
            );
            return;
        }

        let batch = self.batch_size().min(remaining as u32);
        info!(
            domain = %config.domain,
            remaining = remaining,
            batch = batch,
            "warmup_domain_batch"
        );

        for _ in 0..batch {
            match self.send_one(config).await {
                Ok(()) => result.emails_sent += 1,
                Err(e) => {
                    warn!(domain = %config.domain, error = %e, "warmup_attempt_failed");
                    result.errors.push(format!("{}: {e}", config.domain));
                }
            }
        }
    }

    /// Uniform draw from `1..=max_batch`.
    fn batch_size(&self) -> u32 {
        let max = self.policy.max_batch.max(1);
        let draw = (self.chance.unit() * max as f64) as u32;
        draw.min(max - 1) + 1
    }

    fn pick<'a>(&self, pool: &'a [PooledAddress]) -> Option<&'a PooledAddress> {
        if pool.is_empty() {
            None
        } else {
            pool.get(self.chance.index(pool.len()))
        }
    }

    async fn send_one(&self, config: &DomainConfig) -> Result<()> {
        let senders = self.store.active_addresses_in(&config.domain).await?;
        let sender = self.pick(&senders).ok_or_else(|| {
            WarmupError::EmptyPool("No active emails for domain".to_string())
        })?;

        let recipients = self.store.active_addresses_outside(&sender.domain).await?;
        let recipient = self.pick(&recipients).ok_or_else(|| {
            WarmupError::EmptyPool("No recipient available".to_string())
        })?;

        let open = self.store.find_open_thread(sender.id, recipient.id).await?;
        match open {
            Some(thread) if self.chance.unit() < self.policy.reply_probability => {
                self.reply(&thread, sender, recipient).await
            }
            _ => self.start_thread(sender, recipient).await,
        }
    }

    async fn start_thread(&self, sender: &PooledAddress, recipient: &PooledAddress) -> Result<()> {
        let content = generate_outbound(&mut rand::thread_rng(), self.policy.typo_probability);

        let thread = self
            .store
            .create_thread(NewThread {
                from_email_id: sender.id,
                to_email_id: recipient.id,
                subject: content.subject.clone(),
            })
            .await
            .map_err(|e| WarmupError::Persistence(format!("Failed to create thread: {e}")))?;

        info!(
            thread_id = %thread.id,
            from = %sender.email,
            to = %recipient.email,
            "warmup_thread_started"
        );

        self.sender
            .send(SendRequest {
                from: &sender.email,
                domain: &sender.domain,
                to: &recipient.email,
                subject: &content.subject,
                body: &content.body,
                thread_id: thread.id,
                in_reply_to: None,
                references: None,
            })
            .await?;
        Ok(())
    }

    async fn reply(
        &self,
        thread: &Thread,
        sender: &PooledAddress,
        recipient: &PooledAddress,
    ) -> Result<()> {
        let body = generate_reply(&mut rand::thread_rng());
        let refs = self.sender.thread_references(thread.id).await?;
        let subject = format!("Re: {}", thread.subject);

        self.sender
            .send(SendRequest {
                from: &sender.email,
                domain: &sender.domain,
                to: &recipient.email,
                subject: &subject,
                body: &body,
                thread_id: thread.id,
                in_reply_to: refs.in_reply_to.as_deref(),
                references: refs.references.as_deref(),
            })
            .await?;

        // This send was the thread's last allowed message.
        if thread.message_count >= THREAD_MESSAGE_CAP - 1 {
            if let Err(e) = self.store.complete_thread(thread.id).await {
                error!(thread_id = %thread.id, error = %e, "warmup_thread_complete_failed");
            } else {
                info!(thread_id = %thread.id, "warmup_thread_completed");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::mock::MockMailer;
    use crate::models::{DailyStat, ThreadStatus};
    use crate::stats::today;
    use crate::store::MemoryStore;
    use crate::util::chance::scripted::ScriptedChance;
    use chrono::Utc;

    fn domain(name: &str, limit: i32) -> DomainConfig {
        let mut config = DomainConfig::starting(name, Utc::now());
        config.daily_limit = limit;
        config
    }

    async fn seeded(limit: i32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_domain_config(domain("a.com", limit)).await;
        store.insert_address(PooledAddress::new("alice@a.com", "a.com", "Alice")).await;
        store.insert_address(PooledAddress::new("bob@b.com", "b.com", "Bob")).await;
        store
    }

    fn scheduler(
        store: Arc<MemoryStore>,
        mailer: Arc<MockMailer>,
        units: &[f64],
    ) -> Scheduler {
        Scheduler::new(
            store,
            mailer,
            Arc::new(ScriptedChance::new(units, &[])),
            CyclePolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_no_active_configs() {
        let store = Arc::new(MemoryStore::new());
        let result = scheduler(store, Arc::new(MockMailer::default()), &[])
            .run_cycle()
            .await;
        assert!(result.success);
        assert_eq!(result.emails_sent, 0);
        assert_eq!(result.errors, vec!["No active warmup configs".to_string()]);
    }

    #[tokio::test]
    async fn test_quota_exhausted_sends_nothing() {
        let store = seeded(3).await;
        let mut stat = DailyStat::empty(today(), "a.com");
        stat.emails_sent = 3;
        store.insert_stat(stat).await;

        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store, mailer.clone(), &[0.9]).run_cycle().await;

        assert!(result.success);
        assert_eq!(result.emails_sent, 0);
        assert!(result.errors.is_empty());
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_batch_capped_by_remaining() {
        let store = seeded(3).await;
        let mut stat = DailyStat::empty(today(), "a.com");
        stat.emails_sent = 2;
        store.insert_stat(stat).await;

        let mailer = Arc::new(MockMailer::default());
        // Batch draw of 2, clipped to the single remaining send.
        let result = scheduler(store, mailer.clone(), &[0.9]).run_cycle().await;

        assert_eq!(result.emails_sent, 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_domain_scenario() {
        let store = seeded(3).await;
        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store.clone(), mailer.clone(), &[0.9]).run_cycle().await;

        assert!(result.success);
        assert_eq!(result.emails_sent, 2);
        assert!(result.errors.is_empty());

        let ledger = StatsLedger::new(store.clone());
        assert_eq!(ledger.count_sent_today("a.com").await.unwrap(), 2);

        let messages = store.messages().await;
        assert_eq!(messages.len(), 2);
        let threads = store.threads().await;
        for message in &messages {
            assert_eq!(threads.iter().filter(|t| t.id == message.thread_id).count(), 1);
        }
        for email in mailer.sent() {
            assert_eq!(email.from, "alice@a.com");
            assert_eq!(email.to, "bob@b.com");
        }
    }

    #[tokio::test]
    async fn test_batch_of_one() {
        let store = seeded(3).await;
        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store, mailer.clone(), &[0.1]).run_cycle().await;
        assert_eq!(result.emails_sent, 1);
    }

    #[tokio::test]
    async fn test_quota_holds_for_mixed_case_domain() {
        let store = Arc::new(MemoryStore::new());
        store.insert_domain_config(domain("Acme.com", 3)).await;
        store.insert_address(PooledAddress::new("sales@Acme.com", "Acme.com", "Sales")).await;
        store.insert_address(PooledAddress::new("bob@b.com", "b.com", "Bob")).await;

        let mailer = Arc::new(MockMailer::default());
        let sched = Scheduler::new(
            store.clone(),
            mailer.clone(),
            Arc::new(crate::util::ThreadChance),
            CyclePolicy::default(),
        );
        for _ in 0..10 {
            sched.run_cycle().await;
        }

        assert_eq!(mailer.sent().len(), 3);
        let ledger = StatsLedger::new(store);
        assert_eq!(ledger.count_sent_today("Acme.com").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_never_pairs_same_domain() {
        let store = Arc::new(MemoryStore::new());
        store.insert_domain_config(domain("a.com", 30)).await;
        store.insert_domain_config(domain("b.com", 30)).await;
        for (email, dom) in [
            ("a1@a.com", "a.com"),
            ("a2@a.com", "a.com"),
            ("b1@b.com", "b.com"),
            ("b2@b.com", "b.com"),
        ] {
            store.insert_address(PooledAddress::new(email, dom, email)).await;
        }

        let mailer = Arc::new(MockMailer::default());
        let sched = Scheduler::new(
            store,
            mailer.clone(),
            Arc::new(crate::util::ThreadChance),
            CyclePolicy::default(),
        );
        for _ in 0..5 {
            sched.run_cycle().await;
        }

        let sent = mailer.sent();
        assert!(!sent.is_empty());
        for email in sent {
            let from_domain = email.from.rsplit_once('@').map(|(_, d)| d.to_string());
            let to_domain = email.to.rsplit_once('@').map(|(_, d)| d.to_string());
            assert_ne!(from_domain, to_domain);
        }
    }

    #[tokio::test]
    async fn test_empty_recipient_pool_is_per_attempt_error() {
        let store = Arc::new(MemoryStore::new());
        store.insert_domain_config(domain("a.com", 3)).await;
        store.insert_address(PooledAddress::new("alice@a.com", "a.com", "Alice")).await;

        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store, mailer.clone(), &[0.9]).run_cycle().await;

        assert!(result.success);
        assert_eq!(result.emails_sent, 0);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0], "a.com: No recipient available");
    }

    #[tokio::test]
    async fn test_empty_sender_pool_does_not_stop_other_domains() {
        let store = seeded(3).await;
        store.insert_domain_config(domain("empty.com", 3)).await;

        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store, mailer.clone(), &[0.1, 0.1]).run_cycle().await;

        assert_eq!(result.emails_sent, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0], "empty.com: No active emails for domain");
    }

    #[tokio::test]
    async fn test_provider_rejection_collected() {
        let store = seeded(3).await;
        let mailer = Arc::new(MockMailer::rejecting());
        let result = scheduler(store.clone(), mailer, &[0.9]).run_cycle().await;

        assert!(result.success);
        assert_eq!(result.emails_sent, 0);
        assert_eq!(result.errors.len(), 2);
        assert!(store.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_thread_creation_failure_collected() {
        let store = seeded(3).await;
        store.fail_thread_creation(true);
        let mailer = Arc::new(MockMailer::default());
        let result = scheduler(store, mailer.clone(), &[0.1]).run_cycle().await;

        assert_eq!(result.emails_sent, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Failed to create thread"));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reply_continues_thread_with_references() {
        let store = seeded(30).await;
        let mailer = Arc::new(MockMailer::default());
        // Cycle 1: batch 1, new thread. Cycle 2: batch 1, reply (0.1 < 0.7).
        let sched = scheduler(store.clone(), mailer.clone(), &[0.1, 0.1, 0.1]);
        sched.run_cycle().await;
        sched.run_cycle().await;

        let threads = store.threads().await;
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].message_count, 2);

        let sent = mailer.sent();
        let first_id = sent[0].header("Message-ID").unwrap().to_string();
        assert_eq!(sent[1].subject, format!("Re: {}", threads[0].subject));
        assert_eq!(sent[1].header("In-Reply-To"), Some(first_id.as_str()));
        assert_eq!(sent[1].header("References"), Some(first_id.as_str()));
    }

    #[tokio::test]
    async fn test_new_thread_when_roll_exceeds_reply_probability() {
        let store = seeded(30).await;
        let mailer = Arc::new(MockMailer::default());
        // Second cycle rolls 0.8 >= 0.7: open a second thread.
        let sched = scheduler(store.clone(), mailer.clone(), &[0.1, 0.1, 0.8]);
        sched.run_cycle().await;
        sched.run_cycle().await;

        assert_eq!(store.threads().await.len(), 2);
        assert!(mailer.sent().iter().all(|e| e.header("In-Reply-To").is_none()));
    }

    #[tokio::test]
    async fn test_thread_completes_at_fifth_message() {
        let store = seeded(30).await;
        let mailer = Arc::new(MockMailer::default());
        // Each cycle: batch draw 0.1 (one send), then reply draw 0.1.
        let sched = scheduler(store.clone(), mailer.clone(), &[0.1; 20]);

        for expected in 1..=4 {
            sched.run_cycle().await;
            let thread = &store.threads().await[0];
            assert_eq!(thread.message_count, expected);
            assert_eq!(thread.status, ThreadStatus::Active);
        }

        sched.run_cycle().await;
        let threads = store.threads().await;
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].message_count, 5);
        assert_eq!(threads[0].status, ThreadStatus::Completed);

        // A completed thread is never continued; the next send opens a new one.
        sched.run_cycle().await;
        let threads = store.threads().await;
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].message_count, 5);
    }

    #[test]
    fn test_batch_size_bounds() {
        let store = Arc::new(MemoryStore::new());
        let sched = scheduler(store, Arc::new(MockMailer::default()), &[0.0, 0.49, 0.5, 0.999]);
        assert_eq!(sched.batch_size(), 1);
        assert_eq!(sched.batch_size(), 1);
        assert_eq!(sched.batch_size(), 2);
        assert_eq!(sched.batch_size(), 2);
    }
}
