//! Daily statistics ledger and per-domain overview.
//!
//! Days are UTC calendar dates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{DailyStat, StatField};
use crate::store::WarmupStore;

/// Today's UTC date.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// One dashboard row per active domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainOverview {
    pub domain: String,
    pub current_week: i32,
    pub daily_limit: i32,
    pub is_active: bool,
    pub email_count: i64,
    pub today_sent: i32,
    pub today_received: i32,
    pub today_replied: i32,
}

/// Reads and increments [`DailyStat`] rows.
#[derive(Clone)]
pub struct StatsLedger {
    store: Arc<dyn WarmupStore>,
}

impl StatsLedger {
    pub fn new(store: Arc<dyn WarmupStore>) -> Self {
        Self { store }
    }

    /// Emails sent today from `domain`, 0 when no row exists yet.
    pub async fn count_sent_today(&self, domain: &str) -> Result<i32> {
        let stat = self.store.daily_stat(today(), domain).await?;
        Ok(stat.map(|s| s.emails_sent).unwrap_or(0))
    }

    /// Add one to `field` on today's row for `domain`.
    pub async fn increment(&self, domain: &str, field: StatField) -> Result<()> {
        debug!(domain = %domain, field = %field, "stat_increment");
        self.store.increment_stat(today(), domain, field).await
    }

    /// Rows from the trailing `days` window, newest first. A window reaching
    /// past 1970-01-01 starts there.
    pub async fn list(&self, domain: Option<&str>, days: u32) -> Result<Vec<DailyStat>> {
        let today = today();
        // 1970-01-01
        let floor = NaiveDate::default();
        let since = today
            .checked_sub_days(Days::new(days as u64))
            .unwrap_or(floor)
            .max(floor);
        self.store.stats_since(since, domain).await
    }

    /// Join each active config with its active-address count and today's row.
    pub async fn domain_overview(&self) -> Result<Vec<DomainOverview>> {
        let configs = self.store.active_domain_configs().await?;
        let counts = self.store.active_address_counts().await?;
        let today_stats: HashMap<String, DailyStat> = self
            .store
            .stats_for_date(today())
            .await?
            .into_iter()
            .map(|s| (s.domain.clone(), s))
            .collect();

        Ok(configs
            .into_iter()
            .map(|config| {
                let stat = today_stats.get(&config.domain);
                DomainOverview {
                    email_count: counts.get(&config.domain).copied().unwrap_or(0),
                    today_sent: stat.map(|s| s.emails_sent).unwrap_or(0),
                    today_received: stat.map(|s| s.emails_received).unwrap_or(0),
                    today_replied: stat.map(|s| s.emails_replied).unwrap_or(0),
                    domain: config.domain,
                    current_week: config.current_week,
                    daily_limit: config.daily_limit,
                    is_active: config.is_active,
                }
            })
            .collect())
    }
}
