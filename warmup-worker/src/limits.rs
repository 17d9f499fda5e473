//! Weekly ramp of each domain's daily send cap.
//!
//! State is derived from wall-clock time on every run, so running the updater
//! more often than needed is harmless.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::store::WarmupStore;

/// Daily limit per ramp week, starting at week 1.
const RAMP: [i32; 6] = [3, 7, 12, 18, 25, 30];

/// Ramp week for a domain that started at `started_at`.
pub fn ramp_week(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i32 {
    let days = (now - started_at).num_days().max(0);
    (days / 7) as i32 + 1
}

/// Daily limit for a ramp week; weeks past the table stay at the last step.
pub fn daily_limit_for_week(week: i32) -> i32 {
    let idx = (week.max(1) as usize - 1).min(RAMP.len() - 1);
    RAMP[idx]
}

/// Recomputes week and limit for every active domain.
#[derive(Clone)]
pub struct LimitUpdater {
    store: Arc<dyn WarmupStore>,
}

impl LimitUpdater {
    pub fn new(store: Arc<dyn WarmupStore>) -> Self {
        Self { store }
    }

    /// Update every active config whose week or limit is stale. Returns the
    /// number of configs written.
    pub async fn update_limits(&self) -> Result<usize> {
        self.update_limits_at(Utc::now()).await
    }

    pub async fn update_limits_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let configs = self.store.active_domain_configs().await?;
        let mut updated = 0;

        for config in configs {
            let week = ramp_week(config.started_at, now);
            let limit = daily_limit_for_week(week);

            if config.current_week == week && config.daily_limit == limit {
                continue;
            }

            self.store.update_domain_ramp(config.id, week, limit).await?;
            updated += 1;

            info!(
                domain = %config.domain,
                previous_week = config.current_week,
                previous_limit = config.daily_limit,
                week = week,
                daily_limit = limit,
                "warmup_limit_updated"
            );
        }

        Ok(updated)
    }
}
