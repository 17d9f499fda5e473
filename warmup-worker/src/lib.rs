//! Warmup - domain reputation warmup engine.
//!
//! Keeps a pool of controlled mailboxes talking to each other so new sending
//! domains build reputation gradually. Two binaries share this library:
//! - `warmup-web`: HTTP server for the inbound webhook, cron trigger and stats
//! - `warmup-cycle`: one-shot cycle runner for process-based job schedulers
//!
//! ## Architecture
//!
//! ```text
//! cron → LimitUpdater → Scheduler → Sender → Mailer (Resend)
//! webhook → signature → InboundProcessor ─┐
//!                                         └→ WarmupStore (Postgres)
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod inbound;
pub mod limits;
pub mod mailer;
pub mod models;
pub mod scheduler;
pub mod sender;
pub mod stats;
pub mod store;
pub mod util;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, WarmupError};
pub use inbound::{InboundEvent, InboundOutcome, InboundProcessor};
pub use limits::LimitUpdater;
pub use mailer::{LogMailer, Mailer, ResendMailer};
pub use scheduler::{CyclePolicy, CycleResult, Scheduler};
pub use sender::Sender;
pub use stats::StatsLedger;
pub use store::{MemoryStore, PgStore, WarmupStore};
pub use web::AppState;
