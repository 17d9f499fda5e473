//! Inbound "email received" events.
//!
//! Runs after the webhook signature has been verified:
//!
//! ```text
//! filter type → pool match → resolve/create thread → record message → counters
//! ```
//!
//! Replies are never sent from here; the next scheduled cycle picks the
//! thread up through normal selection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::content::generate_reply_delay;
use crate::error::{Result, WarmupError};
use crate::models::{Direction, NewMessage, NewThread, StatField, Thread};
use crate::stats::StatsLedger;
use crate::store::WarmupStore;
use crate::util::normalize_address;

/// The only event type acted on.
pub const EMAIL_RECEIVED: &str = "email.received";

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub data: Option<InboundEmail>,
}

/// Recipient field, sent either as one address or a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    pub fn first(&self) -> Option<&str> {
        match self {
            Recipients::One(addr) => Some(addr.as_str()),
            Recipients::Many(addrs) => addrs.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEmail {
    pub from: String,
    pub to: Recipients,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub headers: InboundHeaders,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundHeaders {
    #[serde(default, rename = "message-id")]
    pub message_id: Option<String>,
    #[serde(default, rename = "in-reply-to")]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    /// Acknowledged without touching state.
    Ignored { reason: &'static str },
    /// Message recorded on `thread_id`.
    Recorded {
        thread_id: Uuid,
        /// Suggested delay before replying; informational only
        reply_delay: Duration,
    },
}

/// Strip one leading `Re:` (any case) and the whitespace after it.
pub fn strip_reply_prefix(subject: &str) -> &str {
    match subject.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("re:") => subject[3..].trim_start(),
        _ => subject,
    }
}

/// Applies verified inbound events to the store.
#[derive(Clone)]
pub struct InboundProcessor {
    store: Arc<dyn WarmupStore>,
    stats: StatsLedger,
}

impl InboundProcessor {
    pub fn new(store: Arc<dyn WarmupStore>) -> Self {
        let stats = StatsLedger::new(store.clone());
        Self { store, stats }
    }

    /// Handle one verified event.
    ///
    /// Errors: `Validation` for a received event without data, `Persistence`
    /// when a lookup fails or a new thread cannot be created. Everything after
    /// the thread exists is best-effort.
    pub async fn process(&self, event: InboundEvent) -> Result<InboundOutcome> {
        if event.event_type != EMAIL_RECEIVED {
            info!(event_type = %event.event_type, "webhook_event_ignored");
            return Ok(InboundOutcome::Ignored { reason: "Event ignored" });
        }

        let email = event
            .data
            .ok_or_else(|| WarmupError::Validation("missing event data".to_string()))?;
        let to_raw = email
            .to
            .first()
            .ok_or_else(|| WarmupError::Validation("missing recipient".to_string()))?;

        let from = normalize_address(&email.from);
        let to = normalize_address(to_raw);
        let message_id = email.headers.message_id.clone();
        let in_reply_to = email.headers.in_reply_to.clone();

        info!(from = %from, to = %to, message_id = ?message_id, "webhook_email_received");

        let from_address = self.store.find_address(&from).await?;
        let to_address = self.store.find_address(&to).await?;
        let (from_address, to_address) = match (from_address, to_address) {
            (Some(f), Some(t)) => (f, t),
            _ => {
                info!(from = %from, to = %to, "webhook_not_warmup_email");
                return Ok(InboundOutcome::Ignored { reason: "Not a warmup email" });
            }
        };

        if let Some(id) = message_id.as_deref() {
            if self.store.find_message_by_message_id(id).await?.is_some() {
                // Replays are recorded again; there is no idempotency key.
                warn!(message_id = %id, "webhook_duplicate_message_id");
            }
        }

        let thread = match self.resolve_thread(in_reply_to.as_deref()).await? {
            Some(thread) => thread,
            None => {
                let thread = self
                    .store
                    .create_thread(NewThread {
                        from_email_id: from_address.id,
                        to_email_id: to_address.id,
                        subject: strip_reply_prefix(&email.subject).to_string(),
                    })
                    .await
                    .map_err(|e| {
                        error!(error = %e, "webhook_thread_create_failed");
                        WarmupError::Persistence(format!("Failed to create thread: {e}"))
                    })?;
                info!(thread_id = %thread.id, "webhook_thread_created");
                thread
            }
        };

        let now = Utc::now();
        let message = NewMessage {
            thread_id: thread.id,
            from_email: from_address.email.clone(),
            to_email: to_address.email.clone(),
            subject: email.subject.clone(),
            body: email.text.clone().unwrap_or_default(),
            message_id: message_id.clone(),
            in_reply_to: in_reply_to.clone(),
            direction: Direction::Received,
            resend_id: None,
            sent_at: now,
        };

        match self.store.insert_message(message).await {
            Ok(_) => {
                if let Err(e) = self
                    .store
                    .record_thread_message(thread.id, message_id.as_deref(), now)
                    .await
                {
                    error!(thread_id = %thread.id, error = %e, "webhook_thread_update_failed");
                }
            }
            Err(e) => {
                error!(thread_id = %thread.id, error = %e, "webhook_message_log_failed");
            }
        }

        if let Err(e) = self.store.record_address_received(&to_address.email, now).await {
            error!(email = %to_address.email, error = %e, "webhook_recipient_counter_failed");
        }

        if let Err(e) = self
            .stats
            .increment(&to_address.domain, StatField::EmailsReceived)
            .await
        {
            error!(domain = %to_address.domain, error = %e, "webhook_stat_update_failed");
        }

        let reply_delay = generate_reply_delay(&mut rand::thread_rng());
        info!(
            thread_id = %thread.id,
            reply_delay_minutes = reply_delay.as_secs() / 60,
            "webhook_reply_deferred_to_cycle"
        );

        Ok(InboundOutcome::Recorded {
            thread_id: thread.id,
            reply_delay,
        })
    }

    /// Thread of the message this one replies to, if known.
    async fn resolve_thread(&self, in_reply_to: Option<&str>) -> Result<Option<Thread>> {
        let Some(in_reply_to) = in_reply_to else {
            return Ok(None);
        };
        match self.store.find_message_by_message_id(in_reply_to).await? {
            Some(parent) => self.store.get_thread(parent.thread_id).await,
            None => Ok(None),
        }
    }
}
