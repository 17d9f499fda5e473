//! Persistent entities shared by the scheduler, sender and webhook paths.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages per thread after which a conversation is considered complete.
pub const THREAD_MESSAGE_CAP: i32 = 5;

/// A controlled mailbox participating in warmup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PooledAddress {
    pub id: Uuid,
    pub email: String,
    pub domain: String,
    pub alias: String,
    pub is_active: bool,
    pub daily_send_count: i32,
    pub daily_receive_count: i32,
    pub total_sent: i32,
    pub total_received: i32,
    pub reputation_score: f64,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub last_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PooledAddress {
    /// A fresh, active address with zeroed counters. Email and domain are
    /// kept as given.
    pub fn new(email: &str, domain: &str, alias: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            domain: domain.to_string(),
            alias: alias.to_string(),
            is_active: true,
            daily_send_count: 0,
            daily_receive_count: 0,
            total_sent: 0,
            total_received: 0,
            reputation_score: 0.0,
            last_sent_at: None,
            last_received_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Warmup ramp state for one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DomainConfig {
    pub id: Uuid,
    pub domain: String,
    pub current_week: i32,
    pub daily_limit: i32,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DomainConfig {
    /// Config for a domain starting warmup at `started_at` (week 1, limit 2).
    pub fn starting(domain: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            domain: domain.to_string(),
            current_week: 1,
            daily_limit: 2,
            is_active: true,
            started_at,
            updated_at: started_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Completed,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Active => "active",
            ThreadStatus::Completed => "completed",
        }
    }
}

impl TryFrom<String> for ThreadStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(ThreadStatus::Active),
            "completed" => Ok(ThreadStatus::Completed),
            other => Err(format!("unknown thread status: {other}")),
        }
    }
}

/// One modeled conversation between two pooled addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub id: Uuid,
    pub from_email_id: Uuid,
    pub to_email_id: Uuid,
    /// Normalized subject, without any reply prefix
    pub subject: String,
    pub message_count: i32,
    pub last_message_id: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Whether this thread links the two addresses, in either direction.
    pub fn connects(&self, a: Uuid, b: Uuid) -> bool {
        (self.from_email_id == a && self.to_email_id == b)
            || (self.from_email_id == b && self.to_email_id == a)
    }
}

/// Fields supplied when opening a thread.
#[derive(Debug, Clone)]
pub struct NewThread {
    pub from_email_id: Uuid,
    pub to_email_id: Uuid,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }

    /// Delivery status recorded alongside the direction.
    pub fn status(&self) -> &'static str {
        self.as_str()
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "sent" => Ok(Direction::Sent),
            "received" => Ok(Direction::Received),
            other => Err(format!("unknown message direction: {other}")),
        }
    }
}

/// One sent or received email. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    #[sqlx(try_from = "String")]
    pub direction: Direction,
    pub resend_id: Option<String>,
    pub status: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a message.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub thread_id: Uuid,
    pub from_email: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub direction: Direction,
    pub resend_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Per-(date, domain) counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyStat {
    pub id: Uuid,
    pub date: NaiveDate,
    pub domain: String,
    pub emails_sent: i32,
    pub emails_received: i32,
    pub emails_replied: i32,
    pub bounce_count: i32,
    pub spam_count: i32,
    pub created_at: DateTime<Utc>,
}

impl DailyStat {
    pub fn empty(date: NaiveDate, domain: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            domain: domain.to_string(),
            emails_sent: 0,
            emails_received: 0,
            emails_replied: 0,
            bounce_count: 0,
            spam_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn bump(&mut self, field: StatField) {
        let slot = match field {
            StatField::EmailsSent => &mut self.emails_sent,
            StatField::EmailsReceived => &mut self.emails_received,
            StatField::EmailsReplied => &mut self.emails_replied,
            StatField::BounceCount => &mut self.bounce_count,
            StatField::SpamCount => &mut self.spam_count,
        };
        *slot += 1;
    }
}

/// Counter columns of a [`DailyStat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    EmailsSent,
    EmailsReceived,
    EmailsReplied,
    BounceCount,
    SpamCount,
}

impl StatField {
    /// Column name in the `warmup_stats` table.
    pub fn column(&self) -> &'static str {
        match self {
            StatField::EmailsSent => "emails_sent",
            StatField::EmailsReceived => "emails_received",
            StatField::EmailsReplied => "emails_replied",
            StatField::BounceCount => "bounce_count",
            StatField::SpamCount => "spam_count",
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_connects_either_direction() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();
        let thread = Thread {
            id: Uuid::new_v4(),
            from_email_id: a,
            to_email_id: b,
            subject: "Checking in".to_string(),
            message_count: 0,
            last_message_id: None,
            status: ThreadStatus::Active,
            created_at: now,
            updated_at: now,
        };

        assert!(thread.connects(a, b));
        assert!(thread.connects(b, a));
        assert!(!thread.connects(a, Uuid::new_v4()));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            ThreadStatus::try_from("completed".to_string()),
            Ok(ThreadStatus::Completed)
        );
        assert!(ThreadStatus::try_from("archived".to_string()).is_err());
        assert_eq!(Direction::try_from("received".to_string()), Ok(Direction::Received));
    }

    #[test]
    fn test_daily_stat_bump() {
        let mut stat = DailyStat::empty(Utc::now().date_naive(), "a.com");
        stat.bump(StatField::EmailsSent);
        stat.bump(StatField::EmailsSent);
        stat.bump(StatField::SpamCount);
        assert_eq!(stat.emails_sent, 2);
        assert_eq!(stat.spam_count, 1);
        assert_eq!(stat.emails_received, 0);
    }
}
