//! Outbound send path with RFC 5322 threading headers.
//!
//! A send is committed once the provider accepts it. Bookkeeping after that
//! point (message row, counters, stats) is best-effort: failures are logged
//! and never turn an accepted send into a failure.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::content::generate_message_id;
use crate::error::{Result, WarmupError};
use crate::mailer::{Mailer, OutboundEmail};
use crate::models::{Direction, NewMessage, StatField};
use crate::stats::StatsLedger;
use crate::store::WarmupStore;

/// One outbound message to send on a thread.
#[derive(Debug, Clone)]
pub struct SendRequest<'a> {
    pub from: &'a str,
    /// Stored domain of the sending address; stats are keyed on it
    pub domain: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub thread_id: Uuid,
    pub in_reply_to: Option<&'a str>,
    pub references: Option<&'a str>,
}

/// A send accepted by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    /// Generated Message-ID header
    pub message_id: String,
    /// Provider-assigned id
    pub provider_id: String,
}

/// Threading headers for the next reply on a thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadReferences {
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

/// Build the provider message, including threading headers for replies.
pub fn compose(request: &SendRequest<'_>, message_id: &str) -> OutboundEmail {
    let mut headers = vec![("Message-ID".to_string(), message_id.to_string())];

    if let Some(in_reply_to) = request.in_reply_to {
        headers.push(("In-Reply-To".to_string(), in_reply_to.to_string()));
        headers.push((
            "References".to_string(),
            request.references.unwrap_or(in_reply_to).to_string(),
        ));
    }

    OutboundEmail {
        from: request.from.to_string(),
        to: request.to.to_string(),
        subject: request.subject.to_string(),
        text: request.body.to_string(),
        headers,
    }
}

/// Sends warmup mail and records it.
#[derive(Clone)]
pub struct Sender {
    store: Arc<dyn WarmupStore>,
    mailer: Arc<dyn Mailer>,
    stats: StatsLedger,
}

impl Sender {
    pub fn new(store: Arc<dyn WarmupStore>, mailer: Arc<dyn Mailer>) -> Self {
        let stats = StatsLedger::new(store.clone());
        Self { store, mailer, stats }
    }

    /// Send one message. Returns `Err` only when nothing was sent.
    pub async fn send(&self, request: SendRequest<'_>) -> Result<SentMessage> {
        let domain = request.domain;
        if domain.trim().is_empty() {
            return Err(WarmupError::Validation(format!(
                "sender address has no domain: {}",
                request.from
            )));
        }
        let message_id = generate_message_id(&mut rand::thread_rng(), domain);
        let email = compose(&request, &message_id);

        let provider_id = match self.mailer.send(&email).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    from = %request.from,
                    to = %request.to,
                    thread_id = %request.thread_id,
                    error = %e,
                    "warmup_send_failed"
                );
                return Err(e);
            }
        };

        let now = Utc::now();

        let message = NewMessage {
            thread_id: request.thread_id,
            from_email: request.from.to_string(),
            to_email: request.to.to_string(),
            subject: request.subject.to_string(),
            body: request.body.to_string(),
            message_id: Some(message_id.clone()),
            in_reply_to: request.in_reply_to.map(str::to_string),
            direction: Direction::Sent,
            resend_id: Some(provider_id.clone()),
            sent_at: now,
        };
        // The thread count mirrors stored rows, so it only moves with one.
        match self.store.insert_message(message).await {
            Ok(_) => {
                if let Err(e) = self
                    .store
                    .record_thread_message(request.thread_id, Some(&message_id), now)
                    .await
                {
                    error!(thread_id = %request.thread_id, error = %e, "warmup_thread_update_failed");
                }
            }
            Err(e) => {
                error!(message_id = %message_id, error = %e, "warmup_message_log_failed");
            }
        }

        if let Err(e) = self.store.record_address_sent(request.from, now).await {
            error!(email = %request.from, error = %e, "warmup_sender_counter_failed");
        }

        if let Err(e) = self.stats.increment(domain, StatField::EmailsSent).await {
            error!(domain = %domain, error = %e, "warmup_stat_update_failed");
        }

        info!(
            from = %request.from,
            to = %request.to,
            thread_id = %request.thread_id,
            message_id = %message_id,
            provider_id = %provider_id,
            is_reply = request.in_reply_to.is_some(),
            "warmup_email_sent"
        );

        Ok(SentMessage {
            message_id,
            provider_id,
        })
    }

    /// In-Reply-To and References for the next reply on `thread_id`.
    ///
    /// References is every Message-ID in the thread, oldest first, joined by
    /// spaces. Both are empty when the thread has no last message.
    pub async fn thread_references(&self, thread_id: Uuid) -> Result<ThreadReferences> {
        let last = match self.store.get_thread(thread_id).await? {
            Some(thread) => thread.last_message_id,
            None => None,
        };
        let Some(in_reply_to) = last else {
            return Ok(ThreadReferences::default());
        };

        let ids = self.store.thread_message_ids(thread_id).await?;
        let references = if ids.is_empty() { None } else { Some(ids.join(" ")) };

        Ok(ThreadReferences {
            in_reply_to: Some(in_reply_to),
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::mock::MockMailer;
    use crate::models::{NewThread, PooledAddress};
    use crate::store::MemoryStore;
    use crate::stats::today;

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<MockMailer>,
        sender: Sender,
        thread_id: Uuid,
    }

    async fn fixture(mailer: MockMailer) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let alice = PooledAddress::new("alice@a.com", "a.com", "Alice");
        let bob = PooledAddress::new("bob@b.com", "b.com", "Bob");
        let thread = store
            .create_thread(NewThread {
                from_email_id: alice.id,
                to_email_id: bob.id,
                subject: "Checking in".to_string(),
            })
            .await
            .unwrap();
        store.insert_address(alice).await;
        store.insert_address(bob).await;

        let mailer = Arc::new(mailer);
        let sender = Sender::new(store.clone(), mailer.clone());
        Fixture { store, mailer, sender, thread_id: thread.id }
    }

    fn request(thread_id: Uuid) -> SendRequest<'static> {
        SendRequest {
            from: "alice@a.com",
            domain: "a.com",
            to: "bob@b.com",
            subject: "Checking in",
            body: "Hello",
            thread_id,
            in_reply_to: None,
            references: None,
        }
    }

    #[test]
    fn test_compose_new_thread_has_only_message_id() {
        let email = compose(&request(Uuid::new_v4()), "<1.a@a.com>");
        assert_eq!(email.headers.len(), 1);
        assert_eq!(email.header("Message-ID"), Some("<1.a@a.com>"));
    }

    #[test]
    fn test_compose_reply_falls_back_to_in_reply_to() {
        let mut req = request(Uuid::new_v4());
        req.in_reply_to = Some("<1.a@a.com>");
        let email = compose(&req, "<2.b@a.com>");
        assert_eq!(email.header("In-Reply-To"), Some("<1.a@a.com>"));
        assert_eq!(email.header("References"), Some("<1.a@a.com>"));

        req.references = Some("<0.z@b.com> <1.a@a.com>");
        let email = compose(&req, "<2.b@a.com>");
        assert_eq!(email.header("References"), Some("<0.z@b.com> <1.a@a.com>"));
    }

    #[tokio::test]
    async fn test_send_records_everything() {
        let f = fixture(MockMailer::default()).await;
        let sent = f.sender.send(request(f.thread_id)).await.unwrap();

        assert!(sent.message_id.ends_with("@a.com>"));
        assert_eq!(f.mailer.sent().len(), 1);

        let messages = f.store.messages().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].direction, Direction::Sent);
        assert_eq!(messages[0].status, "sent");
        assert_eq!(messages[0].message_id.as_deref(), Some(sent.message_id.as_str()));
        assert_eq!(messages[0].resend_id.as_deref(), Some("provider-1"));

        let thread = f.store.get_thread(f.thread_id).await.unwrap().unwrap();
        assert_eq!(thread.message_count, 1);
        assert_eq!(thread.last_message_id.as_deref(), Some(sent.message_id.as_str()));

        let alice = f.store.find_address("alice@a.com").await.unwrap().unwrap();
        assert_eq!(alice.daily_send_count, 1);
        assert_eq!(alice.total_sent, 1);
        assert!(alice.last_sent_at.is_some());

        let stat = f.store.daily_stat(today(), "a.com").await.unwrap().unwrap();
        assert_eq!(stat.emails_sent, 1);
    }

    #[tokio::test]
    async fn test_send_rejected_records_nothing() {
        let f = fixture(MockMailer::rejecting()).await;
        let err = f.sender.send(request(f.thread_id)).await.unwrap_err();

        assert!(matches!(err, WarmupError::Provider(_)));
        assert!(f.store.messages().await.is_empty());
        let thread = f.store.get_thread(f.thread_id).await.unwrap().unwrap();
        assert_eq!(thread.message_count, 0);
        assert!(f.store.daily_stat(today(), "a.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_send_requires_sender_domain() {
        let f = fixture(MockMailer::default()).await;
        let mut req = request(f.thread_id);
        req.domain = "";
        assert!(matches!(
            f.sender.send(req).await,
            Err(WarmupError::Validation(_))
        ));
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_counts_under_stored_domain() {
        let f = fixture(MockMailer::default()).await;
        let mut req = request(f.thread_id);
        req.from = "sales@Acme.com";
        req.domain = "Acme.com";
        let sent = f.sender.send(req).await.unwrap();

        assert!(sent.message_id.ends_with("@Acme.com>"));
        let stat = f.store.daily_stat(today(), "Acme.com").await.unwrap().unwrap();
        assert_eq!(stat.emails_sent, 1);
        assert!(f.store.daily_stat(today(), "acme.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_thread_references_chain() {
        let f = fixture(MockMailer::default()).await;
        assert_eq!(
            f.sender.thread_references(f.thread_id).await.unwrap(),
            ThreadReferences::default()
        );

        let first = f.sender.send(request(f.thread_id)).await.unwrap();
        let refs = f.sender.thread_references(f.thread_id).await.unwrap();
        assert_eq!(refs.in_reply_to.as_deref(), Some(first.message_id.as_str()));
        assert_eq!(refs.references.as_deref(), Some(first.message_id.as_str()));

        let mut reply = request(f.thread_id);
        reply.in_reply_to = refs.in_reply_to.as_deref();
        reply.references = refs.references.as_deref();
        let second = f.sender.send(reply).await.unwrap();

        let refs = f.sender.thread_references(f.thread_id).await.unwrap();
        assert_eq!(refs.in_reply_to.as_deref(), Some(second.message_id.as_str()));
        assert_eq!(
            refs.references,
            Some(format!("{} {}", first.message_id, second.message_id))
        );

        let sent = f.mailer.sent();
        assert_eq!(sent[1].header("In-Reply-To"), Some(first.message_id.as_str()));
        assert_eq!(sent[1].header("References"), Some(first.message_id.as_str()));
    }
}
