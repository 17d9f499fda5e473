//! Outbound email delivery.
//!
//! [`Mailer`] is the seam to the delivery provider; [`ResendMailer`] talks to
//! the Resend HTTP API and [`LogMailer`] only logs, for dry runs.

pub mod resend;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;

pub use resend::ResendMailer;

/// A composed message ready for the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    /// Extra headers: always `Message-ID`, plus threading headers on replies
    pub headers: Vec<(String, String)>,
}

impl OutboundEmail {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hand the message to the provider. Returns the provider's message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String>;
}

/// Mailer that accepts everything and only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        info!(
            from = %email.from,
            to = %email.to,
            subject = %email.subject,
            message_id = ?email.header("Message-ID"),
            provider_id = %id,
            "dry_run_send"
        );
        Ok(id)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let email = OutboundEmail {
            from: "a@a.com".to_string(),
            to: "b@b.com".to_string(),
            subject: "Hi".to_string(),
            text: "Body".to_string(),
            headers: vec![("Message-ID".to_string(), "<1.x@a.com>".to_string())],
        };
        assert_eq!(email.header("message-id"), Some("<1.x@a.com>"));
        assert_eq!(email.header("In-Reply-To"), None);
    }

    #[tokio::test]
    async fn test_log_mailer_accepts() {
        let email = OutboundEmail {
            from: "a@a.com".to_string(),
            to: "b@b.com".to_string(),
            subject: "Hi".to_string(),
            text: "Body".to_string(),
            headers: Vec::new(),
        };
        assert!(LogMailer.send(&email).await.is_ok());
    }
}
