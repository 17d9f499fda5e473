//! Resend HTTP API client.
//!
//! Reference: https://resend.com/docs/api-reference/emails/send-email

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::{error, info};

use super::{Mailer, OutboundEmail};
use crate::error::{Result, WarmupError};

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
    headers: Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Mailer posting to Resend's `/emails` endpoint.
#[derive(Clone)]
pub struct ResendMailer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl ResendMailer {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WarmupError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/emails", base_url.trim_end_matches('/')),
            api_key,
        })
    }
}

fn request_body(email: &OutboundEmail) -> SendRequest<'_> {
    let headers = email
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();

    SendRequest {
        from: &email.from,
        to: &email.to,
        subject: &email.subject,
        text: &email.text,
        headers,
    }
}

/// Best human-readable reason from an error response body.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse { message: Some(message), .. }) => message,
        Ok(ErrorResponse { name: Some(name), .. }) => name,
        _ => format!("provider returned HTTP {status}"),
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_body(email))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status.as_u16(), &body);
            error!(
                status_code = status.as_u16(),
                from = %email.from,
                to = %email.to,
                error = %message,
                "resend_send_rejected"
            );
            return Err(WarmupError::Provider(message));
        }

        let sent: SendResponse = response.json().await?;
        info!(provider_id = %sent.id, from = %email.from, to = %email.to, "resend_send_accepted");
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let email = OutboundEmail {
            from: "alice@a.com".to_string(),
            to: "bob@b.com".to_string(),
            subject: "Re: Checking in".to_string(),
            text: "Thanks!".to_string(),
            headers: vec![
                ("Message-ID".to_string(), "<2.y@a.com>".to_string()),
                ("In-Reply-To".to_string(), "<1.x@b.com>".to_string()),
            ],
        };

        let json = serde_json::to_value(request_body(&email)).unwrap();
        assert_eq!(json["from"], "alice@a.com");
        assert_eq!(json["text"], "Thanks!");
        assert_eq!(json["headers"]["Message-ID"], "<2.y@a.com>");
        assert_eq!(json["headers"]["In-Reply-To"], "<1.x@b.com>");
    }

    #[test]
    fn test_error_message_prefers_message_field() {
        let body = r#"{"statusCode":403,"message":"The a.com domain is not verified","name":"validation_error"}"#;
        assert_eq!(error_message(403, body), "The a.com domain is not verified");
        assert_eq!(error_message(429, r#"{"name":"rate_limit_exceeded"}"#), "rate_limit_exceeded");
        assert_eq!(error_message(502, "<html>bad gateway</html>"), "provider returned HTTP 502");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let mailer =
            ResendMailer::new("https://api.resend.com/", "re_test".to_string(), Duration::from_secs(1))
                .unwrap();
        assert_eq!(mailer.endpoint, "https://api.resend.com/emails");
    }
}
