//! SMTP notifier (STARTTLS submission relay).

use crate::models::{FreebieError, NotifyConfig, Result, Secrets};
use crate::notify::Notifier;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, info};

/// Mails the claim summary through an authenticated relay.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    receiver: Mailbox,
}

impl SmtpNotifier {
    /// Build the transport; addresses are parsed up front so a bad
    /// configuration fails at startup rather than after the first claim.
    pub fn new(config: &NotifyConfig, secrets: &Secrets) -> Result<Self> {
        let sender: Mailbox = secrets.sender_email.parse().map_err(|e| {
            FreebieError::InvalidInput(format!("Invalid sender address: {}", e))
        })?;
        let receiver: Mailbox = secrets.receiver_email.parse().map_err(|e| {
            FreebieError::InvalidInput(format!("Invalid receiver address: {}", e))
        })?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| FreebieError::Notification(format!("SMTP relay setup failed: {}", e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                secrets.sender_email.clone(),
                secrets.sender_password.clone(),
            ))
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .build();

        debug!(host = %config.smtp_host, port = config.smtp_port, "SMTP notifier ready");

        Ok(Self {
            transport,
            sender,
            receiver,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(self.receiver.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| FreebieError::Notification(format!("Failed to build message: {}", e)))?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| FreebieError::Notification(format!("SMTP send failed: {}", e)))?;

        info!(code = %response.code(), "Email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(sender: &str, receiver: &str) -> Secrets {
        Secrets {
            username: "user".to_string(),
            password: "pw".to_string(),
            shared_secret: "c2VjcmV0".to_string(),
            sender_email: sender.to_string(),
            sender_password: "app-password".to_string(),
            receiver_email: receiver.to_string(),
        }
    }

    #[test]
    fn test_rejects_malformed_receiver() {
        let result = SmtpNotifier::new(
            &NotifyConfig::default(),
            &secrets("bot@example.com", "not an address"),
        );
        assert!(matches!(result, Err(FreebieError::InvalidInput(_))));
    }

    // The pooled transport spawns onto the runtime when built.
    #[tokio::test]
    async fn test_builds_with_valid_addresses() {
        let result = SmtpNotifier::new(
            &NotifyConfig::default(),
            &secrets("bot@example.com", "me@example.com"),
        );
        assert!(result.is_ok());
    }
}
