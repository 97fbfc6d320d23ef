//! Outbound mail.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::SmtpConfig;
use crate::error::DeliveryError;

/// Sends one HTML message to a list of recipients.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipients: &[String], subject: &str, html: &str)
    -> Result<(), DeliveryError>;
}

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the message without sending it.
pub fn build_message(
    sender: &str,
    recipients: &[String],
    subject: &str,
    html: &str,
) -> Result<Message, DeliveryError> {
    if recipients.is_empty() {
        return Err(DeliveryError::NoRecipients);
    }
    let mut builder = Message::builder()
        .from(mailbox(sender)?)
        .subject(subject)
        .header(ContentType::TEXT_HTML);
    for recipient in recipients {
        builder = builder.to(mailbox(recipient)?);
    }
    builder
        .body(html.to_string())
        .map_err(|e| DeliveryError::Build(e.to_string()))
}

/// SMTP relay via lettre. The blocking transport runs on the blocking pool.
pub struct SmtpMailer {
    config: SmtpConfig,
    sender: String,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig, sender: String, timeout: Duration) -> Self {
        Self {
            config,
            sender,
            timeout,
        }
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        Ok(SmtpTransport::relay(&self.config.host)
            .map_err(|e| DeliveryError::Transport(format!("SMTP relay error: {e}")))?
            .port(self.config.port)
            .credentials(creds)
            .timeout(Some(self.timeout))
            .build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        html: &str,
    ) -> Result<(), DeliveryError> {
        let email = build_message(&self.sender, recipients, subject, html)?;
        let transport = self.transport()?;

        let send = tokio::task::spawn_blocking(move || transport.send(&email));
        match tokio::time::timeout(self.timeout, send).await {
            Err(_) => Err(DeliveryError::Timeout(self.timeout)),
            Ok(Err(join)) => Err(DeliveryError::Transport(format!("send task failed: {join}"))),
            Ok(Ok(Err(e))) => Err(DeliveryError::Transport(format!("SMTP send failed: {e}"))),
            Ok(Ok(Ok(_))) => {
                info!(
                    host = %self.config.host,
                    recipients = recipients.len(),
                    "Digest mailed"
                );
                Ok(())
            }
        }
    }
}

/// Stands in when no SMTP relay is configured. Every send fails.
pub struct UnconfiguredMailer;

#[async_trait]
impl Mailer for UnconfiguredMailer {
    async fn send(
        &self,
        recipients: &[String],
        _subject: &str,
        _html: &str,
    ) -> Result<(), DeliveryError> {
        if recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        Err(DeliveryError::Transport("SMTP is not configured".to_string()))
    }
}
