//! Email delivery through an SMTP relay, used to reach SMS carrier gateways.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use cwalert_common::config::SmtpConfig;
use cwalert_common::error::{AppError, AppResult};

use crate::EmailSender;

/// Upper bound on a single SMTP session.
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends plain-text mail over a STARTTLS session.
///
/// Every send opens its own session and drops it afterwards, success or not.
pub struct SmtpNotifier {
    server: Option<String>,
    port: u16,
    sender_email: Option<String>,
    sender_password: Option<String>,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Self {
        Self {
            server: config.server.clone(),
            port: config.port,
            sender_email: config.sender_email.clone(),
            sender_password: config.sender_password.clone(),
        }
    }

    /// Whether host, sender and credential are all present.
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    /// `(server, sender, password)` when all three are set.
    fn credentials(&self) -> Option<(&str, &str, &str)> {
        Some((
            self.server.as_deref()?,
            self.sender_email.as_deref()?,
            self.sender_password.as_deref()?,
        ))
    }

    /// Build the outgoing message without touching the network.
    pub fn build_message(
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> AppResult<Message> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| AppError::Dispatch(format!("invalid sender address: {e}")))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| AppError::Dispatch(format!("invalid recipient address: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::Dispatch(e.to_string()))
    }

    async fn deliver(
        &self,
        server: &str,
        sender: &str,
        password: &str,
        message: Message,
    ) -> AppResult<()> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| AppError::Dispatch(e.to_string()))?
            .port(self.port)
            .credentials(Credentials::new(sender.to_string(), password.to_string()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        transport
            .send(message)
            .await
            .map_err(|e| AppError::Dispatch(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EmailSender for SmtpNotifier {
    async fn send_email(&self, subject: &str, body: &str, recipient: &str) -> bool {
        let Some((server, sender, password)) = self.credentials() else {
            tracing::warn!("SMTP credentials not fully configured, skipping email/SMS alert");
            return false;
        };

        let result = match Self::build_message(sender, recipient, subject, body) {
            Ok(message) => self.deliver(server, sender, password, message).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(recipient, "SMS/email alert sent");
                true
            }
            Err(e) => {
                tracing::error!(recipient, error = %e, "Failed to send email/SMS alert");
                false
            }
        }
    }
}
