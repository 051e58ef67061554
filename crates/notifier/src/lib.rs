//! Notification delivery for ticket alerts.
//!
//! - Chat: Slack-compatible incoming webhooks (attachment payload)
//! - Email/SMS: SMTP relay with STARTTLS, one message per gateway address
//!
//! Senders never return errors. Every failure is logged and reported as
//! `false` so the caller can keep going with the remaining channels.

pub mod email;
pub mod format;
pub mod slack;

use async_trait::async_trait;

use cwalert_common::types::{ChatChannel, Severity};

pub use email::SmtpNotifier;
pub use slack::SlackNotifier;

/// Posts a titled message to a chat channel.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Returns `true` only when the webhook accepted the message.
    async fn send_chat(
        &self,
        title: &str,
        body: &str,
        channel: ChatChannel,
        severity: Severity,
    ) -> bool;
}

/// Sends a single plain-text email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns `true` only when the relay confirmed the send.
    async fn send_email(&self, subject: &str, body: &str, recipient: &str) -> bool;
}
