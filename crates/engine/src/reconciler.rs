//! Reconciliation cycle: detect new tickets and notify at most once.
//!
//! One call to [`Reconciler::run_cycle`]:
//! 1. Reads the watermark `W`
//! 2. Fetches every matching ticket
//! 3. Splits out tickets with `id > W`
//! 4. Picks the notification:
//!    - new tickets → urgent chat + one email per gateway address
//!    - only old tickets → regular chat summary
//!    - nothing open → regular chat all-clear
//! 5. Advances the watermark to the highest new id only if at least one send
//!    in step 4 succeeded
//!
//! A failed fetch ends the cycle early: no message, watermark untouched.

use std::sync::Arc;

use cwalert_common::types::{ChatChannel, DispatchReport, Severity, Ticket};
use cwalert_notifier::format;
use cwalert_notifier::{ChatSender, EmailSender};
use cwalert_poller::TicketSource;

use crate::watermark::WatermarkStore;

/// What happened to the watermark during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkChange {
    Advanced { from: u64, to: u64 },
    /// Alerts went out but no sink accepted the new value.
    PersistFailed { from: u64, to: u64 },
    Unchanged(u64),
}

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The ticket source failed; nothing was sent.
    SourceUnavailable { watermark: u64 },
    /// Tickets above the watermark were found and alerted on.
    NewTickets {
        count: usize,
        report: DispatchReport,
        watermark: WatermarkChange,
    },
    /// Tickets are open but all were alerted on before.
    ExistingTickets { count: usize, delivered: bool },
    /// No ticket matches the filter.
    AllClear { delivered: bool },
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::SourceUnavailable { watermark } => {
                write!(f, "source unavailable (watermark {watermark})")
            }
            CycleOutcome::NewTickets {
                count,
                report,
                watermark,
            } => {
                write!(
                    f,
                    "{count} new ticket(s), {}/{} sends delivered, ",
                    report.delivered_count(),
                    report.attempts().len()
                )?;
                match watermark {
                    WatermarkChange::Advanced { from, to } => {
                        write!(f, "watermark {from} -> {to}")
                    }
                    WatermarkChange::PersistFailed { from, to } => {
                        write!(f, "watermark {from} -> {to} NOT persisted")
                    }
                    WatermarkChange::Unchanged(w) => write!(f, "watermark unchanged at {w}"),
                }
            }
            CycleOutcome::ExistingTickets { count, delivered } => {
                write!(f, "{count} existing ticket(s), status delivered: {delivered}")
            }
            CycleOutcome::AllClear { delivered } => {
                write!(f, "all clear, status delivered: {delivered}")
            }
        }
    }
}

/// Tickets strictly above the watermark, in source order.
pub fn partition_new(tickets: &[Ticket], watermark: u64) -> Vec<&Ticket> {
    tickets.iter().filter(|t| t.id > watermark).collect()
}

/// Drives one poll → compare → notify → persist cycle.
pub struct Reconciler {
    source: Arc<dyn TicketSource>,
    chat: Arc<dyn ChatSender>,
    email: Arc<dyn EmailSender>,
    watermark: WatermarkStore,
    /// SMS gateway addresses, one email each
    recipients: Vec<String>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn TicketSource>,
        chat: Arc<dyn ChatSender>,
        email: Arc<dyn EmailSender>,
        watermark: WatermarkStore,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            source,
            chat,
            email,
            watermark,
            recipients,
        }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        let watermark = self.watermark.read();
        tracing::info!(watermark, "Last processed ticket id");

        let tickets = match self.source.fetch_matching().await {
            Ok(tickets) => tickets,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    watermark,
                    "Ticket source unavailable, skipping cycle without notifying"
                );
                return CycleOutcome::SourceUnavailable { watermark };
            }
        };

        let malformed = tickets.iter().filter(|t| t.id == 0).count();
        if malformed > 0 {
            tracing::warn!(
                malformed,
                "Tickets without a usable id can never be classified as new"
            );
        }

        let new_tickets = partition_new(&tickets, watermark);

        if !new_tickets.is_empty() {
            self.alert_new(&new_tickets, watermark).await
        } else if !tickets.is_empty() {
            tracing::info!(
                existing = tickets.len(),
                "No new tickets, sending status update for existing ones"
            );
            let message = format::existing_ticket_summary(&tickets);
            let delivered = self
                .chat
                .send_chat(&message.title, &message.body, ChatChannel::Regular, Severity::Stale)
                .await;
            CycleOutcome::ExistingTickets {
                count: tickets.len(),
                delivered,
            }
        } else {
            tracing::info!("No tickets match the monitored board/status");
            let message = format::all_clear();
            let delivered = self
                .chat
                .send_chat(&message.title, &message.body, ChatChannel::Regular, Severity::Clear)
                .await;
            CycleOutcome::AllClear { delivered }
        }
    }

    async fn alert_new(&self, new_tickets: &[&Ticket], watermark: u64) -> CycleOutcome {
        tracing::info!(count = new_tickets.len(), "Processing new tickets");

        let message = format::new_ticket_alert(new_tickets.iter().copied());
        let subject = format::sms_subject(new_tickets.iter().copied());
        let candidate = new_tickets.iter().map(|t| t.id).max().unwrap_or(0);

        let mut report = DispatchReport::new();

        let chat_sent = self
            .chat
            .send_chat(&message.title, &message.body, ChatChannel::Urgent, Severity::Alert)
            .await;
        report.record(format!("chat:{}", ChatChannel::Urgent), chat_sent);

        if self.recipients.is_empty() {
            tracing::warn!("No SMS gateway recipients configured");
        }
        for recipient in &self.recipients {
            let sent = self.email.send_email(&subject, "", recipient).await;
            report.record(recipient.clone(), sent);
        }

        let change = if !report.any_delivered() {
            tracing::error!(
                attempts = report.attempts().len(),
                watermark,
                "All alerts failed, watermark unchanged"
            );
            WatermarkChange::Unchanged(watermark)
        } else if candidate > watermark {
            tracing::info!(
                delivered = report.delivered_count(),
                failed = report.failed_count(),
                from = watermark,
                to = candidate,
                "Advancing watermark"
            );
            if self.watermark.write(candidate) == 0 {
                tracing::error!(
                    from = watermark,
                    to = candidate,
                    "No sink accepted the new watermark, next cycle will alert again"
                );
                WatermarkChange::PersistFailed {
                    from: watermark,
                    to: candidate,
                }
            } else {
                WatermarkChange::Advanced {
                    from: watermark,
                    to: candidate,
                }
            }
        } else {
            WatermarkChange::Unchanged(watermark)
        };

        CycleOutcome::NewTickets {
            count: new_tickets.len(),
            report,
            watermark: change,
        }
    }
}
