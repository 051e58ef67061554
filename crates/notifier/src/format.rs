//! Ticket rendering for chat and SMS.
//!
//! Pure functions only: no I/O, no failure paths. Missing ticket fields render
//! as `N/A`.

use cwalert_common::types::Ticket;

/// Footer attached to every chat notification.
pub const FOOTER: &str = "Automated ConnectWise Alert";

/// Prefix of the consolidated SMS subject line.
pub const SMS_SUBJECT_PREFIX: &str = "CW Alert: ";

/// Output style for a single ticket line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// Markdown for chat: `` `id` | *PRIO* | site ``
    Rich,
    /// No markup, for subject lines and SMS
    Plain,
}

/// Title and body of a chat notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub title: String,
    pub body: String,
}

/// Map a ConnectWise priority name to its short code.
///
/// Unknown names are returned unchanged.
pub fn abbreviate_priority(name: &str) -> &str {
    match name {
        "Priority 1 - Critical" => "P1-CRIT",
        "Priority 2 - High" => "P2-HIGH",
        "Priority 3 - Medium" => "P3-MED",
        "Priority 4 - Low" => "P4-LOW",
        other => other,
    }
}

/// Render one ticket as `ID | PRIORITY | SITE` in the given style.
pub fn format_ticket(ticket: &Ticket, style: MessageStyle) -> String {
    let priority = abbreviate_priority(ticket.priority_name());
    let site = ticket.site_name();

    match style {
        MessageStyle::Rich => format!("`{}` | *{}* | {}", ticket.id, priority, site),
        MessageStyle::Plain => format!("{} | {} | {}", ticket.id, priority, site),
    }
}

/// Consolidated urgent alert for newly discovered tickets.
pub fn new_ticket_alert<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> ChatMessage {
    let lines: Vec<String> = tickets
        .into_iter()
        .map(|t| format_ticket(t, MessageStyle::Rich))
        .collect();

    ChatMessage {
        title: format!("🚨 {} NEW ConnectWise Ticket Alert(s)", lines.len()),
        body: lines.join("\n"),
    }
}

/// Subject line carrying every new ticket, for the SMS gateway.
pub fn sms_subject<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> String {
    let lines: Vec<String> = tickets
        .into_iter()
        .map(|t| format_ticket(t, MessageStyle::Plain))
        .collect();

    format!("{SMS_SUBJECT_PREFIX}{}", lines.join(" / "))
}

/// Status update listing tickets that are still open but already alerted on.
pub fn existing_ticket_summary<'a>(
    tickets: impl IntoIterator<Item = &'a Ticket>,
) -> ChatMessage {
    let lines: Vec<String> = tickets
        .into_iter()
        .map(|t| format_ticket(t, MessageStyle::Rich))
        .collect();

    ChatMessage {
        title: format!("⚠️ {} Existing Ticket(s) Acknowledged", lines.len()),
        body: lines.join("\n"),
    }
}

/// Status update sent when nothing matches the filter.
pub fn all_clear() -> ChatMessage {
    ChatMessage {
        title: "✅ Ticket Status Update".to_string(),
        body: "All Current Tickets are Scheduled".to_string(),
    }
}
