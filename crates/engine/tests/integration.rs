//! Scenario tests for the reconciliation cycle.
//!
//! Every collaborator is an in-memory fake, so these run without network
//! access:
//!
//! ```bash
//! cargo test -p cwalert-engine --test integration
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use cwalert_common::error::{AppError, AppResult};
use cwalert_common::types::{ChatChannel, Severity, Ticket};
use cwalert_engine::watermark::{LocalFile, PipelineOutput, WatermarkSink, WatermarkSource};
use cwalert_engine::{CycleOutcome, Reconciler, WatermarkChange, WatermarkStore};
use cwalert_notifier::{ChatSender, EmailSender};
use cwalert_poller::TicketSource;

// ============================================================
// Fakes
// ============================================================

enum FakeSource {
    Tickets(Vec<Ticket>),
    Outage,
}

#[async_trait]
impl TicketSource for FakeSource {
    async fn fetch_matching(&self) -> AppResult<Vec<Ticket>> {
        match self {
            FakeSource::Tickets(tickets) => Ok(tickets.clone()),
            FakeSource::Outage => Err(AppError::Source("connection refused".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SentChat {
    title: String,
    body: String,
    channel: ChatChannel,
    severity: Severity,
}

struct FakeChat {
    succeed: bool,
    sent: Mutex<Vec<SentChat>>,
}

#[async_trait]
impl ChatSender for FakeChat {
    async fn send_chat(
        &self,
        title: &str,
        body: &str,
        channel: ChatChannel,
        severity: Severity,
    ) -> bool {
        self.sent.lock().unwrap().push(SentChat {
            title: title.to_string(),
            body: body.to_string(),
            channel,
            severity,
        });
        self.succeed
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SentEmail {
    subject: String,
    body: String,
    recipient: String,
}

struct FakeEmail {
    /// Recipients whose sends fail
    failing: Vec<String>,
    sent: Mutex<Vec<SentEmail>>,
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send_email(&self, subject: &str, body: &str, recipient: &str) -> bool {
        self.sent.lock().unwrap().push(SentEmail {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: recipient.to_string(),
        });
        !self.failing.iter().any(|r| r == recipient)
    }
}

/// Shared in-memory watermark usable as both source and sink.
#[derive(Clone, Default)]
struct MemoryWatermark {
    value: Arc<Mutex<Option<u64>>>,
    writes: Arc<Mutex<u32>>,
}

impl MemoryWatermark {
    fn with(value: u64) -> Self {
        let memory = Self::default();
        *memory.value.lock().unwrap() = Some(value);
        memory
    }

    fn get(&self) -> Option<u64> {
        *self.value.lock().unwrap()
    }

    fn writes(&self) -> u32 {
        *self.writes.lock().unwrap()
    }
}

impl WatermarkSource for MemoryWatermark {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> AppResult<Option<u64>> {
        Ok(self.get())
    }
}

impl WatermarkSink for MemoryWatermark {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self, value: u64) -> AppResult<()> {
        *self.value.lock().unwrap() = Some(value);
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

// ============================================================
// Harness
// ============================================================

const RECIPIENTS: [&str; 2] = ["15550001111@txt.att.net", "15550002222@vtext.com"];

struct Harness {
    chat: Arc<FakeChat>,
    email: Arc<FakeEmail>,
    memory: MemoryWatermark,
    reconciler: Reconciler,
}

struct Setup {
    source: FakeSource,
    watermark: u64,
    chat_ok: bool,
    failing_recipients: Vec<&'static str>,
    recipients: Vec<&'static str>,
}

impl Setup {
    fn new(source: FakeSource, watermark: u64) -> Self {
        Self {
            source,
            watermark,
            chat_ok: true,
            failing_recipients: vec![],
            recipients: RECIPIENTS.to_vec(),
        }
    }

    fn chat_fails(mut self) -> Self {
        self.chat_ok = false;
        self
    }

    fn email_fails_for(mut self, recipients: &[&'static str]) -> Self {
        self.failing_recipients = recipients.to_vec();
        self
    }

    fn recipients(mut self, recipients: &[&'static str]) -> Self {
        self.recipients = recipients.to_vec();
        self
    }

    fn build(self) -> Harness {
        let chat = Arc::new(FakeChat {
            succeed: self.chat_ok,
            sent: Mutex::new(vec![]),
        });
        let email = Arc::new(FakeEmail {
            failing: self.failing_recipients.iter().map(|r| r.to_string()).collect(),
            sent: Mutex::new(vec![]),
        });
        let memory = MemoryWatermark::with(self.watermark);
        let store = WatermarkStore::new()
            .with_source(memory.clone())
            .with_sink(memory.clone());

        let reconciler = Reconciler::new(
            Arc::new(self.source),
            chat.clone(),
            email.clone(),
            store,
            self.recipients.iter().map(|r| r.to_string()).collect(),
        );

        Harness {
            chat,
            email,
            memory,
            reconciler,
        }
    }
}

impl Harness {
    fn chats(&self) -> Vec<SentChat> {
        self.chat.sent.lock().unwrap().clone()
    }

    fn emails(&self) -> Vec<SentEmail> {
        self.email.sent.lock().unwrap().clone()
    }
}

fn acme_critical(id: u64) -> Ticket {
    Ticket::new(id, Some("Priority 1 - Critical"), Some("Acme"))
}

// ============================================================
// New tickets
// ============================================================

#[tokio::test]
async fn test_new_ticket_alerts_and_advances() {
    let h = Setup::new(FakeSource::Tickets(vec![acme_critical(101)]), 100).build();

    let outcome = h.reconciler.run_cycle().await;

    let chats = h.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].channel, ChatChannel::Urgent);
    assert_eq!(chats[0].severity, Severity::Alert);
    assert_eq!(chats[0].title, "🚨 1 NEW ConnectWise Ticket Alert(s)");
    assert_eq!(chats[0].body, "`101` | *P1-CRIT* | Acme");

    let emails = h.emails();
    assert_eq!(emails.len(), 2);
    for (email, recipient) in emails.iter().zip(RECIPIENTS) {
        assert_eq!(email.subject, "CW Alert: 101 | P1-CRIT | Acme");
        assert_eq!(email.body, "");
        assert_eq!(email.recipient, recipient);
    }

    assert_eq!(h.memory.get(), Some(101));
    match outcome {
        CycleOutcome::NewTickets {
            count,
            report,
            watermark,
        } => {
            assert_eq!(count, 1);
            assert_eq!(report.attempts().len(), 3);
            assert_eq!(report.delivered_count(), 3);
            assert_eq!(watermark, WatermarkChange::Advanced { from: 100, to: 101 });
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_all_sends_fail_leaves_watermark() {
    let h = Setup::new(FakeSource::Tickets(vec![acme_critical(101)]), 100)
        .chat_fails()
        .email_fails_for(&RECIPIENTS)
        .build();

    let outcome = h.reconciler.run_cycle().await;

    assert_eq!(h.memory.get(), Some(100));
    assert_eq!(h.memory.writes(), 0);
    match outcome {
        CycleOutcome::NewTickets { report, watermark, .. } => {
            assert!(!report.any_delivered());
            assert_eq!(watermark, WatermarkChange::Unchanged(100));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_email_success_alone_advances() {
    let h = Setup::new(FakeSource::Tickets(vec![acme_critical(101)]), 100)
        .chat_fails()
        .build();

    h.reconciler.run_cycle().await;

    assert_eq!(h.memory.get(), Some(101));
}

#[tokio::test]
async fn test_single_recipient_success_advances() {
    let h = Setup::new(FakeSource::Tickets(vec![acme_critical(101)]), 100)
        .chat_fails()
        .email_fails_for(&RECIPIENTS[..1])
        .build();

    let outcome = h.reconciler.run_cycle().await;

    assert_eq!(h.memory.get(), Some(101));
    match outcome {
        CycleOutcome::NewTickets { report, .. } => {
            let delivered: Vec<bool> = report.attempts().iter().map(|a| a.delivered).collect();
            assert_eq!(delivered, vec![false, false, true]);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_chat_success_without_recipients_advances() {
    let h = Setup::new(FakeSource::Tickets(vec![acme_critical(101)]), 100)
        .recipients(&[])
        .build();

    h.reconciler.run_cycle().await;

    assert!(h.emails().is_empty());
    assert_eq!(h.memory.get(), Some(101));
}

#[tokio::test]
async fn test_only_tickets_above_watermark_are_alerted() {
    let tickets = vec![
        Ticket::new(90, Some("Priority 4 - Low"), Some("Globex")),
        acme_critical(103),
        Ticket::new(0, None, None),
        Ticket::new(101, Some("Priority 2 - High"), None),
    ];
    let h = Setup::new(FakeSource::Tickets(tickets), 100).build();

    h.reconciler.run_cycle().await;

    let chats = h.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].title, "🚨 2 NEW ConnectWise Ticket Alert(s)");
    assert_eq!(chats[0].body, "`103` | *P1-CRIT* | Acme\n`101` | *P2-HIGH* | N/A");
    assert_eq!(
        h.emails()[0].subject,
        "CW Alert: 103 | P1-CRIT | Acme / 101 | P2-HIGH | N/A"
    );
    assert_eq!(h.memory.get(), Some(103));
}

// ============================================================
// No new tickets
// ============================================================

#[tokio::test]
async fn test_existing_tickets_send_regular_summary() {
    let tickets = vec![Ticket::new(300, Some("Priority 3 - Medium"), Some("Initech"))];
    let h = Setup::new(FakeSource::Tickets(tickets), 500).build();

    let outcome = h.reconciler.run_cycle().await;

    let chats = h.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].channel, ChatChannel::Regular);
    assert_eq!(chats[0].severity, Severity::Stale);
    assert_eq!(chats[0].title, "⚠️ 1 Existing Ticket(s) Acknowledged");
    assert_eq!(chats[0].body, "`300` | *P3-MED* | Initech");

    assert!(h.emails().is_empty());
    assert_eq!(h.memory.get(), Some(500));
    assert_eq!(h.memory.writes(), 0);
    assert_eq!(
        outcome,
        CycleOutcome::ExistingTickets {
            count: 1,
            delivered: true
        }
    );
}

#[tokio::test]
async fn test_empty_board_sends_all_clear() {
    let h = Setup::new(FakeSource::Tickets(vec![]), 0).build();

    let outcome = h.reconciler.run_cycle().await;

    let chats = h.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].channel, ChatChannel::Regular);
    assert_eq!(chats[0].severity, Severity::Clear);
    assert_eq!(chats[0].title, "✅ Ticket Status Update");
    assert_eq!(chats[0].body, "All Current Tickets are Scheduled");

    assert!(h.emails().is_empty());
    assert_eq!(h.memory.writes(), 0);
    assert_eq!(outcome, CycleOutcome::AllClear { delivered: true });
}

#[tokio::test]
async fn test_status_send_failure_is_reported_not_fatal() {
    let h = Setup::new(FakeSource::Tickets(vec![]), 42).chat_fails().build();

    let outcome = h.reconciler.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::AllClear { delivered: false });
    assert_eq!(h.memory.get(), Some(42));
}

// ============================================================
// Source failure
// ============================================================

#[tokio::test]
async fn test_source_outage_is_not_all_clear() {
    let h = Setup::new(FakeSource::Outage, 100).build();

    let outcome = h.reconciler.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::SourceUnavailable { watermark: 100 });
    assert!(h.chats().is_empty());
    assert!(h.emails().is_empty());
    assert_eq!(h.memory.writes(), 0);
}

// ============================================================
// Across cycles
// ============================================================

#[tokio::test]
async fn test_second_cycle_does_not_realert() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("last_run_id.txt");
    std::fs::write(&file, "100").unwrap();

    let tickets = vec![acme_critical(101), acme_critical(102)];

    let run = |tickets: Vec<Ticket>| {
        let chat = Arc::new(FakeChat {
            succeed: true,
            sent: Mutex::new(vec![]),
        });
        let email = Arc::new(FakeEmail {
            failing: vec![],
            sent: Mutex::new(vec![]),
        });
        let store = WatermarkStore::new()
            .with_source(LocalFile::new(&file))
            .with_sink(LocalFile::new(&file));
        let reconciler = Reconciler::new(
            Arc::new(FakeSource::Tickets(tickets)),
            chat.clone(),
            email.clone(),
            store,
            vec![RECIPIENTS[0].to_string()],
        );
        (reconciler, chat)
    };

    let (first, first_chat) = run(tickets.clone());
    first.run_cycle().await;
    assert_eq!(first_chat.sent.lock().unwrap()[0].channel, ChatChannel::Urgent);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "102");

    let (second, second_chat) = run(tickets);
    let outcome = second.run_cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::ExistingTickets {
            count: 2,
            delivered: true
        }
    );
    assert_eq!(second_chat.sent.lock().unwrap()[0].channel, ChatChannel::Regular);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "102");
}

#[tokio::test]
async fn test_advance_emits_pipeline_output_and_file() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("last_run_id.txt");
    let output = dir.path().join("gh_output");

    let store = WatermarkStore::new()
        .with_source(LocalFile::new(&file))
        .with_sink(PipelineOutput::new(&output))
        .with_sink(LocalFile::new(&file));
    let reconciler = Reconciler::new(
        Arc::new(FakeSource::Tickets(vec![acme_critical(7)])),
        Arc::new(FakeChat {
            succeed: true,
            sent: Mutex::new(vec![]),
        }),
        Arc::new(FakeEmail {
            failing: vec![],
            sent: Mutex::new(vec![]),
        }),
        store,
        vec![],
    );

    let outcome = reconciler.run_cycle().await;

    assert!(matches!(
        outcome,
        CycleOutcome::NewTickets {
            watermark: WatermarkChange::Advanced { from: 0, to: 7 },
            ..
        }
    ));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "7");
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "next_id=7\n");
}

#[tokio::test]
async fn test_unwritable_sinks_report_persist_failure() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("last_run_id.txt");

    // Directories cannot be written as files, so every sink rejects the value.
    let store = WatermarkStore::new()
        .with_source(LocalFile::new(&file))
        .with_sink(PipelineOutput::new(dir.path()))
        .with_sink(LocalFile::new(dir.path()));
    let reconciler = Reconciler::new(
        Arc::new(FakeSource::Tickets(vec![acme_critical(101)])),
        Arc::new(FakeChat {
            succeed: true,
            sent: Mutex::new(vec![]),
        }),
        Arc::new(FakeEmail {
            failing: vec![],
            sent: Mutex::new(vec![]),
        }),
        store,
        vec![],
    );

    let outcome = reconciler.run_cycle().await;

    match &outcome {
        CycleOutcome::NewTickets {
            report, watermark, ..
        } => {
            assert!(report.any_delivered());
            assert_eq!(*watermark, WatermarkChange::PersistFailed { from: 0, to: 101 });
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(outcome.to_string().ends_with("watermark 0 -> 101 NOT persisted"));
    assert!(!file.exists());
}
