use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use cwalert_common::config::AppConfig;
use cwalert_engine::{Reconciler, WatermarkStore};
use cwalert_notifier::{SlackNotifier, SmtpNotifier};
use cwalert_poller::TicketPoller;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cwalert=info,cwalert_engine=info,cwalert_poller=info,cwalert_notifier=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("ConnectWise ticket alert started");

    // Load configuration
    let config = AppConfig::from_env()?;

    let poller = TicketPoller::new(&config.connectwise)?;
    let slack = SlackNotifier::new(&config.slack)?;
    let smtp = SmtpNotifier::new(&config.smtp);
    let watermark = WatermarkStore::from_config(&config.watermark);

    let reconciler = Reconciler::new(
        Arc::new(poller),
        Arc::new(slack),
        Arc::new(smtp),
        watermark,
        config.smtp.recipients.clone(),
    );

    // One cycle per invocation; the scheduler provides the cadence
    let cycle_id = Uuid::new_v4();
    let outcome = reconciler
        .run_cycle()
        .instrument(tracing::info_span!("cycle", %cycle_id))
        .await;

    tracing::info!(%cycle_id, outcome = %outcome, "ConnectWise ticket alert finished");
    Ok(())
}
