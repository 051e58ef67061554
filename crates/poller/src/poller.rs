use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use cwalert_common::config::ConnectWiseConfig;
use cwalert_common::error::{AppError, AppResult};
use cwalert_common::types::Ticket;

use crate::TicketSource;

/// ConnectWise Manage ticket poller.
///
/// Requests `service/tickets` filtered by board and status, ascending by id,
/// one page at a time until a short page arrives or `max_pages` is reached.
pub struct TicketPoller {
    client: Client,
    endpoint: String,
    /// `{company_id}+{public_key}`
    username: String,
    private_key: String,
    client_id: String,
    conditions: String,
    page_size: u32,
    max_pages: u32,
}

impl TicketPoller {
    pub fn new(config: &ConnectWiseConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/service/tickets", config.base_url),
            username: format!("{}+{}", config.company_id, config.public_key),
            private_key: config.private_key.clone(),
            client_id: config.client_id.clone(),
            conditions: Self::build_conditions(&config.board_name, &config.status_name),
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        })
    }

    /// ConnectWise condition string selecting the watched board and status.
    pub fn build_conditions(board_name: &str, status_name: &str) -> String {
        format!(
            "board/name=\"{}\" and status/name=\"{}\"",
            board_name.replace('"', "\\\""),
            status_name.replace('"', "\\\"")
        )
    }

    pub fn conditions(&self) -> &str {
        &self.conditions
    }

    /// Fetch a single page (1-based).
    async fn fetch_page(&self, page: u32) -> AppResult<Vec<Ticket>> {
        let page_size = self.page_size.to_string();
        let page = page.to_string();

        let response = self
            .client
            .get(&self.endpoint)
            .basic_auth(&self.username, Some(&self.private_key))
            .header("clientID", &self.client_id)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .query(&[
                ("conditions", self.conditions.as_str()),
                ("orderBy", "id asc"),
                ("pageSize", page_size.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Source(format!(
                "ConnectWise returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let entries = response.json::<Vec<Value>>().await?;
        let malformed = entries.iter().filter(|e| !e.is_object()).count();
        if malformed > 0 {
            tracing::warn!(page = %page, malformed, "Non-object ticket entries, treating as id 0");
        }

        Ok(entries.into_iter().map(Ticket::from_entry).collect())
    }
}

#[async_trait]
impl TicketSource for TicketPoller {
    async fn fetch_matching(&self) -> AppResult<Vec<Ticket>> {
        tracing::info!(conditions = %self.conditions, "Checking ConnectWise for matching tickets");

        let mut tickets = Vec::new();

        for page in 1..=self.max_pages {
            let batch = self.fetch_page(page).await.inspect_err(|e| {
                tracing::error!(
                    page,
                    error = %e,
                    "ConnectWise request failed, check credentials/URL/filters"
                );
            })?;

            let short_page = batch.len() < self.page_size as usize;
            tickets.extend(batch);

            if short_page {
                tracing::info!(total = tickets.len(), pages = page, "Fetched matching tickets");
                return Ok(tickets);
            }
        }

        tracing::warn!(
            max_pages = self.max_pages,
            total = tickets.len(),
            "Page cap reached; tickets beyond it are not seen this cycle"
        );
        Ok(tickets)
    }
}
