pub mod poller;

use async_trait::async_trait;

use cwalert_common::error::AppResult;
use cwalert_common::types::Ticket;

pub use poller::TicketPoller;

/// Source of the tickets currently matching the watched board/status.
///
/// Callers must not rely on the order of the returned tickets.
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Fetch every ticket that currently matches the filter.
    ///
    /// A transport or API failure is an `Err`, never an empty list.
    async fn fetch_matching(&self) -> AppResult<Vec<Ticket>>;
}
