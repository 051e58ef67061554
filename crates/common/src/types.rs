use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Sentinel rendered for ticket fields the source left empty.
pub const NOT_AVAILABLE: &str = "N/A";

/// A ticket snapshot as returned by the ConnectWise `service/tickets` endpoint.
///
/// Only the fields used for alerting are kept. A missing or non-numeric `id`
/// deserializes to `0`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Ticket {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: u64,

    /// Priority name (`priority.name`), e.g. "Priority 1 - Critical"
    #[serde(default, deserialize_with = "reference_name")]
    pub priority: Option<String>,

    /// Site name (`site.name`)
    #[serde(default, deserialize_with = "reference_name")]
    pub site: Option<String>,
}

impl Ticket {
    pub fn new(id: u64, priority: Option<&str>, site: Option<&str>) -> Self {
        Self {
            id,
            priority: priority.map(str::to_string),
            site: site.map(str::to_string),
        }
    }

    /// Decode one entry of the tickets array.
    ///
    /// Entries that are not JSON objects (`null`, strings, nested arrays)
    /// become an empty ticket with id `0` instead of failing the whole page.
    pub fn from_entry(entry: Value) -> Self {
        match entry {
            Value::Object(_) => {
                serde_json::from_value(entry).unwrap_or_else(|_| Self::new(0, None, None))
            }
            _ => Self::new(0, None, None),
        }
    }

    pub fn priority_name(&self) -> &str {
        self.priority.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn site_name(&self) -> &str {
        self.site.as_deref().unwrap_or(NOT_AVAILABLE)
    }
}

/// Accepts a JSON number or numeric string; anything else becomes `0`.
fn lenient_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// ConnectWise references are objects like `{"id": 7, "name": "Acme"}`.
/// A bare string is accepted as the name.
fn reference_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Chat webhook destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatChannel {
    Urgent,
    Regular,
}

impl std::fmt::Display for ChatChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatChannel::Urgent => write!(f, "urgent"),
            ChatChannel::Regular => write!(f, "regular"),
        }
    }
}

/// Visual treatment of a chat notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// New tickets found
    Alert,
    /// No new tickets, existing ones still open
    Stale,
    /// Nothing open on the board
    Clear,
}

impl Severity {
    /// RGB color as an integer.
    pub fn color(&self) -> u32 {
        match self {
            Severity::Alert => 0xFF0000,
            Severity::Stale => 0xFFFF00,
            Severity::Clear => 0x2ECC71,
        }
    }

    /// Color as a `#rrggbb` string for attachment payloads.
    pub fn hex_color(&self) -> String {
        format!("#{:06x}", self.color())
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Alert => write!(f, "alert"),
            Severity::Stale => write!(f, "stale"),
            Severity::Clear => write!(f, "clear"),
        }
    }
}

/// Outcome of a single send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    /// Channel label or recipient address
    pub target: String,
    pub delivered: bool,
}

/// Ordered record of every send attempted during a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    attempts: Vec<DispatchAttempt>,
}

impl DispatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, target: impl Into<String>, delivered: bool) {
        self.attempts.push(DispatchAttempt {
            target: target.into(),
            delivered,
        });
    }

    pub fn attempts(&self) -> &[DispatchAttempt] {
        &self.attempts
    }

    pub fn any_delivered(&self) -> bool {
        self.attempts.iter().any(|a| a.delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.delivered).count()
    }

    pub fn failed_count(&self) -> usize {
        self.attempts.len() - self.delivered_count()
    }
}
