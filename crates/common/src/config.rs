use std::path::PathBuf;
use std::str::FromStr;

/// Default SMTP submission port (STARTTLS).
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Allowed chat webhook timeout, in seconds. Sends must finish well inside
/// ten seconds.
pub const SLACK_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=9;

/// Default local file holding the last processed ticket id.
pub const DEFAULT_WATERMARK_FILE: &str = "last_run_id.txt";

/// Global application configuration loaded from environment variables.
///
/// Built once at process start and handed to each component by reference.
/// No component reads the environment on its own.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connectwise: ConnectWiseConfig,
    pub slack: SlackConfig,
    pub smtp: SmtpConfig,
    pub watermark: WatermarkConfig,
}

/// ConnectWise Manage API credentials and ticket filter.
#[derive(Debug, Clone)]
pub struct ConnectWiseConfig {
    /// API root, e.g. `https://na.myconnectwise.net/v4_6_release/apis/3.0`
    pub base_url: String,

    pub company_id: String,

    pub public_key: String,

    pub private_key: String,

    /// Value sent in the `clientID` header
    pub client_id: String,

    /// Service board to watch (`board/name`)
    pub board_name: String,

    /// Ticket status to watch (`status/name`)
    pub status_name: String,

    /// Tickets requested per page (default: 100)
    pub page_size: u32,

    /// Upper bound on pages fetched per cycle (default: 10)
    pub max_pages: u32,

    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

/// Chat webhook destinations.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Webhook for status updates (existing tickets, all clear)
    pub regular_webhook_url: Option<String>,

    /// Webhook for new-ticket alerts
    pub urgent_webhook_url: Option<String>,

    /// Per-request timeout in seconds (default: 5, clamped to 1..=9)
    pub timeout_secs: u64,
}

/// SMTP relay used for the email/SMS gateway.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: Option<String>,

    /// Submission port (default: 587; invalid values fall back to the default)
    pub port: u16,

    pub sender_email: Option<String>,

    /// Sender credential (usually an app password)
    pub sender_password: Option<String>,

    /// Gateway addresses, one message per address
    pub recipients: Vec<String>,
}

/// Watermark persistence settings.
#[derive(Debug, Clone)]
pub struct WatermarkConfig {
    /// Externally supplied watermark that takes precedence over the local file
    pub override_value: Option<String>,

    /// Local single-line file holding the watermark
    pub file: PathBuf,

    /// Pipeline output file (`GITHUB_OUTPUT`) receiving `next_id=<value>`
    pub pipeline_output: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &str| {
            get(key).ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
        };

        Ok(Self {
            connectwise: ConnectWiseConfig {
                base_url: required("CW_BASE_URL")?.trim_end_matches('/').to_string(),
                company_id: required("CW_COMPANY_ID")?,
                public_key: required("CW_PUBLIC_KEY")?,
                private_key: required("CW_PRIVATE_KEY")?,
                client_id: required("CW_CLIENT_ID")?,
                board_name: required("CW_BOARD_NAME")?,
                status_name: required("CW_STATUS_NAME")?,
                page_size: parse_or(get("CW_PAGE_SIZE"), "CW_PAGE_SIZE", 100)?,
                max_pages: parse_or(get("CW_MAX_PAGES"), "CW_MAX_PAGES", 10)?,
                timeout_secs: parse_or(get("CW_TIMEOUT_SECS"), "CW_TIMEOUT_SECS", 30)?,
            },
            slack: SlackConfig {
                regular_webhook_url: get("SLACK_WEBHOOK_URL_REGULAR"),
                urgent_webhook_url: get("SLACK_WEBHOOK_URL_URGENT"),
                timeout_secs: parse_or(get("SLACK_TIMEOUT_SECS"), "SLACK_TIMEOUT_SECS", 5u64)?
                    .clamp(*SLACK_TIMEOUT_RANGE.start(), *SLACK_TIMEOUT_RANGE.end()),
            },
            smtp: SmtpConfig {
                server: get("SMTP_SERVER"),
                port: get("SMTP_PORT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SMTP_PORT),
                sender_email: get("SENDER_EMAIL"),
                sender_password: get("SENDER_PASSWORD"),
                recipients: get("SMS_RECIPIENT_EMAILS")
                    .map(|v| split_list(&v))
                    .unwrap_or_default(),
            },
            watermark: WatermarkConfig {
                override_value: get("LAST_RUN_ID"),
                file: get("WATERMARK_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WATERMARK_FILE)),
                pipeline_output: get("GITHUB_OUTPUT").map(PathBuf::from),
            },
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T> {
    match value {
        Some(raw) => raw.parse().map_err(|_| {
            anyhow::anyhow!(
                "{key} must be a valid {}",
                std::any::type_name::<T>()
            )
        }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
