use anyhow::{Context, anyhow};
use order_flow::DialogueConfig;
use std::time::Duration;

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

/// Service settings, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub openrouter_api_key: String,
    pub classifier_model: String,
    pub chat_model: String,
    pub oracle_timeout: Duration,
    pub database_url: Option<String>,
    pub catalog_file: Option<String>,
    pub fulfillment_url: Option<String>,
    pub operator_number: String,
    pub transcript_dir: Option<String>,
    pub port: u16,
    pub log_format: String,
    pub dialogue: DialogueConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openrouter_api_key =
            get("OPENROUTER_API_KEY").ok_or_else(|| anyhow!("OPENROUTER_API_KEY not set"))?;

        let oracle_timeout_secs = match get("ORACLE_TIMEOUT_SECS") {
            Some(v) => v.parse().context("ORACLE_TIMEOUT_SECS must be a number of seconds")?,
            None => DEFAULT_ORACLE_TIMEOUT_SECS,
        };
        let port = match get("PORT") {
            Some(v) => v.parse().context("PORT must be a valid port number")?,
            None => DEFAULT_PORT,
        };

        let mut dialogue = DialogueConfig::default();
        if let Some(v) = get("SUMMARIES_ENABLED") {
            dialogue.summaries_enabled = parse_flag(&v)
                .ok_or_else(|| anyhow!("SUMMARIES_ENABLED must be true or false, got {v}"))?;
        }
        if let Some(v) = get("MAX_SHOWN_TERMS") {
            dialogue.max_shown_terms =
                Some(v.parse().context("MAX_SHOWN_TERMS must be a positive number")?);
        }

        Ok(Self {
            openrouter_api_key,
            classifier_model: get("CLASSIFIER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            database_url: get("DATABASE_URL"),
            catalog_file: get("CATALOG_FILE"),
            fulfillment_url: get("FULFILLMENT_URL"),
            operator_number: get("OPERATOR_NUMBER").unwrap_or_default(),
            transcript_dir: get("TRANSCRIPT_DIR"),
            port,
            log_format: get("LOG_FORMAT").unwrap_or_else(|| "json".to_string()),
            dialogue,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
