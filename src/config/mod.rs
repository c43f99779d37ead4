use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

/// Where and how the listing is fetched
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Host that relative detail links are resolved against.
    #[serde(default = "default_site_root")]
    pub site_root: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Eligibility criteria
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    /// Offerings closing in `0..window_days` days are considered.
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default = "default_gmp_threshold")]
    pub gmp_threshold: f64,

    /// Lower bar applied when the primary one leaves too few candidates.
    #[serde(default)]
    pub fallback_threshold: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Max candidates enriched at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Telegram,
    Discord,
    Slack,
    #[default]
    Console,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub telegram_bot_token: Option<String>,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    #[serde(default)]
    pub slack_webhook_url: Option<String>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_listing_url() -> String {
    "https://www.investorgain.com/report/live-ipo-gmp/331/".to_string()
}
fn default_site_root() -> String {
    "https://www.investorgain.com".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    "ipo-alert/0.1 (personal GMP watcher)".to_string()
}
fn default_window_days() -> u32 {
    3
}
fn default_gmp_threshold() -> f64 {
    20.0
}
fn default_concurrency() -> usize {
    4
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            site_root: default_site_root(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            gmp_threshold: default_gmp_threshold(),
            fallback_threshold: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dry_run: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            filter: FilterConfig::default(),
            pipeline: PipelineConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::Environment::with_prefix("IPO_ALERT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration sources")?;

        cfg.try_deserialize().context("Invalid configuration")
    }

    /// Checks cross-field rules once, after CLI overrides are applied.
    pub fn validate(&self) -> Result<()> {
        let f = &self.filter;
        if !f.gmp_threshold.is_finite() {
            bail!("gmp_threshold must be a finite number");
        }
        if let Some(fallback) = f.fallback_threshold {
            if !fallback.is_finite() {
                bail!("fallback_threshold must be a finite number");
            }
            if fallback >= f.gmp_threshold {
                bail!(
                    "fallback_threshold ({}) must be lower than gmp_threshold ({})",
                    fallback,
                    f.gmp_threshold
                );
            }
        }
        url::Url::parse(&self.scraper.site_root)
            .with_context(|| format!("site_root {:?} is not a URL", self.scraper.site_root))?;

        if self.pipeline.dry_run {
            return Ok(());
        }
        let n = &self.notifier;
        let missing = match n.provider {
            Provider::Telegram if blank(&n.telegram_bot_token) => Some("telegram_bot_token"),
            Provider::Telegram if blank(&n.telegram_chat_id) => Some("telegram_chat_id"),
            Provider::Discord if blank(&n.discord_webhook_url) => Some("discord_webhook_url"),
            Provider::Slack if blank(&n.slack_webhook_url) => Some("slack_webhook_url"),
            _ => None,
        };
        if let Some(field) = missing {
            bail!("notifier.{} is required for the {:?} provider", field, n.provider);
        }
        Ok(())
    }
}

fn blank(v: &Option<String>) -> bool {
    v.as_deref().map(str::trim).unwrap_or_default().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_fallback_must_be_lower() {
        let mut cfg = AppConfig::default();
        cfg.filter.fallback_threshold = Some(20.0);
        assert!(cfg.validate().is_err());

        cfg.filter.fallback_threshold = Some(10.0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_provider_needs_credentials_unless_dry_run() {
        let mut cfg = AppConfig::default();
        cfg.notifier.provider = Provider::Telegram;
        cfg.notifier.telegram_bot_token = Some("123:abc".into());
        assert!(cfg.validate().is_err());

        cfg.pipeline.dry_run = true;
        assert!(cfg.validate().is_ok());

        cfg.pipeline.dry_run = false;
        cfg.notifier.telegram_chat_id = Some("42".into());
        assert!(cfg.validate().is_ok());
    }
}
