//! Nucleo configuration system.
//!
//! Values come from `~/.nucleo/config.toml` (every field has a default) and
//! secrets can be supplied or overridden through environment variables.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NucleoError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NucleoConfig {
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub work: WorkConfig,
    #[serde(default)]
    pub email: EmailChannelConfig,
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub social: SocialChannelConfig,
    #[serde(default)]
    pub periodic: PeriodicConfig,
}

impl NucleoConfig {
    /// Load config from the default path (~/.nucleo/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("📄 No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NucleoError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!("📄 Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from a user-supplied path (`~` is expanded), or the default path.
    pub fn load_optional(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(Path::new(shellexpand::tilde(p).as_ref())),
            None => Self::load(),
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Nucleo home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".nucleo")
    }

    /// Apply secret overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("EMAIL_ADDRESS") {
            self.email.address = v;
        }
        if let Some(v) = get("EMAIL_PASSWORD") {
            self.email.password = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = v;
        }
        if let Some(v) = get("NUCLEO_TRUSTED_SENDER") {
            self.operator.trusted_sender = v;
        }
        if let Some(v) = get("SOCIAL_BEARER_TOKEN") {
            self.social.bearer_token = v;
        }
    }

    /// Fail fast on missing required values. The error lists all of them.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.email.address.is_empty() {
            missing.push("email.address (EMAIL_ADDRESS)");
        }
        if self.email.password.is_empty() {
            missing.push("email.password (EMAIL_PASSWORD)");
        }
        if self.telegram.bot_token.is_empty() {
            missing.push("telegram.bot_token (TELEGRAM_BOT_TOKEN)");
        }
        if self.telegram.chat_id.is_empty() {
            missing.push("telegram.chat_id (TELEGRAM_CHAT_ID)");
        }
        if self.operator.trusted_sender.is_empty() {
            missing.push("operator.trusted_sender (NUCLEO_TRUSTED_SENDER)");
        }
        if !missing.is_empty() {
            return Err(NucleoError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        if self.work.poll_interval_mins == 0 || self.work.report_interval_mins == 0 {
            return Err(NucleoError::Config(
                "work.poll_interval_mins and work.report_interval_mins must be positive".into(),
            ));
        }
        let poll_secs = self.work.poll_interval_mins.saturating_mul(60);
        if self.work.recovery_delay_secs == 0 || self.work.recovery_delay_secs >= poll_secs {
            return Err(NucleoError::Config(format!(
                "work.recovery_delay_secs must be positive and below the poll interval ({poll_secs}s), got {}",
                self.work.recovery_delay_secs
            )));
        }
        self.periodic.daily_time()?;
        Ok(())
    }
}

/// Who the scheduler works for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Only mail whose `From` contains this (case-insensitive) becomes a task.
    #[serde(default)]
    pub trusted_sender: String,
    /// Recipient of task started/completed mails. Falls back to `trusted_sender`.
    #[serde(default)]
    pub notify_address: Option<String>,
}

impl OperatorConfig {
    pub fn notify_address(&self) -> &str {
        self.notify_address
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.trusted_sender)
    }
}

/// Work scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkConfig {
    #[serde(default = "default_poll_interval_mins")]
    pub poll_interval_mins: u64,
    #[serde(default = "default_report_interval_mins")]
    pub report_interval_mins: u64,
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_simulated_work_millis")]
    pub simulated_work_millis: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_poll_interval_mins() -> u64 { 10 }
fn default_report_interval_mins() -> u64 { 60 }
fn default_recovery_delay_secs() -> u64 { 60 }
fn default_max_results() -> usize { 10 }
fn default_simulated_work_millis() -> u64 { 1000 }
fn default_call_timeout_secs() -> u64 { 10 }

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            poll_interval_mins: default_poll_interval_mins(),
            report_interval_mins: default_report_interval_mins(),
            recovery_delay_secs: default_recovery_delay_secs(),
            max_results: default_max_results(),
            simulated_work_millis: default_simulated_work_millis(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

/// IMAP + SMTP mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailChannelConfig {
    #[serde(default = "default_imap_host")]
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub address: String,
    /// App password / authorization code, not the login password.
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_max_emails_per_day")]
    pub max_per_day: u32,
}

fn default_imap_host() -> String { "imap.163.com".into() }
fn default_imap_port() -> u16 { 993 }
fn default_smtp_host() -> String { "smtp.163.com".into() }
fn default_smtp_port() -> u16 { 465 }
fn default_mailbox() -> String { "INBOX".into() }
fn default_max_emails_per_day() -> u32 { 200 }

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            imap_host: default_imap_host(),
            imap_port: default_imap_port(),
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            address: String::new(),
            password: String::new(),
            display_name: None,
            mailbox: default_mailbox(),
            max_per_day: default_max_emails_per_day(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String { "https://api.telegram.org".into() }

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api_base(),
        }
    }
}

/// Social posting account and its limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialChannelConfig {
    #[serde(default = "default_social_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_max_posts_per_day")]
    pub max_posts_per_day: u32,
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_social_api_base() -> String { "https://api.twitter.com".into() }
fn default_max_posts_per_day() -> u32 { 50 }
fn default_min_interval_secs() -> u64 { 300 }
fn default_signature() -> String { "\n\n— from CC".into() }
fn default_max_chars() -> usize { 280 }

impl Default for SocialChannelConfig {
    fn default() -> Self {
        Self {
            api_base: default_social_api_base(),
            bearer_token: String::new(),
            max_posts_per_day: default_max_posts_per_day(),
            min_interval_secs: default_min_interval_secs(),
            signature: default_signature(),
            max_chars: default_max_chars(),
        }
    }
}

/// Timing for the simpler periodic runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodicConfig {
    #[serde(default = "default_check_interval_mins")]
    pub check_interval_mins: u64,
    /// Local time of day, `HH:MM`.
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Upper bound for one job run.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
}

fn default_check_interval_mins() -> u64 { 30 }
fn default_daily_at() -> String { "02:00".into() }
fn default_tick_secs() -> u64 { 60 }
fn default_job_timeout_secs() -> u64 { 60 }

impl PeriodicConfig {
    pub fn daily_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M").map_err(|e| {
            NucleoError::Config(format!("periodic.daily_at '{}': {e}", self.daily_at))
        })
    }
}

impl Default for PeriodicConfig {
    fn default() -> Self {
        Self {
            check_interval_mins: default_check_interval_mins(),
            daily_at: default_daily_at(),
            tick_secs: default_tick_secs(),
            job_timeout_secs: default_job_timeout_secs(),
        }
    }
}
