//! Configuration models for freebie.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! Secrets never live in the file: only the names of the environment
//! variables that carry them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for freebie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Steam account settings
    #[serde(default)]
    pub account: AccountConfig,

    /// Store (catalog) API settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Timing of the claim loop and idle refresh
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Files persisted between runs
    #[serde(default)]
    pub paths: PathsConfig,

    /// Mail notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// HTTP control surface
    #[serde(default)]
    pub control: ControlConfig,

    /// Session bridge connection
    #[serde(default)]
    pub session: SessionConfig,
}

/// Steam account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Environment variable holding the account name
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Environment variable holding the base64 shared secret
    #[serde(default = "default_shared_secret_env")]
    pub shared_secret_env: String,

    /// Persona state reported once logged on (1 = online)
    #[serde(default = "default_persona_state")]
    pub persona_state: u8,

    /// App ids reported as being played
    #[serde(default = "default_games")]
    pub games: Vec<u32>,
}

fn default_username_env() -> String {
    "STEAM_USERNAME".to_string()
}

fn default_password_env() -> String {
    "STEAM_PASSWORD".to_string()
}

fn default_shared_secret_env() -> String {
    "STEAM_SHARED_SECRET".to_string()
}

fn default_persona_state() -> u8 {
    1
}

fn default_games() -> Vec<u32> {
    vec![
        578080, 304930, 230410, 729460, 42700, 1222730, 414700, 1546990, 1547000, 242760, 281990,
        383180,
    ]
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username_env: default_username_env(),
            password_env: default_password_env(),
            shared_secret_env: default_shared_secret_env(),
            persona_state: default_persona_state(),
            games: default_games(),
        }
    }
}

/// Store API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL for the store front
    #[serde(default = "default_store_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// `maxprice` hint passed to the search endpoint
    #[serde(default = "default_max_price")]
    pub max_price: String,

    /// Minimum discount (percent) for a paid item to count as an offer
    #[serde(default = "default_discount_threshold")]
    pub discount_threshold: u8,

    /// Country code for price lookups (store default when unset)
    #[serde(default)]
    pub country: Option<String>,
}

fn default_store_url() -> String {
    "https://store.steampowered.com".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_price() -> String {
    "free".to_string()
}

fn default_discount_threshold() -> u8 {
    80
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_price: default_max_price(),
            discount_threshold: default_discount_threshold(),
            country: None,
        }
    }
}

/// Scheduling configuration.
///
/// K_i: The check interval is sampled uniformly from `[min, max]` each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Shortest wait between checks, in seconds
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Longest wait between checks, in seconds
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u64,

    /// Pause between listing offers and claiming them, in milliseconds
    #[serde(default = "default_claim_delay")]
    pub claim_delay_ms: u64,

    /// Wait after a failed cycle, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Period of the idle refresh (stop then restart games), in seconds
    #[serde(default = "default_idle_period")]
    pub idle_refresh_secs: u64,

    /// How long games stay stopped during an idle refresh, in seconds
    #[serde(default = "default_idle_pause")]
    pub idle_pause_secs: u64,

    /// Whether the ledger is only updated after a successful notification
    #[serde(default)]
    pub ledger_policy: LedgerPolicy,
}

fn default_min_interval() -> u64 {
    60 * 60
}

fn default_max_interval() -> u64 {
    6 * 60 * 60
}

fn default_claim_delay() -> u64 {
    2_000
}

fn default_retry_delay() -> u64 {
    10 * 60
}

fn default_idle_period() -> u64 {
    60 * 60
}

fn default_idle_pause() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval(),
            max_interval_secs: default_max_interval(),
            claim_delay_ms: default_claim_delay(),
            retry_delay_secs: default_retry_delay(),
            idle_refresh_secs: default_idle_period(),
            idle_pause_secs: default_idle_pause(),
            ledger_policy: LedgerPolicy::default(),
        }
    }
}

impl ScheduleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }

    pub fn claim_delay(&self) -> Duration {
        Duration::from_millis(self.claim_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn idle_refresh(&self) -> Duration {
        Duration::from_secs(self.idle_refresh_secs)
    }

    pub fn idle_pause(&self) -> Duration {
        Duration::from_secs(self.idle_pause_secs)
    }
}

/// When claimed titles are written to the ledger.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerPolicy {
    /// Record once the notification was attempted, whatever its outcome
    #[default]
    AfterNotifyAttempt,
    /// Record only when the notification went out
    AfterNotifySuccess,
}

/// Persisted file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Sentry (session continuity) blob
    #[serde(default = "default_sentry_path")]
    pub sentry_file: PathBuf,

    /// Titles already claimed, one per line
    #[serde(default = "default_ledger_path")]
    pub ledger_file: PathBuf,
}

fn default_sentry_path() -> PathBuf {
    PathBuf::from("sentry.bin")
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("seen_promotions.txt")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sentry_file: default_sentry_path(),
            ledger_file: default_ledger_path(),
        }
    }
}

/// Mail notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// SMTP relay host
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    /// SMTP submission port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Environment variable holding the sender address
    #[serde(default = "default_sender_env")]
    pub sender_env: String,

    /// Environment variable holding the sender password
    #[serde(default = "default_sender_password_env")]
    pub sender_password_env: String,

    /// Environment variable holding the recipient address
    #[serde(default = "default_receiver_env")]
    pub receiver_env: String,

    /// Subject line of the claim summary
    #[serde(default = "default_subject")]
    pub subject: String,

    /// Timeout for one SMTP exchange, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Log the summary instead of mailing it
    #[serde(default)]
    pub dry_run: bool,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_sender_env() -> String {
    "SENDER_EMAIL".to_string()
}

fn default_sender_password_env() -> String {
    "SENDER_PASSWORD".to_string()
}

fn default_receiver_env() -> String {
    "RECEIVER_EMAIL".to_string()
}

fn default_subject() -> String {
    "New Free Steam Games Claimed!".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            sender_env: default_sender_env(),
            sender_password_env: default_sender_password_env(),
            receiver_env: default_receiver_env(),
            subject: default_subject(),
            timeout_secs: default_timeout(),
            dry_run: false,
        }
    }
}

/// HTTP control surface configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind: default_bind(),
        }
    }
}

/// Session bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Base URL of the local session bridge
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Request timeout for bridge commands, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Long-poll wait for the event stream, in seconds
    #[serde(default = "default_event_wait")]
    pub event_wait_secs: u64,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_event_wait() -> u64 {
    25
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            timeout_secs: default_timeout(),
            event_wait_secs: default_event_wait(),
        }
    }
}

/// Secrets resolved from the environment.
///
/// B_i(all variables set) → checked by [`Config::resolve_secrets`].
#[derive(Clone)]
pub struct Secrets {
    pub username: String,
    pub password: String,
    pub shared_secret: String,
    pub sender_email: String,
    pub sender_password: String,
    pub receiver_email: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("shared_secret", &"<redacted>")
            .field("sender_email", &self.sender_email)
            .field("sender_password", &"<redacted>")
            .field("receiver_email", &self.receiver_email)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.expand_env();
        config.validate()?;
        Ok(config)
    }

    /// Load the file if present, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Expand `${VAR}` placeholders in free-form string values.
    ///
    /// The `*_env` fields name variables and are left as written.
    fn expand_env(&mut self) {
        for field in [
            &mut self.store.base_url,
            &mut self.store.max_price,
            &mut self.notify.smtp_host,
            &mut self.notify.subject,
            &mut self.control.bind,
            &mut self.session.bridge_url,
        ] {
            *field = expand_env_vars(field);
        }
        if let Some(country) = self.store.country.as_mut() {
            *country = expand_env_vars(country);
        }
        for path in [&mut self.paths.sentry_file, &mut self.paths.ledger_file] {
            if let Some(raw) = path.to_str() {
                *path = PathBuf::from(expand_env_vars(raw));
            }
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.min_interval_secs > self.schedule.max_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "schedule.min_interval_secs ({}) exceeds schedule.max_interval_secs ({})",
                self.schedule.min_interval_secs, self.schedule.max_interval_secs
            )));
        }
        if self.store.discount_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "store.discount_threshold must be at most 100, got {}",
                self.store.discount_threshold
            )));
        }
        if self.schedule.idle_refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.idle_refresh_secs must be at least 1".to_string(),
            ));
        }
        if self.store.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "store.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve every required secret from the environment.
    ///
    /// Fails on the first variable that is unset or empty.
    pub fn resolve_secrets(&self) -> Result<Secrets, ConfigError> {
        Ok(Secrets {
            username: require_env(&self.account.username_env)?,
            password: require_env(&self.account.password_env)?,
            shared_secret: require_env(&self.account.shared_secret_env)?,
            sender_email: require_env(&self.notify.sender_env)?,
            sender_password: require_env(&self.notify.sender_password_env)?,
            receiver_email: require_env(&self.notify.receiver_env)?,
        })
    }
}

fn require_env(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(expand_env_vars(&value)),
        _ => Err(ConfigError::MissingEnv(var.to_string())),
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error, out-of-range value
/// - I^B materialized: Missing required environment values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
