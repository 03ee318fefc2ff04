use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_provider_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default = "default_publish_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_publish_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_publish_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_publish_attempts(),
            initial_delay_ms: default_publish_initial_delay_ms(),
            max_delay_ms: default_publish_max_delay_ms(),
        }
    }
}

fn default_publish_attempts() -> u32 {
    3
}
fn default_publish_initial_delay_ms() -> u64 {
    500
}
fn default_publish_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_initial_delay_secs")]
    pub retry_initial_delay_secs: u64,
    #[serde(default = "default_retry_step_secs")]
    pub retry_step_secs: u64,
    #[serde(default = "default_retry_max_delay_secs")]
    pub retry_max_delay_secs: u64,
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: u64,
    #[serde(default = "default_checkpoint_every_n")]
    pub checkpoint_every_n: u64,
    #[serde(default = "default_checkpoint_every_secs")]
    pub checkpoint_every_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_initial_delay_secs: default_retry_initial_delay_secs(),
            retry_step_secs: default_retry_step_secs(),
            retry_max_delay_secs: default_retry_max_delay_secs(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
            checkpoint_every_n: default_checkpoint_every_n(),
            checkpoint_every_secs: default_checkpoint_every_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_initial_delay_secs() -> u64 {
    5
}
fn default_retry_step_secs() -> u64 {
    5
}
fn default_retry_max_delay_secs() -> u64 {
    30
}
fn default_breaker_threshold() -> u32 {
    5
}
fn default_breaker_cooldown_secs() -> u64 {
    60
}
fn default_checkpoint_every_n() -> u64 {
    50
}
fn default_checkpoint_every_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default = "default_strategy_timeout_secs")]
    pub strategy_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            strategy_timeout_secs: default_strategy_timeout_secs(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}
fn default_max_page_size() -> u32 {
    100
}
fn default_strategy_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub fixture: Vec<FixtureProviderConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixtureProviderConfig {
    pub name: String,
    pub path: PathBuf,
}

impl SyncConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

impl SearchConfig {
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate sync
    if config.sync.batch_size == 0 {
        anyhow::bail!("sync.batch_size must be > 0");
    }
    if config.sync.provider_timeout_secs == 0 {
        anyhow::bail!("sync.provider_timeout_secs must be > 0");
    }

    // Validate notifier
    if config.notifier.max_attempts == 0 {
        anyhow::bail!("notifier.max_attempts must be >= 1");
    }

    // Validate consumer
    if config.consumer.concurrency == 0 {
        anyhow::bail!("consumer.concurrency must be >= 1");
    }
    if config.consumer.retry_attempts == 0 {
        anyhow::bail!("consumer.retry_attempts must be >= 1");
    }
    if config.consumer.breaker_threshold == 0 {
        anyhow::bail!("consumer.breaker_threshold must be >= 1");
    }

    // Validate search
    if config.search.default_page_size == 0 {
        anyhow::bail!("search.default_page_size must be >= 1");
    }
    if config.search.default_page_size > config.search.max_page_size {
        anyhow::bail!("search.default_page_size must not exceed search.max_page_size");
    }
    if config.search.strategy_timeout_secs == 0 {
        anyhow::bail!("search.strategy_timeout_secs must be > 0");
    }

    Ok(config)
}
