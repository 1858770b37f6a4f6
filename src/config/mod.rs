//! Configuration management for the enrichment cache.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation

use std::env;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Result;


/// Main configuration container for the enrichment cache components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EnricherConfig {
    /// Cache refresh, expiry and eviction parameters
    #[serde(default)]
    pub cache: CacheConfig,

    /// Rate limiting of cloud provider lookups
    #[serde(default)]
    pub limiter: LimiterConfig,
}

impl EnricherConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later
    /// sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `ENRICH__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Validation is
    /// deferred to allow further overrides via `with_override_config()`.
    /// Callers MUST call `validate()` before using the configuration.
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("ENRICH")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from a file without
    /// validation. Later sources override earlier ones.
    pub fn with_override_config(self, path: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(&self)?)
            .add_source(File::with_name(path).required(true))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates all subsystem configurations
    pub fn validate(self) -> Result<Self> {
        self.cache.validate()?;
        self.limiter.validate()?;
        Ok(self)
    }
}

/// Cache behaviour configuration.
///
/// Distinct TTLs govern successful and failed lookups, the refresh period
/// drives the periodic expiry/eviction pass, and the idle period drops
/// entries no item has touched regardless of their expiry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Interval between refresh passes over the cache (milliseconds)
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,

    /// Entries not accessed for this long are evicted, expired or not
    /// (milliseconds)
    #[serde(default = "default_evict_after_idle_ms")]
    pub evict_after_idle_ms: u64,

    /// Lifetime of entries created from a successful lookup (milliseconds)
    #[serde(default = "default_positive_ttl_ms")]
    pub positive_ttl_ms: u64,

    /// Lifetime of entries created from a failed lookup, i.e. the retry
    /// cadence after transient provider errors (milliseconds)
    #[serde(default = "default_negative_ttl_ms")]
    pub negative_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_period_ms: default_refresh_period_ms(),
            evict_after_idle_ms: default_evict_after_idle_ms(),
            positive_ttl_ms: default_positive_ttl_ms(),
            negative_ttl_ms: default_negative_ttl_ms(),
        }
    }
}

impl CacheConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_period_ms)
    }

    pub fn evict_after_idle(&self) -> Duration {
        Duration::from_millis(self.evict_after_idle_ms)
    }

    pub fn positive_ttl(&self) -> Duration {
        Duration::from_millis(self.positive_ttl_ms)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_millis(self.negative_ttl_ms)
    }

    /// Validates cache timing parameters.
    ///
    /// Zero durations are hard errors. Violations of the recommended
    /// relationships (refresh period well below the positive TTL, negative
    /// TTL not above the positive TTL, idle eviction beyond the positive
    /// TTL) only log a warning: they degrade cache behaviour but keep it
    /// correct.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_period_ms == 0 {
            return Err(ConfigError::Message(
                "cache.refresh_period_ms must be greater than 0".into(),
            )
            .into());
        }
        if self.evict_after_idle_ms == 0 {
            return Err(ConfigError::Message(
                "cache.evict_after_idle_ms must be greater than 0".into(),
            )
            .into());
        }
        if self.positive_ttl_ms == 0 {
            return Err(
                ConfigError::Message("cache.positive_ttl_ms must be greater than 0".into()).into(),
            );
        }
        if self.negative_ttl_ms == 0 {
            return Err(
                ConfigError::Message("cache.negative_ttl_ms must be greater than 0".into()).into(),
            );
        }

        if self.refresh_period_ms >= self.positive_ttl_ms {
            warn!(
                "cache.refresh_period_ms ({}) should be well below cache.positive_ttl_ms ({})",
                self.refresh_period_ms, self.positive_ttl_ms
            );
        }
        if self.negative_ttl_ms > self.positive_ttl_ms {
            warn!(
                "cache.negative_ttl_ms ({}) should not exceed cache.positive_ttl_ms ({})",
                self.negative_ttl_ms, self.positive_ttl_ms
            );
        }
        if self.evict_after_idle_ms < self.positive_ttl_ms {
            warn!(
                "cache.evict_after_idle_ms ({}) below cache.positive_ttl_ms ({}) evicts entries \
                 before they ever expire",
                self.evict_after_idle_ms, self.positive_ttl_ms
            );
        }
        Ok(())
    }
}

/// Token-bucket parameters for cloud provider lookups.
///
/// One token is consumed per lookup batch, not per address.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LimiterConfig {
    /// Sustained lookup batches per second
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: f64,

    /// Burst capacity on top of the sustained rate
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate_per_second(),
            burst: default_burst(),
        }
    }
}

impl LimiterConfig {
    /// Validates rate limiting parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.rate_per_second > 0.0) {
            return Err(ConfigError::Message(
                "limiter.rate_per_second must be greater than 0".into(),
            )
            .into());
        }
        if self.burst == 0 {
            return Err(ConfigError::Message("limiter.burst must be greater than 0".into()).into());
        }
        Ok(())
    }
}

fn default_refresh_period_ms() -> u64 {
    60_000
}

fn default_evict_after_idle_ms() -> u64 {
    1_200_000
}

fn default_positive_ttl_ms() -> u64 {
    300_000
}

fn default_negative_ttl_ms() -> u64 {
    60_000
}

fn default_rate_per_second() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    15
}
