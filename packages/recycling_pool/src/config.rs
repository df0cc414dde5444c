//! Declarative pool configuration.
//!
//! All value types here are plain data: they carry no behavior beyond defaults and
//! normalization. A configuration is copied into a pool when the pool is created and never
//! changes afterwards.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::TemplateLoadError;

/// What a pool does when it has no free instance and may not grow any further.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum RecyclingPolicy {
    /// The acquisition fails and the pool records it in its `failed_acquires` counter.
    ReturnNull,

    /// The active instance that was accessed least recently is forcibly released and handed
    /// to the new caller. The previous holder's handle becomes stale.
    RecycleLeastRecentlyUsed,

    /// A new instance is created even though this takes the pool past its size limit. A
    /// one-shot check is scheduled to shrink the pool back once demand drops. This is the
    /// default.
    #[default]
    ExceedMaxSizeTemporarily,
}

/// How a pool reacts when its template fails to load.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorStrategy {
    /// The failure is logged and the pool stays uninitialized. This is the default.
    #[default]
    LogAndReturnNull,

    /// The failure is returned to the caller of `initialize()`.
    ThrowException,

    /// The configured fallback template is loaded and used in place of the requested one.
    /// Without a fallback template this behaves like [`LogAndReturnNull`][Self::LogAndReturnNull].
    ReturnFallback,

    /// The load is retried with a delay between attempts. When all attempts fail this behaves
    /// like [`LogAndReturnNull`][Self::LogAndReturnNull].
    ///
    /// The delay is awaited through [`AssetSource::delay()`][crate::AssetSource::delay].
    RetryWithTimeout,
}

/// Size limits of a pool and its behavior on exhaustion.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SizeConfig {
    /// Number of instances created while the pool is initialized.
    pub initial_size: usize,

    /// Whether the pool may create instances on demand after initialization.
    pub allow_growth: bool,

    /// Upper bound on live plus free instances, outside a temporary overflow window.
    pub max_size: usize,

    /// What to do when the pool is exhausted.
    pub recycling_policy: RecyclingPolicy,
}

impl SizeConfig {
    /// Sets the number of instances created during initialization.
    #[must_use]
    pub fn with_initial_size(mut self, initial_size: usize) -> Self {
        self.initial_size = initial_size;
        self
    }

    /// Sets whether the pool may create instances on demand.
    #[must_use]
    pub fn with_allow_growth(mut self, allow_growth: bool) -> Self {
        self.allow_growth = allow_growth;
        self
    }

    /// Sets the upper bound on live plus free instances.
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the policy applied on exhaustion.
    #[must_use]
    pub fn with_recycling_policy(mut self, policy: RecyclingPolicy) -> Self {
        self.recycling_policy = policy;
        self
    }

    fn normalized(mut self) -> Self {
        self.initial_size = self.initial_size.min(self.max_size);
        self
    }
}

impl Default for SizeConfig {
    fn default() -> Self {
        Self {
            initial_size: 10,
            allow_growth: true,
            max_size: 100,
            recycling_policy: RecyclingPolicy::default(),
        }
    }
}

/// Controls when and how aggressively free instances are destroyed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct TrimConfig {
    /// Whether releases may trigger trimming. Explicit `trim_excess()` calls ignore this.
    pub enabled: bool,

    /// Minimum time between two release-triggered trims.
    #[serde(with = "seconds")]
    pub check_interval: Duration,

    /// How long an instance must sit unused before it may be destroyed.
    #[serde(with = "seconds")]
    pub inactivity_threshold: Duration,

    /// Share of the trim-eligible instances that survives a trim, in `[0, 1]`.
    pub retain_ratio: f64,

    /// Number of free instances that are never trimmed away.
    pub minimum_retain: usize,
}

impl TrimConfig {
    /// Sets whether releases may trigger trimming.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the minimum time between two release-triggered trims.
    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Sets how long an instance must be unused before it may be destroyed.
    #[must_use]
    pub fn with_inactivity_threshold(mut self, threshold: Duration) -> Self {
        self.inactivity_threshold = threshold;
        self
    }

    /// Sets the share of trim-eligible instances that survives a trim.
    #[must_use]
    pub fn with_retain_ratio(mut self, ratio: f64) -> Self {
        self.retain_ratio = ratio;
        self
    }

    /// Sets the number of free instances that are never trimmed away.
    #[must_use]
    pub fn with_minimum_retain(mut self, minimum_retain: usize) -> Self {
        self.minimum_retain = minimum_retain;
        self
    }

    fn normalized(mut self) -> Self {
        self.retain_ratio = if self.retain_ratio.is_nan() {
            0.0
        } else {
            self.retain_ratio.clamp(0.0, 1.0)
        };
        self
    }
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(30),
            inactivity_threshold: Duration::from_secs(60),
            retain_ratio: 0.5,
            minimum_retain: 5,
        }
    }
}

/// Callback invoked with every failed template load attempt.
#[derive(Clone)]
pub struct ErrorCallback(Rc<dyn Fn(&TemplateLoadError)>);

impl ErrorCallback {
    /// Wraps a closure as an error callback.
    pub fn new(callback: impl Fn(&TemplateLoadError) + 'static) -> Self {
        Self(Rc::new(callback))
    }

    pub(crate) fn call(&self, error: &TemplateLoadError) {
        (self.0)(error);
    }
}

impl fmt::Debug for ErrorCallback {
    #[cfg_attr(test, mutants::skip)] // Opaque output, nothing to assert on.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorCallback").finish_non_exhaustive()
    }
}

/// How template load failures are handled.
///
/// `K` is the template key type of the asset source, used to name the fallback template.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ErrorConfig<K> {
    /// The strategy applied once loading has failed.
    pub strategy: ErrorStrategy,

    /// Template loaded instead of the requested one under [`ErrorStrategy::ReturnFallback`].
    pub fallback_template: Option<K>,

    /// Total number of load attempts under [`ErrorStrategy::RetryWithTimeout`].
    pub max_retries: u32,

    /// Delay between two load attempts under [`ErrorStrategy::RetryWithTimeout`], awaited
    /// through [`AssetSource::delay()`][crate::AssetSource::delay].
    #[serde(with = "seconds")]
    pub retry_delay: Duration,

    /// Invoked with every failed load attempt, whatever the strategy.
    #[serde(skip)]
    pub on_error: Option<ErrorCallback>,
}

impl<K> ErrorConfig<K> {
    /// Sets the strategy applied once loading has failed.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the template substituted under [`ErrorStrategy::ReturnFallback`].
    #[must_use]
    pub fn with_fallback_template(mut self, fallback: K) -> Self {
        self.fallback_template = Some(fallback);
        self
    }

    /// Sets the number of load attempts under [`ErrorStrategy::RetryWithTimeout`].
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay between load attempts under [`ErrorStrategy::RetryWithTimeout`].
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the callback invoked with every failed load attempt.
    #[must_use]
    pub fn with_on_error(mut self, callback: impl Fn(&TemplateLoadError) + 'static) -> Self {
        self.on_error = Some(ErrorCallback::new(callback));
        self
    }

    /// How many times the loader is called before the strategy gives up on the template.
    pub(crate) fn attempt_limit(&self) -> u32 {
        match self.strategy {
            ErrorStrategy::RetryWithTimeout => self.max_retries.max(1),
            _ => 1,
        }
    }

    pub(crate) fn notify(&self, error: &TemplateLoadError) {
        if let Some(callback) = &self.on_error {
            callback.call(error);
        }
    }
}

impl<K> Default for ErrorConfig<K> {
    fn default() -> Self {
        Self {
            strategy: ErrorStrategy::default(),
            fallback_template: None,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            on_error: None,
        }
    }
}

/// Complete configuration of one pool.
///
/// # Examples
///
/// ```
/// use recycling_pool::{PoolConfig, RecyclingPolicy};
///
/// let config: PoolConfig<String> = PoolConfig::from_toml_str(
///     r#"
///     [size]
///     max_size = 8
///     recycling_policy = "return_null"
///
///     [trim]
///     check_interval = 5.0
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.size.max_size, 8);
/// assert_eq!(config.size.recycling_policy, RecyclingPolicy::ReturnNull);
/// assert_eq!(config.trim.minimum_retain, 5);
/// ```
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct PoolConfig<K> {
    /// Size limits and exhaustion behavior.
    pub size: SizeConfig,

    /// Trimming behavior.
    pub trim: TrimConfig,

    /// Template load failure handling.
    pub error: ErrorConfig<K>,
}

impl<K> PoolConfig<K> {
    /// Replaces the size configuration.
    #[must_use]
    pub fn with_size(mut self, size: SizeConfig) -> Self {
        self.size = size;
        self
    }

    /// Replaces the trim configuration.
    #[must_use]
    pub fn with_trim(mut self, trim: TrimConfig) -> Self {
        self.trim = trim;
        self
    }

    /// Replaces the error configuration.
    #[must_use]
    pub fn with_error(mut self, error: ErrorConfig<K>) -> Self {
        self.error = error;
        self
    }

    /// Clamps out-of-range values into the range the pool operates with.
    pub(crate) fn normalized(self) -> Self {
        Self {
            size: self.size.normalized(),
            trim: self.trim.normalized(),
            error: self.error,
        }
    }
}

impl<K: DeserializeOwned> PoolConfig<K> {
    /// Parses a pool configuration from TOML text.
    ///
    /// Tables and fields that are absent take their default values. Durations are given in
    /// (fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid TOML or does not match the
    /// configuration schema.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

impl<K> Default for PoolConfig<K> {
    fn default() -> Self {
        Self {
            size: SizeConfig::default(),
            trim: TrimConfig::default(),
            error: ErrorConfig::default(),
        }
    }
}

/// Errors from parsing pool configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The text is not valid TOML or does not match the configuration schema.
    #[error("invalid pool configuration: {0}")]
    Parse(String),
}

/// Serializes durations as fractional seconds, which is how humans write them in TOML.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
