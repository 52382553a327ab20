//! Result polling with exponential backoff
//!
//! Bounds store load while a caller blocks on a result: the first polls come
//! quickly, later ones back off up to `max_interval`.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::worker::env_parse;

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    /// Delay after the first unsuccessful poll
    #[serde(with = "duration_millis")]
    pub min_interval: Duration,

    /// Upper bound for the delay between polls
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier applied after every unsuccessful poll
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0-1.0) to add randomness
    pub jitter: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            jitter: 0.1,
        }
    }
}

impl PollConfig {
    /// Create a new poll configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// - `CELERY_POLL_MIN_MS` (default: 10)
    /// - `CELERY_POLL_MAX_MS` (default: 500)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>("CELERY_POLL_MIN_MS") {
            config = config.with_min_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("CELERY_POLL_MAX_MS") {
            config = config.with_max_interval(Duration::from_millis(ms));
        }
        config
    }

    /// Set minimum poll interval; never below one millisecond
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval.max(Duration::from_millis(1));
        self.max_interval = self.max_interval.max(self.min_interval);
        self
    }

    /// Set maximum poll interval
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval.max(self.min_interval);
        self
    }

    /// Set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Set jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }
}

/// Backoff state of one blocking retrieval
#[derive(Debug, Clone)]
pub struct ResultPoller {
    config: PollConfig,
    current_interval: Duration,
}

impl ResultPoller {
    /// Create a poller starting at the minimum interval
    pub fn new(config: PollConfig) -> Self {
        Self {
            current_interval: config.min_interval,
            config,
        }
    }

    /// Delay before the next poll; advances the backoff
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.apply_jitter(self.current_interval);
        self.increase_backoff();
        delay
    }

    /// Get the current poll interval (before jitter)
    pub fn current_interval(&self) -> Duration {
        self.current_interval
    }

    fn increase_backoff(&mut self) {
        let new_interval = Duration::from_secs_f64(
            self.current_interval.as_secs_f64() * self.config.backoff_multiplier,
        );
        self.current_interval = new_interval.min(self.config.max_interval);
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return interval;
        }
        let factor = rand::thread_rng().gen_range(-self.config.jitter..=self.config.jitter);
        let jittered = interval.as_secs_f64() * (1.0 + factor);
        Duration::from_secs_f64(jittered.max(self.config.min_interval.as_secs_f64() / 2.0))
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.min_interval, Duration::from_millis(10));
        assert_eq!(config.max_interval, Duration::from_millis(500));
        assert_eq!(config.backoff_multiplier, 1.5);
        assert_eq!(config.jitter, 0.1);
    }

    #[test]
    fn test_config_builder() {
        let config = PollConfig::new()
            .with_min_interval(Duration::from_millis(5))
            .with_max_interval(Duration::from_millis(100))
            .with_backoff_multiplier(0.5)
            .with_jitter(2.0);

        assert_eq!(config.min_interval, Duration::from_millis(5));
        assert_eq!(config.max_interval, Duration::from_millis(100));
        assert_eq!(config.backoff_multiplier, 1.0);
        assert_eq!(config.jitter, 1.0);
    }

    #[test]
    fn test_min_interval_never_zero() {
        let config = PollConfig::new().with_min_interval(Duration::ZERO);
        assert_eq!(config.min_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = PollConfig::new()
            .with_min_interval(Duration::from_millis(10))
            .with_max_interval(Duration::from_millis(40))
            .with_backoff_multiplier(2.0)
            .with_jitter(0.0);
        let mut poller = ResultPoller::new(config);

        assert_eq!(poller.next_delay(), Duration::from_millis(10));
        assert_eq!(poller.next_delay(), Duration::from_millis(20));
        assert_eq!(poller.next_delay(), Duration::from_millis(40));
        assert_eq!(poller.next_delay(), Duration::from_millis(40));
        assert_eq!(poller.current_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = PollConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(100))
            .with_jitter(0.1);
        let mut poller = ResultPoller::new(config);

        for _ in 0..100 {
            let delay = poller.next_delay();
            assert!(delay >= Duration::from_millis(89), "{delay:?}");
            assert!(delay <= Duration::from_millis(111), "{delay:?}");
        }
    }
}
