use std::str::FromStr;
use std::time::Duration;

use montage_core::continuity::DEFAULT_CONTEXT_LOOKBACK;
use montage_core::error::CoreError;
use montage_core::retry::{RetryPolicy, RetryStrategy, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_STRATEGIES};
use montage_core::segmentation::{
    DurationLimits, SplitConfig, DEFAULT_MAX_SEGMENT_SECS, DEFAULT_MIN_SEGMENT_SECS,
};
use montage_core::threshold_validation::validate_unit_range;
use montage_core::timing::DEFAULT_WORDS_PER_MINUTE;

use crate::pacing::PacingConfig;

/// Concurrent provider calls allowed per production.
pub const DEFAULT_MAX_WORKERS: usize = 2;

/// Frames per second used to advance the continuity timeline.
pub const DEFAULT_FRAME_RATE: f64 = 24.0;

/// How many times a failed segment may itself be re-split.
pub const DEFAULT_MAX_SPLIT_DEPTH: u32 = 2;

/// Production settings loaded from environment variables.
///
/// Defaults suit a local dry run against the mock provider.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub limits: DurationLimits,
    pub retry: RetryPolicy,
    /// Provider used for shots that do not name one. Falls back to the
    /// registry default when unset.
    pub default_provider: Option<String>,
    /// Providers tried by the fallback strategy, in order. Empty means
    /// the registry's healthy providers by priority.
    pub fallback_providers: Vec<String>,
    pub max_workers: usize,
    pub pacing: PacingConfig,
    /// Per-call limit; `None` leaves timeouts to the provider.
    pub generation_timeout: Option<Duration>,
    pub frame_rate: f64,
    pub context_lookback: usize,
    pub max_split_depth: u32,
    /// Fraction of the way lighting moves toward a shot's target on commit.
    pub lighting_blend: f64,
    pub words_per_minute: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: DurationLimits::default(),
            retry: RetryPolicy::default(),
            default_provider: None,
            fallback_providers: Vec::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            pacing: PacingConfig::default(),
            generation_timeout: None,
            frame_rate: DEFAULT_FRAME_RATE,
            context_lookback: DEFAULT_CONTEXT_LOOKBACK,
            max_split_depth: DEFAULT_MAX_SPLIT_DEPTH,
            lighting_blend: 1.0,
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                               |
    /// |----------------------------------|---------------------------------------|
    /// | `MONTAGE_MAX_SEGMENT_SECS`       | `8.0`                                 |
    /// | `MONTAGE_MIN_SEGMENT_SECS`       | `2.0`                                 |
    /// | `MONTAGE_MAX_RETRIES`            | `3`                                   |
    /// | `MONTAGE_RETRY_STRATEGIES`       | `direct,simplified,resplit,fallback`  |
    /// | `MONTAGE_DEFAULT_PROVIDER`       | registry default                      |
    /// | `MONTAGE_FALLBACK_PROVIDERS`     | healthy providers by priority         |
    /// | `MONTAGE_MAX_WORKERS`            | `2`                                   |
    /// | `MONTAGE_PACING_BASE_MS`         | `500`                                 |
    /// | `MONTAGE_PACING_MAX_MS`          | `30000`                               |
    /// | `MONTAGE_PACING_MULTIPLIER`      | `2.0`                                 |
    /// | `MONTAGE_GENERATION_TIMEOUT_SECS`| none                                  |
    /// | `MONTAGE_FRAME_RATE`             | `24`                                  |
    /// | `MONTAGE_CONTEXT_LOOKBACK`       | `3`                                   |
    /// | `MONTAGE_MAX_SPLIT_DEPTH`        | `2`                                   |
    /// | `MONTAGE_LIGHTING_BLEND`         | `1.0`                                 |
    /// | `MONTAGE_WORDS_PER_MINUTE`       | `150`                                 |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let limits = DurationLimits {
            min_segment: parse_or(&lookup, "MONTAGE_MIN_SEGMENT_SECS", DEFAULT_MIN_SEGMENT_SECS)?,
            max_segment: parse_or(&lookup, "MONTAGE_MAX_SEGMENT_SECS", DEFAULT_MAX_SEGMENT_SECS)?,
        };

        let strategies = match lookup("MONTAGE_RETRY_STRATEGIES") {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|label| RetryStrategy::from_label(label))
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_RETRY_STRATEGIES.to_vec(),
        };
        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "MONTAGE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            strategies,
        };

        let pacing = PacingConfig {
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "MONTAGE_PACING_BASE_MS",
                defaults.pacing.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "MONTAGE_PACING_MAX_MS",
                defaults.pacing.max_delay.as_millis() as u64,
            )?),
            multiplier: parse_or(&lookup, "MONTAGE_PACING_MULTIPLIER", defaults.pacing.multiplier)?,
        };

        let generation_timeout = lookup("MONTAGE_GENERATION_TIMEOUT_SECS")
            .map(|raw| parse_value::<u64>("MONTAGE_GENERATION_TIMEOUT_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        let config = Self {
            limits,
            retry,
            default_provider: lookup("MONTAGE_DEFAULT_PROVIDER")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            fallback_providers: lookup("MONTAGE_FALLBACK_PROVIDERS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            max_workers: parse_or(&lookup, "MONTAGE_MAX_WORKERS", defaults.max_workers)?,
            pacing,
            generation_timeout,
            frame_rate: parse_or(&lookup, "MONTAGE_FRAME_RATE", defaults.frame_rate)?,
            context_lookback: parse_or(&lookup, "MONTAGE_CONTEXT_LOOKBACK", defaults.context_lookback)?,
            max_split_depth: parse_or(&lookup, "MONTAGE_MAX_SPLIT_DEPTH", defaults.max_split_depth)?,
            lighting_blend: parse_or(&lookup, "MONTAGE_LIGHTING_BLEND", defaults.lighting_blend)?,
            words_per_minute: parse_or(&lookup, "MONTAGE_WORDS_PER_MINUTE", defaults.words_per_minute)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.limits.validate()?;
        if self.max_workers == 0 {
            return Err(CoreError::Validation("max_workers must be at least 1".to_string()));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(CoreError::Validation(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if !(self.words_per_minute.is_finite() && self.words_per_minute > 0.0) {
            return Err(CoreError::Validation(format!(
                "words_per_minute must be positive, got {}",
                self.words_per_minute
            )));
        }
        if !(self.pacing.multiplier.is_finite() && self.pacing.multiplier >= 1.0) {
            return Err(CoreError::Validation(format!(
                "pacing multiplier must be at least 1.0, got {}",
                self.pacing.multiplier
            )));
        }
        validate_unit_range(self.lighting_blend, "lighting_blend")
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            words_per_minute: self.words_per_minute,
            ..SplitConfig::with_limits(self.limits)
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'")))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<PipelineConfig, CoreError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.limits.max_segment, 8.0);
        assert_eq!(config.limits.min_segment, 2.0);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.strategies, DEFAULT_RETRY_STRATEGIES.to_vec());
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.frame_rate, 24.0);
        assert!(config.generation_timeout.is_none());
        assert!(config.fallback_providers.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("MONTAGE_MAX_SEGMENT_SECS", "5"),
            ("MONTAGE_RETRY_STRATEGIES", "fallback, direct"),
            ("MONTAGE_FALLBACK_PROVIDERS", "runway, ,pika"),
            ("MONTAGE_GENERATION_TIMEOUT_SECS", "90"),
            ("MONTAGE_DEFAULT_PROVIDER", "veo"),
        ])
        .unwrap();
        assert_eq!(config.limits.max_segment, 5.0);
        assert_eq!(
            config.retry.strategies,
            vec![RetryStrategy::FallbackProvider, RetryStrategy::DirectRetry]
        );
        assert_eq!(config.fallback_providers, vec!["runway", "pika"]);
        assert_eq!(config.generation_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.default_provider.as_deref(), Some("veo"));
    }

    #[test]
    fn rejects_unparsable_values() {
        assert_matches!(
            load(&[("MONTAGE_MAX_WORKERS", "many")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            load(&[("MONTAGE_RETRY_STRATEGIES", "pray")]),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn rejects_inverted_limits() {
        assert_matches!(
            load(&[("MONTAGE_MIN_SEGMENT_SECS", "9")]),
            Err(CoreError::InvalidDurationConfig(_))
        );
    }

    #[test]
    fn rejects_zero_workers() {
        let config = PipelineConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(CoreError::Validation(_)));
    }
}
