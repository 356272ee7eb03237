//! Engine configuration read from the process environment.

use std::str::FromStr;
use std::time::Duration;

use opsradar_risk::ForecastParams;

pub const HORIZON_DAYS: &str = "OPSRADAR_HORIZON_DAYS";
pub const HISTORY_DAYS: &str = "OPSRADAR_HISTORY_DAYS";
pub const LEAD_TIME_DAYS: &str = "OPSRADAR_LEAD_TIME_DAYS";
pub const RESOLVED_EXPIRY_DAYS: &str = "OPSRADAR_RESOLVED_EXPIRY_DAYS";
pub const SCAN_INTERVAL_SECS: &str = "OPSRADAR_SCAN_INTERVAL_SECS";
pub const MAX_RETRIES: &str = "OPSRADAR_MAX_RETRIES";
pub const BASE_BACKOFF_MS: &str = "OPSRADAR_BASE_BACKOFF_MS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Defaults for scans that do not override horizon/history.
    pub forecast: ForecastParams,
    /// Resolved insights older than this get an `expires_at` stamp.
    pub resolved_expiry_days: u32,
    /// `None` disables the scheduled runner.
    pub scan_interval: Option<Duration>,
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastParams::default(),
            resolved_expiry_days: 30,
            scan_interval: None,
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let forecast = ForecastParams {
            horizon_days: positive(&lookup, HORIZON_DAYS, defaults.forecast.horizon_days)?,
            history_days: positive(&lookup, HISTORY_DAYS, defaults.forecast.history_days)?,
            lead_time_days: parse_or(&lookup, LEAD_TIME_DAYS, defaults.forecast.lead_time_days)?,
        };

        let scan_interval = match lookup(SCAN_INTERVAL_SECS) {
            Some(raw) => Some(Duration::from_secs(parse_positive(SCAN_INTERVAL_SECS, &raw)?)),
            None => None,
        };

        Ok(Self {
            forecast,
            resolved_expiry_days: positive(&lookup, RESOLVED_EXPIRY_DAYS, defaults.resolved_expiry_days)?,
            scan_interval,
            max_retries: parse_or(&lookup, MAX_RETRIES, defaults.max_retries)?,
            base_backoff: Duration::from_millis(parse_or(
                &lookup,
                BASE_BACKOFF_MS,
                defaults.base_backoff.as_millis() as u64,
            )?),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn positive<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_positive(key, &raw),
        None => Ok(default),
    }
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialOrd,
{
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Ok(v),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.forecast.horizon_days, 30);
        assert_eq!(cfg.forecast.history_days, 60);
        assert_eq!(cfg.forecast.lead_time_days, 10);
        assert!(cfg.scan_interval.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            (HORIZON_DAYS, "14"),
            (LEAD_TIME_DAYS, "0"),
            (SCAN_INTERVAL_SECS, " 300 "),
            (BASE_BACKOFF_MS, "100"),
        ])
        .unwrap();
        assert_eq!(cfg.forecast.horizon_days, 14);
        assert_eq!(cfg.forecast.lead_time_days, 0);
        assert_eq!(cfg.scan_interval, Some(Duration::from_secs(300)));
        assert_eq!(cfg.base_backoff, Duration::from_millis(100));
    }

    #[test]
    fn zero_or_garbage_is_rejected() {
        assert_eq!(
            config(&[(HISTORY_DAYS, "0")]).unwrap_err(),
            ConfigError::Invalid { key: HISTORY_DAYS, value: "0".to_string() }
        );
        assert!(config(&[(SCAN_INTERVAL_SECS, "soon")]).is_err());
        assert!(config(&[(MAX_RETRIES, "-1")]).is_err());
    }
}
