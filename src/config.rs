use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use std::env;

use crate::error::EngineError;
use crate::live::{CohortDimension, LiveConfig, MAX_WINDOW_BUCKETS};

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(r"^(\d+)\s*([smhd])$").unwrap();
}

const DEFAULT_DATABASE_URL: &str = "sqlite:trusty_tally.db";
const DEFAULT_SNAPSHOT_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub nullifier_secret: String,
    pub live: LiveConfig,
    pub snapshot_interval_seconds: u64,
}

impl EngineConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let nullifier_secret = lookup("NULLIFIER_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EngineError::config("NULLIFIER_SECRET", "must be set"))?;

        let bucket_width = match lookup("LIVE_BUCKET_WIDTH") {
            Some(raw) => parse_duration(&raw)
                .ok_or_else(|| EngineError::config("LIVE_BUCKET_WIDTH", format!("invalid duration {:?}", raw)))?,
            None => Duration::hours(1),
        };

        let window_buckets = parse_number::<usize>(&lookup, "LIVE_WINDOW_BUCKETS", 24)?;
        if window_buckets == 0 || window_buckets > MAX_WINDOW_BUCKETS {
            return Err(EngineError::config(
                "LIVE_WINDOW_BUCKETS",
                format!("must be between 1 and {}", MAX_WINDOW_BUCKETS),
            ));
        }

        let cohort_dimension = match lookup("LIVE_COHORT_DIMENSION") {
            Some(raw) => raw
                .parse::<CohortDimension>()
                .map_err(|e| EngineError::config("LIVE_COHORT_DIMENSION", e))?,
            None => CohortDimension::Department,
        };

        let snapshot_interval_seconds = parse_number::<u64>(
            &lookup,
            "SNAPSHOT_INTERVAL_SECONDS",
            DEFAULT_SNAPSHOT_INTERVAL_SECONDS,
        )?;
        if snapshot_interval_seconds == 0 {
            return Err(EngineError::config("SNAPSHOT_INTERVAL_SECONDS", "must be at least 1"));
        }

        Ok(Self {
            database_url,
            nullifier_secret,
            live: LiveConfig {
                bucket_width,
                window_buckets,
                cohort_dimension,
            },
            snapshot_interval_seconds,
        })
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> Result<T, EngineError> {
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| EngineError::config(var, format!("not a number: {:?}", raw))),
        None => Ok(default),
    }
}

/// Parses `30m`, `1h`, `2d` style durations. Zero is rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(raw.trim())?;
    let amount: i64 = caps[1].parse().ok()?;
    if amount == 0 {
        return None;
    }
    match &caps[2] {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<EngineConfig, EngineError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("NULLIFIER_SECRET", "pepper")]).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.live.bucket_width, Duration::hours(1));
        assert_eq!(config.live.window_buckets, 24);
        assert_eq!(config.live.cohort_dimension, CohortDimension::Department);
        assert_eq!(config.snapshot_interval_seconds, 60);
    }

    #[test]
    fn secret_is_required() {
        assert!(matches!(
            config_from(&[]),
            Err(EngineError::Config { ref var, .. }) if var == "NULLIFIER_SECRET"
        ));
        assert!(config_from(&[("NULLIFIER_SECRET", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("NULLIFIER_SECRET", "pepper"),
            ("LIVE_BUCKET_WIDTH", "15m"),
            ("LIVE_WINDOW_BUCKETS", "8"),
            ("LIVE_COHORT_DIMENSION", "cohort_year"),
        ])
        .unwrap();
        assert_eq!(config.live.bucket_width, Duration::minutes(15));
        assert_eq!(config.live.window_buckets, 8);
        assert_eq!(config.live.cohort_dimension, CohortDimension::CohortYear);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config_from(&[("NULLIFIER_SECRET", "p"), ("LIVE_BUCKET_WIDTH", "hourly")]).unwrap_err();
        assert!(err.to_string().contains("LIVE_BUCKET_WIDTH"));

        let err = config_from(&[("NULLIFIER_SECRET", "p"), ("LIVE_WINDOW_BUCKETS", "many")]).unwrap_err();
        assert!(err.to_string().contains("LIVE_WINDOW_BUCKETS"));
    }

    #[test]
    fn window_bucket_count_is_bounded() {
        let max = MAX_WINDOW_BUCKETS.to_string();
        let config = config_from(&[("NULLIFIER_SECRET", "p"), ("LIVE_WINDOW_BUCKETS", &max)]).unwrap();
        assert_eq!(config.live.window_buckets, MAX_WINDOW_BUCKETS);

        let over = (MAX_WINDOW_BUCKETS + 1).to_string();
        let err = config_from(&[("NULLIFIER_SECRET", "p"), ("LIVE_WINDOW_BUCKETS", &over)]).unwrap_err();
        assert!(err.to_string().contains("LIVE_WINDOW_BUCKETS"));

        let err = config_from(&[("NULLIFIER_SECRET", "p"), ("LIVE_WINDOW_BUCKETS", "0")]).unwrap_err();
        assert!(err.to_string().contains("LIVE_WINDOW_BUCKETS"));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("90s"), Some(Duration::seconds(90)));
        assert_eq!(parse_duration("2d"), Some(Duration::days(2)));
        assert_eq!(parse_duration("0h"), None);
        assert_eq!(parse_duration("1w"), None);
    }
}
