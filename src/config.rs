//! Runtime configuration.
//!
//! Read once at startup, from the process environment or a JSON file.

use std::path::Path;
use std::str::FromStr;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::{GpiError, GpiResult};

/// Layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpiConfig {
    /// Minimum log level (`error`, `warn`, `info`, `debug`, `trace` or `off`).
    pub log_level: String,
    /// Seconds to stall at startup so a debugger can attach. Zero disables.
    pub attach_wait_secs: u64,
    /// Idle timed callbacks kept for reuse.
    pub timer_cache_capacity: usize,
    /// Buffered lifecycle events per subscriber.
    pub event_capacity: usize,
    /// Extra user entry points, recorded for the embedding.
    pub extra_entry_points: Vec<String>,
}

impl Default for GpiConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            attach_wait_secs: 0,
            timer_cache_capacity: 256,
            event_capacity: 64,
            extra_entry_points: Vec::new(),
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> GpiResult<T> {
    raw.trim().parse().map_err(|_| GpiError::Config {
        message: format!("{key}={raw} is not a valid number"),
    })
}

impl GpiConfig {
    /// Reads `GPI_LOG_LEVEL`, `GPI_ATTACH`, `GPI_TIMER_CACHE`,
    /// `GPI_EVENT_CAPACITY` and `GPI_EXTRA` over the defaults.
    ///
    /// # Errors
    /// `Config` if a numeric variable does not parse.
    pub fn from_env() -> GpiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GpiConfig::from_env`], with an arbitrary variable source.
    ///
    /// # Errors
    /// `Config` if a numeric variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GpiResult<Self> {
        let mut config = Self::default();
        if let Some(level) = lookup("GPI_LOG_LEVEL") {
            config.log_level = level.trim().to_ascii_lowercase();
        }
        if let Some(raw) = lookup("GPI_ATTACH") {
            config.attach_wait_secs = parse_number("GPI_ATTACH", &raw)?;
        }
        if let Some(raw) = lookup("GPI_TIMER_CACHE") {
            config.timer_cache_capacity = parse_number("GPI_TIMER_CACHE", &raw)?;
        }
        if let Some(raw) = lookup("GPI_EVENT_CAPACITY") {
            config.event_capacity = parse_number("GPI_EVENT_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("GPI_EXTRA") {
            config.extra_entry_points = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        config.level_filter()?;
        Ok(config)
    }

    /// Loads a JSON document; missing fields keep their defaults.
    ///
    /// # Errors
    /// `Config` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> GpiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GpiError::Config {
            message: format!("read {}: {e}", path.display()),
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| GpiError::Config {
            message: format!("parse {}: {e}", path.display()),
        })?;
        config.level_filter()?;
        Ok(config)
    }

    /// The configured level as a `log` filter.
    ///
    /// # Errors
    /// `Config` if the level name is not recognized.
    pub fn level_filter(&self) -> GpiResult<LevelFilter> {
        LevelFilter::from_str(&self.log_level).map_err(|_| GpiError::Config {
            message: format!("unknown log level '{}'", self.log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("GPI_LOG_LEVEL", "DEBUG"),
            ("GPI_TIMER_CACHE", "8"),
            ("GPI_EXTRA", "tb.setup, tb.extra ,"),
        ]
        .into_iter()
        .collect();
        let config = GpiConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Debug);
        assert_eq!(config.timer_cache_capacity, 8);
        assert_eq!(config.event_capacity, 64);
        assert_eq!(config.extra_entry_points, vec!["tb.setup", "tb.extra"]);
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = GpiConfig::from_lookup(|k| (k == "GPI_ATTACH").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, GpiError::Config { .. }));
    }

    #[test]
    fn test_json_file_keeps_missing_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"log_level": "warn", "timer_cache_capacity": 4}}"#).unwrap();
        let config = GpiConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.level_filter().unwrap(), LevelFilter::Warn);
        assert_eq!(config.timer_cache_capacity, 4);
        assert_eq!(config.attach_wait_secs, 0);
    }

    #[test]
    fn test_unknown_level_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"log_level": "loud"}}"#).unwrap();
        assert!(GpiConfig::from_json_file(file.path()).is_err());
    }
}
