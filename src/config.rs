use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::DEFAULT_SESSION_RETENTION_MS;
use crate::model::Ms;
use crate::property::PropertySettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Daemon settings, read from `ROOMOPS_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub property: String,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub session_retention_ms: Ms,
    pub poll_interval: Duration,
    /// JSON activity catalog; the built-in one when unset.
    pub catalog_path: Option<PathBuf>,
}

fn parse<T>(var: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        })
    })
    .transpose()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = lookup("ROOMOPS_DATA_DIR").unwrap_or_else(|| "./data".into());
        let property = lookup("ROOMOPS_PROPERTY").unwrap_or_else(|| "default".into());
        let metrics_port = parse("ROOMOPS_METRICS_PORT", lookup("ROOMOPS_METRICS_PORT"))?;
        let compact_threshold =
            parse("ROOMOPS_COMPACT_THRESHOLD", lookup("ROOMOPS_COMPACT_THRESHOLD"))?.unwrap_or(1000);
        let session_retention_ms: Ms = parse(
            "ROOMOPS_SESSION_RETENTION_MS",
            lookup("ROOMOPS_SESSION_RETENTION_MS"),
        )?
        .unwrap_or(DEFAULT_SESSION_RETENTION_MS);
        if session_retention_ms < 0 {
            return Err(ConfigError::Invalid {
                var: "ROOMOPS_SESSION_RETENTION_MS",
                value: session_retention_ms.to_string(),
                reason: "must not be negative".into(),
            });
        }
        let poll_secs: u64 =
            parse("ROOMOPS_POLL_INTERVAL_SECS", lookup("ROOMOPS_POLL_INTERVAL_SECS"))?.unwrap_or(15);
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "ROOMOPS_POLL_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            property,
            metrics_port,
            compact_threshold,
            session_retention_ms,
            poll_interval: Duration::from_secs(poll_secs),
            catalog_path: lookup("ROOMOPS_CATALOG").map(PathBuf::from),
        })
    }

    pub fn property_settings(&self) -> PropertySettings {
        PropertySettings {
            compact_threshold: self.compact_threshold,
            session_retention_ms: self.session_retention_ms,
            poll_interval: self.poll_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| vars.get(k).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.property, "default");
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.session_retention_ms, DEFAULT_SESSION_RETENTION_MS);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert!(config.catalog_path.is_none());
        assert_eq!(config.property_settings(), PropertySettings::default());
    }

    #[test]
    fn overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ROOMOPS_DATA_DIR", "/var/lib/roomops"),
            ("ROOMOPS_PROPERTY", "seaside"),
            ("ROOMOPS_METRICS_PORT", "9100"),
            ("ROOMOPS_COMPACT_THRESHOLD", " 50 "),
            ("ROOMOPS_POLL_INTERVAL_SECS", "5"),
            ("ROOMOPS_CATALOG", "/etc/roomops/catalog.json"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/roomops"));
        assert_eq!(config.property, "seaside");
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/roomops/catalog.json"))
        );
    }

    #[test]
    fn malformed_values_rejected() {
        let err = Config::from_lookup(lookup(&[("ROOMOPS_METRICS_PORT", "ninety")])).unwrap_err();
        assert!(err.to_string().contains("ROOMOPS_METRICS_PORT"));

        assert!(Config::from_lookup(lookup(&[("ROOMOPS_POLL_INTERVAL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("ROOMOPS_SESSION_RETENTION_MS", "-1")])).is_err());
    }
}
