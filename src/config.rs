use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::constants::DEFAULT_PORT;
use crate::quota::{LimitTable, LimitsError, parse_utc_offset};

/// CORS configuration mode
#[derive(Debug, Clone, PartialEq)]
pub enum CorsMode {
    /// Only allow localhost origins (default, for local development)
    LocalhostOnly,
    /// Allow all origins
    AllowAll,
    /// Allow specific origins (comma-separated list)
    AllowList(Vec<String>),
}

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Explicit limits file; `None` means look in the config dir, then fall back to built-ins
    pub limits_file: Option<PathBuf>,
    /// Offset from UTC at which the quota day rolls over
    pub reset_offset: FixedOffset,
    /// Days a record may sit untouched before the sweep evicts it
    pub retention_days: u64,
    /// Seconds between retention sweeps; 0 disables the sweep
    pub sweep_interval_secs: u64,
    /// Take the client address from x-forwarded-for instead of the socket peer
    pub trust_forwarded_for: bool,
    pub cors_mode: CorsMode,
}

impl Config {
    pub fn from_env() -> Result<Self, LimitsError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, LimitsError> {
        let host = var("QUOTA_GATE_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or("QUOTA_GATE_PORT", var("QUOTA_GATE_PORT"), DEFAULT_PORT)?;

        let limits_file = var("QUOTA_GATE_LIMITS_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let reset_offset = match var("QUOTA_GATE_RESET_UTC_OFFSET") {
            Some(value) => parse_utc_offset(&value).ok_or(LimitsError::InvalidSetting {
                var: "QUOTA_GATE_RESET_UTC_OFFSET",
                value,
            })?,
            None => Utc.fix(),
        };

        let retention_days = parse_or(
            "QUOTA_GATE_RETENTION_DAYS",
            var("QUOTA_GATE_RETENTION_DAYS"),
            7,
        )?;
        let sweep_interval_secs = parse_or(
            "QUOTA_GATE_SWEEP_INTERVAL_SECS",
            var("QUOTA_GATE_SWEEP_INTERVAL_SECS"),
            3600,
        )?;

        let trust_forwarded_for = var("QUOTA_GATE_TRUST_FORWARDED_FOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        // CORS configuration: "localhost" (default), "*" (allow all), or comma-separated origins
        let cors_mode = match var("QUOTA_GATE_CORS_ORIGINS").as_deref() {
            Some("*") => CorsMode::AllowAll,
            Some(origins) if !origins.trim().is_empty() && origins != "localhost" => {
                CorsMode::AllowList(origins.split(',').map(|s| s.trim().to_string()).collect())
            }
            _ => CorsMode::LocalhostOnly,
        };

        Ok(Self {
            host,
            port,
            limits_file,
            reset_offset,
            retention_days,
            sweep_interval_secs,
            trust_forwarded_for,
            cors_mode,
        })
    }

    /// Load the limit table: the explicit file if configured, otherwise
    /// `<config_dir>/quota-gate/limits.json` when present, otherwise the
    /// built-in table.
    pub fn load_limits(&self) -> Result<LimitTable, LimitsError> {
        if let Some(path) = &self.limits_file {
            return LimitTable::load(path);
        }
        match default_limits_path() {
            Some(path) if path.exists() => LimitTable::load(&path),
            _ => Ok(LimitTable::default()),
        }
    }
}

fn default_limits_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quota-gate").join("limits.json"))
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, LimitsError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| LimitsError::InvalidSetting {
            var: name,
            value: v,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, LimitsError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.limits_file.is_none());
        assert_eq!(config.reset_offset.local_minus_utc(), 0);
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.sweep_interval_secs, 3600);
        assert!(!config.trust_forwarded_for);
        assert_eq!(config.cors_mode, CorsMode::LocalhostOnly);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("QUOTA_GATE_HOST", "0.0.0.0"),
            ("QUOTA_GATE_PORT", "8080"),
            ("QUOTA_GATE_LIMITS_FILE", "/etc/quota/limits.json"),
            ("QUOTA_GATE_RESET_UTC_OFFSET", "+05:30"),
            ("QUOTA_GATE_RETENTION_DAYS", "2"),
            ("QUOTA_GATE_SWEEP_INTERVAL_SECS", "0"),
            ("QUOTA_GATE_TRUST_FORWARDED_FOR", "TRUE"),
            ("QUOTA_GATE_CORS_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.limits_file,
            Some(PathBuf::from("/etc/quota/limits.json"))
        );
        assert_eq!(config.reset_offset.local_minus_utc(), 19800);
        assert_eq!(config.retention_days, 2);
        assert_eq!(config.sweep_interval_secs, 0);
        assert!(config.trust_forwarded_for);
        assert_eq!(
            config.cors_mode,
            CorsMode::AllowList(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }

    #[test]
    fn test_cors_allow_all() {
        let config = config_from(&[("QUOTA_GATE_CORS_ORIGINS", "*")]).unwrap();
        assert_eq!(config.cors_mode, CorsMode::AllowAll);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("QUOTA_GATE_PORT", "http")]),
            Err(LimitsError::InvalidSetting { var: "QUOTA_GATE_PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("QUOTA_GATE_RESET_UTC_OFFSET", "noon")]),
            Err(LimitsError::InvalidSetting { .. })
        ));
        assert!(matches!(
            config_from(&[("QUOTA_GATE_RETENTION_DAYS", "-1")]),
            Err(LimitsError::InvalidSetting { .. })
        ));
    }

    #[test]
    fn test_missing_limits_file_is_an_error() {
        let config =
            config_from(&[("QUOTA_GATE_LIMITS_FILE", "/nonexistent/quota-gate/limits.json")])
                .unwrap();
        assert!(matches!(
            config.load_limits(),
            Err(LimitsError::Io { .. })
        ));
    }
}
