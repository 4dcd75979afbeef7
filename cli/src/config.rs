//! Environment-driven configuration. `.env` is loaded before this runs;
//! every knob has a deployment-sensible default so a bare environment
//! still starts against localhost.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use tally_sync::SyncConfig;
use tally_upstream::UpstreamConfig;
use tally_warehouse::WarehouseConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub upstream: UpstreamConfig,
    pub sync: SyncConfig,
    pub log_level: String,
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let warehouse = WarehouseConfig {
            host: env_or("DB_HOST", "localhost"),
            port: env_parse("DB_PORT", 3306)?,
            username: env_or("DB_USERNAME", "root"),
            password: env_or("DB_PASSWORD", ""),
            database: env_or("DB_NAME", "tally_cdc"),
            pool_size: env_parse("DB_POOL_SIZE", 10)?,
        };

        let upstream = UpstreamConfig {
            host: env_or("TALLY_HOST", "localhost"),
            port: env_parse("TALLY_PORT", 9000)?,
            connect_timeout: Duration::from_secs(env_parse("TALLY_CONNECT_TIMEOUT", 60)?),
            read_timeout: Duration::from_secs(env_parse("TALLY_READ_TIMEOUT", 1800)?),
            max_retries: env_parse("TALLY_MAX_RETRIES", 3)?,
            templates_dir: PathBuf::from(env_or("TEMPLATES_DIR", "templates")),
        };

        let fallback_from = env_or("SYNC_FALLBACK_FROM", "20240401");
        let fallback_from = NaiveDate::parse_from_str(&fallback_from, "%Y%m%d")
            .with_context(|| format!("SYNC_FALLBACK_FROM is not YYYYMMDD: {fallback_from}"))?;
        let sync = SyncConfig {
            chunk_months: env_parse("SNAPSHOT_CHUNK_MONTHS", 3)?,
            voucher_workers: env_parse("VOUCHER_WORKERS", 8)?,
            fallback_from,
        };

        Ok(Self {
            warehouse,
            upstream,
            sync,
            log_level: env_or("LOG_LEVEL", "info"),
            log_dir: PathBuf::from(env_or("LOG_DIR", "logs")),
        })
    }

    /// Per-tenant upstream overrides, honored at orchestrator entry.
    #[must_use]
    pub fn upstream_for(
        &self,
        tally_host: Option<&str>,
        tally_port: Option<u16>,
    ) -> UpstreamConfig {
        let mut config = self.upstream.clone();
        if let Some(host) = tally_host {
            config.host = host.to_string();
        }
        if let Some(port) = tally_port {
            config.port = port;
        }
        config
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {key}={value}: {err}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn overrides_replace_host_and_port() {
        let config = AppConfig {
            warehouse: WarehouseConfig::default(),
            upstream: UpstreamConfig::default(),
            sync: SyncConfig::default(),
            log_level: "info".into(),
            log_dir: PathBuf::from("logs"),
        };
        let upstream = config.upstream_for(Some("10.0.0.5"), Some(9999));
        assert_eq!(upstream.host, "10.0.0.5");
        assert_eq!(upstream.port, 9999);

        let unchanged = config.upstream_for(None, None);
        assert_eq!(unchanged.host, config.upstream.host);
        assert_eq!(unchanged.port, config.upstream.port);
    }
}
