//! Runtime configuration: CLI flags plus validation.
//!
//! The CLI surface itself is out of scope for this specification; this
//! module only validates the recognized options (spec §6) the way the
//! teacher's `Cli` struct in `main.rs` feeds `DbConfig`.

use std::time::Duration;

use clap::Parser;

use crate::error::ProxyError;

#[derive(Parser, Debug, Clone)]
#[command(name = "subsoxy")]
#[command(about = "Transparent reverse proxy that learns per-user listening habits")]
pub struct Cli {
    /// Port the proxy listens on.
    #[arg(long, default_value_t = 8080)]
    pub proxy_port: u16,

    /// Upstream Subsonic-compatible server, e.g. http://localhost:4040
    #[arg(long)]
    pub upstream_url: String,

    /// Log level: debug, info, warn, error.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// SQLite database file path.
    #[arg(long, default_value = "subsoxy.db")]
    pub db_path: String,

    /// Requests per second permitted by the rate limiter.
    #[arg(long, default_value_t = 10)]
    pub rate_limit_rps: u32,

    /// Token bucket burst size.
    #[arg(long, default_value_t = 20)]
    pub rate_limit_burst: u32,

    /// Enable the rate limiter.
    #[arg(long, default_value_t = true)]
    pub rate_limit_enabled: bool,

    /// Maximum open database connections.
    #[arg(long, default_value_t = 10)]
    pub max_open_conns: u32,

    /// Maximum idle database connections.
    #[arg(long, default_value_t = 5)]
    pub max_idle_conns: u32,

    /// Connection max lifetime, in seconds.
    #[arg(long, default_value_t = 3600)]
    pub conn_max_lifetime_secs: u64,

    /// Connection max idle time, in seconds.
    #[arg(long, default_value_t = 600)]
    pub conn_max_idle_time_secs: u64,

    /// Enable periodic pool health checks.
    #[arg(long, default_value_t = true)]
    pub health_check: bool,

    /// Background sync interval, in seconds.
    #[arg(long, default_value_t = 3600)]
    pub sync_interval_secs: u64,
}

/// Validated configuration derived from `Cli`.
#[derive(Debug, Clone)]
pub struct Config {
    pub proxy_port: u16,
    pub upstream_url: url::Url,
    pub log_level: LogLevel,
    pub db_path: String,
    pub rate_limit: RateLimitConfig,
    pub pool: PoolConfig,
    pub sync_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub rps: u32,
    pub burst: u32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_open: u32,
    pub max_idle: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
    pub health_check: bool,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ProxyError> {
        if cli.proxy_port == 0 {
            return Err(ProxyError::config(
                "invalid_port",
                "proxy_port must be in 1..65535",
            )
            .with_context("proxy_port", cli.proxy_port.to_string()));
        }

        let upstream_url = url::Url::parse(&cli.upstream_url).map_err(|e| {
            ProxyError::config(
                "invalid_url",
                format!("upstream_url must be a valid http/https URL: {e}"),
            )
            .with_context("upstream_url", cli.upstream_url.clone())
        })?;
        if !matches!(upstream_url.scheme(), "http" | "https") || upstream_url.host().is_none() {
            return Err(ProxyError::config(
                "invalid_url",
                "upstream_url must use http/https and include a host",
            )
            .with_context("upstream_url", cli.upstream_url.clone()));
        }

        let log_level = match cli.log_level.to_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            other => {
                return Err(ProxyError::config(
                    "invalid_log_level",
                    format!("log_level must be one of debug/info/warn/error, got '{other}'"),
                ));
            }
        };

        if cli.db_path.trim().is_empty() {
            return Err(ProxyError::config("invalid_db_path", "db_path must not be empty"));
        }

        if cli.rate_limit_rps < 1 {
            return Err(ProxyError::config(
                "invalid_rate_limit",
                "rate_limit_rps must be >= 1",
            )
            .with_context("rate_limit_rps", cli.rate_limit_rps.to_string()));
        }
        if cli.rate_limit_burst < cli.rate_limit_rps {
            return Err(ProxyError::config(
                "invalid_rate_limit",
                "rate_limit_burst must be >= rate_limit_rps",
            )
            .with_context("rate_limit_burst", cli.rate_limit_burst.to_string()));
        }

        if cli.max_open_conns < 1 {
            return Err(ProxyError::config(
                "invalid_pool_config",
                "max_open_conns must be >= 1",
            ));
        }
        if cli.max_idle_conns > cli.max_open_conns {
            return Err(ProxyError::config(
                "invalid_pool_config",
                "max_idle_conns must be <= max_open_conns",
            )
            .with_context("max_idle_conns", cli.max_idle_conns.to_string())
            .with_context("max_open_conns", cli.max_open_conns.to_string()));
        }

        Ok(Config {
            proxy_port: cli.proxy_port,
            upstream_url,
            log_level,
            db_path: cli.db_path,
            rate_limit: RateLimitConfig {
                rps: cli.rate_limit_rps,
                burst: cli.rate_limit_burst,
                enabled: cli.rate_limit_enabled,
            },
            pool: PoolConfig {
                max_open: cli.max_open_conns,
                max_idle: cli.max_idle_conns,
                max_lifetime: Duration::from_secs(cli.conn_max_lifetime_secs),
                max_idle_time: Duration::from_secs(cli.conn_max_idle_time_secs),
                health_check: cli.health_check,
            },
            sync_interval: Duration::from_secs(cli.sync_interval_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            proxy_port: 8080,
            upstream_url: "http://localhost:4040".into(),
            log_level: "info".into(),
            db_path: "test.db".into(),
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            rate_limit_enabled: true,
            max_open_conns: 10,
            max_idle_conns: 5,
            conn_max_lifetime_secs: 3600,
            conn_max_idle_time_secs: 600,
            health_check: true,
            sync_interval_secs: 3600,
        }
    }

    #[test]
    fn valid_config_parses() {
        assert!(Config::from_cli(base_cli()).is_ok());
    }

    #[test]
    fn rejects_bad_scheme() {
        let mut cli = base_cli();
        cli.upstream_url = "ftp://localhost".into();
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn rejects_burst_below_rps() {
        let mut cli = base_cli();
        cli.rate_limit_burst = 1;
        cli.rate_limit_rps = 5;
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn rejects_idle_above_open() {
        let mut cli = base_cli();
        cli.max_idle_conns = 20;
        cli.max_open_conns = 10;
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut cli = base_cli();
        cli.log_level = "verbose".into();
        assert!(Config::from_cli(cli).is_err());
    }
}
