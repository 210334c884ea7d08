// crates/server/src/config.rs
//! Command-line / environment configuration and the runtime settings
//! derived from it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use taskforge_core::RetryPolicy;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 47900;

/// Default generation endpoint when none is configured.
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:8700/generate";

#[derive(Debug, Clone, Parser)]
#[command(name = "taskforge", version, about = "Durable long-running generation tasks")]
pub struct ServerConfig {
    /// Address to bind.
    #[arg(long, env = "TASKFORGE_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port to listen on (falls back to `PORT`, then 47900).
    #[arg(long, env = "TASKFORGE_PORT")]
    pub port: Option<u16>,

    /// SQLite database file. Defaults to `<data dir>/taskforge/taskforge.db`.
    #[arg(long, env = "TASKFORGE_DB")]
    pub db: Option<PathBuf>,

    /// Endpoint the HTTP generation engine POSTs items to.
    #[arg(long, env = "TASKFORGE_ENGINE_URL", default_value = DEFAULT_ENGINE_URL)]
    pub engine_url: String,

    #[arg(long, env = "TASKFORGE_ENGINE_TIMEOUT_SECS", default_value_t = 120)]
    pub engine_timeout_secs: u64,

    /// A running task with no heartbeat for this long is reaped as stalled.
    #[arg(long, env = "TASKFORGE_STALE_AFTER_SECS", default_value_t = 1800)]
    pub stale_after_secs: u64,

    /// A live task no executor has touched for this long is taken over by
    /// the next request for its queue. Never shorter than one engine call
    /// plus the longest retry backoff.
    #[arg(long, env = "TASKFORGE_RESUME_AFTER_SECS", default_value_t = 180)]
    pub resume_after_secs: u64,

    /// Interval of the background stale-task sweep.
    #[arg(long, env = "TASKFORGE_SWEEP_SECS", default_value_t = 300)]
    pub sweep_secs: u64,

    /// Monitor store poll interval.
    #[arg(long, env = "TASKFORGE_POLL_INTERVAL_MS", default_value_t = 1200)]
    pub poll_interval_ms: u64,

    /// Monitor transport heartbeat interval.
    #[arg(long, env = "TASKFORGE_HEARTBEAT_SECS", default_value_t = 5)]
    pub heartbeat_secs: u64,

    /// Attempts per item, including the first.
    #[arg(long, env = "TASKFORGE_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    #[arg(long, env = "TASKFORGE_RETRY_BASE_MS", default_value_t = 1000)]
    pub retry_base_ms: u64,

    #[arg(long, env = "TASKFORGE_RETRY_MAX_MS", default_value_t = 30_000)]
    pub retry_max_ms: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "TASKFORGE_LOG_JSON")]
    pub log_json: bool,
}

impl ServerConfig {
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port())
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            executor: ExecutorSettings {
                retry: RetryPolicy::new(
                    self.retry_attempts,
                    Duration::from_millis(self.retry_base_ms),
                    Duration::from_millis(self.retry_max_ms),
                ),
            },
            monitor: MonitorSettings {
                poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
                heartbeat_interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            },
            reaper: ReaperSettings {
                stale_after: Duration::from_secs(self.stale_after_secs),
                resume_after: Duration::from_secs(self.resume_after_secs)
                    .max(self.engine_timeout() + Duration::from_millis(self.retry_max_ms)),
                sweep_interval: Duration::from_secs(self.sweep_secs.max(1)),
            },
        }
    }
}

/// Everything the running components need, independent of how it was parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub executor: ExecutorSettings,
    pub monitor: MonitorSettings,
    pub reaper: ReaperSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1200),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperSettings {
    /// Quiet period after which a live task is failed as stalled.
    pub stale_after: Duration,
    /// Quiet period after which a live task without a local executor may be
    /// resumed. Shorter than `stale_after`.
    pub resume_after: Duration,
    pub sweep_interval: Duration,
}

impl Default for ReaperSettings {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30 * 60),
            resume_after: Duration::from_secs(3 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = ServerConfig::try_parse_from(["taskforge"]).unwrap();
        assert_eq!(config.engine_url, DEFAULT_ENGINE_URL);
        assert!(!config.log_json);
        assert_eq!(config.settings(), RuntimeSettings::default());
    }

    #[test]
    fn test_flags_override_settings() {
        let config = ServerConfig::try_parse_from([
            "taskforge",
            "--port",
            "9001",
            "--retry-attempts",
            "0",
            "--retry-base-ms",
            "10",
            "--poll-interval-ms",
            "250",
            "--stale-after-secs",
            "60",
        ])
        .unwrap();

        assert_eq!(config.port(), 9001);
        let settings = config.settings();
        // never below one attempt
        assert_eq!(settings.executor.retry.max_attempts, 1);
        assert_eq!(settings.executor.retry.base_delay, Duration::from_millis(10));
        assert_eq!(settings.monitor.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.reaper.stale_after, Duration::from_secs(60));
    }

    #[test]
    fn test_resume_window_outlasts_one_attempt() {
        let config = ServerConfig::try_parse_from([
            "taskforge",
            "--resume-after-secs",
            "10",
            "--engine-timeout-secs",
            "90",
            "--retry-max-ms",
            "5000",
        ])
        .unwrap();
        assert_eq!(config.settings().reaper.resume_after, Duration::from_secs(95));
    }
}
