//! TOML configuration for a dashboard session.
//!
//! Every section is optional and falls back to compiled-in defaults. The
//! file is located via `--config`, then `SURVEIL_CONFIG`, then
//! `./surveil.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SURVEIL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "surveil.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DashboardConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded dashboard configuration");
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the environment
    /// and local fallbacks are skipped with a warning when broken.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(env_path);
            match Self::load(&path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "SURVEIL_CONFIG set but file could not be loaded, trying fallback"
                ),
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => warn!(
                    path = %local.display(),
                    error = %e,
                    "local config file exists but could not be loaded, using defaults"
                ),
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }

    /// Reject values the session timers and log buffer cannot run with.
    pub fn validate(&self) -> Result<()> {
        let events = &self.events;
        if events.sweep_interval_ms == 0 {
            bail!("events.sweep_interval_ms must be greater than zero");
        }
        if events.flush_interval_ms == 0 {
            bail!("events.flush_interval_ms must be greater than zero");
        }
        if events.threat_window_ms == 0 {
            bail!("events.threat_window_ms must be greater than zero");
        }
        if events.max_log_events == 0 {
            bail!("events.max_log_events must be greater than zero");
        }
        if self.snapshots.poll_interval_ms == 0 {
            bail!("snapshots.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Event stream URL derived from the server base URL.
    pub fn ws_url(&self) -> String {
        let base = self.server.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", base, self.stream.path)
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Where the detection backend lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL for `/cameras`, `/snapshot/<id>` and the event stream.
    pub base_url: String,
    /// Timeout for roster and snapshot requests (milliseconds).
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Path of the event WebSocket on the server.
    pub path: String,
    /// Fixed wait before each reconnect attempt (milliseconds).
    pub reconnect_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            path: "/ws/events".to_string(),
            reconnect_delay_ms: 2_000,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Aggregation window and history pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub threat_window_ms: u64,
    pub sweep_interval_ms: u64,
    pub flush_interval_ms: u64,
    pub max_log_events: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            threat_window_ms: 10_000,
            sweep_interval_ms: 2_000,
            flush_interval_ms: 1_000,
            max_log_events: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Whether tiles are mounted for roster cameras.
    pub enabled: bool,
    /// Delay between successful polls of one tile (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 66,
        }
    }
}

impl SnapshotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

/// Read-only snapshot API for a presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8090".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = DashboardConfig::default();

        assert_eq!(cfg.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(cfg.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.stream.path, "/ws/events");
        assert_eq!(cfg.stream.reconnect_delay(), Duration::from_secs(2));
        assert_eq!(cfg.events.threat_window_ms, 10_000);
        assert_eq!(cfg.events.sweep_interval_ms, 2_000);
        assert_eq!(cfg.events.flush_interval_ms, 1_000);
        assert_eq!(cfg.events.max_log_events, 500);
        assert!(cfg.snapshots.enabled);
        assert_eq!(cfg.snapshots.poll_interval(), Duration::from_millis(66));
        assert!(!cfg.api.enabled);
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
base_url = "https://ops.example.net/"
request_timeout_ms = 2500

[stream]
reconnect_delay_ms = 500

[events]
threat_window_ms = 30000
max_log_events = 100

[snapshots]
enabled = false

[api]
enabled = true
bind = "0.0.0.0:9000"

[logging]
level = "debug"
json = true
"#;

        let cfg: DashboardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.request_timeout_ms, 2_500);
        assert_eq!(cfg.stream.reconnect_delay_ms, 500);
        assert_eq!(cfg.stream.path, "/ws/events");
        assert_eq!(cfg.events.threat_window_ms, 30_000);
        assert_eq!(cfg.events.max_log_events, 100);
        assert_eq!(cfg.events.flush_interval_ms, 1_000);
        assert!(!cfg.snapshots.enabled);
        assert!(cfg.api.enabled);
        assert_eq!(cfg.api.bind, "0.0.0.0:9000");
        assert!(cfg.logging.json);
        assert_eq!(cfg.ws_url(), "wss://ops.example.net/ws/events");
    }

    #[test]
    fn test_ws_url_from_plain_http() {
        let cfg = DashboardConfig::default();
        assert_eq!(cfg.ws_url(), "ws://127.0.0.1:8000/ws/events");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: DashboardConfig = toml::from_str("").unwrap();
        let defaults = DashboardConfig::default();
        assert_eq!(cfg.server.base_url, defaults.server.base_url);
        assert_eq!(cfg.events.max_log_events, defaults.events.max_log_events);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("surveil.toml");
        std::fs::write(
            &path,
            r#"
[server]
base_url = "http://10.1.2.3:8000"
"#,
        )
        .unwrap();

        let cfg = DashboardConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.server.base_url, "http://10.1.2.3:8000");
    }

    #[test]
    fn test_explicit_missing_file_errors() {
        let result = DashboardConfig::resolve(Some(Path::new("/nonexistent/surveil.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        for section in [
            "[events]\nsweep_interval_ms = 0\n",
            "[events]\nflush_interval_ms = 0\n",
            "[snapshots]\npoll_interval_ms = 0\n",
        ] {
            let path = dir.path().join("surveil.toml");
            std::fs::write(&path, section).unwrap();
            let err = DashboardConfig::load(&path).unwrap_err();
            assert!(
                format!("{:#}", err).contains("must be greater than zero"),
                "unexpected error: {:#}",
                err
            );
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(DashboardConfig::default().validate().is_ok());
    }
}
