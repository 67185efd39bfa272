//! Process-wide settings read once from the environment.

use std::env;

fn as_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn as_int(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn as_float(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

fn as_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
    pub color_enabled: bool,
}

impl LoggingSettings {
    fn from_env() -> Self {
        Self {
            level: as_string("LOG_LEVEL", "INFO"),
            format: as_string("LOG_FORMAT", "text"),
            color_enabled: as_bool("LOG_COLOR_ENABLED", true),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub default_interval: String,
    pub max_failure_backoff_seconds: f64,
    pub rpc_request_timeout_seconds: f64,
    pub warm_poll_enabled: bool,
    pub warm_poll_timeout_seconds: f64,
}

impl PollerSettings {
    fn from_env() -> Self {
        Self {
            default_interval: as_string("POLL_DEFAULT_INTERVAL", "5m"),
            max_failure_backoff_seconds: as_float("MAX_FAILURE_BACKOFF_SECONDS", 900.0),
            rpc_request_timeout_seconds: as_float("RPC_REQUEST_TIMEOUT_SECONDS", 10.0),
            warm_poll_enabled: as_bool("WARM_POLL_ENABLED", false),
            warm_poll_timeout_seconds: as_float("WARM_POLL_TIMEOUT_SECONDS", 30.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub readiness_stale_threshold_seconds: f64,
}

impl HealthSettings {
    fn from_env() -> Self {
        Self {
            readiness_stale_threshold_seconds: as_float("READINESS_STALE_THRESHOLD_SECONDS", 300.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub health_port: u16,
    pub metrics_port: u16,
}

impl ServerSettings {
    fn from_env() -> Self {
        Self {
            health_port: as_int("HEALTH_PORT", 8080) as u16,
            metrics_port: as_int("METRICS_PORT", 9100) as u16,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigSettings {
    pub config_path_env: String,
    pub default_config_filename: String,
}

impl ConfigSettings {
    fn from_env() -> Self {
        Self {
            config_path_env: as_string("BLOCKCHAIN_EXPORTER_CONFIG_PATH", ""),
            default_config_filename: "config.toml".to_string(),
        }
    }

    /// Resolve the effective config path: explicit env var (joined with the
    /// default filename if it names a directory), else `./config.toml`.
    pub fn resolve_config_path(&self) -> std::path::PathBuf {
        if self.config_path_env.trim().is_empty() {
            return std::path::PathBuf::from("config.toml");
        }
        let candidate = std::path::PathBuf::from(&self.config_path_env);
        if candidate.is_dir() {
            candidate.join(&self.default_config_filename)
        } else {
            candidate
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub logging: LoggingSettings,
    pub poller: PollerSettings,
    pub health: HealthSettings,
    pub server: ServerSettings,
    pub config: ConfigSettings,
}

impl AppSettings {
    /// Load a `.env` file (if present) then read settings from the process
    /// environment. Safe to call more than once; later calls simply re-read.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            logging: LoggingSettings::from_env(),
            poller: PollerSettings::from_env(),
            health: HealthSettings::from_env(),
            server: ServerSettings::from_env(),
            config: ConfigSettings::from_env(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: "INFO".to_string(),
                format: "text".to_string(),
                color_enabled: true,
            },
            poller: PollerSettings {
                default_interval: "5m".to_string(),
                max_failure_backoff_seconds: 900.0,
                rpc_request_timeout_seconds: 10.0,
                warm_poll_enabled: false,
                warm_poll_timeout_seconds: 30.0,
            },
            health: HealthSettings {
                readiness_stale_threshold_seconds: 300.0,
            },
            server: ServerSettings {
                health_port: 8080,
                metrics_port: 9100,
            },
            config: ConfigSettings {
                config_path_env: String::new(),
                default_config_filename: "config.toml".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_recognizes_common_spellings() {
        std::env::set_var("TEST_BOOL_FLAG_A", "Yes");
        assert!(as_bool("TEST_BOOL_FLAG_A", false));
        std::env::set_var("TEST_BOOL_FLAG_A", "off");
        assert!(!as_bool("TEST_BOOL_FLAG_A", true));
        std::env::remove_var("TEST_BOOL_FLAG_A");
    }

    #[test]
    fn resolve_config_path_defaults_to_cwd_file() {
        let settings = ConfigSettings {
            config_path_env: String::new(),
            default_config_filename: "config.toml".to_string(),
        };
        assert_eq!(settings.resolve_config_path(), std::path::PathBuf::from("config.toml"));
    }
}
