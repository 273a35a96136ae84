use std::env;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub session_server: SessionServerConfig,
    pub polling: PollingConfig,
    pub recovery: RecoveryConfig,
    pub governor: GovernorConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub origins: Vec<String>,
    pub methods: Vec<String>,
    pub credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Empty means "run on the in-memory repository" (no durable storage).
    pub connection_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionServerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub startup_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    pub sweep_interval_secs: u64,
    pub inactivity_threshold_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub default_country_code: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                name: var("SERVER_NAME", "sessionwarp"),
                port: parse_u16("SERVER_PORT", 8080),
            },
            cors: CorsConfig {
                origins: split_csv("CORS_ORIGIN", vec!["*".to_string()]),
                methods: split_csv(
                    "CORS_METHODS",
                    vec![
                        "POST".to_string(),
                        "GET".to_string(),
                        "PUT".to_string(),
                        "DELETE".to_string(),
                    ],
                ),
                credentials: bool_var("CORS_CREDENTIALS"),
            },
            database: DatabaseConfig {
                connection_uri: var("DATABASE_CONNECTION_URI", ""),
            },
            session_server: SessionServerConfig {
                base_url: var("SESSION_SERVER_URL", "http://127.0.0.1:3333"),
                api_key: optional_var("SESSION_SERVER_API_KEY"),
                request_timeout_ms: parse_u64("SESSION_SERVER_TIMEOUT_MS", 5000),
            },
            polling: PollingConfig {
                max_attempts: parse_u32("QR_POLL_MAX_ATTEMPTS", 20),
                interval_ms: parse_u64("QR_POLL_INTERVAL_MS", 3000),
                timeout_ms: parse_u64("QR_POLL_TIMEOUT_MS", 60_000),
            },
            recovery: RecoveryConfig {
                startup_delay_secs: parse_u64("RECOVERY_STARTUP_DELAY_SECS", 10),
            },
            governor: GovernorConfig {
                sweep_interval_secs: parse_u64("GOVERNOR_SWEEP_INTERVAL_SECS", 180),
                inactivity_threshold_secs: parse_u64("GOVERNOR_INACTIVITY_THRESHOLD_SECS", 600),
            },
            engine: EngineConfig {
                default_country_code: var(
                    "DEFAULT_COUNTRY_CODE",
                    crate::normalize::DEFAULT_COUNTRY_CODE,
                ),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "sessionwarp".to_string(),
                port: 8080,
            },
            cors: CorsConfig {
                origins: vec!["*".to_string()],
                methods: vec![
                    "POST".to_string(),
                    "GET".to_string(),
                    "PUT".to_string(),
                    "DELETE".to_string(),
                ],
                credentials: false,
            },
            database: DatabaseConfig {
                connection_uri: String::new(),
            },
            session_server: SessionServerConfig {
                base_url: "http://127.0.0.1:3333".to_string(),
                api_key: None,
                request_timeout_ms: 5000,
            },
            polling: PollingConfig {
                max_attempts: 20,
                interval_ms: 3000,
                timeout_ms: 60_000,
            },
            recovery: RecoveryConfig {
                startup_delay_secs: 10,
            },
            governor: GovernorConfig {
                sweep_interval_secs: 180,
                inactivity_threshold_secs: 600,
            },
            engine: EngineConfig {
                default_country_code: crate::normalize::DEFAULT_COUNTRY_CODE.to_string(),
            },
        }
    }
}

fn var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn bool_var(key: &str) -> bool {
    env::var(key)
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn split_csv(key: &str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        _ => default,
    }
}

fn parse_u16(key: &str, default: u16) -> u16 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}
