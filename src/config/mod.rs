//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS; empty allows any
    pub client_origins: Vec<String>,
    /// Relay timing and capacity
    pub relay: RelayConfig,
}

/// Relay knobs
#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    /// Max tanks per room
    pub room_capacity: usize,
    /// Room tick rate (Hz)
    pub tick_hz: u32,
    /// Relay bullet lifetime
    pub bullet_ttl_ms: u64,
    /// Silence before a connection is dropped
    pub connection_timeout: Duration,
    /// Inactivity before a room is dropped
    pub room_idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub stats_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            room_capacity: 10,
            tick_hz: 60,
            bullet_ttl_ms: 5000,
            connection_timeout: Duration::from_secs(30),
            room_idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            stats_interval: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_hz.max(1)))
    }

    /// Seconds a bullet travels per tick
    pub fn tick_secs(&self) -> f32 {
        1.0 / self.tick_hz.max(1) as f32
    }

    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            room_capacity: parse_var("ROOM_CAPACITY", defaults.room_capacity)?,
            tick_hz: parse_var("TICK_HZ", defaults.tick_hz)?,
            bullet_ttl_ms: parse_var("BULLET_TTL_MS", defaults.bullet_ttl_ms)?,
            connection_timeout: secs_var("CONNECTION_TIMEOUT_SECS", defaults.connection_timeout)?,
            room_idle_timeout: secs_var("ROOM_IDLE_TIMEOUT_SECS", defaults.room_idle_timeout)?,
            sweep_interval: secs_var("SWEEP_INTERVAL_SECS", defaults.sweep_interval)?,
            stats_interval: secs_var("STATS_INTERVAL_SECS", defaults.stats_interval)?,
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosted platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:10000".to_string())
        };

        let client_origins = env::var("CLIENT_ORIGIN")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origins,
            relay: RelayConfig::from_env()?,
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

fn secs_var(name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.room_capacity, 10);
        assert_eq!(config.tick_interval(), Duration::from_micros(16_666));
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unset_variables_fall_back() {
        let value: u32 = parse_var("TANK_ARENA_TEST_SURELY_UNSET", 7).unwrap();
        assert_eq!(value, 7);
    }
}
