use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use crate::analysis::AnalysisConfig;
use crate::error::{HiveError, Result};

pub const DEFAULT_COHORT_SIZE: usize = 16;
pub const MAX_COHORT_SIZE: usize = 1_000;
pub const DEFAULT_TICK_MS: u64 = 2_000;
pub const DEFAULT_POLL_MS: u64 = 3_000;
pub const DEFAULT_ANALYSIS_DELAY_MS: u64 = 1_500;

pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub analysis: AnalysisConfig,
}

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Timers and roster sizing for a monitoring session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cohort_size: usize,
    pub tick_interval: Duration,
    pub poll_interval: Duration,
    pub analysis_delay: Duration,
    pub capture_enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cohort_size: DEFAULT_COHORT_SIZE,
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            analysis_delay: Duration::from_millis(DEFAULT_ANALYSIS_DELAY_MS),
            capture_enabled: true,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self {
            cohort_size: env_or("SESSION_COHORT_SIZE", DEFAULT_COHORT_SIZE),
            tick_interval: Duration::from_millis(env_or("SESSION_TICK_MS", DEFAULT_TICK_MS)),
            poll_interval: Duration::from_millis(env_or("SESSION_POLL_MS", DEFAULT_POLL_MS)),
            analysis_delay: Duration::from_millis(env_or(
                "SESSION_ANALYSIS_DELAY_MS",
                DEFAULT_ANALYSIS_DELAY_MS,
            )),
            capture_enabled: env_or("CAPTURE_ENABLED", true),
        }
    }

    /// Rejects values the session timers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cohort_size == 0 || self.cohort_size > MAX_COHORT_SIZE {
            return Err(HiveError::InvalidConfiguration(format!(
                "SESSION_COHORT_SIZE must be between 1 and {}",
                MAX_COHORT_SIZE
            )));
        }
        if self.tick_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(HiveError::InvalidConfiguration(
                "SESSION_TICK_MS and SESSION_POLL_MS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SERVER_PORT", 8080),
            },
            session: SessionConfig::from_env(),
            analysis: AnalysisConfig::from_env(),
        }
    }

    pub fn bind_address(&self) -> ([u8; 4], u16) {
        let ip_addr = self.parse_host_to_ipv4();
        (ip_addr.octets(), self.server.port)
    }

    fn parse_host_to_ipv4(&self) -> Ipv4Addr {
        if let Ok(addr) = self.server.host.parse::<IpAddr>() {
            match addr {
                IpAddr::V4(ipv4) => return ipv4,
                IpAddr::V6(_) => {
                    tracing::warn!(
                        host = %self.server.host,
                        "IPv6 address provided but only IPv4 supported, using 0.0.0.0"
                    );
                    return Ipv4Addr::new(0, 0, 0, 0);
                }
            }
        }

        match self.server.host.as_str() {
            "localhost" => Ipv4Addr::new(127, 0, 0, 1),
            "" | "0.0.0.0" => Ipv4Addr::new(0, 0, 0, 0),
            _ => {
                tracing::warn!(
                    host = %self.server.host,
                    "Unable to parse host as IPv4, using 0.0.0.0"
                );
                Ipv4Addr::new(0, 0, 0, 0)
            }
        }
    }
}

/// Reads and parses an environment variable, falling back to `default`
/// when it is unset or malformed.
pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = %key, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
