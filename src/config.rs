//! Runtime Configuration
//!
//! Engine and server settings, read from `SPINSERVE_*` environment variables
//! with defaults for anything unset or unparsable.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use serde::{Serialize, Deserialize};

/// What happens to a session after its reward has been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AfterRewardPolicy {
    /// `REWARD_APPLIED` is final. One reward per visit.
    Terminal,
    /// A bill refresh after the reward was applied starts the next cycle.
    NextCycle,
}

impl FromStr for AfterRewardPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminal" => Ok(Self::Terminal),
            "next_cycle" | "next-cycle" => Ok(Self::NextCycle),
            other => Err(format!("unknown after-reward policy '{}'", other)),
        }
    }
}

/// Game engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Times a spin is recomputed when the wheel config changes under it.
    pub spin_retries: u32,
    /// Longest wait for a session lock before reporting a conflict.
    pub lock_timeout: Duration,
    /// Policy after a reward is applied.
    pub after_reward: AfterRewardPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            spin_retries: 3,
            lock_timeout: Duration::from_millis(2000),
            after_reward: AfterRewardPolicy::Terminal,
            event_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            spin_retries: env_or("SPINSERVE_SPIN_RETRIES", defaults.spin_retries),
            lock_timeout: Duration::from_millis(env_or(
                "SPINSERVE_LOCK_TIMEOUT_MS",
                defaults.lock_timeout.as_millis() as u64,
            )),
            after_reward: env_or("SPINSERVE_AFTER_REWARD", defaults.after_reward),
            event_capacity: env_or("SPINSERVE_EVENT_CAPACITY", defaults.event_capacity),
        }
    }
}

/// Network server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// Closed sessions are purged after this long.
    pub closed_retention: Duration,
    /// Interval of the cleanup loop.
    pub cleanup_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            closed_retention: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("SPINSERVE_BIND_ADDR", defaults.bind_addr),
            max_connections: env_or("SPINSERVE_MAX_CONNECTIONS", defaults.max_connections),
            idle_timeout: Duration::from_secs(env_or(
                "SPINSERVE_IDLE_TIMEOUT_SECS",
                defaults.idle_timeout.as_secs(),
            )),
            closed_retention: Duration::from_secs(env_or(
                "SPINSERVE_CLOSED_RETENTION_SECS",
                defaults.closed_retention.as_secs(),
            )),
            cleanup_interval: defaults.cleanup_interval,
        }
    }
}

/// Parse an env var, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.spin_retries, 3);
        assert_eq!(config.after_reward, AfterRewardPolicy::Terminal);
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("terminal".parse(), Ok(AfterRewardPolicy::Terminal));
        assert_eq!("NEXT_CYCLE".parse(), Ok(AfterRewardPolicy::NextCycle));
        assert!("sometimes".parse::<AfterRewardPolicy>().is_err());
    }

    #[test]
    fn test_env_or_fallback() {
        std::env::set_var("SPINSERVE_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("SPINSERVE_TEST_ENV_OR", 7u32), 7);
        std::env::set_var("SPINSERVE_TEST_ENV_OR", "12");
        assert_eq!(env_or("SPINSERVE_TEST_ENV_OR", 7u32), 12);
        std::env::remove_var("SPINSERVE_TEST_ENV_OR");
        assert_eq!(env_or("SPINSERVE_TEST_ENV_OR", 7u32), 7);
    }
}
