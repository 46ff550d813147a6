//! Node configuration.
//!
//! Defaults match a small lab cluster: every node listens on the same RPC
//! port, a calculation runs for three seconds and peers are given half a
//! second per call.

use std::time::Duration;

pub const DEFAULT_RPC_PORT: u16 = 3105;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port every node serves RPC on.
    pub rpc_port: u16,
    /// Wall-clock bound of one distributed calculation.
    pub duration: Duration,
    /// Idle pause between two rounds is drawn from `idle_min..=idle_max`.
    pub idle_min: Duration,
    pub idle_max: Duration,
    /// Pause after handing the token on, so an idle ring does not spin.
    pub token_pause: Duration,
    pub rpc_timeout: Duration,
    pub rpc_attempts: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_port: DEFAULT_RPC_PORT,
            duration: Duration::from_secs(3),
            idle_min: Duration::from_millis(50),
            idle_max: Duration::from_millis(250),
            token_pause: Duration::from_millis(50),
            rpc_timeout: Duration::from_millis(500),
            rpc_attempts: 3,
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `DM_*` environment variables. Unparseable
    /// values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse::<u16>("DM_RPC_PORT") {
            config.rpc_port = port;
        }
        if let Some(ms) = env_parse::<u64>("DM_DURATION_MS") {
            config.duration = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("DM_RPC_TIMEOUT_MS") {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<usize>("DM_RPC_ATTEMPTS") {
            config.rpc_attempts = attempts.max(1);
        }

        config
    }

    /// Short timings for in-process simulations.
    pub fn fast(duration: Duration) -> Self {
        Self {
            duration,
            idle_min: Duration::from_millis(5),
            idle_max: Duration::from_millis(20),
            token_pause: Duration::from_millis(5),
            ..Self::default()
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a valid value", key, raw);
            None
        }
    }
}
