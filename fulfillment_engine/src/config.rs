//! Engine configuration.
//!
//! Every setting can be supplied through an environment variable. Missing or malformed values fall back to the
//! defaults below, and the fallback is logged.
use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use log::*;
use pod_common::parse_boolean_flag;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/pod_orders.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_PRODUCTION_CANCEL_WINDOW_MINS: i64 = 120;
const DEFAULT_MAX_CANCEL_REASON_LEN: usize = 500;
const DEFAULT_ORDER_ID_ATTEMPTS: usize = 5;
const DEFAULT_FOLLOW_UP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_FOLLOW_UP_MAX_ATTEMPTS: i64 = 5;

/// The business rules that the lifecycle engine enforces and that an operator may want to tune.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// How long after production starts a customer may still cancel an order.
    pub production_cancel_window: Duration,
    /// Longest accepted cancellation reason, in characters.
    pub max_cancel_reason_len: usize,
    /// How many external order ids are tried before placement gives up.
    pub order_id_attempts: usize,
    /// How many times a follow-up action is attempted before it is abandoned.
    pub follow_up_max_attempts: i64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            production_cancel_window: Duration::minutes(DEFAULT_PRODUCTION_CANCEL_WINDOW_MINS),
            max_cancel_reason_len: DEFAULT_MAX_CANCEL_REASON_LEN,
            order_id_attempts: DEFAULT_ORDER_ID_ATTEMPTS,
            follow_up_max_attempts: DEFAULT_FOLLOW_UP_MAX_ATTEMPTS,
        }
    }
}

impl LifecyclePolicy {
    pub fn from_env_or_default() -> Self {
        let window_mins = env_or_default("POD_PRODUCTION_CANCEL_WINDOW_MINS", DEFAULT_PRODUCTION_CANCEL_WINDOW_MINS);
        Self {
            production_cancel_window: Duration::minutes(window_mins),
            max_cancel_reason_len: env_or_default("POD_MAX_CANCEL_REASON_LEN", DEFAULT_MAX_CANCEL_REASON_LEN),
            order_id_attempts: env_or_default("POD_ORDER_ID_ATTEMPTS", DEFAULT_ORDER_ID_ATTEMPTS).max(1),
            follow_up_max_attempts: env_or_default("POD_FOLLOW_UP_MAX_ATTEMPTS", DEFAULT_FOLLOW_UP_MAX_ATTEMPTS).max(1),
        }
    }

    pub fn with_production_cancel_window(mut self, window: Duration) -> Self {
        self.production_cancel_window = window;
        self
    }

    pub fn with_order_id_attempts(mut self, attempts: usize) -> Self {
        self.order_id_attempts = attempts.max(1);
        self
    }

    pub fn with_follow_up_max_attempts(mut self, attempts: i64) -> Self {
        self.follow_up_max_attempts = attempts.max(1);
        self
    }
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Run the embedded migrations when the database is opened.
    pub run_migrations: bool,
    /// Period of the follow-up worker.
    pub follow_up_interval: std::time::Duration,
    pub policy: LifecyclePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            follow_up_interval: std::time::Duration::from_secs(DEFAULT_FOLLOW_UP_INTERVAL_SECS),
            policy: LifecyclePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("POD_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ POD_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env_or_default("POD_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let run_migrations = parse_boolean_flag(env::var("POD_RUN_MIGRATIONS").ok(), true);
        let interval_secs = env_or_default("POD_FOLLOW_UP_INTERVAL_SECS", DEFAULT_FOLLOW_UP_INTERVAL_SECS);
        Self {
            database_url,
            max_connections,
            run_migrations,
            follow_up_interval: std::time::Duration::from_secs(interval_secs.max(1)),
            policy: LifecyclePolicy::from_env_or_default(),
        }
    }
}

fn env_or_default<T>(var: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.trim().parse::<T>().map_err(|e| {
                warn!("🪛️ Invalid configuration value for {var}: '{s}'. {e} Using the default value of {default}.")
            })
        })
        .ok()
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database_url, "sqlite://data/pod_orders.db");
        assert_eq!(config.max_connections, 5);
        assert!(config.run_migrations);
        assert_eq!(config.follow_up_interval.as_secs(), 60);
        assert_eq!(config.policy.production_cancel_window, Duration::hours(2));
        assert_eq!(config.policy.max_cancel_reason_len, 500);
        assert_eq!(config.policy.order_id_attempts, 5);
        assert_eq!(config.policy.follow_up_max_attempts, 5);
    }

    #[test]
    fn env_overrides() {
        env::set_var("POD_TEST_ONLY_WINDOW", "45");
        env::set_var("POD_TEST_ONLY_BAD", "forty-five");
        assert_eq!(env_or_default("POD_TEST_ONLY_WINDOW", 120i64), 45);
        assert_eq!(env_or_default("POD_TEST_ONLY_BAD", 120i64), 120);
        assert_eq!(env_or_default("POD_TEST_ONLY_MISSING", 7usize), 7);
    }
}
