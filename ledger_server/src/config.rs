//! Server configuration.
//!
//! Everything is read from environment variables (optionally loaded from a `.env` file). Missing or invalid values
//! are logged and replaced by their defaults, so the server always starts with a complete configuration. Run the
//! server with any command line argument to see the list of variables.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use chain_rpc::ChainRpcConfig;
use ledger_common::helpers::{parse_boolean_flag, parse_millis, parse_number, parse_secs};
use ledger_engine::{db_url, ReconcilerConfig, SweepConfig, WatchConfig};
use log::*;

use crate::errors::ServerError;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    /// If true, pending migrations are applied to the database at startup.
    pub run_migrations: bool,
    pub reconciler: ReconcilerConfig,
    pub chain_rpc: ChainRpcConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            run_migrations: true,
            reconciler: ReconcilerConfig::default(),
            chain_rpc: ChainRpcConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = db_url();
        let db_max_connections = env_number("LEDGER_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let run_migrations = parse_boolean_flag(env::var("LEDGER_RUN_MIGRATIONS").ok(), true);
        let reconciler = reconciler_config_from_env();
        let chain_rpc = ChainRpcConfig::new_from_env_or_default();
        Self { database_url, db_max_connections, run_migrations, reconciler, chain_rpc }
    }

    /// Catches combinations of values that would leave the reconciler unable to do its job.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.database_url.is_empty() {
            return Err(ServerError::ConfigurationError("No database URL was provided".into()));
        }
        if self.db_max_connections == 0 {
            return Err(ServerError::ConfigurationError("LEDGER_DB_MAX_CONNECTIONS must be at least 1".into()));
        }
        let watch = &self.reconciler.watch;
        if watch.poll_interval.is_zero() || self.reconciler.sweep.interval.is_zero() {
            return Err(ServerError::ConfigurationError("Poll and sweep intervals must be non-zero".into()));
        }
        if watch.oracle_concurrency == 0 || watch.max_oracle_attempts == 0 || self.reconciler.sweep.batch_size == 0 {
            return Err(ServerError::ConfigurationError(
                "Oracle concurrency, oracle attempts and sweep batch size must be at least 1".into(),
            ));
        }
        if watch.backoff_base > watch.backoff_max {
            return Err(ServerError::ConfigurationError(format!(
                "The backoff base ({}ms) is larger than the maximum backoff ({}ms)",
                watch.backoff_base.as_millis(),
                watch.backoff_max.as_millis()
            )));
        }
        Ok(())
    }
}

fn reconciler_config_from_env() -> ReconcilerConfig {
    let defaults = ReconcilerConfig::default();
    let watch = WatchConfig {
        poll_interval: env_millis("LEDGER_POLL_INTERVAL_MS", defaults.watch.poll_interval),
        max_oracle_attempts: env_number("LEDGER_ORACLE_MAX_ATTEMPTS", defaults.watch.max_oracle_attempts),
        backoff_base: env_millis("LEDGER_BACKOFF_BASE_MS", defaults.watch.backoff_base),
        backoff_max: env_millis("LEDGER_BACKOFF_MAX_MS", defaults.watch.backoff_max),
        oracle_concurrency: env_number("LEDGER_ORACLE_CONCURRENCY", defaults.watch.oracle_concurrency),
    };
    let sweep = SweepConfig {
        interval: env_secs("LEDGER_SWEEP_INTERVAL_SECS", defaults.sweep.interval),
        batch_size: env_number("LEDGER_SWEEP_BATCH_SIZE", defaults.sweep.batch_size),
        min_age: env_secs("LEDGER_SWEEP_MIN_AGE_SECS", defaults.sweep.min_age),
    };
    ReconcilerConfig {
        watch,
        sweep,
        shutdown_timeout: env_secs("LEDGER_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
        forced_shutdown_timeout: env_secs("LEDGER_FORCED_SHUTDOWN_SECS", defaults.forced_shutdown_timeout),
        event_buffer_size: env_number("LEDGER_EVENT_BUFFER_SIZE", defaults.event_buffer_size),
    }
}

fn env_number<T: FromStr + Display>(name: &str, default: T) -> T {
    env_value(name, default, |v| parse_number(Some(v)), |d| d.to_string())
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env_value(name, default, |v| parse_millis(Some(v)), |d| format!("{}ms", d.as_millis()))
}

fn env_secs(name: &str, default: Duration) -> Duration {
    env_value(name, default, |v| parse_secs(Some(v)), |d| format!("{}s", d.as_secs()))
}

fn env_value<T>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>, show: impl Fn(&T) -> String) -> T {
    match env::var(name) {
        Ok(s) => parse(&s).unwrap_or_else(|| {
            error!("🪛️ {s} is not a valid value for {name}. Using the default, {}, instead.", show(&default));
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {}.", show(&default));
            default
        },
    }
}
