use std::{collections::HashMap, time::Duration};

use ledger_common::{
    helpers::{parse_millis, parse_number},
    Secret,
};
use log::*;

pub const DEFAULT_CONFIRMATIONS: u64 = 12;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ChainRpcConfig {
    /// RPC endpoint per chain id. The URLs usually embed provider API keys, so they are kept secret.
    pub endpoints: HashMap<u64, Secret<String>>,
    /// Number of blocks a successful receipt must be buried under before it counts as confirmed.
    pub required_confirmations: u64,
    pub request_timeout: Duration,
}

impl Default for ChainRpcConfig {
    fn default() -> Self {
        Self {
            endpoints: HashMap::new(),
            required_confirmations: DEFAULT_CONFIRMATIONS,
            request_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

impl ChainRpcConfig {
    pub fn new_from_env_or_default() -> Self {
        let endpoints = match std::env::var("LEDGER_CHAIN_RPC_URLS") {
            Ok(s) => parse_endpoints(&s),
            Err(_) => {
                warn!("🔗️ LEDGER_CHAIN_RPC_URLS not set. No chain can be queried, so every watch will stay pending.");
                HashMap::new()
            },
        };
        let confirmations = std::env::var("LEDGER_CONFIRMATIONS").ok();
        let required_confirmations = parse_number::<u64>(confirmations.as_deref()).unwrap_or_else(|| {
            info!("🔗️ LEDGER_CONFIRMATIONS not set or invalid, using {DEFAULT_CONFIRMATIONS} as default");
            DEFAULT_CONFIRMATIONS
        });
        let timeout = std::env::var("LEDGER_RPC_TIMEOUT_MS").ok();
        let request_timeout = parse_millis(timeout.as_deref()).unwrap_or_else(|| {
            info!("🔗️ LEDGER_RPC_TIMEOUT_MS not set or invalid, using {}ms", DEFAULT_RPC_TIMEOUT.as_millis());
            DEFAULT_RPC_TIMEOUT
        });
        Self { endpoints, required_confirmations, request_timeout }
    }

    pub fn endpoint(&self, chain_id: u64) -> Option<&str> {
        self.endpoints.get(&chain_id).map(|s| s.reveal().as_str())
    }
}

/// Parses a comma separated list of `chain_id=url` pairs. Malformed entries are logged and skipped.
pub fn parse_endpoints(value: &str) -> HashMap<u64, Secret<String>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let Some((id, url)) = entry.split_once('=') else {
                warn!("🔗️ Ignoring RPC endpoint entry without '=': {entry}");
                return None;
            };
            let Ok(id) = id.trim().parse::<u64>() else {
                warn!("🔗️ Ignoring RPC endpoint with an invalid chain id: {id}");
                return None;
            };
            let url = url.trim();
            if url.is_empty() {
                warn!("🔗️ Ignoring empty RPC endpoint for chain {id}");
                return None;
            }
            Some((id, Secret::new(url.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn endpoint_list() {
        let endpoints = parse_endpoints("1=https://eth.example/key, 56 = https://bsc.example ,bad,x=http://a,10=");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[&1].reveal(), "https://eth.example/key");
        assert_eq!(endpoints[&56].reveal(), "https://bsc.example");
    }

    #[test]
    fn endpoints_are_not_logged() {
        let config = ChainRpcConfig { endpoints: parse_endpoints("1=https://eth.example/key"), ..Default::default() };
        let printed = format!("{config:?}");
        assert!(!printed.contains("eth.example"));
        assert_eq!(config.endpoint(1), Some("https://eth.example/key"));
        assert_eq!(config.endpoint(2), None);
    }
}
