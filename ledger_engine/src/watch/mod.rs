//! # Watch registry
//!
//! The registry keeps the set of transactions whose terminal outcome the ledger is waiting for. Watches are
//! deduplicated by `(chain, tx hash, op)` and polled by one task per chain. When the oracle reports a terminal state,
//! a [`ConfirmationEvent`](crate::events::ConfirmationEvent) is pushed onto an unbounded stream and the watch is
//! forgotten.
//!
//! If the oracle keeps failing for a watch, the watch is *parked*: it is no longer polled, but it still counts as
//! outstanding. The next sweep re-appends it, which reactivates polling.
mod poller;
mod registry;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use registry::WatchRegistry;

use crate::{
    db_types::{BalanceOp, ChainId, TxHash},
    traits::WatchRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchKey {
    pub chain_id: ChainId,
    pub tx_hash: TxHash,
    pub op: BalanceOp,
}

impl From<&WatchRequest> for WatchKey {
    fn from(request: &WatchRequest) -> Self {
        Self { chain_id: request.chain_id, tx_hash: request.tx_hash.clone(), op: request.op }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// A poller is asking the oracle about this transaction.
    Active,
    /// The oracle failed too many times in a row. Waiting to be re-appended.
    Parked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    Registered,
    /// An identical watch is already being polled. Nothing changed.
    AlreadyWatching,
    /// A parked watch was handed back to its poller.
    Reactivated,
    /// The registry is shutting down.
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// How often each poller checks its due watches.
    pub poll_interval: Duration,
    /// Consecutive `Unknown` answers after which a watch is parked.
    pub max_oracle_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Maximum number of oracle queries a single poller has in flight.
    pub oracle_concurrency: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_oracle_attempts: 8,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            oracle_concurrency: 16,
        }
    }
}
