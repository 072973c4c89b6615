use std::{fmt::Display, future::Future};

use crate::db_types::{ChainId, ChainOutcome, TxHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTxStatus {
    /// Not yet mined, or mined but not yet final.
    Pending,
    Confirmed,
    Failed,
    /// The oracle could not answer. Always retryable, never treated as a failure of the transaction.
    Unknown,
}

impl ChainTxStatus {
    /// The terminal outcome carried by this status, if any.
    pub fn outcome(&self) -> Option<ChainOutcome> {
        match self {
            ChainTxStatus::Confirmed => Some(ChainOutcome::Confirmed),
            ChainTxStatus::Failed => Some(ChainOutcome::Failed),
            ChainTxStatus::Pending | ChainTxStatus::Unknown => None,
        }
    }
}

impl Display for ChainTxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainTxStatus::Pending => write!(f, "Pending"),
            ChainTxStatus::Confirmed => write!(f, "Confirmed"),
            ChainTxStatus::Failed => write!(f, "Failed"),
            ChainTxStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The source of truth for on-chain transaction outcomes.
///
/// Implementations must not return an error type: transport and RPC problems are reported as
/// [`ChainTxStatus::Unknown`] and the caller retries.
pub trait ChainOracle: Send + Sync + 'static {
    fn query_status(&self, chain_id: ChainId, tx_hash: &TxHash) -> impl Future<Output = ChainTxStatus> + Send;
}
