use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ChainOutcome, FlowId},
    traits::{Settlement, WatchRequest},
};

/// Emitted by the watch registry when a watched transaction reaches a terminal state on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationEvent {
    pub watch: WatchRequest,
    pub outcome: ChainOutcome,
}

impl ConfirmationEvent {
    pub fn new(watch: WatchRequest, outcome: ChainOutcome) -> Self {
        Self { watch, outcome }
    }

    pub fn flow_id(&self) -> FlowId {
        self.watch.flow_id
    }

    /// Events that cannot refer to a stored flow.
    pub fn is_malformed(&self) -> bool {
        self.watch.flow_id <= 0 || self.watch.account_id <= 0
    }
}

/// Published after a flow's terminal status and balance change have been committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSettledEvent {
    pub settlement: Settlement,
}

impl FlowSettledEvent {
    pub fn new(settlement: Settlement) -> Self {
        Self { settlement }
    }
}

/// Published when the registry stops polling a transaction because the oracle kept failing. The watch stays
/// outstanding until the next sweep re-submits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchParkedEvent {
    pub watch: WatchRequest,
    pub attempts: u32,
}

impl WatchParkedEvent {
    pub fn new(watch: WatchRequest, attempts: u32) -> Self {
        Self { watch, attempts }
    }
}
