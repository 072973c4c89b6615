use ledger_common::Amount;
use serde::{Deserialize, Serialize};

use crate::db_types::{Account, AccountId, BalanceDelta, BalanceFlow, BalanceOp, ChainId, FlowId, TxHash};

/// The result of moving a flow out of `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// The flow as it was stored by the settlement.
    pub flow: BalanceFlow,
    /// The owning account after the settlement.
    pub account: Account,
    pub delta: BalanceDelta,
    /// For a failed Withdraw or Unfreeze, the amount that was reserved against the hold and is now free again.
    pub released: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementResult {
    Settled(Settlement),
    /// The flow was already terminal. Nothing was written.
    AlreadySettled(BalanceFlow),
}

/// A request to watch a transaction until it reaches a terminal state on chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchRequest {
    pub chain_id: ChainId,
    pub tx_hash: TxHash,
    pub account_id: AccountId,
    pub flow_id: FlowId,
    pub op: BalanceOp,
}

impl WatchRequest {
    pub fn new(chain_id: ChainId, tx_hash: TxHash, account_id: AccountId, flow_id: FlowId, op: BalanceOp) -> Self {
        Self { chain_id, tx_hash, account_id, flow_id, op }
    }

    /// Builds the watch for a stored flow. The flow's own id is always the subject, since it is the row whose status
    /// will change.
    pub fn for_flow(flow: &BalanceFlow) -> Result<Self, crate::db_types::ConversionError> {
        let (chain_id, tx_hash) = flow.watch_target()?;
        Ok(Self::new(chain_id, tx_hash, flow.account_id, flow.id, flow.op))
    }
}
