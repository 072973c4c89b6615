use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Account, BalanceFlow, FlowId, NewBalanceFlow, TxHash},
    traits::{ChainOracle, LedgerDatabase, LedgerError, WatchRequest},
    watch::{AppendResult, WatchRegistry},
};

/// A flow as stored by [`FlowApi::submit_flow`], and what happened when its watch was registered.
#[derive(Debug, Clone)]
pub struct SubmittedFlow {
    pub flow: BalanceFlow,
    /// `None` if the flow has no transaction hash yet.
    pub watch: Option<AppendResult>,
}

/// `FlowApi` is the entry point for the request path. It records new flows and starts watching the transactions
/// behind them.
pub struct FlowApi<B, O> {
    db: B,
    registry: WatchRegistry<O>,
}

impl<B: Clone, O> Clone for FlowApi<B, O> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), registry: self.registry.clone() }
    }
}

impl<B, O> Debug for FlowApi<B, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FlowApi ({:?})", self.registry)
    }
}

impl<B, O> FlowApi<B, O>
where
    B: LedgerDatabase,
    O: ChainOracle,
{
    pub fn new(db: B, registry: WatchRegistry<O>) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &WatchRegistry<O> {
        &self.registry
    }

    pub async fn create_account(&self) -> Result<Account, LedgerError> {
        self.db.create_account().await
    }

    /// Stores a new `Pending` flow. If the flow already has a transaction hash, a watch is registered for it.
    ///
    /// The flow is stored even if the watch is rejected because the registry is shutting down; the next sweep after a
    /// restart will pick it up.
    pub async fn submit_flow(&self, flow: NewBalanceFlow) -> Result<SubmittedFlow, LedgerError> {
        let flow = self.db.insert_flow(flow).await?;
        let watch = if flow.tx_hash.is_empty() {
            debug!("🧾️ Flow {} has no transaction yet. It will be watched once one is attached.", flow.id);
            None
        } else {
            Some(self.watch(&flow)?)
        };
        Ok(SubmittedFlow { flow, watch })
    }

    /// Attaches the hash of the transaction that was submitted for a flow created earlier, and starts watching it.
    pub async fn attach_tx_hash(&self, flow_id: FlowId, tx_hash: &TxHash) -> Result<SubmittedFlow, LedgerError> {
        let flow = self.db.attach_tx_hash(flow_id, tx_hash).await?;
        let watch = Some(self.watch(&flow)?);
        Ok(SubmittedFlow { flow, watch })
    }

    fn watch(&self, flow: &BalanceFlow) -> Result<AppendResult, LedgerError> {
        let request = WatchRequest::for_flow(flow)?;
        Ok(self.registry.append(request))
    }
}
