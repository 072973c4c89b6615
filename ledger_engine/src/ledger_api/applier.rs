use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{AccountId, BalanceFlow, ChainOutcome, FlowId},
    events::{EventProducers, FlowSettledEvent},
    helpers::KeyedLock,
    traits::{LedgerDatabase, LedgerError, Settlement, SettlementResult},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    Applied(Settlement),
    /// The flow was already terminal. This is the expected result of a duplicate confirmation.
    AlreadySettled(BalanceFlow),
}

/// Applies terminal chain outcomes to the ledger.
///
/// Settlements for the same account are serialised by an in-process lock on the account id, on top of the row locks
/// taken by the store. Settlements for different accounts proceed concurrently.
pub struct LedgerApplier<B> {
    db: B,
    locks: KeyedLock<AccountId>,
    producers: EventProducers,
}

impl<B: Clone> Clone for LedgerApplier<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), locks: self.locks.clone(), producers: self.producers.clone() }
    }
}

impl<B> Debug for LedgerApplier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApplier ({} accounts locked)", self.locks.len())
    }
}

impl<B> LedgerApplier<B>
where B: LedgerDatabase
{
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, locks: KeyedLock::new(), producers }
    }

    /// Applies `outcome` to the flow with the given id.
    ///
    /// Calling this again for a flow that has already been settled returns [`ApplyOutcome::AlreadySettled`] and
    /// changes nothing. On error, nothing has been written and the flow is still `Pending`.
    pub async fn apply(&self, flow_id: FlowId, outcome: ChainOutcome) -> Result<ApplyOutcome, LedgerError> {
        let flow = self.db.fetch_flow(flow_id).await?.ok_or(LedgerError::FlowNotFound(flow_id))?;
        if flow.status.is_terminal() {
            debug!("🧾️ Flow {flow_id} is already {}. Ignoring the {outcome} outcome.", flow.status);
            return Ok(ApplyOutcome::AlreadySettled(flow));
        }
        let guard = self.locks.lock(flow.account_id).await;
        trace!("🧾️ Holding the lock for account {} to settle flow {flow_id}", guard.key());
        let result = self.db.settle_flow(flow_id, outcome).await;
        drop(guard);
        match result? {
            SettlementResult::Settled(settlement) => {
                info!(
                    "🧾️ {} flow {flow_id} of {} is {}. Account {} balance is {} available, {} held.",
                    settlement.flow.op,
                    settlement.flow.amount,
                    settlement.flow.status,
                    settlement.account.id,
                    settlement.account.available,
                    settlement.account.held
                );
                self.producers.publish_flow_settled(FlowSettledEvent::new(settlement.clone())).await;
                Ok(ApplyOutcome::Applied(settlement))
            },
            SettlementResult::AlreadySettled(flow) => {
                debug!("🧾️ Flow {flow_id} was settled concurrently. Nothing to do.");
                Ok(ApplyOutcome::AlreadySettled(flow))
            },
        }
    }

    /// The number of accounts whose lock is currently held or awaited.
    pub fn locks_in_use(&self) -> usize {
        self.locks.len()
    }
}
