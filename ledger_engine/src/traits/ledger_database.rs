use std::{future::Future, time::Duration};

use ledger_common::Amount;
use thiserror::Error;

use crate::{
    db_types::{Account, AccountId, BalanceFlow, ChainOutcome, ConversionError, FlowId, NewBalanceFlow, TxHash},
    traits::{AccountManagement, SettlementResult},
};

/// This trait defines the persistence behaviour the reconciliation core relies on.
///
/// The core itself only needs three operations: [`fetch_flow`](LedgerDatabase::fetch_flow),
/// [`settle_flow`](LedgerDatabase::settle_flow) and [`fetch_pending_flows`](LedgerDatabase::fetch_pending_flows).
/// The remaining methods serve the request path that creates accounts and flows.
pub trait LedgerDatabase: Clone + AccountManagement + Send + Sync + 'static {
    /// The URL of the database
    fn url(&self) -> &str;

    fn fetch_flow(&self, flow_id: FlowId) -> impl Future<Output = Result<Option<BalanceFlow>, LedgerError>> + Send;

    /// Moves a `Pending` flow to the status given by `outcome`, in a single atomic transaction.
    ///
    /// * The flow row is claimed first, then the owning account row is locked.
    /// * For `Confirmed`, a Withdraw or Unfreeze must reference a `Confirmed` Freeze of the same account with enough
    ///   unsettled hold left. The delta for the operation is computed, written to the account, and recorded on the
    ///   flow together with the new status.
    /// * For `Failed`, only the status changes.
    ///
    /// If the flow is already terminal, nothing is written and [`SettlementResult::AlreadySettled`] is returned. Any
    /// error rolls the whole transaction back, leaving the flow `Pending`.
    fn settle_flow(
        &self,
        flow_id: FlowId,
        outcome: ChainOutcome,
    ) -> impl Future<Output = Result<SettlementResult, LedgerError>> + Send;

    /// Fetches up to `limit` `Pending` flows that have a transaction hash and are older than `min_age`. Flows that
    /// were swept least recently come first.
    fn fetch_pending_flows(
        &self,
        limit: u32,
        min_age: Duration,
    ) -> impl Future<Output = Result<Vec<BalanceFlow>, LedgerError>> + Send;

    /// Records that the given flows were looked at by a sweep. Status is never touched.
    fn mark_flows_swept(&self, flow_ids: &[FlowId]) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Creates a new account with zero balances.
    fn create_account(&self) -> impl Future<Output = Result<Account, LedgerError>> + Send;

    /// Stores a new `Pending` flow.
    ///
    /// A flow that settles a hold reserves part of it immediately: the sum of all non-failed flows referencing the
    /// same Freeze, plus this one, may not exceed the Freeze amount.
    fn insert_flow(&self, flow: NewBalanceFlow) -> impl Future<Output = Result<BalanceFlow, LedgerError>> + Send;

    /// Sets the transaction hash of a `Pending` flow that was created before it was submitted to the chain.
    fn attach_tx_hash(
        &self,
        flow_id: FlowId,
        tx_hash: &TxHash,
    ) -> impl Future<Output = Result<BalanceFlow, LedgerError>> + Send;

    /// Closes the database connection.
    fn close(&self) -> impl Future<Output = Result<(), LedgerError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested flow {0} does not exist")]
    FlowNotFound(FlowId),
    #[error("The requested account id {0} does not exist")]
    AccountNotFound(AccountId),
    #[error("Flow {flow_id} cannot settle flow {ref_flow_id}: {reason}")]
    UnpairedSettlement { flow_id: FlowId, ref_flow_id: FlowId, reason: String },
    #[error("Flow {flow_id} would leave account {account_id} with a negative balance")]
    InsufficientFunds { flow_id: FlowId, account_id: AccountId },
    #[error("Hold {ref_flow_id} has {remaining} left, but {requested} was requested")]
    HoldExceeded { ref_flow_id: FlowId, requested: Amount, remaining: Amount },
    #[error("Invalid flow. {0}")]
    InvalidFlow(String),
    #[error("Cannot insert flow, since one already exists for {0}")]
    FlowAlreadyExists(String),
    #[error("Flow {0} already has a transaction hash")]
    TxHashAlreadySet(FlowId),
}

impl LedgerError {
    /// Errors that leave the store untouched and may succeed if the same operation is tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::DatabaseError(_))
    }

    /// Errors caused by the recorded data itself. Retrying will not help, and forcing a status would corrupt the
    /// ledger, so the flow is left `Pending` for an operator.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            LedgerError::UnpairedSettlement { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::HoldExceeded { .. }
                | LedgerError::InvalidFlow(_)
                | LedgerError::AccountNotFound(_)
        )
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        LedgerError::DatabaseError(format!("Migration failed. {e}"))
    }
}

impl From<ConversionError> for LedgerError {
    fn from(e: ConversionError) -> Self {
        LedgerError::InvalidFlow(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_classes() {
        assert!(LedgerError::DatabaseError("locked".into()).is_retryable());
        assert!(!LedgerError::DatabaseError("locked".into()).is_integrity_error());
        let unpaired = LedgerError::UnpairedSettlement { flow_id: 2, ref_flow_id: 1, reason: "pending".into() };
        assert!(unpaired.is_integrity_error());
        assert!(!unpaired.is_retryable());
        assert!(LedgerError::InsufficientFunds { flow_id: 1, account_id: 1 }.is_integrity_error());
        assert!(!LedgerError::FlowNotFound(1).is_retryable());
        assert!(!LedgerError::FlowNotFound(1).is_integrity_error());
    }
}
