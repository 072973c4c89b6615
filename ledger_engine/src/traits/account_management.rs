use std::future::Future;

use crate::{
    db_types::{Account, AccountId, BalanceDelta, BalanceFlow},
    traits::LedgerError,
};

/// Read-only queries over accounts and the flows that make up their history.
pub trait AccountManagement {
    /// Fetches the account with the given id. If no account exists, `None` is returned.
    fn fetch_account(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Option<Account>, LedgerError>> + Send;

    /// Every flow recorded against the account, oldest first, regardless of status.
    fn fetch_flows_for_account(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<Vec<BalanceFlow>, LedgerError>> + Send;

    /// The sum of the deltas of all `Confirmed` flows for the account. For a consistent ledger this equals the
    /// account's stored balances.
    fn fetch_ledger_totals(
        &self,
        account_id: AccountId,
    ) -> impl Future<Output = Result<BalanceDelta, LedgerError>> + Send;
}
