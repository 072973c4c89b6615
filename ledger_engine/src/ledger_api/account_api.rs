//! Read access to accounts.
use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Account, AccountId, BalanceDelta, BalanceFlow},
    traits::{AccountManagement, LedgerError},
};

/// An account's stored balances next to the sum of its confirmed flow deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub account: Account,
    pub totals: BalanceDelta,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.account.available == self.totals.available && self.account.held == self.totals.held
    }
}

pub struct AccountApi<B> {
    db: B,
}

impl<B: Debug> Debug for AccountApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountApi ({:?})", self.db)
    }
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn account(&self, account_id: AccountId) -> Result<Option<Account>, LedgerError> {
        self.db.fetch_account(account_id).await
    }

    /// Every flow recorded for the account, oldest first.
    pub async fn flows(&self, account_id: AccountId) -> Result<Vec<BalanceFlow>, LedgerError> {
        self.db.fetch_flows_for_account(account_id).await
    }

    pub async fn audit(&self, account_id: AccountId) -> Result<LedgerAudit, LedgerError> {
        let account = self.db.fetch_account(account_id).await?.ok_or(LedgerError::AccountNotFound(account_id))?;
        let totals = self.db.fetch_ledger_totals(account_id).await?;
        let audit = LedgerAudit { account, totals };
        if !audit.is_consistent() {
            error!(
                "🧾️ Account {account_id} balances ({}/{}) do not match its confirmed flows ({}/{})",
                audit.account.available, audit.account.held, audit.totals.available, audit.totals.held
            );
        }
        Ok(audit)
    }
}
