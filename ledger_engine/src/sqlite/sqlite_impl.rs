//! `SqliteDatabase` is the SQLite implementation of the ledger store.
//!
//! It implements [`LedgerDatabase`] and [`AccountManagement`]. Every multi-statement operation runs inside a single
//! transaction obtained from the pool, and takes its write locks before it reads the rows it depends on.
use std::{fmt::Debug, time::Duration};

use ledger_common::Amount;
use log::*;
use sqlx::{migrate, SqliteConnection, SqlitePool};

use super::db::{accounts, db_url, flows, new_pool};
use crate::{
    db_types::{
        Account,
        AccountId,
        BalanceDelta,
        BalanceFlow,
        BalanceOp,
        ChainOutcome,
        FlowId,
        FlowStatus,
        NewBalanceFlow,
        TxHash,
    },
    traits::{AccountManagement, LedgerDatabase, LedgerError, Settlement, SettlementResult},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `LEDGER_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, LedgerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, LedgerError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Connected to {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Brings the schema up to date with the migrations embedded in this crate.
    pub async fn run_migrations(&self) -> Result<(), LedgerError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_flow(&self, flow_id: FlowId) -> Result<Option<BalanceFlow>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flows::fetch_flow(flow_id, &mut conn).await
    }

    async fn settle_flow(&self, flow_id: FlowId, outcome: ChainOutcome) -> Result<SettlementResult, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let Some(flow) = flows::claim_pending_flow(flow_id, &mut tx).await? else {
            let flow = flows::fetch_flow(flow_id, &mut tx).await?.ok_or(LedgerError::FlowNotFound(flow_id))?;
            tx.rollback().await?;
            debug!("🗃️ Flow {flow_id} is already {}. Nothing to settle.", flow.status);
            return Ok(SettlementResult::AlreadySettled(flow));
        };
        let account_id = flow.account_id;
        let account = accounts::lock_account(account_id, &mut tx).await?.ok_or(LedgerError::AccountNotFound(account_id))?;
        let settlement = match outcome {
            ChainOutcome::Failed => {
                let released = if flow.op.settles_hold() && flow.ref_flow_id > 0 { flow.amount } else { Amount::zero() };
                let flow = flows::finalize_flow(flow_id, FlowStatus::Failed, BalanceDelta::default(), &mut tx).await?;
                Settlement { flow, account, delta: BalanceDelta::default(), released }
            },
            ChainOutcome::Confirmed => {
                let delta = flow.op.confirmation_delta(flow.amount, flow.ref_flow_id).ok_or_else(|| {
                    LedgerError::UnpairedSettlement {
                        flow_id,
                        ref_flow_id: flow.ref_flow_id,
                        reason: format!("a {} flow cannot be paired this way", flow.op),
                    }
                })?;
                if flow.ref_flow_id > 0 {
                    check_pairing(&flow, &mut tx).await?;
                }
                if account.after(&delta).is_none() {
                    return Err(LedgerError::InsufficientFunds { flow_id, account_id: account.id });
                }
                let account = accounts::apply_delta(account.id, delta, &mut tx).await?;
                let flow = flows::finalize_flow(flow_id, FlowStatus::Confirmed, delta, &mut tx).await?;
                Settlement { flow, account, delta, released: Amount::zero() }
            },
        };
        tx.commit().await?;
        debug!(
            "🗃️ Flow {flow_id} settled as {}. Account {} is now {}/{} (available/held)",
            settlement.flow.status, settlement.account.id, settlement.account.available, settlement.account.held
        );
        Ok(SettlementResult::Settled(settlement))
    }

    async fn fetch_pending_flows(&self, limit: u32, min_age: Duration) -> Result<Vec<BalanceFlow>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flows::fetch_pending_flows(limit, min_age, &mut conn).await
    }

    async fn mark_flows_swept(&self, flow_ids: &[FlowId]) -> Result<u64, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flows::mark_swept(flow_ids, &mut conn).await
    }

    async fn create_account(&self) -> Result<Account, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::create_account(&mut conn).await?;
        debug!("🗃️ Created account {}", account.id);
        Ok(account)
    }

    async fn insert_flow(&self, flow: NewBalanceFlow) -> Result<BalanceFlow, LedgerError> {
        flow.validate()?;
        let mut tx = self.pool.begin().await?;
        // Serialises reservations against the same account's holds.
        let account_id = flow.account_id;
        accounts::lock_account(account_id, &mut tx).await?.ok_or(LedgerError::AccountNotFound(account_id))?;
        if flow.ref_flow_id > 0 {
            check_reservation(&flow, &mut tx).await?;
        }
        let flow = flows::insert_flow(flow, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Stored {} flow {} for account {} ({})", flow.op, flow.id, flow.account_id, flow.amount);
        Ok(flow)
    }

    async fn attach_tx_hash(&self, flow_id: FlowId, tx_hash: &TxHash) -> Result<BalanceFlow, LedgerError> {
        let mut tx = self.pool.begin().await?;
        if let Some(flow) = flows::set_tx_hash(flow_id, tx_hash, &mut tx).await? {
            tx.commit().await?;
            debug!("🗃️ Flow {flow_id} is backed by transaction {tx_hash}");
            return Ok(flow);
        }
        let flow = flows::fetch_flow(flow_id, &mut tx).await?.ok_or(LedgerError::FlowNotFound(flow_id))?;
        tx.rollback().await?;
        if flow.tx_hash.is_empty() {
            Err(LedgerError::InvalidFlow(format!("Flow {flow_id} is already {}", flow.status)))
        } else {
            Err(LedgerError::TxHashAlreadySet(flow_id))
        }
    }

    async fn close(&self) -> Result<(), LedgerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_account(&self, account_id: AccountId) -> Result<Option<Account>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_account(account_id, &mut conn).await
    }

    async fn fetch_flows_for_account(&self, account_id: AccountId) -> Result<Vec<BalanceFlow>, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flows::fetch_flows_for_account(account_id, &mut conn).await
    }

    async fn fetch_ledger_totals(&self, account_id: AccountId) -> Result<BalanceDelta, LedgerError> {
        let mut conn = self.pool.acquire().await?;
        flows::ledger_totals(account_id, &mut conn).await
    }
}

/// A Withdraw or Unfreeze may only settle a `Confirmed` Freeze on the same account, and only up to what is left of it.
async fn check_pairing(flow: &BalanceFlow, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let unpaired = |reason: String| LedgerError::UnpairedSettlement {
        flow_id: flow.id,
        ref_flow_id: flow.ref_flow_id,
        reason,
    };
    let hold = flows::fetch_flow(flow.ref_flow_id, conn)
        .await?
        .ok_or_else(|| unpaired("the referenced flow does not exist".into()))?;
    if hold.account_id != flow.account_id {
        return Err(unpaired(format!("the referenced flow belongs to account {}", hold.account_id)));
    }
    if hold.op != BalanceOp::Freeze {
        return Err(unpaired(format!("expected a Freeze but found a {}", hold.op)));
    }
    if hold.status != FlowStatus::Confirmed {
        return Err(unpaired(format!("the referenced Freeze is {}", hold.status)));
    }
    let remaining = hold.amount - flows::settled_against(hold.id, conn).await?;
    if flow.amount > remaining {
        return Err(LedgerError::HoldExceeded { ref_flow_id: hold.id, requested: flow.amount, remaining });
    }
    Ok(())
}

/// Request-time version of [`check_pairing`]. The hold may still be pending, but must not have failed, and pending
/// settlements count against it.
async fn check_reservation(flow: &NewBalanceFlow, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let hold = flows::fetch_flow(flow.ref_flow_id, conn)
        .await?
        .ok_or_else(|| LedgerError::InvalidFlow(format!("Referenced flow {} does not exist", flow.ref_flow_id)))?;
    if hold.account_id != flow.account_id || hold.op != BalanceOp::Freeze {
        return Err(LedgerError::InvalidFlow(format!(
            "Flow {} is not a Freeze held by account {}",
            hold.id, flow.account_id
        )));
    }
    if hold.status == FlowStatus::Failed {
        return Err(LedgerError::InvalidFlow(format!("Freeze {} has failed", hold.id)));
    }
    let remaining = hold.amount - flows::reserved_against(hold.id, conn).await?;
    if flow.amount > remaining {
        return Err(LedgerError::HoldExceeded { ref_flow_id: hold.id, requested: flow.amount, remaining });
    }
    Ok(())
}
