use std::time::Duration;

use ledger_common::Amount;
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{AccountId, BalanceDelta, BalanceFlow, FlowId, FlowStatus, NewBalanceFlow, TxHash},
    traits::LedgerError,
};

pub async fn insert_flow(flow: NewBalanceFlow, conn: &mut SqliteConnection) -> Result<BalanceFlow, LedgerError> {
    let tx_hash = flow.tx_hash.as_ref().map(|h| h.to_string()).unwrap_or_default();
    let key = format!("{tx_hash} on chain {} ({})", flow.chain_id, flow.op);
    let flow = sqlx::query_as(
        r#"
            INSERT INTO balance_flows (account_id, chain_id, tx_hash, op, ref_flow_id, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(flow.account_id)
    .bind(flow.chain_id.to_string())
    .bind(tx_hash)
    .bind(flow.op)
    .bind(flow.ref_flow_id)
    .bind(flow.amount)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::FlowAlreadyExists(key),
        _ => LedgerError::from(e),
    })?;
    Ok(flow)
}

pub async fn fetch_flow(flow_id: FlowId, conn: &mut SqliteConnection) -> Result<Option<BalanceFlow>, LedgerError> {
    let flow = sqlx::query_as("SELECT * FROM balance_flows WHERE id = $1").bind(flow_id).fetch_optional(conn).await?;
    Ok(flow)
}

/// Claims a `Pending` flow for the current transaction. Returns `None` if the flow does not exist or is terminal.
///
/// Like [`super::accounts::lock_account`], this is a no-op write. Making it the first statement of a settlement means
/// the transaction holds the write lock before it reads anything, so two settlements of the same flow cannot both see
/// it as `Pending`.
pub async fn claim_pending_flow(
    flow_id: FlowId,
    conn: &mut SqliteConnection,
) -> Result<Option<BalanceFlow>, LedgerError> {
    let flow = sqlx::query_as(
        "UPDATE balance_flows SET updated_at = updated_at WHERE id = $1 AND status = 'Pending' RETURNING *",
    )
    .bind(flow_id)
    .fetch_optional(conn)
    .await?;
    Ok(flow)
}

/// Moves a claimed flow to its terminal status and records the delta it applied.
pub async fn finalize_flow(
    flow_id: FlowId,
    status: FlowStatus,
    delta: BalanceDelta,
    conn: &mut SqliteConnection,
) -> Result<BalanceFlow, LedgerError> {
    let flow = sqlx::query_as(
        r#"
            UPDATE balance_flows SET
                status = $1,
                available_delta = $2,
                held_delta = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(delta.available)
    .bind(delta.held)
    .bind(flow_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| LedgerError::InvalidFlow(format!("Flow {flow_id} is no longer pending")))?;
    Ok(flow)
}

/// The total amount of `Confirmed` flows that settled the given hold.
pub async fn settled_against(ref_flow_id: FlowId, conn: &mut SqliteConnection) -> Result<Amount, LedgerError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM balance_flows WHERE ref_flow_id = $1 AND status = 'Confirmed'",
    )
    .bind(ref_flow_id)
    .fetch_one(conn)
    .await?;
    Ok(Amount::from(total))
}

/// The total amount of flows that settled, or may still settle, the given hold.
pub async fn reserved_against(ref_flow_id: FlowId, conn: &mut SqliteConnection) -> Result<Amount, LedgerError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM balance_flows WHERE ref_flow_id = $1 AND status <> 'Failed'",
    )
    .bind(ref_flow_id)
    .fetch_one(conn)
    .await?;
    Ok(Amount::from(total))
}

/// Sets the transaction hash of a pending flow that does not have one yet. Returns `None` if no such flow exists.
pub async fn set_tx_hash(
    flow_id: FlowId,
    tx_hash: &TxHash,
    conn: &mut SqliteConnection,
) -> Result<Option<BalanceFlow>, LedgerError> {
    let flow = sqlx::query_as(
        r#"
            UPDATE balance_flows SET tx_hash = $1, updated_at = CURRENT_TIMESTAMP
            WHERE id = $2 AND tx_hash = '' AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(tx_hash.as_str())
    .bind(flow_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => LedgerError::FlowAlreadyExists(tx_hash.to_string()),
        _ => LedgerError::from(e),
    })?;
    Ok(flow)
}

pub async fn fetch_pending_flows(
    limit: u32,
    min_age: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceFlow>, LedgerError> {
    let age = format!("-{} seconds", min_age.as_secs());
    let flows = sqlx::query_as(
        r#"
            SELECT * FROM balance_flows
            WHERE status = 'Pending' AND tx_hash <> '' AND created_at <= datetime('now', $1)
            ORDER BY last_swept_at ASC, id ASC
            LIMIT $2;
        "#,
    )
    .bind(age)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(flows)
}

pub async fn mark_swept(flow_ids: &[FlowId], conn: &mut SqliteConnection) -> Result<u64, LedgerError> {
    if flow_ids.is_empty() {
        return Ok(0);
    }
    let mut builder = QueryBuilder::new(
        "UPDATE balance_flows SET sweep_count = sweep_count + 1, last_swept_at = CURRENT_TIMESTAMP WHERE status = \
         'Pending' AND id IN (",
    );
    let mut ids = builder.separated(", ");
    for id in flow_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(")");
    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected())
}

pub async fn fetch_flows_for_account(
    account_id: AccountId,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceFlow>, LedgerError> {
    let flows = sqlx::query_as("SELECT * FROM balance_flows WHERE account_id = $1 ORDER BY id ASC")
        .bind(account_id)
        .fetch_all(conn)
        .await?;
    Ok(flows)
}

pub async fn ledger_totals(account_id: AccountId, conn: &mut SqliteConnection) -> Result<BalanceDelta, LedgerError> {
    let totals = sqlx::query_as(
        r#"
            SELECT
                COALESCE(SUM(available_delta), 0) AS available,
                COALESCE(SUM(held_delta), 0) AS held
            FROM balance_flows
            WHERE account_id = $1 AND status = 'Confirmed';
        "#,
    )
    .bind(account_id)
    .fetch_one(conn)
    .await?;
    Ok(totals)
}
