use sqlx::SqliteConnection;

use crate::{
    db_types::{Account, AccountId, BalanceDelta},
    traits::LedgerError,
};

pub async fn create_account(conn: &mut SqliteConnection) -> Result<Account, LedgerError> {
    let account = sqlx::query_as("INSERT INTO accounts DEFAULT VALUES RETURNING *").fetch_one(conn).await?;
    Ok(account)
}

pub async fn fetch_account(account_id: AccountId, conn: &mut SqliteConnection) -> Result<Option<Account>, LedgerError> {
    let account = sqlx::query_as("SELECT * FROM accounts WHERE id = $1").bind(account_id).fetch_optional(conn).await?;
    Ok(account)
}

/// Takes the write lock on the account row for the rest of the transaction and returns its current state.
///
/// SQLite has no `SELECT .. FOR UPDATE`. A no-op update gives the same effect: the transaction becomes a writer, and
/// every other writer waits (up to the busy timeout) until it commits or rolls back.
pub async fn lock_account(account_id: AccountId, conn: &mut SqliteConnection) -> Result<Option<Account>, LedgerError> {
    let account = sqlx::query_as("UPDATE accounts SET updated_at = updated_at WHERE id = $1 RETURNING *")
        .bind(account_id)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

pub async fn apply_delta(
    account_id: AccountId,
    delta: BalanceDelta,
    conn: &mut SqliteConnection,
) -> Result<Account, LedgerError> {
    let account = sqlx::query_as(
        r#"
            UPDATE accounts SET
                available = available + $1,
                held = held + $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *;
        "#,
    )
    .bind(delta.available)
    .bind(delta.held)
    .bind(account_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_check_violation() => {
            LedgerError::InvalidFlow(format!("Balance change {delta:?} would overdraw account {account_id}"))
        },
        _ => LedgerError::from(e),
    })?
    .ok_or(LedgerError::AccountNotFound(account_id))?;
    Ok(account)
}
