use std::time::Duration;

use ledger_common::Amount;

use crate::{
    db_types::{AccountId, BalanceFlow, BalanceOp, ChainId, FlowId, NewBalanceFlow, TxHash},
    reconciler::{ReconcilerConfig, SweepConfig},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::LedgerDatabase,
    watch::WatchConfig,
    SqliteDatabase,
};

/// A migrated database in a fresh file.
pub async fn new_test_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

pub fn random_tx_hash() -> TxHash {
    format!("0x{:064x}", rand::random::<u64>()).parse().expect("Invalid tx hash")
}

/// Inserts a pending flow on chain 1 with a random transaction hash. Use `ref_flow_id = 0` for no reference.
pub async fn pending_flow(
    db: &SqliteDatabase,
    account_id: AccountId,
    op: BalanceOp,
    amount: i64,
    ref_flow_id: FlowId,
) -> BalanceFlow {
    let chain = ChainId::new(1).expect("Invalid chain id");
    let flow = NewBalanceFlow::new(account_id, chain, op, Amount::from(amount))
        .with_tx_hash(random_tx_hash())
        .with_ref_flow(ref_flow_id);
    db.insert_flow(flow).await.expect("Error inserting flow")
}

/// Millisecond timings, so that tests do not wait on production intervals. The sweeper only runs at startup.
pub fn fast_reconciler_config() -> ReconcilerConfig {
    ReconcilerConfig {
        watch: WatchConfig {
            poll_interval: Duration::from_millis(10),
            max_oracle_attempts: 3,
            backoff_base: Duration::from_millis(5),
            backoff_max: Duration::from_millis(20),
            oracle_concurrency: 8,
        },
        sweep: SweepConfig { interval: Duration::from_secs(3600), batch_size: 100, min_age: Duration::ZERO },
        shutdown_timeout: Duration::from_secs(5),
        forced_shutdown_timeout: Duration::from_secs(1),
        event_buffer_size: 16,
    }
}
