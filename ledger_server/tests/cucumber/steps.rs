use std::time::Duration;

use cucumber::{given, then, when};
use ledger_common::Amount;
use ledger_engine::{
    db_types::{BalanceOp, FlowStatus},
    AccountManagement,
    ChainTxStatus,
    LedgerDatabase,
    LedgerError,
};

use crate::cucumber::LedgerWorld;

fn parse_op(op: &str) -> BalanceOp {
    match op {
        "recharges" => BalanceOp::Recharge,
        "freezes" => BalanceOp::Freeze,
        "unfreezes" => BalanceOp::Unfreeze,
        "withdraws" => BalanceOp::Withdraw,
        _ => panic!("Unknown operation: {op}"),
    }
}

fn parse_status(status: &str) -> FlowStatus {
    match status {
        "Pending" => FlowStatus::Pending,
        "Confirmed" => FlowStatus::Confirmed,
        "Failed" => FlowStatus::Failed,
        _ => panic!("Unknown status: {status}"),
    }
}

#[given("a running reconciler")]
async fn running_reconciler(world: &mut LedgerWorld) {
    world.start_reconciler().await;
}

#[given(expr = "an account for {word}")]
async fn an_account(world: &mut LedgerWorld, name: String) {
    let account = world.api().create_account().await.unwrap();
    world.accounts.insert(name, account.id);
}

// Alice recharges 100 in transaction "tx1"
#[when(expr = "{word} {word} {int} in transaction {string}")]
async fn submit_flow(world: &mut LedgerWorld, name: String, op: String, amount: i64, tx: String) {
    world.submit(&name, parse_op(&op), amount, &tx, None).await;
}

// Alice unfreezes 30 of "tx2" in transaction "tx3"
#[when(expr = "{word} {word} {int} of {string} in transaction {string}")]
async fn submit_paired_flow(
    world: &mut LedgerWorld,
    name: String,
    op: String,
    amount: i64,
    reference: String,
    tx: String,
) {
    world.submit(&name, parse_op(&op), amount, &tx, Some(&reference)).await;
}

#[when(expr = "transaction {string} is confirmed on chain")]
async fn confirmed_on_chain(world: &mut LedgerWorld, tx: String) {
    let hash = world.tx_hash(&tx);
    world.oracle.set_status(&hash, ChainTxStatus::Confirmed);
}

#[when(expr = "transaction {string} fails on chain")]
async fn failed_on_chain(world: &mut LedgerWorld, tx: String) {
    let hash = world.tx_hash(&tx);
    world.oracle.set_status(&hash, ChainTxStatus::Failed);
}

#[when("the reconciler restarts")]
async fn restart(world: &mut LedgerWorld) {
    world.stop_reconciler().await;
    world.start_reconciler().await;
}

#[then(expr = "the flow for {string} is {word}")]
async fn flow_status(world: &mut LedgerWorld, tx: String, status: String) {
    let status = parse_status(&status);
    if status == FlowStatus::Pending {
        // Give the reconciler the chance to (wrongly) settle it
        tokio::time::sleep(Duration::from_millis(200)).await;
        let id = world.flow(&tx).id;
        let flow = world.database().fetch_flow(id).await.unwrap().unwrap();
        assert_eq!(flow.status, FlowStatus::Pending);
    } else {
        world.wait_for_status(&tx, status).await;
    }
}

#[then(expr = "{word} has {int} available and {int} held")]
async fn balances(world: &mut LedgerWorld, name: String, available: i64, held: i64) {
    let account = world.database().fetch_account(world.account(&name)).await.unwrap().unwrap();
    assert_eq!(account.available, Amount::from(available), "available balance of {name}");
    assert_eq!(account.held, Amount::from(held), "held balance of {name}");
}

#[then(expr = "the ledger for {word} is consistent")]
async fn ledger_consistent(world: &mut LedgerWorld, name: String) {
    let account_id = world.account(&name);
    let accounts = world.handle.as_ref().expect("Reconciler not started").account_api();
    let audit = accounts.audit(account_id).await.unwrap();
    assert!(audit.is_consistent(), "{audit:?}");
}

#[then("the flow is rejected because the hold is exhausted")]
async fn hold_exhausted(world: &mut LedgerWorld) {
    let err = world.last_error.take().expect("The flow was accepted");
    assert!(matches!(err, LedgerError::HoldExceeded { .. }), "Unexpected error: {err}");
}
