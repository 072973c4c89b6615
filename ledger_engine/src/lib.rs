//! Ledger Engine
//!
//! The reconciliation core of a ledger whose balance changes only take effect once the blockchain transaction behind
//! them is final. Every change is recorded as a `Pending` balance flow first. It is settled, exactly once, when the
//! chain reports its transaction as confirmed or failed.
//!
//! The library is divided into these sections:
//! 1. Storage ([`mod@traits`], and the SQLite backend in `sqlite`). Backends implement [`LedgerDatabase`], which
//!    settles a flow and updates its account in a single transaction. The data types used in the database live in
//!    [`mod@db_types`].
//! 2. The watch registry ([`mod@watch`]). It deduplicates watch requests and polls a [`ChainOracle`] for each
//!    outstanding transaction, emitting one confirmation event per transaction.
//! 3. The ledger API ([`mod@ledger_api`]), used to submit flows and to apply confirmations.
//! 4. Reconciliation ([`mod@reconciler`]). The consumer applies confirmations as they arrive, and the sweeper re-watches
//!    flows that are still `Pending`, which is how work interrupted by a crash or restart is recovered.
//!
//! Settled flows and parked watches are published as events, see [`mod@events`].
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger_api;
pub mod reconciler;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;
pub mod watch;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use ledger_api::{
    account_api::{AccountApi, LedgerAudit},
    applier::{ApplyOutcome, LedgerApplier},
    flow_api::{FlowApi, SubmittedFlow},
};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle, ShutdownReport, SweepConfig};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use traits::{
    AccountManagement,
    ChainOracle,
    ChainTxStatus,
    LedgerDatabase,
    LedgerError,
    Settlement,
    SettlementResult,
    WatchRequest,
};
pub use watch::{AppendResult, WatchConfig, WatchRegistry};
