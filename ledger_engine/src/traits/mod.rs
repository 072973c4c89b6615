//! # Store and oracle contracts
//!
//! This module defines the interfaces the reconciliation core needs from its collaborators.
//!
//! ## Traits
//! * [`LedgerDatabase`] is the persistence contract. It exposes read-one-by-id, the atomic settle operation that
//!   updates a flow's status and its account's balances together, and a bounded scan of pending flows. The request
//!   path also uses it to create accounts and flows.
//! * [`AccountManagement`] provides read-only queries over accounts and their flows, including the sum of confirmed
//!   deltas used for auditing.
//! * [`ChainOracle`] answers "has transaction T on chain C reached a terminal state?".
//!
//! All futures returned by these traits are `Send`, so the core can run them on spawned tokio tasks.
mod account_management;
mod chain_oracle;
mod data_objects;
mod ledger_database;

pub use account_management::AccountManagement;
pub use chain_oracle::{ChainOracle, ChainTxStatus};
pub use data_objects::{Settlement, SettlementResult, WatchRequest};
pub use ledger_database::{LedgerDatabase, LedgerError};
