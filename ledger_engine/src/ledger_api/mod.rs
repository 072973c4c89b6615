//! # Ledger API
//!
//! The programmatic API of the ledger. Every API is generic over the store backend, and the ones that register watches
//! are also generic over the chain oracle.
//!
//! * [`applier`] moves a flow to its terminal state exactly once, holding the owning account's lock while it does.
//! * [`flow_api`] is used by the request path to open accounts, record new flows and start watching their
//!   transactions.
//! * [`account_api`] provides read access to accounts, their flow history, and an audit of balances against the
//!   confirmed deltas.
pub mod account_api;
pub mod applier;
pub mod flow_api;
