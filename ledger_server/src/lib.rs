//! # Ledger server
//! The process that keeps the ledger in step with the chain. It is responsible for:
//! * Loading the configuration from the environment (see [config](config/index.html)).
//! * Connecting to the ledger database and running its migrations.
//! * Querying chain RPC nodes for transaction status, via [`oracle::RpcChainOracle`].
//! * Running the reconciler until SIGINT or SIGTERM, then shutting it down in an orderly fashion.
pub mod cli;
pub mod config;
pub mod errors;
pub mod oracle;
pub mod server;
