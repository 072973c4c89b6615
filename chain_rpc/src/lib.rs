//! A small JSON-RPC client for EVM-compatible chains.
//!
//! Only the calls needed to decide whether a transaction has reached a terminal state are implemented:
//! `eth_blockNumber` and `eth_getTransactionReceipt`. Each chain id maps to its own RPC endpoint.
mod api;
mod config;
mod error;

mod data_objects;
pub mod helpers;

pub use api::ChainRpcApi;
pub use config::{parse_endpoints, ChainRpcConfig};
pub use data_objects::{ReceiptStatus, TransactionReceipt};
pub use error::ChainRpcError;
